//! HTTP client for the remote gateway.
//!
//! The gateway is a single endpoint: reads are GETs carrying an `action`
//! query parameter (object-valued parameters are JSON-encoded into the query
//! string), writes are POSTs with a JSON body of `{action, payload, ...}`.
//! Every response is an [`Envelope`]. The transport sits behind a trait so
//! unit tests can script responses without a server.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::model::{
    AgendaItem, AttendanceEntry, ClassConfig, GradeData, Guest, Holiday, InventoryItem,
    JournalEntry, LiaisonLog, LiaisonStatus, PermissionRequest, Student, User,
};

/// Apps Script deployments answer POSTs with a redirect to a one-shot
/// content host, so the client must follow redirects (reqwest's default).
const WIRE_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// What went wrong talking to the gateway. Callers get a stable `code` per
/// variant next to the user-facing message, so "offline" is distinguishable
/// from "the server rejected the request".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// No endpoint is configured; remote calls are refused before any I/O.
    #[error("API URL belum dikonfigurasi.")]
    NotConfigured,
    /// The request never produced an HTTP response.
    #[error("Gagal menghubungi server.")]
    Connect { detail: String },
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },
    /// 2xx response whose body was not the expected JSON envelope.
    #[error("Respon server tidak valid.")]
    BadBody { detail: String },
    /// The gateway answered `{status: "error"}`; the message is the server's.
    #[error("{0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotConfigured => "not_configured",
            GatewayError::Connect { .. } => "gateway_unreachable",
            GatewayError::HttpStatus { .. } => "gateway_http",
            GatewayError::BadBody { .. } => "gateway_bad_body",
            GatewayError::Rejected(_) => "gateway_rejected",
        }
    }

    /// Structured context for error responses, where a variant has any.
    pub fn details(&self) -> Option<Value> {
        match self {
            GatewayError::Connect { detail } | GatewayError::BadBody { detail } => {
                Some(json!({ "detail": detail }))
            }
            GatewayError::HttpStatus { status } => Some(json!({ "status": status })),
            _ => None,
        }
    }
}

/// The gateway's uniform response shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    /// Server-issued identifier, present on some create responses.
    #[serde(default)]
    pub id: Option<String>,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Turns a rejection envelope into [`GatewayError::Rejected`]. Writes go
/// through this; reads deliberately do not (see [`GatewayClient::fetch_list`]).
fn expect_success(envelope: Envelope) -> Result<Envelope, GatewayError> {
    if envelope.status == "error" {
        let message = envelope
            .message
            .unwrap_or_else(|| "Gagal menyimpan data.".to_string());
        return Err(GatewayError::Rejected(message));
    }
    Ok(envelope)
}

fn bad_body(err: serde_json::Error) -> GatewayError {
    GatewayError::BadBody {
        detail: err.to_string(),
    }
}

/// Raw wire access. `params` and `body` are JSON objects; how they reach the
/// server (query string vs request body) is the transport's business.
pub trait Transport {
    fn get(&self, action: &str, params: Value) -> Result<Envelope, GatewayError>;
    fn post(&self, body: Value) -> Result<Envelope, GatewayError>;
}

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::Connect {
                detail: err.to_string(),
            })?;
        Ok(HttpTransport {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

/// Flattens a params object into query pairs. Strings pass through as-is;
/// everything else (objects, arrays, null, numbers) is JSON-encoded, which
/// is how the original web client serialized its query strings.
fn query_pairs(action: &str, params: &Value) -> Vec<(String, String)> {
    let mut pairs = vec![("action".to_string(), action.to_string())];
    if let Value::Object(map) = params {
        for (key, value) in map {
            let encoded = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            pairs.push((key.clone(), encoded));
        }
    }
    pairs
}

fn read_envelope(response: Response) -> Result<Envelope, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::HttpStatus {
            status: status.as_u16(),
        });
    }
    response.json::<Envelope>().map_err(|err| GatewayError::BadBody {
        detail: err.to_string(),
    })
}

impl Transport for HttpTransport {
    fn get(&self, action: &str, params: Value) -> Result<Envelope, GatewayError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query_pairs(action, &params))
            .header(CONTENT_TYPE, WIRE_CONTENT_TYPE)
            .send()
            .map_err(|err| GatewayError::Connect {
                detail: err.to_string(),
            })?;
        read_envelope(response)
    }

    fn post(&self, body: Value) -> Result<Envelope, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, WIRE_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .map_err(|err| GatewayError::Connect {
                detail: err.to_string(),
            })?;
        read_envelope(response)
    }
}

/// One thin wrapper per gateway action. Reads return decoded rows; writes
/// return the raw envelope so callers can pick up a server-issued id.
pub struct GatewayClient {
    transport: Box<dyn Transport>,
}

impl GatewayClient {
    pub fn new(endpoint: &str) -> Result<Self, GatewayError> {
        Ok(GatewayClient {
            transport: Box::new(HttpTransport::new(endpoint)?),
        })
    }

    #[cfg(test)]
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        GatewayClient { transport }
    }

    /// Shared read path. A rejection envelope yields an empty list rather
    /// than an error, matching the original client; transport failures still
    /// propagate so callers can tell "offline" from "nothing there".
    fn fetch_list<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Value,
    ) -> Result<Vec<T>, GatewayError> {
        let envelope = self.transport.get(action, params)?;
        if !envelope.is_success() {
            return Ok(Vec::new());
        }
        match envelope.data {
            Some(data) if !data.is_null() => serde_json::from_value(data).map_err(bad_body),
            _ => Ok(Vec::new()),
        }
    }

    // --- Auth ---

    /// `Ok(None)` means the gateway answered but refused the credentials.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<User>, GatewayError> {
        let envelope = self.transport.post(json!({
            "action": "login",
            "payload": { "username": username, "password": password },
        }))?;
        if envelope.status == "error" {
            let message = envelope.message.unwrap_or_else(|| "Login gagal.".to_string());
            return Err(GatewayError::Rejected(message));
        }
        match envelope.data {
            Some(data) if !data.is_null() => Ok(Some(serde_json::from_value(data).map_err(bad_body)?)),
            _ => Ok(None),
        }
    }

    // --- Students ---

    pub fn students(&self, user: Option<&User>) -> Result<Vec<Student>, GatewayError> {
        self.fetch_list("getStudents", scope(user))
    }

    pub fn create_student(&self, student: &Student) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "createStudent",
            "payload": student,
        }))?)
    }

    pub fn update_student(&self, student: &Student) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "updateStudent",
            "payload": student,
        }))?)
    }

    pub fn delete_student(&self, id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteStudent",
            "id": id,
        }))?)
    }

    // --- Inventory ---

    pub fn inventory(&self, class_id: &str) -> Result<Vec<InventoryItem>, GatewayError> {
        self.fetch_list("getInventory", json!({ "classId": class_id }))
    }

    pub fn save_inventory(&self, item: &InventoryItem) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveInventory",
            "payload": item,
        }))?)
    }

    pub fn delete_inventory(&self, id: &str, class_id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteInventory",
            "id": id,
            "classId": class_id,
        }))?)
    }

    // --- Guest book ---

    pub fn guests(&self, class_id: &str) -> Result<Vec<Guest>, GatewayError> {
        self.fetch_list("getGuests", json!({ "classId": class_id }))
    }

    pub fn save_guest(&self, guest: &Guest) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveGuest",
            "payload": guest,
        }))?)
    }

    pub fn delete_guest(&self, id: &str, class_id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteGuest",
            "id": id,
            "classId": class_id,
        }))?)
    }

    // --- Class configuration ---

    pub fn class_config(&self, class_id: &str) -> Result<Option<ClassConfig>, GatewayError> {
        let envelope = self
            .transport
            .get("getClassConfig", json!({ "classId": class_id }))?;
        if !envelope.is_success() {
            return Ok(None);
        }
        match envelope.data {
            Some(data) if !data.is_null() => {
                Ok(Some(serde_json::from_value(data).map_err(bad_body)?))
            }
            _ => Ok(None),
        }
    }

    /// Saves one config section. `key` is an uppercase section name from
    /// [`crate::model::CONFIG_SECTIONS`]; `data` is that section's value.
    pub fn save_class_config(
        &self,
        key: &str,
        data: Value,
        class_id: &str,
    ) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveClassConfig",
            "payload": { "key": key, "data": data, "classId": class_id },
        }))?)
    }

    // --- Agendas ---

    pub fn agendas(&self, user: Option<&User>) -> Result<Vec<AgendaItem>, GatewayError> {
        self.fetch_list("getAgendas", scope(user))
    }

    pub fn create_agenda(&self, agenda: &AgendaItem) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "createAgenda",
            "payload": agenda,
        }))?)
    }

    pub fn update_agenda(&self, agenda: &AgendaItem) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "updateAgenda",
            "payload": agenda,
        }))?)
    }

    pub fn delete_agenda(&self, id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteAgenda",
            "id": id,
        }))?)
    }

    // --- Grades ---

    pub fn grades(&self, user: Option<&User>) -> Result<Vec<crate::model::GradeRecord>, GatewayError> {
        self.fetch_list("getGrades", scope(user))
    }

    pub fn save_grade(
        &self,
        student_id: &str,
        subject_id: &str,
        grade_data: &GradeData,
        class_id: &str,
    ) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveGrade",
            "payload": {
                "studentId": student_id,
                "subjectId": subject_id,
                "gradeData": grade_data,
                "classId": class_id,
            },
        }))?)
    }

    // --- Attendance ---

    pub fn attendance(&self, user: Option<&User>) -> Result<Vec<AttendanceEntry>, GatewayError> {
        self.fetch_list("getAttendance", scope(user))
    }

    /// Saves one day for a whole class in a single call. The date travels
    /// once at the top of the payload, not per record.
    pub fn save_attendance(
        &self,
        date: &str,
        records: &[AttendanceEntry],
    ) -> Result<Envelope, GatewayError> {
        let records: Vec<Value> = records
            .iter()
            .map(|entry| {
                json!({
                    "studentId": entry.student_id,
                    "classId": entry.class_id,
                    "status": entry.status,
                    "notes": entry.notes,
                })
            })
            .collect();
        expect_success(self.transport.post(json!({
            "action": "saveAttendance",
            "payload": { "date": date, "records": records },
        }))?)
    }

    // --- Holidays ---

    pub fn holidays(&self, user: Option<&User>) -> Result<Vec<Holiday>, GatewayError> {
        self.fetch_list("getHolidays", scope(user))
    }

    pub fn save_holiday_batch(&self, holidays: &[Holiday]) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveHolidayBatch",
            "payload": { "holidays": holidays },
        }))?)
    }

    pub fn delete_holiday(&self, id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteHoliday",
            "id": id,
        }))?)
    }

    // --- Learning journal ---

    pub fn journal(&self, class_id: &str) -> Result<Vec<JournalEntry>, GatewayError> {
        self.fetch_list("getLearningJournal", json!({ "classId": class_id }))
    }

    pub fn save_journal_batch(&self, entries: &[JournalEntry]) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveLearningJournalBatch",
            "payload": { "entries": entries },
        }))?)
    }

    pub fn delete_journal(&self, id: &str, class_id: &str) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "deleteLearningJournal",
            "id": id,
            "classId": class_id,
        }))?)
    }

    // --- Liaison book ---

    pub fn liaison_logs(&self, user: Option<&User>) -> Result<Vec<LiaisonLog>, GatewayError> {
        self.fetch_list("getLiaisonLogs", scope(user))
    }

    pub fn save_liaison_log(&self, log: &LiaisonLog) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "saveLiaisonLog",
            "payload": log,
        }))?)
    }

    pub fn update_liaison_status(
        &self,
        ids: &[String],
        status: LiaisonStatus,
    ) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "updateLiaisonStatus",
            "payload": { "ids": ids, "status": status },
        }))?)
    }

    // --- Permission requests ---

    pub fn permission_requests(
        &self,
        user: Option<&User>,
    ) -> Result<Vec<PermissionRequest>, GatewayError> {
        self.fetch_list("getPermissionRequests", scope(user))
    }

    pub fn save_permission_request(
        &self,
        request: &PermissionRequest,
    ) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "savePermissionRequest",
            "payload": request,
        }))?)
    }

    /// `decision` is the gateway's vocabulary: "approve" or "reject".
    pub fn process_permission_request(
        &self,
        id: &str,
        decision: &str,
    ) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "processPermissionRequest",
            "payload": { "id": id, "action": decision },
        }))?)
    }

    // --- Backup restore ---

    pub fn restore_data(&self, data: &Value) -> Result<Envelope, GatewayError> {
        expect_success(self.transport.post(json!({
            "action": "restoreData",
            "payload": data,
        }))?)
    }
}

/// User-scoped reads send the whole session user (or the literal `null`)
/// JSON-encoded into the `user` query parameter.
fn scope(user: Option<&User>) -> Value {
    json!({ "user": user })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for unit tests: queue envelopes or errors, then
    //! assert on what the client sent.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    pub struct RecordedCall {
        pub method: &'static str,
        pub action: String,
        pub sent: Value,
    }

    #[derive(Default)]
    pub struct FakeState {
        pub responses: VecDeque<Result<Envelope, GatewayError>>,
        pub calls: Vec<RecordedCall>,
    }

    impl FakeState {
        pub fn queue_ok(&mut self, data: Value) {
            self.responses.push_back(Ok(success(data)));
        }

        pub fn queue_ok_with_id(&mut self, data: Value, id: &str) {
            let mut envelope = success(data);
            envelope.id = Some(id.to_string());
            self.responses.push_back(Ok(envelope));
        }

        pub fn queue_rejection(&mut self, message: &str) {
            self.responses.push_back(Ok(rejection(message)));
        }

        pub fn queue_error(&mut self, err: GatewayError) {
            self.responses.push_back(Err(err));
        }
    }

    #[derive(Default)]
    pub struct FakeTransport {
        state: Rc<RefCell<FakeState>>,
    }

    impl FakeTransport {
        pub fn new() -> (Self, Rc<RefCell<FakeState>>) {
            let transport = FakeTransport::default();
            let state = Rc::clone(&transport.state);
            (transport, state)
        }

        fn dispatch(
            &self,
            method: &'static str,
            action: String,
            sent: Value,
        ) -> Result<Envelope, GatewayError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(RecordedCall {
                method,
                action: action.clone(),
                sent,
            });
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted response left for {action}"))
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, action: &str, params: Value) -> Result<Envelope, GatewayError> {
            self.dispatch("GET", action.to_string(), params)
        }

        fn post(&self, body: Value) -> Result<Envelope, GatewayError> {
            let action = body
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.dispatch("POST", action, body)
        }
    }

    pub fn success(data: Value) -> Envelope {
        Envelope {
            status: "success".to_string(),
            data: Some(data),
            message: None,
            id: None,
        }
    }

    pub fn rejection(message: &str) -> Envelope {
        Envelope {
            status: "error".to_string(),
            data: None,
            message: Some(message.to_string()),
            id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;
    use crate::model::Student;

    fn client() -> (GatewayClient, std::rc::Rc<std::cell::RefCell<super::testing::FakeState>>) {
        let (transport, state) = FakeTransport::new();
        (GatewayClient::with_transport(Box::new(transport)), state)
    }

    #[test]
    fn query_pairs_json_encode_objects_and_pass_strings_through() {
        let pairs = query_pairs(
            "getStudents",
            &json!({ "classId": "7A", "user": { "id": "u1" }, "missing": null }),
        );
        assert_eq!(pairs[0], ("action".to_string(), "getStudents".to_string()));
        assert!(pairs.contains(&("classId".to_string(), "7A".to_string())));
        assert!(pairs.contains(&("user".to_string(), "{\"id\":\"u1\"}".to_string())));
        assert!(pairs.contains(&("missing".to_string(), "null".to_string())));
    }

    #[test]
    fn reads_decode_rows_and_send_user_scope() {
        let (client, state) = client();
        state.borrow_mut().queue_ok(json!([
            { "id": "s1", "name": "Ahmad", "classId": "7A" },
        ]));

        let user = User {
            id: "u1".to_string(),
            username: "guru".to_string(),
            ..User::default()
        };
        let rows = client.students(Some(&user)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Ahmad");

        let state = state.borrow();
        assert_eq!(state.calls[0].method, "GET");
        assert_eq!(state.calls[0].action, "getStudents");
        assert_eq!(state.calls[0].sent["user"]["id"], "u1");
    }

    #[test]
    fn reads_treat_rejection_envelopes_as_empty() {
        let (client, state) = client();
        state.borrow_mut().queue_rejection("akses ditolak");
        let rows = client.students(None).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn reads_treat_missing_data_as_empty() {
        let (client, state) = client();
        state.borrow_mut().queue_ok(Value::Null);
        let rows: Vec<Student> = client.students(None).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn reads_propagate_transport_failures() {
        let (client, state) = client();
        state
            .borrow_mut()
            .queue_error(GatewayError::HttpStatus { status: 502 });
        let err = client.students(None).unwrap_err();
        assert_eq!(err.code(), "gateway_http");
        assert_eq!(err.to_string(), "HTTP error! status: 502");
    }

    #[test]
    fn absent_user_scope_is_the_null_literal() {
        let (client, state) = client();
        state.borrow_mut().queue_ok(json!([]));
        client.agendas(None).unwrap();
        assert!(state.borrow().calls[0].sent["user"].is_null());
    }

    #[test]
    fn writes_surface_server_rejections_with_their_message() {
        let (client, state) = client();
        state.borrow_mut().queue_rejection("NIS sudah terdaftar");
        let err = client.create_student(&Student::default()).unwrap_err();
        assert_eq!(err.code(), "gateway_rejected");
        assert_eq!(err.to_string(), "NIS sudah terdaftar");
    }

    #[test]
    fn write_rejection_without_message_gets_the_stock_one() {
        let (client, state) = client();
        state.borrow_mut().responses.push_back(Ok(Envelope {
            status: "error".to_string(),
            ..Envelope::default()
        }));
        let err = client.save_guest(&crate::model::Guest::default()).unwrap_err();
        assert_eq!(err.to_string(), "Gagal menyimpan data.");
    }

    #[test]
    fn deletes_carry_identifiers_beside_the_action() {
        let (client, state) = client();
        state.borrow_mut().queue_ok(Value::Null);
        client.delete_inventory("inv-1", "7A").unwrap();

        let state = state.borrow();
        assert_eq!(state.calls[0].method, "POST");
        assert_eq!(state.calls[0].sent["id"], "inv-1");
        assert_eq!(state.calls[0].sent["classId"], "7A");
        assert!(state.calls[0].sent.get("payload").is_none());
    }

    #[test]
    fn login_refusal_without_rejection_is_none() {
        let (client, state) = client();
        state.borrow_mut().queue_ok(Value::Null);
        assert!(client.login("guru", "salah").unwrap().is_none());
    }

    #[test]
    fn login_rejection_surfaces_the_server_message() {
        let (client, state) = client();
        state.borrow_mut().queue_rejection("Akun dinonaktifkan.");
        let err = client.login("guru", "rahasia").unwrap_err();
        assert_eq!(err.to_string(), "Akun dinonaktifkan.");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(GatewayError::NotConfigured.code(), "not_configured");
        assert_eq!(
            GatewayError::Connect { detail: String::new() }.code(),
            "gateway_unreachable"
        );
        assert_eq!(GatewayError::HttpStatus { status: 500 }.code(), "gateway_http");
        assert_eq!(
            GatewayError::BadBody { detail: String::new() }.code(),
            "gateway_bad_body"
        );
        assert_eq!(GatewayError::Rejected(String::new()).code(), "gateway_rejected");
    }
}
