use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::calc::{self, AttendanceTally};
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{class_scope, get_required_record, get_required_str, not_configured, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceEntry, AttendanceStatus, User};
use crate::store::Dataset;

fn attendance_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.attendance(session)?,
        None => Vec::new(),
    };
    data.attendance.replace_all(rows);
    Ok(json!({ "records": data.attendance.items() }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayRecord {
    student_id: String,
    #[serde(default)]
    class_id: String,
    status: AttendanceStatus,
    #[serde(default)]
    notes: String,
}

/// A full day is one gateway call. The local rows are written first so the
/// snapshot can be restored if the gateway refuses the batch.
fn attendance_save_day(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let date = get_required_str(params, "date")?;
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params(format!("invalid date: {}", date)));
    }
    let records: Vec<DayRecord> = get_required_record(params, "records")?;
    if records.is_empty() {
        return Err(HandlerErr::bad_params("records must not be empty"));
    }

    let entries: Vec<AttendanceEntry> = records
        .into_iter()
        .map(|record| AttendanceEntry {
            student_id: record.student_id,
            class_id: if record.class_id.is_empty() {
                class_id.to_string()
            } else {
                record.class_id
            },
            date: date.clone(),
            status: record.status,
            notes: record.notes,
        })
        .collect();

    let snapshot = data.attendance.items().to_vec();
    for entry in &entries {
        data.attendance.upsert(entry.clone());
    }
    if let Err(error) = client.save_attendance(&date, &entries) {
        data.attendance.replace_all(snapshot);
        return Err(HandlerErr::from(error));
    }
    Ok(json!({ "ok": true, "saved": entries.len() }))
}

/// Per-student tallies for one month, joined against the roster. Entries for
/// students no longer on the roster still count in the class totals.
fn attendance_recap(data: &Dataset, params: &Value, class_id: &str) -> Result<Value, HandlerErr> {
    let month = get_required_str(params, "month")?;

    let in_scope: Vec<&AttendanceEntry> = data
        .attendance
        .items()
        .iter()
        .filter(|entry| entry.date.starts_with(&month))
        .filter(|entry| entry.class_id.is_empty() || entry.class_id == class_id)
        .collect();

    let mut per_student: BTreeMap<&str, AttendanceTally> = BTreeMap::new();
    let mut totals = AttendanceTally::default();
    for entry in &in_scope {
        per_student
            .entry(entry.student_id.as_str())
            .or_default()
            .add(entry.status);
        totals.add(entry.status);
    }

    let students: Vec<Value> = data
        .students
        .items()
        .iter()
        .map(|student| {
            let tally = per_student
                .get(student.id.as_str())
                .copied()
                .unwrap_or_default();
            json!({
                "studentId": student.id,
                "nis": student.nis,
                "name": student.name,
                "tally": tally,
                "percent": tally.percent(),
            })
        })
        .collect();

    Ok(json!({
        "month": month,
        "students": students,
        "totals": totals,
        "percent": totals.percent(),
    }))
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match attendance_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_save_day(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match attendance_save_day(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_recap(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    match attendance_recap(&state.data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.load" => Some(handle_load(state, req)),
        "attendance.saveDay" => Some(handle_save_day(state, req)),
        "attendance.recap" => Some(handle_recap(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Student;

    fn entry(student_id: &str, date: &str, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            student_id: student_id.to_string(),
            class_id: "4b".to_string(),
            date: date.to_string(),
            status,
            notes: String::new(),
        }
    }

    fn student(id: &str, nis: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            nis: nis.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn recap_joins_roster_and_filters_month() {
        let mut data = Dataset::default();
        data.students.replace_all(vec![
            student("s1", "1001", "Ahmad"),
            student("s2", "1002", "Budi"),
        ]);
        data.attendance.replace_all(vec![
            entry("s1", "2024-05-02", AttendanceStatus::Present),
            entry("s1", "2024-05-03", AttendanceStatus::Sick),
            entry("s2", "2024-05-02", AttendanceStatus::Present),
            entry("s1", "2024-06-01", AttendanceStatus::Alpha),
        ]);

        let recap =
            attendance_recap(&data, &json!({ "month": "2024-05" }), "4b").unwrap();
        assert_eq!(recap["month"], "2024-05");
        let students = recap["students"].as_array().unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0]["tally"]["present"], 1);
        assert_eq!(students[0]["tally"]["sick"], 1);
        assert_eq!(students[0]["percent"], 50);
        assert_eq!(recap["totals"]["present"], 2);
        assert_eq!(recap["totals"]["alpha"], 0);
    }

    #[test]
    fn recap_skips_other_classes() {
        let mut data = Dataset::default();
        data.students.replace_all(vec![student("s1", "1001", "Ahmad")]);
        let mut other = entry("s1", "2024-05-03", AttendanceStatus::Alpha);
        other.class_id = "5a".to_string();
        data.attendance
            .replace_all(vec![entry("s1", "2024-05-02", AttendanceStatus::Present), other]);

        let recap =
            attendance_recap(&data, &json!({ "month": "2024-05" }), "4b").unwrap();
        assert_eq!(recap["totals"]["present"], 1);
        assert_eq!(recap["totals"]["alpha"], 0);
    }

    #[test]
    fn recap_requires_month() {
        let data = Dataset::default();
        let err = attendance_recap(&data, &json!({}), "4b").unwrap_err();
        assert_eq!(err.code, "bad_params");
    }
}
