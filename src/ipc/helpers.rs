//! Shared plumbing for the request handlers: parameter extraction, the
//! handler-level error type, and the JSON shapes for mutation outcomes and
//! batch reports.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::gateway::GatewayError;
use crate::ipc::error::err;
use crate::ipc::types::AppState;
use crate::sync::{BatchReport, MutationOutcome};

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }
}

impl From<GatewayError> for HandlerErr {
    fn from(error: GatewayError) -> Self {
        HandlerErr {
            code: error.code(),
            message: error.to_string(),
            details: error.details(),
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Deserializes one params field into a typed record.
pub fn get_required_record<T: DeserializeOwned>(
    params: &Value,
    key: &str,
) -> Result<T, HandlerErr> {
    let value = params
        .get(key)
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    serde_json::from_value(value)
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}

/// Cell rows as a UI sends them: an array of arrays of strings. Non-string
/// cells are stringified so numeric spreadsheet cells survive.
pub fn get_required_rows(params: &Value, key: &str) -> Result<Vec<Vec<String>>, HandlerErr> {
    let rows = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = row
            .as_array()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} rows must be arrays", key)))?;
        out.push(
            cells
                .iter()
                .map(|cell| match cell {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    Ok(out)
}

/// Demo mode refuses writes before any state is touched. Handlers that go on
/// to mutate collections check `state.client` inline instead so the borrow
/// stays on that one field.
pub fn not_configured() -> HandlerErr {
    HandlerErr::from(GatewayError::NotConfigured)
}

/// The class a request operates on: explicit `classId` param first, then the
/// logged-in teacher's assignment.
pub fn class_scope(state: &AppState, params: &Value) -> Result<String, HandlerErr> {
    if let Some(class_id) = get_optional_str(params, "classId") {
        return Ok(class_id);
    }
    state
        .session
        .as_ref()
        .and_then(|user| user.class_id.clone())
        .ok_or_else(|| HandlerErr::bad_params("missing classId"))
}

pub fn outcome_json(outcome: &MutationOutcome) -> Value {
    json!({
        "mode": outcome.mode,
        "id": outcome.id,
        "stale": outcome.stale,
    })
}

/// Batch report plus the count of rows skipped before the engine ran
/// (invalid rows never become gateway calls).
pub fn report_json(report: &BatchReport, skipped: usize) -> Value {
    let mut value = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
    value["skipped"] = json!(skipped);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_str_reports_the_missing_key() {
        let params = json!({ "other": 1 });
        let e = get_required_str(&params, "classId").unwrap_err();
        assert_eq!(e.code, "bad_params");
        assert_eq!(e.message, "missing classId");
    }

    #[test]
    fn rows_stringify_numeric_cells() {
        let params = json!({ "rows": [["Spidol", 2, null]] });
        let rows = get_required_rows(&params, "rows").unwrap();
        assert_eq!(rows, vec![vec!["Spidol".to_string(), "2".to_string(), String::new()]]);
    }

    #[test]
    fn gateway_errors_map_to_stable_codes() {
        let e = HandlerErr::from(GatewayError::NotConfigured);
        assert_eq!(e.code, "not_configured");
        assert_eq!(e.message, "API URL belum dikonfigurasi.");
        let e = HandlerErr::from(GatewayError::HttpStatus { status: 502 });
        assert_eq!(e.code, "gateway_http");
        assert_eq!(e.details, Some(json!({ "status": 502 })));
    }
}
