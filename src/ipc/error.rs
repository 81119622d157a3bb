//! Reply envelopes. Three shapes leave the daemon: success, failure, and an
//! id-less failure for lines that never parsed.

use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    json!({ "id": id, "ok": false, "error": wire_error(code, message, details) })
}

/// A line that never parsed has no id to echo back.
pub fn parse_failure(message: impl Into<String>) -> Value {
    json!({ "ok": false, "error": wire_error("bad_json", message, None) })
}

fn wire_error(code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(details) = details {
        error["details"] = details;
    }
    error
}
