use serde_json::{json, Value};
use tracing::warn;

use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_rows, get_required_str, not_configured,
    outcome_json, report_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Student, User};
use crate::sheets;
use crate::store::Dataset;
use crate::sync::{self, BatchReport, MutationMode};

fn students_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.students(session)?,
        None => Vec::new(),
    };
    data.students.replace_all(rows);
    Ok(json!({ "students": data.students.items() }))
}

fn students_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let student: Student = get_required_record(params, "student")?;
    if student.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("student name must not be empty"));
    }
    let pending = sync::begin_save(&mut data.students, student, None);
    let result = match pending.mode() {
        MutationMode::Created => client.create_student(&pending.record),
        MutationMode::Updated => client.update_student(&pending.record),
    };
    let outcome = sync::complete_save(&mut data.students, pending, result)?;
    Ok(outcome_json(&outcome))
}

fn students_delete(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    if !data.students.contains(&id) {
        return Err(HandlerErr::not_found("student not found"));
    }
    // Deletes are confirmed-then-removed, never optimistic.
    client.delete_student(&id)?;
    data.students.remove(&id);
    Ok(json!({ "ok": true }))
}

/// Shared import core: rows are already-split cells (from a pasted grid or a
/// parsed exchange file). Invalid rows are skipped before the engine runs;
/// valid rows always create, since imported rows never carry ids.
pub(super) fn import_student_rows(
    client: &GatewayClient,
    data: &mut Dataset,
    rows: &[Vec<String>],
    fallback_class: &str,
) -> Value {
    let mut report = BatchReport::default();
    let mut skipped = 0usize;
    for (index, fields) in rows.iter().enumerate() {
        let Some(student) = sheets::student_from_row(fields, fallback_class) else {
            skipped += 1;
            continue;
        };
        let pending = sync::begin_save(&mut data.students, student, None);
        let result = client.create_student(&pending.record);
        match sync::complete_save(&mut data.students, pending, result) {
            Ok(outcome) => report.record_success(index, &outcome),
            Err(error) => {
                warn!(%error, index, "student import row failed");
                report.record_failure(index, &error);
            }
        }
    }
    report_json(&report, skipped)
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        client,
        session,
        data,
        ..
    } = state;
    match students_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "students": state.data.students.items() }))
}

fn handle_save(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match students_save(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match students_delete(client, data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_rows(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match get_required_rows(&req.params, "rows") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(&req.id, import_student_rows(client, data, &rows, &class_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.load" => Some(handle_load(state, req)),
        "students.list" => Some(handle_list(state, req)),
        "students.save" => Some(handle_save(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        "students.importRows" => Some(handle_import_rows(state, req)),
        _ => None,
    }
}
