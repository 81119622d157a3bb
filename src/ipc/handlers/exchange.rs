use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{json, Value};
use tracing::warn;

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::handlers::{grades, inventory, students};
use crate::ipc::helpers::{
    class_scope, get_optional_str, get_required_str, not_configured, report_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::default_subjects;
use crate::sheets;
use crate::store::Dataset;
use crate::sync::{self, BatchReport};

fn required_path(params: &Value, key: &str) -> Result<PathBuf, HandlerErr> {
    let raw = get_required_str(params, key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(PathBuf::from(trimmed))
}

fn io_failed(path: &Path, error: impl std::fmt::Display) -> HandlerErr {
    HandlerErr {
        code: "io_failed",
        message: error.to_string(),
        details: Some(json!({ "path": path.to_string_lossy() })),
    }
}

/// Templates and exports write wherever the caller points them; the format
/// comes from the extension (`.xlsx` or CSV).
fn write_rows(path: &Path, sheet: &str, rows: &[Vec<String>]) -> Result<Value, HandlerErr> {
    sheets::write_table(path, sheet, rows).map_err(|error| io_failed(path, error))?;
    Ok(json!({
        "ok": true,
        "path": path.to_string_lossy(),
        "rows": rows.len(),
    }))
}

fn read_rows(path: &Path) -> Result<Vec<(usize, Vec<String>)>, HandlerErr> {
    let text = fs::read_to_string(path).map_err(|error| io_failed(path, error))?;
    Ok(sheets::parse_csv(&text))
}

fn data_rows(numbered: Vec<(usize, Vec<String>)>) -> Vec<Vec<String>> {
    numbered.into_iter().map(|(_, fields)| fields).collect()
}

// --- Students ---

fn students_template(params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(
        &path,
        sheets::STUDENT_TEMPLATE_SHEET,
        &sheets::student_template_rows(),
    )
}

fn export_students(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(
        &path,
        sheets::STUDENT_EXPORT_SHEET,
        &sheets::student_export_rows(data.students.items()),
    )
}

/// Dry run of a student import: every data line is judged, nothing is
/// written anywhere. Works without a gateway.
fn preview_students(params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    let fallback_class = get_optional_str(params, "classId").unwrap_or_default();
    let numbered = read_rows(&path)?;

    let mut valid = 0usize;
    let rows: Vec<Value> = numbered
        .iter()
        .map(|(line, fields)| match sheets::student_from_row(fields, &fallback_class) {
            Some(student) => {
                valid += 1;
                json!({
                    "line": line,
                    "ok": true,
                    "nis": student.nis,
                    "name": student.name,
                })
            }
            None => json!({
                "line": line,
                "ok": false,
                "reason": "NIS dan Nama Lengkap wajib diisi",
            }),
        })
        .collect();

    Ok(json!({ "rows": rows, "total": rows.len(), "valid": valid }))
}

// --- Grades ---

fn grades_template(params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    let subject_id = get_required_str(params, "subjectId")?;
    write_rows(
        &path,
        sheets::GRADE_TEMPLATE_SHEET,
        &sheets::grade_template_rows(&subject_id),
    )
}

fn export_grades(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let catalog = default_subjects();
    let subject_name = catalog
        .iter()
        .find(|subject| subject.id == subject_id)
        .map(|subject| subject.name.clone())
        .unwrap_or_else(|| subject_id.clone());
    let kktp = calc::effective_kktp(data.class_config.as_ref(), &catalog, &subject_id);
    let rows = sheets::grade_export_rows(
        data.students.items(),
        data.grades.items(),
        &subject_id,
        &subject_name,
        kktp,
    );
    write_rows(&path, &subject_name, &rows)
}

// --- Inventory ---

fn inventory_template(params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(
        &path,
        sheets::INVENTORY_SHEET,
        &sheets::inventory_template_rows(),
    )
}

fn export_inventory(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(
        &path,
        sheets::INVENTORY_SHEET,
        &sheets::inventory_export_rows(data.inventory.items()),
    )
}

// --- Guests ---

fn guests_template(params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(&path, sheets::GUEST_SHEET, &sheets::guest_template_rows())
}

fn export_guests(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let path = required_path(params, "path")?;
    write_rows(
        &path,
        sheets::GUEST_SHEET,
        &sheets::guest_export_rows(data.guests.items()),
    )
}

fn import_guest_rows(
    client: &GatewayClient,
    data: &mut Dataset,
    rows: &[Vec<String>],
    class_id: &str,
) -> Value {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let now = Local::now().format("%H:%M").to_string();
    let mut report = BatchReport::default();
    let mut skipped = 0usize;
    for (index, fields) in rows.iter().enumerate() {
        let Some(guest) = sheets::guest_from_row(fields, class_id, &today, &now) else {
            skipped += 1;
            continue;
        };
        let pending = sync::begin_save(&mut data.guests, guest, Some(calc::guest_order));
        let result = client.save_guest(&pending.record);
        match sync::complete_save(&mut data.guests, pending, result) {
            Ok(outcome) => report.record_success(index, &outcome),
            Err(error) => {
                warn!(code = error.code(), index, "guest import row failed");
                report.record_failure(index, &error);
            }
        }
    }
    report_json(&report, skipped)
}

// --- Wrappers ---

fn local_op(
    state: &mut AppState,
    req: &Request,
    op: fn(&Dataset, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    match op(&state.data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_template(req: &Request) -> Value {
    match students_template(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_grades_template(req: &Request) -> Value {
    match grades_template(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_inventory_template(req: &Request) -> Value {
    match inventory_template(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_guests_template(req: &Request) -> Value {
    match guests_template(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_preview_students(req: &Request) -> Value {
    match preview_students(&req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_students(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let path = match required_path(&req.params, "path") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match read_rows(&path) {
        Ok(v) => data_rows(v),
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(
        &req.id,
        students::import_student_rows(client, data, &rows, &class_id),
    )
}

fn handle_import_grades(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let subject_id = match get_required_str(&req.params, "subjectId") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let path = match required_path(&req.params, "path") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match read_rows(&path) {
        Ok(v) => data_rows(v),
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(
        &req.id,
        grades::import_grade_rows(client, data, &rows, &subject_id, &class_id),
    )
}

fn handle_import_inventory(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let path = match required_path(&req.params, "path") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match read_rows(&path) {
        Ok(v) => data_rows(v),
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(
        &req.id,
        inventory::import_inventory_rows(client, data, &rows, &class_id),
    )
}

fn handle_import_guests(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let path = match required_path(&req.params, "path") {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let rows = match read_rows(&path) {
        Ok(v) => data_rows(v),
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    ok(&req.id, import_guest_rows(client, data, &rows, &class_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "exchange.studentsTemplate" => Some(handle_students_template(req)),
        "exchange.exportStudents" => Some(local_op(state, req, export_students)),
        "exchange.previewStudents" => Some(handle_preview_students(req)),
        "exchange.importStudents" => Some(handle_import_students(state, req)),
        "exchange.gradesTemplate" => Some(handle_grades_template(req)),
        "exchange.exportGrades" => Some(local_op(state, req, export_grades)),
        "exchange.importGrades" => Some(handle_import_grades(state, req)),
        "exchange.inventoryTemplate" => Some(handle_inventory_template(req)),
        "exchange.exportInventory" => Some(local_op(state, req, export_inventory)),
        "exchange.importInventory" => Some(handle_import_inventory(state, req)),
        "exchange.guestsTemplate" => Some(handle_guests_template(req)),
        "exchange.exportGuests" => Some(local_op(state, req, export_guests)),
        "exchange.importGuests" => Some(handle_import_guests(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_paths_are_rejected() {
        let err = required_path(&json!({ "path": "   " }), "path").unwrap_err();
        assert_eq!(err.code, "bad_params");
        let err = required_path(&json!({}), "path").unwrap_err();
        assert_eq!(err.code, "bad_params");
        assert_eq!(err.message, "missing path");
    }

    #[test]
    fn missing_files_report_the_path() {
        let path = Path::new("/definitely/not/here.csv");
        let err = read_rows(path).unwrap_err();
        assert_eq!(err.code, "io_failed");
        let details = err.details.unwrap();
        assert_eq!(details["path"], "/definitely/not/here.csv");
    }
}
