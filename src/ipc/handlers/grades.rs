use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::calc;
use crate::gateway::GatewayClient;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    class_scope, get_required_record, get_required_rows, get_required_str, not_configured,
    outcome_json, report_json, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{default_subjects, GradeData, GradeRecord, User};
use crate::sheets;
use crate::store::Dataset;
use crate::sync::{self, BatchReport};

fn clamp_data(data: &GradeData) -> GradeData {
    GradeData {
        sum1: calc::clamp_score(data.sum1),
        sum2: calc::clamp_score(data.sum2),
        sum3: calc::clamp_score(data.sum3),
        sum4: calc::clamp_score(data.sum4),
        sas: calc::clamp_score(data.sas),
    }
}

/// One student's scores for one subject merged into their grade record and
/// pushed through the optimistic engine. Grade records are keyed by student,
/// so the engine always sees an update; the server upserts by studentId.
fn save_one(
    client: &GatewayClient,
    data: &mut Dataset,
    student_id: &str,
    subject_id: &str,
    grade_data: GradeData,
    class_id: &str,
) -> Result<sync::MutationOutcome, HandlerErr> {
    let grade_data = clamp_data(&grade_data);
    let mut record = data
        .grades
        .get(student_id)
        .cloned()
        .unwrap_or_else(|| GradeRecord {
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            subjects: Default::default(),
        });
    if record.class_id.is_empty() {
        record.class_id = class_id.to_string();
    }
    record.subjects.insert(subject_id.to_string(), grade_data.clone());
    let pending = sync::begin_save(&mut data.grades, record, None);
    let result = client.save_grade(student_id, subject_id, &grade_data, class_id);
    sync::complete_save(&mut data.grades, pending, result).map_err(HandlerErr::from)
}

fn grades_load(
    client: Option<&GatewayClient>,
    session: Option<&User>,
    data: &mut Dataset,
) -> Result<Value, HandlerErr> {
    let rows = match client {
        Some(client) => client.grades(session)?,
        None => Vec::new(),
    };
    data.grades.replace_all(rows);
    Ok(json!({ "grades": data.grades.items() }))
}

fn grades_save(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let grade_data: GradeData = get_required_record(params, "gradeData")?;
    let outcome = save_one(client, data, &student_id, &subject_id, grade_data, class_id)?;
    Ok(outcome_json(&outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRow {
    student_id: String,
    grade_data: GradeData,
}

/// Sequential per-student saves for one subject; each row reports its own
/// outcome and a failed row never stops the rest.
fn grades_save_all(
    client: &GatewayClient,
    data: &mut Dataset,
    params: &Value,
    class_id: &str,
) -> Result<Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let scores: Vec<ScoreRow> = get_required_record(params, "scores")?;
    let mut report = BatchReport::default();
    for (index, row) in scores.into_iter().enumerate() {
        match save_one(client, data, &row.student_id, &subject_id, row.grade_data, class_id) {
            Ok(outcome) => report.record_success(index, &outcome),
            Err(error) => {
                warn!(code = error.code, index, "grade batch row failed");
                report.record_rejected(index, error.code, error.message);
            }
        }
    }
    Ok(report_json(&report, 0))
}

fn grades_summary(data: &Dataset, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let catalog = default_subjects();
    let subject_name = catalog
        .iter()
        .find(|subject| subject.id == subject_id)
        .map(|subject| subject.name.clone())
        .unwrap_or_else(|| subject_id.clone());
    let kktp = calc::effective_kktp(data.class_config.as_ref(), &catalog, &subject_id);

    let mut graded = 0usize;
    let students_json: Vec<Value> = data
        .students
        .items()
        .iter()
        .map(|student| {
            let grade = data
                .grades
                .get(&student.id)
                .and_then(|record| record.subjects.get(&subject_id))
                .cloned()
                .unwrap_or_default();
            let average = calc::final_average(&grade);
            if average > 0 {
                graded += 1;
            }
            json!({
                "studentId": student.id,
                "nis": student.nis,
                "name": student.name,
                "average": average,
                "display": calc::display_average(average),
                "status": calc::grade_status(average, kktp).label(),
                "needsRemedial": calc::needs_remedial(average, kktp),
            })
        })
        .collect();

    let class_average =
        calc::class_subject_average(data.students.items(), data.grades.items(), &subject_id);
    Ok(json!({
        "subjectId": subject_id,
        "subjectName": subject_name,
        "kktp": kktp,
        "classAverage": class_average,
        "progress": calc::curriculum_progress(class_average, kktp),
        "graded": graded,
        "students": students_json,
    }))
}

/// Shared import core: exchange rows matched to the roster by NIS. Unmatched
/// rows fail with `not_found`; matched rows run the normal save flow.
pub(super) fn import_grade_rows(
    client: &GatewayClient,
    data: &mut Dataset,
    rows: &[Vec<String>],
    subject_id: &str,
    class_id: &str,
) -> Value {
    let mut report = BatchReport::default();
    let mut skipped = 0usize;
    for (index, fields) in rows.iter().enumerate() {
        let Some((nis, grade_data)) = sheets::grade_scores_from_row(fields) else {
            skipped += 1;
            continue;
        };
        let Some(student_id) = data
            .students
            .items()
            .iter()
            .find(|student| student.nis == nis)
            .map(|student| student.id.clone())
        else {
            report.record_rejected(index, "not_found", format!("NIS {} tidak terdaftar", nis));
            continue;
        };
        match save_one(client, data, &student_id, subject_id, grade_data, class_id) {
            Ok(outcome) => report.record_success(index, &outcome),
            Err(error) => {
                warn!(code = error.code, index, "grade import row failed");
                report.record_rejected(index, error.code, error.message);
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
    match grades_load(client.as_ref(), session.as_ref(), data) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    ok(&req.id, json!({ "grades": state.data.grades.items() }))
}

fn handle_save(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match grades_save(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_save_all(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let AppState { client, data, .. } = state;
    let Some(client) = client.as_ref() else {
        return not_configured().response(&req.id);
    };
    match grades_save_all(client, data, &req.params, &class_id) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_summary(state: &mut AppState, req: &Request) -> Value {
    match grades_summary(&state.data, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import_rows(state: &mut AppState, req: &Request) -> Value {
    let class_id = match class_scope(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let subject_id = match get_required_str(&req.params, "subjectId") {
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
    ok(
        &req.id,
        import_grade_rows(client, data, &rows, &subject_id, &class_id),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.load" => Some(handle_load(state, req)),
        "grades.list" => Some(handle_list(state, req)),
        "grades.save" => Some(handle_save(state, req)),
        "grades.saveAll" => Some(handle_save_all(state, req)),
        "grades.summary" => Some(handle_summary(state, req)),
        "grades.importRows" => Some(handle_import_rows(state, req)),
        _ => None,
    }
}
