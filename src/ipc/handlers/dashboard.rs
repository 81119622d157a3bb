use chrono::{Datelike, Duration, Local, NaiveDate};
use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::model::{default_subjects, AttendanceStatus, Holiday, PermissionStatus, Subject};
use crate::store::Dataset;

const TREND_DAYS: [&str; 6] = ["Sen", "Sel", "Rab", "Kam", "Jum", "Sab"];

/// Everything the dashboard shows, computed from the collections as loaded.
/// Pure in `today` so the week and month windows are testable.
fn summary_for(data: &Dataset, catalog: &[Subject], today: NaiveDate) -> Value {
    let today_str = today.format("%Y-%m-%d").to_string();
    let month_prefix = today.format("%Y-%m").to_string();

    let students = data.students.items();
    let male = students.iter().filter(|s| s.gender == "L").count();
    let female = students.iter().filter(|s| s.gender == "P").count();

    let monthly = calc::tally_entries(
        data.attendance
            .items()
            .iter()
            .filter(|entry| entry.date.starts_with(&month_prefix)),
    );
    let rate = calc::dashboard_attendance_rate(&monthly, students.len());

    // The trend covers the school week around `today`: Monday through
    // Saturday, whatever weekday it currently is.
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let weekly_trend: Vec<Value> = TREND_DAYS
        .iter()
        .enumerate()
        .map(|(offset, name)| {
            let date = (monday + Duration::days(offset as i64))
                .format("%Y-%m-%d")
                .to_string();
            let tally = calc::tally_entries(
                data.attendance.items().iter().filter(|e| e.date == date),
            );
            json!({
                "day": name,
                "date": date,
                "present": tally.present,
                "sick": tally.sick,
                "permit": tally.permit,
                "alpha": tally.alpha,
            })
        })
        .collect();

    let absent_today: Vec<Value> = data
        .attendance
        .items()
        .iter()
        .filter(|entry| entry.date == today_str && entry.status != AttendanceStatus::Present)
        .map(|entry| {
            let name = data
                .students
                .get(&entry.student_id)
                .map(|student| student.name.clone())
                .unwrap_or_else(|| "Siswa tidak ditemukan".to_string());
            json!({
                "studentId": entry.student_id,
                "name": name,
                "status": entry.status,
                "notes": entry.notes,
            })
        })
        .collect();

    let pending_permissions = data
        .permissions
        .items()
        .iter()
        .filter(|request| request.status == PermissionStatus::Pending)
        .count();

    let agendas = data.agendas.items();
    let priority_agenda = agendas
        .iter()
        .find(|agenda| agenda.kind == "urgent" && !agenda.completed)
        .or_else(|| agendas.iter().find(|agenda| !agenda.completed));

    let mut upcoming: Vec<(NaiveDate, &Holiday)> = data
        .holidays
        .items()
        .iter()
        .filter_map(|holiday| {
            let date = NaiveDate::parse_from_str(&holiday.date, "%Y-%m-%d").ok()?;
            (date >= today).then_some((date, holiday))
        })
        .collect();
    upcoming.sort_by_key(|(date, _)| *date);
    let upcoming_holidays: Vec<Value> = upcoming
        .into_iter()
        .take(4)
        .map(|(date, holiday)| {
            let mut value = serde_json::to_value(holiday).unwrap_or_else(|_| json!({}));
            value["inDays"] = json!((date - today).num_days());
            value
        })
        .collect();

    let curriculum: Vec<Value> = catalog
        .iter()
        .map(|subject| {
            let class_average =
                calc::class_subject_average(students, data.grades.items(), &subject.id);
            let kktp = calc::effective_kktp(data.class_config.as_ref(), catalog, &subject.id);
            json!({
                "subjectId": subject.id,
                "name": subject.name,
                "kktp": kktp,
                "classAverage": class_average,
                "progress": calc::curriculum_progress(class_average, kktp),
            })
        })
        .collect();

    json!({
        "date": today_str,
        "students": { "total": students.len(), "male": male, "female": female },
        "monthly": {
            "present": monthly.present,
            "sick": monthly.sick,
            "permit": monthly.permit,
            "alpha": monthly.alpha,
            "rate": rate,
        },
        "weeklyTrend": weekly_trend,
        "absentToday": absent_today,
        "pendingPermissions": pending_permissions,
        "priorityAgenda": priority_agenda,
        "upcomingHolidays": upcoming_holidays,
        "curriculumProgress": curriculum,
    })
}

fn handle_summary(state: &mut AppState, req: &Request) -> Value {
    let catalog = default_subjects();
    ok(
        &req.id,
        summary_for(&state.data, &catalog, Local::now().date_naive()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "dashboard.summary" => Some(handle_summary(state, req)),
        _ => None,
    }
}
