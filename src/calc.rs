//! Derived computations: grade averages, profile completeness, attendance
//! recaps, curriculum progress, seating and duty-roster manipulation.
//!
//! Rounding follows the web client's `Math.round`: halves away from zero
//! toward positive infinity. All percentages are integers in [0, 100].

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::model::{
    AttendanceEntry, AttendanceStatus, ClassConfig, GradeData, GradeRecord, Guest, JournalEntry,
    LiaisonLog, PiketGroup, SeatingLayouts, Student, Subject,
};

/// Fallback passing threshold when neither the class config nor the subject
/// catalog carries one.
pub const DEFAULT_KKTP: f64 = 75.0;

/// `Math.round` parity: 0.5 rounds up.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

// --- Profile completeness ---

/// A text field counts once trimmed non-empty, except failed photo fetches
/// which are stored as strings starting with "ERROR".
fn filled_text(value: &str) -> bool {
    !value.trim().is_empty() && !value.starts_with("ERROR")
}

fn filled_number(value: f64) -> bool {
    value > 0.0
}

/// Share of the 24 tracked biodata fields that are filled in, as a rounded
/// percentage.
pub fn completeness_percent(student: &Student) -> i64 {
    let texts = [
        &student.nis,
        &student.name,
        &student.gender,
        &student.birth_place,
        &student.birth_date,
        &student.address,
        &student.photo,
        &student.religion,
        &student.father_name,
        &student.father_job,
        &student.father_education,
        &student.mother_name,
        &student.mother_job,
        &student.mother_education,
        &student.parent_name,
        &student.parent_phone,
        &student.parent_job,
        &student.blood_type,
        &student.health_notes,
        &student.hobbies,
        &student.ambition,
        &student.economy_status,
    ];
    let numbers = [student.height, student.weight];

    let filled = texts.iter().filter(|value| filled_text(value)).count()
        + numbers.iter().filter(|value| filled_number(**value)).count();
    let total = texts.len() + numbers.len();
    round_half_up(filled as f64 / total as f64 * 100.0)
}

// --- Grades ---

/// Average of the non-zero components only. All five zero means "ungraded"
/// and reports 0; callers render that as a dash, never as a score.
pub fn final_average(data: &GradeData) -> i64 {
    let filled: Vec<f64> = data
        .components()
        .iter()
        .copied()
        .filter(|score| *score > 0.0)
        .collect();
    if filled.is_empty() {
        return 0;
    }
    round_half_up(filled.iter().sum::<f64>() / filled.len() as f64)
}

pub fn display_average(average: i64) -> String {
    if average > 0 {
        average.to_string()
    } else {
        "-".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GradeStatus {
    #[serde(rename = "Belum Dinilai")]
    Ungraded,
    Tuntas,
    #[serde(rename = "Belum Tuntas")]
    BelumTuntas,
}

impl GradeStatus {
    pub fn label(self) -> &'static str {
        match self {
            GradeStatus::Ungraded => "Belum Dinilai",
            GradeStatus::Tuntas => "Tuntas",
            GradeStatus::BelumTuntas => "Belum Tuntas",
        }
    }
}

pub fn grade_status(average: i64, kktp: f64) -> GradeStatus {
    if average <= 0 {
        GradeStatus::Ungraded
    } else if average as f64 >= kktp {
        GradeStatus::Tuntas
    } else {
        GradeStatus::BelumTuntas
    }
}

/// Remedial applies only to graded work below the threshold; an ungraded 0
/// is not a failing mark.
pub fn needs_remedial(average: i64, kktp: f64) -> bool {
    average > 0 && (average as f64) < kktp
}

/// Threshold precedence: class-config override, then the catalog entry,
/// then [`DEFAULT_KKTP`]. Zero means "not set" at every level.
pub fn effective_kktp(config: Option<&ClassConfig>, catalog: &[Subject], subject_id: &str) -> f64 {
    if let Some(threshold) = config
        .and_then(|cfg| cfg.kktp.get(subject_id))
        .copied()
        .filter(|value| *value > 0.0)
    {
        return threshold;
    }
    catalog
        .iter()
        .find(|subject| subject.id == subject_id)
        .map(|subject| subject.kktp)
        .filter(|value| *value > 0.0)
        .unwrap_or(DEFAULT_KKTP)
}

/// Class average for one subject: mean of per-student averages (unrounded),
/// counting only students with at least one non-zero component, rounded once
/// at the end.
pub fn class_subject_average(
    students: &[Student],
    grades: &[GradeRecord],
    subject_id: &str,
) -> i64 {
    let mut total = 0.0;
    let mut graded = 0usize;
    for student in students {
        let Some(record) = grades.iter().find(|g| g.student_id == student.id) else {
            continue;
        };
        let Some(data) = record.subjects.get(subject_id) else {
            continue;
        };
        let filled: Vec<f64> = data
            .components()
            .iter()
            .copied()
            .filter(|score| *score > 0.0)
            .collect();
        if filled.is_empty() {
            continue;
        }
        total += filled.iter().sum::<f64>() / filled.len() as f64;
        graded += 1;
    }
    if graded == 0 {
        0
    } else {
        round_half_up(total / graded as f64)
    }
}

/// How far the class average sits against the threshold, capped at 100.
pub fn curriculum_progress(class_average: i64, kktp: f64) -> i64 {
    if kktp <= 0.0 {
        return 0;
    }
    round_half_up(class_average as f64 / kktp * 100.0).min(100)
}

// --- Attendance ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTally {
    pub present: u32,
    pub sick: u32,
    pub permit: u32,
    pub alpha: u32,
    pub dispensation: u32,
}

impl AttendanceTally {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Sick => self.sick += 1,
            AttendanceStatus::Permit => self.permit += 1,
            AttendanceStatus::Alpha => self.alpha += 1,
            AttendanceStatus::Dispensation => self.dispensation += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.present + self.sick + self.permit + self.alpha + self.dispensation
    }

    /// Recap percentage. Dispensation counts as attendance: the student was
    /// excused on school business, not absent.
    pub fn percent(&self) -> i64 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        round_half_up((self.present + self.dispensation) as f64 / total as f64 * 100.0)
    }
}

pub fn tally_entries<'a, I>(entries: I) -> AttendanceTally
where
    I: IntoIterator<Item = &'a AttendanceEntry>,
{
    let mut tally = AttendanceTally::default();
    for entry in entries {
        tally.add(entry.status);
    }
    tally
}

/// The dashboard headline rate ignores dispensation on both sides, matching
/// the card it feeds. Returns 0 for an empty class.
pub fn dashboard_attendance_rate(tally: &AttendanceTally, total_students: usize) -> i64 {
    if total_students == 0 {
        return 0;
    }
    let denom = tally.present + tally.sick + tally.permit + tally.alpha;
    let denom = if denom == 0 { 1 } else { denom };
    round_half_up(tally.present as f64 / denom as f64 * 100.0)
}

// --- Seating ---

/// Index-preserving resize: seats `0..min(old, new)` keep their occupant,
/// the rest are empty.
pub fn resize_layout(seats: &[Option<String>], count: usize) -> Vec<Option<String>> {
    let mut resized = vec![None; count];
    for (slot, seat) in resized.iter_mut().zip(seats.iter()) {
        *slot = seat.clone();
    }
    resized
}

pub fn resize_layouts(layouts: &SeatingLayouts, count: usize) -> SeatingLayouts {
    SeatingLayouts {
        classical: resize_layout(&layouts.classical, count),
        groups: resize_layout(&layouts.groups, count),
        ushape: resize_layout(&layouts.ushape, count),
    }
}

// --- Duty roster (piket) ---

/// Move a student to `target_day`, or unassign with `None`. The id is
/// stripped from every group first so it can never sit under two days.
pub fn move_piket_student(groups: &mut Vec<PiketGroup>, student_id: &str, target_day: Option<&str>) {
    for group in groups.iter_mut() {
        group.student_ids.retain(|id| id != student_id);
    }
    let Some(day) = target_day else {
        return;
    };
    match groups.iter_mut().find(|group| group.day == day) {
        Some(group) => group.student_ids.push(student_id.to_string()),
        None => groups.push(PiketGroup {
            day: day.to_string(),
            student_ids: vec![student_id.to_string()],
        }),
    }
}

pub fn unassigned_students<'a>(students: &'a [Student], groups: &[PiketGroup]) -> Vec<&'a Student> {
    let assigned: HashSet<&str> = groups
        .iter()
        .flat_map(|group| group.student_ids.iter().map(String::as_str))
        .collect();
    students
        .iter()
        .filter(|student| !assigned.contains(student.id.as_str()))
        .collect()
}

// --- Display orders ---

/// Guest book: newest visit first.
pub fn guest_order(a: &Guest, b: &Guest) -> Ordering {
    b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time))
}

/// Liaison book: newest first, id as the deterministic tie-break.
pub fn liaison_order(a: &LiaisonLog, b: &LiaisonLog) -> Ordering {
    b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id))
}

/// A day's journal reads in lesson-slot order.
pub fn journal_slot_order(a: &JournalEntry, b: &JournalEntry) -> Ordering {
    a.time_slot.cmp(&b.time_slot)
}
