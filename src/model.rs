//! Typed records for every entity the gateway serves.
//!
//! Field names mirror the wire format (camelCase JSON); optional wire fields
//! default so partially-filled server rows still parse. Records used by the
//! entity stores implement [`Keyed`] from the store module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::Keyed;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Legacy per-student attendance counters kept on the profile row.
/// Recaps are computed from [`AttendanceEntry`] records, not from these.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttendanceCounters {
    #[serde(default)]
    pub present: i64,
    #[serde(default)]
    pub sick: i64,
    #[serde(default)]
    pub permit: i64,
    #[serde(default)]
    pub alpha: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub nis: String,
    #[serde(default)]
    pub nisn: String,
    #[serde(default)]
    pub name: String,
    /// "L" or "P".
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub birth_place: String,
    #[serde(default)]
    pub religion: String,
    #[serde(default)]
    pub address: String,
    /// Base64 image or an external URL; a value starting with "ERROR"
    /// marks a failed fetch and never counts toward completeness.
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub father_job: String,
    #[serde(default)]
    pub father_education: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(default)]
    pub mother_job: String,
    #[serde(default)]
    pub mother_education: String,
    /// Guardian (wali) name.
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub parent_job: String,
    #[serde(default)]
    pub parent_phone: String,
    #[serde(default)]
    pub blood_type: String,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub health_notes: String,
    #[serde(default)]
    pub hobbies: String,
    #[serde(default)]
    pub ambition: String,
    /// "Mampu" | "Cukup" | "Kurang Mampu" | "KIP".
    #[serde(default)]
    pub economy_status: String,
    #[serde(default)]
    pub join_date: String,
    #[serde(default)]
    pub origin_school: String,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub violations: Vec<String>,
    #[serde(default)]
    pub behavior_score: i64,
    #[serde(default)]
    pub attendance: AttendanceCounters,
    #[serde(default)]
    pub teacher_notes: String,
}

impl Keyed for Student {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GradeData {
    #[serde(default)]
    pub sum1: f64,
    #[serde(default)]
    pub sum2: f64,
    #[serde(default)]
    pub sum3: f64,
    #[serde(default)]
    pub sum4: f64,
    #[serde(default)]
    pub sas: f64,
}

impl GradeData {
    /// Component order is fixed: four formatives then the summative.
    pub fn components(&self) -> [f64; 5] {
        [self.sum1, self.sum2, self.sum3, self.sum4, self.sas]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub subjects: BTreeMap<String, GradeData>,
}

impl Keyed for GradeRecord {
    // One record per student; identity is never server-reissued.
    fn key(&self) -> String {
        self.student_id.clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    /// Unmarked students count as present until told otherwise.
    #[default]
    Present,
    Sick,
    Permit,
    Alpha,
    Dispensation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub class_id: String,
    /// YYYY-MM-DD.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: String,
}

impl Keyed for AttendanceEntry {
    // Composite identity: one row per student per day.
    fn key(&self) -> String {
        format!("{}@{}", self.student_id, self.date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub name: String,
    /// "Baik" | "Rusak".
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub qty: i64,
}

impl Keyed for InventoryItem {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub agency: String,
}

impl Keyed for Guest {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PiketGroup {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

/// Seat arrays are indexed by position; an empty seat is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeatingLayouts {
    #[serde(default)]
    pub classical: Vec<Option<String>>,
    #[serde(default)]
    pub groups: Vec<Option<String>>,
    #[serde(default)]
    pub ushape: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Passing threshold. Older rows carry the pre-Kurikulum-Merdeka name.
    #[serde(default, alias = "kkm")]
    pub kktp: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrgSection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrganizationStructure {
    #[serde(default)]
    pub roles: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub sections: Vec<OrgSection>,
}

/// Month key (YYYY-MM) to 31 day-content slots.
pub type AcademicCalendar = BTreeMap<String, Vec<Option<String>>>;

/// The per-class configuration document as the gateway returns it. Reads
/// come back under lowercase keys; saves go out one section at a time under
/// the uppercase keys in [`CONFIG_SECTIONS`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassConfig {
    #[serde(default)]
    pub schedule: Vec<ScheduleItem>,
    #[serde(default)]
    pub piket: Vec<PiketGroup>,
    #[serde(default)]
    pub seats: SeatingLayouts,
    /// Per-subject passing threshold overrides, keyed by subject id.
    #[serde(default)]
    pub kktp: BTreeMap<String, f64>,
    #[serde(default)]
    pub academic_calendar: AcademicCalendar,
    #[serde(default)]
    pub time_slots: Vec<String>,
    #[serde(default)]
    pub organization: OrganizationStructure,
}

/// Section keys accepted by the config save action, in save order.
pub const CONFIG_SECTIONS: [&str; 7] = [
    "SCHEDULE",
    "PIKET",
    "SEATING",
    "KKTP",
    "ACADEMIC_CALENDAR",
    "TIME_SLOTS",
    "ORGANIZATION",
];

/// The built-in subject catalog. Class config may override each threshold;
/// anything absent there falls back to the catalog value.
pub fn default_subjects() -> Vec<Subject> {
    [
        ("pai", "Pendidikan Agama Islam", 75.0),
        ("ppkn", "Pendidikan Pancasila", 75.0),
        ("bindo", "Bahasa Indonesia", 75.0),
        ("mtk", "Matematika", 70.0),
        ("ipa", "Ilmu Pengetahuan Alam", 70.0),
        ("ips", "Ilmu Pengetahuan Sosial", 75.0),
        ("bing", "Bahasa Inggris", 70.0),
        ("pjok", "Pendidikan Jasmani", 75.0),
        ("sbk", "Seni Budaya", 75.0),
        ("informatika", "Informatika", 70.0),
    ]
    .into_iter()
    .map(|(id, name, kktp)| Subject {
        id: id.to_string(),
        name: name.to_string(),
        kktp,
    })
    .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    /// Indonesian weekday name (Senin..Minggu).
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub time_slot: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub activities: String,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub reflection: String,
    #[serde(default)]
    pub follow_up: String,
}

impl JournalEntry {
    /// Draft rows get client-local ids; those must never reach a delete call.
    pub fn is_draft_id(id: &str) -> bool {
        id.starts_with("temp-") || id.starts_with("manual-")
    }
}

impl Keyed for JournalEntry {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiaisonStatus {
    Pending,
    Diterima,
    Ditolak,
    Selesai,
}

impl LiaisonStatus {
    pub fn parse(s: &str) -> Option<LiaisonStatus> {
        match s {
            "Pending" => Some(LiaisonStatus::Pending),
            "Diterima" => Some(LiaisonStatus::Diterima),
            "Ditolak" => Some(LiaisonStatus::Ditolak),
            "Selesai" => Some(LiaisonStatus::Selesai),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiaisonStatus::Pending => "Pending",
            LiaisonStatus::Diterima => "Diterima",
            LiaisonStatus::Ditolak => "Ditolak",
            LiaisonStatus::Selesai => "Selesai",
        }
    }

    /// Pending may be accepted or rejected; accepted items may be closed.
    pub fn can_become(&self, next: LiaisonStatus) -> bool {
        matches!(
            (self, next),
            (LiaisonStatus::Pending, LiaisonStatus::Diterima)
                | (LiaisonStatus::Pending, LiaisonStatus::Ditolak)
                | (LiaisonStatus::Diterima, LiaisonStatus::Selesai)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiaisonLog {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub date: String,
    /// "Guru" | "Wali Murid".
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    /// Absent on rows written before the status workflow existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LiaisonStatus>,
    #[serde(default)]
    pub response: String,
}

impl LiaisonLog {
    pub fn effective_status(&self) -> LiaisonStatus {
        self.status.unwrap_or(LiaisonStatus::Pending)
    }
}

impl Keyed for LiaisonLog {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl Default for PermissionStatus {
    fn default() -> Self {
        PermissionStatus::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    /// "sick" | "permit" | "dispensation".
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: PermissionStatus,
}

impl Keyed for PermissionRequest {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    /// "urgent" | "warning" | "info".
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub completed: bool,
}

impl Keyed for AgendaItem {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    /// "nasional" | "haribesar" | "cuti" | "semester".
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl Keyed for Holiday {
    fn key(&self) -> String {
        self.id.clone()
    }
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}
