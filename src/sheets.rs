//! Spreadsheet exchange: CSV parsing/writing plus a minimal XLSX writer.
//!
//! Column layouts match the web client's templates field for field, so files
//! produced by either side keep working. Exports can target `.xlsx` (a small
//! SpreadsheetML container with inline strings); imports parse CSV.

use anyhow::Context;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::calc;
use crate::model::{GradeData, GradeRecord, Guest, InventoryItem, Student};

pub const STUDENT_TEMPLATE_SHEET: &str = "Template Input Siswa";
pub const STUDENT_EXPORT_SHEET: &str = "Data Siswa Lengkap";
pub const GRADE_TEMPLATE_SHEET: &str = "Template Nilai";
pub const INVENTORY_SHEET: &str = "Inventaris";
pub const GUEST_SHEET: &str = "Buku Tamu";

// --- CSV primitives ---

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

/// Data rows of an exchange file: the header line is dropped, blank lines are
/// skipped. Each row carries its 1-based line number so warnings can cite the
/// source line.
pub fn parse_csv(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut rows = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        if line_no == 0 {
            continue;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        rows.push((line_no + 1, parse_csv_record(line)));
    }
    rows
}

pub fn to_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let fields: Vec<String> = row.iter().map(|cell| csv_quote(cell)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// --- XLSX writer ---

const XLSX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const XLSX_ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const XLSX_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A1-style column letters: 0 => A, 25 => Z, 26 => AA.
fn col_ref(mut idx: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(sheet_name)
    )
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            xml.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                col_ref(c),
                r + 1,
                xml_escape(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

pub fn write_xlsx(path: &Path, sheet_name: &str, rows: &[Vec<String>]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| {
        format!("failed to create output file {}", path.to_string_lossy())
    })?;
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)
        .context("failed to start content types entry")?;
    zip.write_all(XLSX_CONTENT_TYPES.as_bytes())
        .context("failed to write content types entry")?;

    zip.start_file("_rels/.rels", opts)
        .context("failed to start package relationships entry")?;
    zip.write_all(XLSX_ROOT_RELS.as_bytes())
        .context("failed to write package relationships entry")?;

    zip.start_file("xl/workbook.xml", opts)
        .context("failed to start workbook entry")?;
    zip.write_all(workbook_xml(sheet_name).as_bytes())
        .context("failed to write workbook entry")?;

    zip.start_file("xl/_rels/workbook.xml.rels", opts)
        .context("failed to start workbook relationships entry")?;
    zip.write_all(XLSX_WORKBOOK_RELS.as_bytes())
        .context("failed to write workbook relationships entry")?;

    zip.start_file("xl/worksheets/sheet1.xml", opts)
        .context("failed to start worksheet entry")?;
    zip.write_all(sheet_xml(rows).as_bytes())
        .context("failed to write worksheet entry")?;

    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

/// Writes `rows` to `path`, picking the format by extension: `.xlsx` gets the
/// SpreadsheetML workbook, anything else CSV.
pub fn write_table(path: &Path, sheet_name: &str, rows: &[Vec<String>]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    let is_xlsx = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if is_xlsx {
        write_xlsx(path, sheet_name, rows)
    } else {
        std::fs::write(path, to_csv(rows))
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))
    }
}

// --- Row helpers ---

fn cell(fields: &[String], idx: usize) -> &str {
    fields.get(idx).map(String::as_str).unwrap_or("").trim()
}

fn cell_or(fields: &[String], idx: usize, default: &str) -> String {
    let value = cell(fields, idx);
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn cell_number(fields: &[String], idx: usize) -> f64 {
    cell(fields, idx).parse::<f64>().unwrap_or(0.0)
}

fn split_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn or_text(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn or_dash(value: &str) -> String {
    or_text(value, "-")
}

fn num(value: f64) -> String {
    format!("{}", value)
}

// --- Students ---

pub const STUDENT_COLUMNS: [&str; 27] = [
    "Class ID",
    "NIS",
    "NISN",
    "Nama Lengkap",
    "Gender (L/P)",
    "Tempat Lahir",
    "Tanggal Lahir (YYYY-MM-DD)",
    "Agama",
    "Alamat",
    "Nama Ayah",
    "Pekerjaan Ayah",
    "Pendidikan Ayah",
    "Nama Ibu",
    "Pekerjaan Ibu",
    "Pendidikan Ibu",
    "Nama Wali",
    "No HP Wali",
    "Pekerjaan Wali",
    "Status Ekonomi",
    "Tinggi (cm)",
    "Berat (kg)",
    "Gol Darah",
    "Riwayat Penyakit",
    "Hobi",
    "Cita-cita",
    "Prestasi",
    "Pelanggaran",
];

pub fn student_template_rows() -> Vec<Vec<String>> {
    let example = [
        "1A",
        "2024001",
        "0012345678",
        "Ahmad Santoso",
        "L",
        "Surabaya",
        "2015-05-20",
        "Islam",
        "Jl. Merpati No. 10",
        "Budi Santoso",
        "Wiraswasta",
        "SMA",
        "Siti Aminah",
        "Ibu Rumah Tangga",
        "SMP",
        "Budi Santoso",
        "081234567890",
        "Wiraswasta",
        "Mampu",
        "145",
        "38",
        "O",
        "Tidak ada",
        "Sepak Bola",
        "Polisi",
        "Juara 1 Lari",
        "-",
    ];
    vec![
        STUDENT_COLUMNS.iter().map(|s| s.to_string()).collect(),
        example.iter().map(|s| s.to_string()).collect(),
    ]
}

pub fn student_export_rows(students: &[Student]) -> Vec<Vec<String>> {
    let mut header: Vec<String> = STUDENT_COLUMNS.iter().map(|s| s.to_string()).collect();
    header.push("Kelengkapan Data (%)".to_string());
    let mut rows = vec![header];
    for s in students {
        rows.push(vec![
            s.class_id.clone(),
            s.nis.clone(),
            or_dash(&s.nisn),
            s.name.clone(),
            s.gender.clone(),
            or_dash(&s.birth_place),
            s.birth_date.clone(),
            or_dash(&s.religion),
            s.address.clone(),
            s.father_name.clone(),
            or_dash(&s.father_job),
            or_dash(&s.father_education),
            s.mother_name.clone(),
            or_dash(&s.mother_job),
            or_dash(&s.mother_education),
            s.parent_name.clone(),
            s.parent_phone.clone(),
            or_dash(&s.parent_job),
            or_text(&s.economy_status, "Mampu"),
            num(s.height),
            num(s.weight),
            or_dash(&s.blood_type),
            or_dash(&s.health_notes),
            or_dash(&s.hobbies),
            or_dash(&s.ambition),
            or_dash(&s.achievements.join(", ")),
            or_dash(&s.violations.join(", ")),
            format!("{}%", calc::completeness_percent(s)),
        ]);
    }
    rows
}

/// One template row to a Student. Valid iff NIS and the full name are
/// present; everything else defaults. The wali name falls back to the
/// father, then the mother.
pub fn student_from_row(fields: &[String], fallback_class: &str) -> Option<Student> {
    let nis = cell(fields, 1);
    let name = cell(fields, 3);
    if nis.is_empty() || name.is_empty() {
        return None;
    }
    let father = cell(fields, 9);
    let mother = cell(fields, 12);
    let wali = cell(fields, 15);
    let parent_name = if !wali.is_empty() {
        wali
    } else if !father.is_empty() {
        father
    } else {
        mother
    };
    let gender = if cell(fields, 4).to_uppercase().contains('P') {
        "P"
    } else {
        "L"
    };

    let mut student = Student::default();
    student.class_id = cell_or(fields, 0, fallback_class);
    student.nis = nis.to_string();
    student.nisn = cell(fields, 2).to_string();
    student.name = name.to_string();
    student.gender = gender.to_string();
    student.birth_place = cell(fields, 5).to_string();
    student.birth_date = cell(fields, 6).to_string();
    student.religion = cell_or(fields, 7, "Islam");
    student.address = cell(fields, 8).to_string();
    student.father_name = father.to_string();
    student.father_job = cell(fields, 10).to_string();
    student.father_education = cell(fields, 11).to_string();
    student.mother_name = mother.to_string();
    student.mother_job = cell(fields, 13).to_string();
    student.mother_education = cell(fields, 14).to_string();
    student.parent_name = parent_name.to_string();
    student.parent_phone = cell(fields, 16).to_string();
    student.parent_job = cell(fields, 17).to_string();
    student.economy_status = cell_or(fields, 18, "Mampu");
    student.height = cell_number(fields, 19);
    student.weight = cell_number(fields, 20);
    student.blood_type = cell(fields, 21).to_string();
    student.health_notes = cell(fields, 22).to_string();
    student.hobbies = cell(fields, 23).to_string();
    student.ambition = cell(fields, 24).to_string();
    student.achievements = split_list(cell(fields, 25));
    student.violations = split_list(cell(fields, 26));
    student.behavior_score = 100;
    Some(student)
}

// --- Grades ---

pub const GRADE_TEMPLATE_COLUMNS: [&str; 8] = [
    "NIS",
    "Nama Siswa",
    "Mata Pelajaran(ID)",
    "SUM 1",
    "SUM 2",
    "SUM 3",
    "SUM 4",
    "SAS",
];

pub const GRADE_EXPORT_COLUMNS: [&str; 10] = [
    "NIS",
    "Nama Siswa",
    "Mata Pelajaran",
    "SUM 1",
    "SUM 2",
    "SUM 3",
    "SUM 4",
    "SAS",
    "Nilai Akhir",
    "Status",
];

pub fn grade_template_rows(subject_id: &str) -> Vec<Vec<String>> {
    let example = ["2024001", "Contoh Siswa", subject_id, "80", "85", "90", "88", "85"];
    vec![
        GRADE_TEMPLATE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        example.iter().map(|s| s.to_string()).collect(),
    ]
}

/// Every rostered student gets a row, graded or not; ungraded rows show a
/// dash and "Belum Dinilai" instead of a zero score.
pub fn grade_export_rows(
    students: &[Student],
    grades: &[GradeRecord],
    subject_id: &str,
    subject_name: &str,
    kktp: f64,
) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> =
        vec![GRADE_EXPORT_COLUMNS.iter().map(|s| s.to_string()).collect()];
    for student in students {
        let data = grades
            .iter()
            .find(|record| record.student_id == student.id)
            .and_then(|record| record.subjects.get(subject_id))
            .cloned()
            .unwrap_or_default();
        let average = calc::final_average(&data);
        rows.push(vec![
            student.nis.clone(),
            student.name.clone(),
            subject_name.to_string(),
            num(data.sum1),
            num(data.sum2),
            num(data.sum3),
            num(data.sum4),
            num(data.sas),
            calc::display_average(average),
            calc::grade_status(average, kktp).label().to_string(),
        ]);
    }
    rows
}

/// Grade import rows match students by NIS (column 0); scores sit in columns
/// 3..=7, read as 0 when non-numeric and clamped to [0, 100].
pub fn grade_scores_from_row(fields: &[String]) -> Option<(String, GradeData)> {
    let nis = cell(fields, 0);
    if nis.is_empty() {
        return None;
    }
    let data = GradeData {
        sum1: calc::clamp_score(cell_number(fields, 3)),
        sum2: calc::clamp_score(cell_number(fields, 4)),
        sum3: calc::clamp_score(cell_number(fields, 5)),
        sum4: calc::clamp_score(cell_number(fields, 6)),
        sas: calc::clamp_score(cell_number(fields, 7)),
    };
    Some((nis.to_string(), data))
}

// --- Inventory ---

pub const INVENTORY_COLUMNS: [&str; 3] = ["Nama Barang", "Jumlah", "Kondisi (Baik/Rusak)"];

pub fn inventory_template_rows() -> Vec<Vec<String>> {
    vec![
        INVENTORY_COLUMNS.iter().map(|s| s.to_string()).collect(),
        vec!["Papan Tulis".to_string(), "1".to_string(), "Baik".to_string()],
    ]
}

pub fn inventory_export_rows(items: &[InventoryItem]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> =
        vec![INVENTORY_COLUMNS.iter().map(|s| s.to_string()).collect()];
    for item in items {
        rows.push(vec![
            item.name.clone(),
            item.qty.to_string(),
            item.condition.clone(),
        ]);
    }
    rows
}

/// The name is required; quantity defaults to 1 (a zero or unreadable cell
/// reads as 1); any condition other than "Rusak" reads as "Baik". The id is
/// left empty for the save path to issue.
pub fn inventory_from_row(fields: &[String], class_id: &str) -> Option<InventoryItem> {
    let name = cell(fields, 0);
    if name.is_empty() {
        return None;
    }
    let qty = match cell(fields, 1).parse::<i64>() {
        Ok(0) | Err(_) => 1,
        Ok(n) => n,
    };
    let condition = if cell(fields, 2).eq_ignore_ascii_case("rusak") {
        "Rusak"
    } else {
        "Baik"
    };
    Some(InventoryItem {
        id: String::new(),
        class_id: class_id.to_string(),
        name: name.to_string(),
        condition: condition.to_string(),
        qty,
    })
}

// --- Guests ---

pub const GUEST_TEMPLATE_COLUMNS: [&str; 5] = [
    "Tanggal (YYYY-MM-DD)",
    "Waktu (HH:mm)",
    "Nama Tamu",
    "Instansi/Asal",
    "Keperluan",
];

pub const GUEST_EXPORT_COLUMNS: [&str; 5] =
    ["Tanggal", "Waktu", "Nama Tamu", "Instansi", "Keperluan"];

pub fn guest_template_rows() -> Vec<Vec<String>> {
    vec![
        GUEST_TEMPLATE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        vec![
            "2024-07-20".to_string(),
            "10:30".to_string(),
            "Orang Tua Siswa".to_string(),
            "Wali Murid".to_string(),
            "Konsultasi nilai".to_string(),
        ],
    ]
}

pub fn guest_export_rows(guests: &[Guest]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> =
        vec![GUEST_EXPORT_COLUMNS.iter().map(|s| s.to_string()).collect()];
    for guest in guests {
        rows.push(vec![
            guest.date.clone(),
            guest.time.clone(),
            guest.name.clone(),
            guest.agency.clone(),
            guest.purpose.clone(),
        ]);
    }
    rows
}

/// The guest name is required; date and time default to the caller-supplied
/// "now" so imports without timestamps still land today.
pub fn guest_from_row(
    fields: &[String],
    class_id: &str,
    today: &str,
    now: &str,
) -> Option<Guest> {
    let name = cell(fields, 2);
    if name.is_empty() {
        return None;
    }
    Some(Guest {
        id: String::new(),
        class_id: class_id.to_string(),
        date: cell_or(fields, 0, today),
        time: cell_or(fields, 1, now),
        name: name.to_string(),
        agency: cell(fields, 3).to_string(),
        purpose: cell(fields, 4).to_string(),
    })
}
