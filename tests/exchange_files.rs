use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(config_path: &PathBuf) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_kelasd");
    let mut child = Command::new(exe)
        .arg(config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn kelasd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value["ok"], true, "{} failed: {}", method, value);
    value["result"].clone()
}

#[test]
fn templates_and_exports_pick_format_by_extension() {
    let workspace = temp_dir("kelasd-exchange-write");
    let config_path = workspace.join("kelasd.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let students_csv = workspace.join("template-siswa.csv");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "exchange.studentsTemplate",
        json!({ "path": students_csv.to_string_lossy() }),
    );
    assert_eq!(result["rows"], 2);
    let text = std::fs::read_to_string(&students_csv).expect("read template");
    assert!(text.starts_with("Class ID,NIS,NISN,Nama Lengkap,"));
    assert!(text.contains("Ahmad Santoso"));

    let export_csv = workspace.join("export-siswa.csv");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.exportStudents",
        json!({ "path": export_csv.to_string_lossy() }),
    );
    // Empty roster: header only.
    assert_eq!(result["rows"], 1);
    let text = std::fs::read_to_string(&export_csv).expect("read export");
    assert!(text.trim_end().ends_with("Kelengkapan Data (%)"));

    let grades_csv = workspace.join("template-nilai.csv");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.gradesTemplate",
        json!({ "path": grades_csv.to_string_lossy(), "subjectId": "mtk" }),
    );
    let text = std::fs::read_to_string(&grades_csv).expect("read grades template");
    assert!(text.starts_with("NIS,Nama Siswa,Mata Pelajaran(ID),SUM 1,SUM 2,SUM 3,SUM 4,SAS"));
    assert!(text.contains(",mtk,"));

    let inventory_xlsx = workspace.join("inventaris.xlsx");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "exchange.exportInventory",
        json!({ "path": inventory_xlsx.to_string_lossy() }),
    );
    let bytes = std::fs::read(&inventory_xlsx).expect("read workbook");
    // SpreadsheetML container, so a zip.
    assert_eq!(&bytes[..2], b"PK");

    let guests_csv = workspace.join("buku-tamu.csv");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.guestsTemplate",
        json!({ "path": guests_csv.to_string_lossy() }),
    );
    let text = std::fs::read_to_string(&guests_csv).expect("read guest template");
    assert!(text.contains("Nama Tamu"));

    let blank = request(
        &mut stdin,
        &mut reader,
        "6",
        "exchange.exportStudents",
        json!({ "path": "   " }),
    );
    assert_eq!(blank["error"]["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn preview_judges_each_line_without_writing_anything() {
    let workspace = temp_dir("kelasd-exchange-preview");
    let config_path = workspace.join("kelasd.json");

    let import_csv = workspace.join("siswa.csv");
    std::fs::write(
        &import_csv,
        "Class ID,NIS,NISN,Nama Lengkap\n\
         4b,2024001,0012345678,Ahmad Santoso\n\
         \n\
         4b,2024002,,\n",
    )
    .expect("write import file");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "exchange.previewStudents",
        json!({ "path": import_csv.to_string_lossy(), "classId": "4b" }),
    );
    assert_eq!(preview["total"], 2);
    assert_eq!(preview["valid"], 1);
    let rows = preview["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["line"], 2);
    assert_eq!(rows[0]["ok"], true);
    assert_eq!(rows[0]["nis"], "2024001");
    assert_eq!(rows[0]["name"], "Ahmad Santoso");
    // Blank line skipped; the half-filled row keeps its file line number.
    assert_eq!(rows[1]["line"], 4);
    assert_eq!(rows[1]["ok"], false);
    assert_eq!(rows[1]["reason"], "NIS dan Nama Lengkap wajib diisi");

    // The file parses fine, but demo mode has no gateway to import into.
    let import = request(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.importStudents",
        json!({ "path": import_csv.to_string_lossy(), "classId": "4b" }),
    );
    assert_eq!(import["error"]["code"], "not_configured");

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.previewStudents",
        json!({ "path": workspace.join("tidak-ada.csv").to_string_lossy() }),
    );
    assert_eq!(missing["error"]["code"], "io_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
