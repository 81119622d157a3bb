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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("kelasd-router-smoke");
    let config_path = workspace.join("kelasd.json");
    let csv_out = workspace.join("smoke-students.csv");
    let bundle_out = workspace.join("smoke-bundle.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["result"]["service"], "kelasd");
    assert_eq!(health["result"]["mode"], "demo");

    let status = request(&mut stdin, &mut reader, "2", "gateway.status", json!({}));
    assert_eq!(status["result"]["mode"], "demo");
    assert_eq!(status["result"]["loggedIn"], false);

    let login = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.login",
        json!({ "username": "demo", "password": "demo" }),
    );
    assert_eq!(login["result"]["user"]["fullName"], "Bpk. Guru Demo");

    let students = request(&mut stdin, &mut reader, "4", "students.load", json!({}));
    assert_eq!(students["result"]["students"], json!([]));
    let _ = request(&mut stdin, &mut reader, "5", "students.list", json!({}));

    let grades = request(&mut stdin, &mut reader, "6", "grades.load", json!({}));
    assert_eq!(grades["result"]["grades"], json!([]));
    let summary = request(
        &mut stdin,
        &mut reader,
        "7",
        "grades.summary",
        json!({ "subjectId": "mtk" }),
    );
    assert_eq!(summary["result"]["subjectName"], "Matematika");

    let attendance = request(&mut stdin, &mut reader, "8", "attendance.load", json!({}));
    assert_eq!(attendance["result"]["records"], json!([]));
    let recap = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.recap",
        json!({ "month": "2024-05", "classId": "4b" }),
    );
    assert_eq!(recap["result"]["month"], "2024-05");

    let inventory = request(&mut stdin, &mut reader, "10", "inventory.load", json!({}));
    assert_eq!(inventory["result"]["items"], json!([]));
    let guests = request(&mut stdin, &mut reader, "11", "guests.load", json!({}));
    assert_eq!(guests["result"]["guests"], json!([]));

    let config = request(&mut stdin, &mut reader, "12", "classconfig.load", json!({}));
    assert!(config["result"]["config"]["schedule"].is_array());
    let _ = request(&mut stdin, &mut reader, "13", "classconfig.get", json!({}));

    let journal = request(&mut stdin, &mut reader, "14", "journal.load", json!({}));
    assert_eq!(journal["result"]["entries"], json!([]));
    let draft_delete = request(
        &mut stdin,
        &mut reader,
        "15",
        "journal.delete",
        json!({ "id": "temp-123" }),
    );
    assert_eq!(draft_delete["result"]["draft"], true);

    let liaison = request(&mut stdin, &mut reader, "16", "liaison.load", json!({}));
    assert_eq!(liaison["result"]["logs"], json!([]));
    let permissions = request(&mut stdin, &mut reader, "17", "permissions.load", json!({}));
    assert_eq!(permissions["result"]["requests"], json!([]));

    let agendas = request(&mut stdin, &mut reader, "18", "agenda.load", json!({}));
    assert_eq!(agendas["result"]["agendas"], json!([]));
    let holidays = request(&mut stdin, &mut reader, "19", "holidays.load", json!({}));
    assert_eq!(holidays["result"]["holidays"], json!([]));

    let dashboard = request(&mut stdin, &mut reader, "20", "dashboard.summary", json!({}));
    assert_eq!(dashboard["result"]["students"]["total"], 0);
    assert_eq!(
        dashboard["result"]["curriculumProgress"]
            .as_array()
            .map(|v| v.len()),
        Some(10)
    );

    let template = request(
        &mut stdin,
        &mut reader,
        "21",
        "exchange.studentsTemplate",
        json!({ "path": csv_out.to_string_lossy() }),
    );
    assert_eq!(template["result"]["ok"], true);
    assert!(csv_out.exists());

    let bundle = request(
        &mut stdin,
        &mut reader,
        "22",
        "backup.exportDataBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(bundle["result"]["ok"], true);
    assert!(bundle_out.exists());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_methods_and_bad_json_get_answers() {
    let workspace = temp_dir("kelasd-router-unknown");
    let config_path = workspace.join("kelasd.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let payload = json!({ "id": "u1", "method": "nope.nothing", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "not_implemented");
    assert_eq!(value["error"]["message"], "unknown method: nope.nothing");

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "bad_json");
    assert!(value.get("id").is_none());

    // The loop keeps serving after a garbage line.
    let health = request(&mut stdin, &mut reader, "u2", "health", json!({}));
    assert_eq!(health["ok"], true);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
