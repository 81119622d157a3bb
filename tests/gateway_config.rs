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

#[test]
fn configure_validates_persists_and_switches_mode() {
    let workspace = temp_dir("kelasd-config-switch");
    let config_path = workspace.join("kelasd.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let bad = request(
        &mut stdin,
        &mut reader,
        "1",
        "gateway.configure",
        json!({ "url": "   " }),
    );
    assert_eq!(bad["error"]["code"], "bad_params");

    // A URL outside the Apps Script host is stored but stays demo.
    let configured = request(
        &mut stdin,
        &mut reader,
        "2",
        "gateway.configure",
        json!({ "url": "https://example.com/exec" }),
    );
    assert_eq!(configured["result"]["mode"], "demo");

    let status = request(&mut stdin, &mut reader, "3", "gateway.status", json!({}));
    assert_eq!(status["result"]["mode"], "demo");
    assert_eq!(status["result"]["endpointUrl"], "https://example.com/exec");

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&config_path).expect("config file written"),
    )
    .expect("config file is json");
    assert_eq!(saved["endpointUrl"], "https://example.com/exec");

    let configured = request(
        &mut stdin,
        &mut reader,
        "4",
        "gateway.configure",
        json!({ "url": "https://script.google.com/macros/s/AKfycb-test/exec" }),
    );
    assert_eq!(configured["result"]["mode"], "remote");

    let health = request(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health["result"]["mode"], "remote");

    // The bypass account never touches the gateway, so it works in remote
    // mode without network.
    let login = request(
        &mut stdin,
        &mut reader,
        "6",
        "session.login",
        json!({ "username": "demo", "password": "demo" }),
    );
    assert_eq!(login["ok"], true);

    let status = request(&mut stdin, &mut reader, "7", "gateway.status", json!({}));
    assert_eq!(status["result"]["mode"], "remote");
    assert_eq!(status["result"]["loggedIn"], true);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn endpoint_survives_a_restart() {
    let workspace = temp_dir("kelasd-config-restart");
    let config_path = workspace.join("kelasd.json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "gateway.configure",
        json!({ "url": "https://example.com/exec" }),
    );
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);
    let status = request(&mut stdin, &mut reader, "1", "gateway.status", json!({}));
    assert_eq!(status["result"]["endpointUrl"], "https://example.com/exec");
    assert_eq!(status["result"]["mode"], "demo");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn configure_can_relocate_the_config_file() {
    let workspace = temp_dir("kelasd-config-relocate");
    let initial_path = workspace.join("kelasd.json");
    let moved_path = workspace.join("deploy").join("kelasd.json");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&initial_path);
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "gateway.configure",
        json!({
            "url": "https://example.com/exec",
            "configPath": moved_path.to_string_lossy(),
        }),
    );
    assert!(moved_path.exists());
    assert!(!initial_path.exists());
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&moved_path);
    let status = request(&mut stdin, &mut reader, "1", "gateway.status", json!({}));
    assert_eq!(status["result"]["endpointUrl"], "https://example.com/exec");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
