use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
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

fn zip_entry(path: &PathBuf, name: &str) -> String {
    let file = std::fs::File::open(path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(file).expect("bundle is a zip");
    let mut text = String::new();
    archive
        .by_name(name)
        .expect("bundle entry")
        .read_to_string(&mut text)
        .expect("read bundle entry");
    text
}

#[test]
fn exported_bundle_carries_a_manifest_and_the_full_dataset() {
    let workspace = temp_dir("kelasd-bundle-export");
    let config_path = workspace.join("kelasd.json");
    let bundle_path = workspace.join("cadangan.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let exported = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.exportDataBundle",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(exported["ok"], true);
    let result = &exported["result"];
    assert_eq!(result["bundleFormat"], "kelasd-dataset-v1");
    assert_eq!(result["entries"], 2);
    let sha256 = result["sha256"].as_str().expect("sha256");
    assert_eq!(sha256.len(), 64);

    let manifest: serde_json::Value =
        serde_json::from_str(&zip_entry(&bundle_path, "manifest.json")).expect("parse manifest");
    assert_eq!(manifest["format"], "kelasd-dataset-v1");
    assert_eq!(manifest["sha256"], sha256);
    assert!(manifest["exportedAt"].is_u64());

    let dataset: serde_json::Value = serde_json::from_str(&zip_entry(
        &bundle_path,
        "data/dataset.json",
    ))
    .expect("parse dataset");
    for key in [
        "students",
        "grades",
        "attendance",
        "inventory",
        "guests",
        "learningJournal",
        "liaisonLogs",
        "permissionRequests",
        "agendas",
        "holidays",
    ] {
        assert_eq!(dataset[key], json!([]), "collection {} missing", key);
    }
    assert!(dataset["classConfig"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn restore_needs_a_configured_gateway() {
    let workspace = temp_dir("kelasd-bundle-restore");
    let config_path = workspace.join("kelasd.json");
    let bundle_path = workspace.join("cadangan.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&config_path);

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.exportDataBundle",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );

    let blank = request(
        &mut stdin,
        &mut reader,
        "2",
        "backup.restoreDataBundle",
        json!({ "inPath": "" }),
    );
    assert_eq!(blank["error"]["code"], "bad_params");

    // The gateway check comes before the file is even opened.
    let restore = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.restoreDataBundle",
        json!({ "inPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(restore["error"]["code"], "not_configured");

    let restore = request(
        &mut stdin,
        &mut reader,
        "4",
        "backup.restoreDataBundle",
        json!({ "inPath": workspace.join("tidak-ada.zip").to_string_lossy() }),
    );
    assert_eq!(restore["error"]["code"], "not_configured");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
