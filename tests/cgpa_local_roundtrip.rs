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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn save_drops_drafts_and_reload_returns_the_filled_row() {
    let ws = temp_dir("campusd-cgpa");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "cgpa.save",
        json!({
            "semesters": [
                { "id": "sem-a", "sgpa": "", "credits": "" },
                { "id": "sem-b", "sgpa": "8.5", "credits": "4" }
            ]
        }),
    );
    let rows = saved["semesters"].as_array().expect("saved rows");
    assert_eq!(rows.len(), 1, "draft row must not be persisted");
    assert_eq!(rows[0]["id"], "sem-b");
    assert_eq!(saved["savedRemote"], false, "no session, no remote mirror");

    let loaded = request_ok(&mut stdin, &mut reader, "r3", "cgpa.load", json!({}));
    assert_eq!(loaded["source"], "local");
    let rows = loaded["semesters"].as_array().expect("loaded rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sgpa"], "8.5");
    assert_eq!(rows[0]["credits"], "4");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn empty_store_loads_a_single_blank_placeholder() {
    let ws = temp_dir("campusd-cgpa-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );
    let loaded = request_ok(&mut stdin, &mut reader, "r2", "cgpa.load", json!({}));
    let rows = loaded["semesters"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sgpa"], "");
    assert_eq!(rows[0]["credits"], "");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_stored_blob_degrades_to_placeholder() {
    let ws = temp_dir("campusd-cgpa-bad");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "r1",
            "workspace.select",
            json!({ "path": ws.to_string_lossy() }),
        );
        drop(stdin);
        let _ = child.wait();
    }

    let conn = rusqlite::Connection::open(ws.join("campus.sqlite3")).expect("open raw db");
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('cgpa_data', '{broken')
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [],
    )
    .expect("plant malformed blob");
    drop(conn);

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "workspace.select",
        json!({ "path": ws.to_string_lossy() }),
    );
    let loaded = request_ok(&mut stdin, &mut reader, "r3", "cgpa.load", json!({}));
    let rows = loaded["semesters"].as_array().expect("rows");
    assert_eq!(rows.len(), 1, "malformed blob falls back to placeholder");
    assert_eq!(rows[0]["sgpa"], "");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_request_line_still_gets_a_json_error() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // A line that parses as JSON but not as a request; the serde message
    // quotes the input, which must survive into a well-formed reply.
    writeln!(stdin, "\"hi\"").expect("write raw line");
    stdin.flush().expect("flush");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).expect("error reply must itself be JSON");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "bad_json");
    assert!(value["id"].is_null());

    // The loop keeps serving afterwards.
    let sgpa = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "sgpa.compute",
        json!({ "subjects": [ { "grade": "8", "credits": "4" } ] }),
    );
    assert_eq!(sgpa["sgpa"], "8.00");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn compute_and_predict_over_ipc() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let sgpa = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "sgpa.compute",
        json!({
            "subjects": [
                { "grade": "8", "credits": "4" },
                { "grade": "9.5", "credits": "3" },
                { "grade": "", "credits": "" },
                { "grade": "12", "credits": "2" }
            ]
        }),
    );
    // 12 is out of range: excluded and flagged, not fatal.
    assert_eq!(sgpa["sgpa"], "8.64");
    assert_eq!(sgpa["totalCredits"], 7.0);
    assert_eq!(sgpa["flags"][2], "blank");
    assert_eq!(sgpa["flags"][3], "invalidValue");

    let cgpa = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "cgpa.compute",
        json!({
            "semesters": [
                { "sgpa": "8.0", "credits": "20" },
                { "sgpa": "0", "credits": "5" }
            ]
        }),
    );
    // An SGPA of exactly 0 is not a valid semester entry.
    assert_eq!(cgpa["cgpa"], "8.000");
    assert_eq!(cgpa["totalCredits"], 20.0);

    let p = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "cgpa.predict",
        json!({
            "semesters": [ { "sgpa": "8.0", "credits": "20" } ],
            "futureSgpa": "9.0",
            "futureCredits": "5"
        }),
    );
    assert_eq!(p["available"], true);
    assert_eq!(p["predicted"], "8.200");

    let none = request_ok(
        &mut stdin,
        &mut reader,
        "r4",
        "cgpa.predict",
        json!({
            "semesters": [],
            "futureSgpa": "9.0",
            "futureCredits": "5"
        }),
    );
    assert_eq!(none["available"], false, "no base credits, no projection");
    assert!(none["predicted"].is_null());

    drop(stdin);
    let _ = child.wait();
}
