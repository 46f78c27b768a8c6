#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_enrolld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn enrolld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Drop an object into the workspace file store the way the upload endpoint
/// would.
pub fn put_object(workspace: &Path, bucket: &str, key: &str, contents: &str) {
    let path = workspace.join("storage").join(bucket).join(key);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create bucket dir");
    std::fs::write(path, contents).expect("write object");
}

pub fn read_object(workspace: &Path, bucket: &str, key: &str) -> String {
    let path = workspace.join("storage").join(bucket).join(key);
    std::fs::read_to_string(path).expect("read object")
}

pub fn object_exists(workspace: &Path, bucket: &str, key: &str) -> bool {
    workspace.join("storage").join(bucket).join(key).is_file()
}

/// Reference bundle shared by most import tests: two class years, two arms,
/// JSS1A/JSS1B, an intentionally duplicated "JSS2" group name, and two
/// sessions that both contain a "First Term".
pub fn seed_default_refs(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    school_id: &str,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        "seed",
        "setup.referenceData",
        json!({
            "schoolId": school_id,
            "classYears": ["JSS1", "JSS2"],
            "classArms": ["A", "B"],
            "classGroups": [
                { "name": "JSS1A", "classYear": "JSS1", "classArm": "A" },
                { "name": "JSS1B", "classYear": "JSS1", "classArm": "B" },
                { "name": "JSS2", "classYear": "JSS2", "classArm": "A" },
                { "name": "JSS2", "classYear": "JSS2", "classArm": "B" }
            ],
            "sessions": [
                { "name": "2023/2024", "terms": [{ "name": "First Term" }] },
                {
                    "name": "2024/2025",
                    "isCurrent": true,
                    "terms": [
                        { "name": "First Term", "isCurrent": true },
                        { "name": "Second Term" }
                    ]
                }
            ]
        }),
    )
}

pub fn group_id(seeded: &serde_json::Value, name: &str) -> String {
    seeded
        .get("classGroups")
        .and_then(|v| v.as_array())
        .and_then(|groups| {
            groups
                .iter()
                .find(|g| g.get("name").and_then(|n| n.as_str()) == Some(name))
        })
        .and_then(|g| g.get("id"))
        .and_then(|v| v.as_str())
        .expect("seeded group id")
        .to_string()
}
