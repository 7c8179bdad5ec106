#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/relayrpc-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("server did not start listening");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

struct ServeGuard {
    child: Child,
    dir: PathBuf,
    sock: PathBuf,
}

impl Drop for ServeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn serve(tag: &str) -> ServeGuard {
    let dir = unique_temp_dir(tag);
    let sock = dir.join("serve.sock");
    let child = Command::new(env!("CARGO_BIN_EXE_relayrpc"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(&sock)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");
    wait_for_socket(&sock, Duration::from_secs(5));
    ServeGuard { child, dir, sock }
}

fn call(sock: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relayrpc"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("call")
        .arg(sock)
        .args(extra)
        .output()
        .expect("call should run")
}

fn result_of(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "call failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("call should emit json");
    payload["result"].clone()
}

#[test]
fn persistent_call_prints_result() {
    let server = serve("persistent");
    let output = call(&server.sock, &["echoReverse", "--args", "[\"hello\"]"]);
    assert_eq!(result_of(&output), serde_json::json!("olleh"));

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(payload["mode"], "persistent");
    assert_eq!(payload["serialization"], "tagged");
}

#[test]
fn single_shot_json_call() {
    let server = serve("single-shot");
    let output = call(
        &server.sock,
        &[
            "add",
            "--args",
            "[1, 2, 39]",
            "--single-shot",
            "--serialization",
            "json",
        ],
    );
    assert_eq!(result_of(&output), serde_json::json!(42));
}

#[test]
fn relayed_values_are_resolved() {
    let server = serve("relays");
    let output = call(&server.sock, &["countdown", "--args", "[3]"]);
    assert_eq!(result_of(&output), serde_json::json!([3, 2, 1]));

    let output = call(&server.sock, &["delayed", "--args", "[\"ready\", 10]"]);
    assert_eq!(result_of(&output), serde_json::json!("ready"));

    let output = call(&server.sock, &["applyTwice", "--args", "[\"same\"]", "--callback"]);
    assert_eq!(result_of(&output), serde_json::json!("same"));
}

#[test]
fn unknown_function_exits_with_usage() {
    let server = serve("unknown");
    let output = call(&server.sock, &["nope"]);
    assert_eq!(output.status.code(), Some(64));

    let output = call(&server.sock, &["nope", "--single-shot"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn rejected_call_exits_with_failure() {
    let server = serve("fail");
    let output = call(&server.sock, &["fail", "--args", "[\"boom\"]"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("boom"));
}

#[test]
fn invalid_args_json_exits_with_usage() {
    let output = call(Path::new("/tmp/unused.sock"), &["f", "--args", "{oops"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn missing_socket_exits_with_failure() {
    let dir = unique_temp_dir("missing");
    let output = call(&dir.join("absent.sock"), &["echoReverse"]);
    assert_eq!(output.status.code(), Some(1));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_relayrpc"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("relayrpc {}", env!("CARGO_PKG_VERSION"))
    );
}
