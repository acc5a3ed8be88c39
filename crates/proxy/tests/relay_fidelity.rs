//! End-to-end relay tests: the real binary with an echo process standing in
//! for the language server. Whatever the proxy forwards to the "server"
//! comes straight back, which makes both relay directions observable from
//! the editor side.

#![cfg(unix)]

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

const IO_TIMEOUT: Duration = Duration::from_secs(10);

fn router_bin() -> &'static str {
    env!("CARGO_BIN_EXE_yaml-schema-router")
}

/// Writes an executable that ignores the `--stdio` argument and echoes its
/// stdin back. `cat` itself would reject the flag.
fn write_echo_server(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("echo-server.sh");
    std::fs::write(&path, "#!/bin/sh\nexec cat\n").expect("write echo server");
    let mut perms = std::fs::metadata(&path).expect("stat echo server").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod echo server");
    path
}

fn spawn_router(dir: &Path) -> Child {
    let echo_server = write_echo_server(dir);
    Command::new(router_bin())
        .arg("--lsp-path")
        .arg(&echo_server)
        .arg("--log-file")
        .arg(dir.join("router.log"))
        .arg("--stdio")
        // Keep the schema cache inside the test sandbox.
        .env("HOME", dir)
        .env("XDG_CACHE_HOME", dir.join("cache"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn yaml-schema-router")
}

async fn send_frame(stdin: &mut tokio::process::ChildStdin, body: &[u8]) {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    stdin.write_all(header.as_bytes()).await.expect("write header");
    stdin.write_all(body).await.expect("write body");
    stdin.flush().await.expect("flush");
}

/// Reads one frame, returning the advertised length and the raw body.
async fn read_frame(stdout: &mut BufReader<ChildStdout>) -> (usize, Vec<u8>) {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = tokio::time::timeout(IO_TIMEOUT, stdout.read_line(&mut line))
            .await
            .expect("header read timed out")
            .expect("read header line");
        assert!(read > 0, "EOF while reading frame headers");
        if line == "\n" || line == "\r\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("content-length:") {
            content_length = Some(rest.trim().parse().expect("numeric Content-Length"));
        }
    }

    let len = content_length.expect("missing Content-Length header");
    let mut body = vec![0u8; len];
    tokio::time::timeout(IO_TIMEOUT, stdout.read_exact(&mut body))
        .await
        .expect("body read timed out")
        .expect("read body");
    (len, body)
}

#[tokio::test]
async fn non_intercepted_frames_round_trip_byte_identically() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut child = spawn_router(dir.path());
    let mut stdin = child.stdin.take().expect("router stdin");
    let mut stdout = BufReader::new(child.stdout.take().expect("router stdout"));

    let body =
        br#"{"jsonrpc":"2.0","id":7,"method":"workspace/symbol","params":{"query":"deploy"}}"#;
    send_frame(&mut stdin, body).await;

    let (len, echoed) = read_frame(&mut stdout).await;
    assert_eq!(len, body.len());
    assert_eq!(echoed, body);

    drop(stdin);
    let status = tokio::time::timeout(IO_TIMEOUT, child.wait())
        .await
        .expect("shutdown timed out")
        .expect("wait for router");
    assert!(status.success(), "router exited with {status}");
}

#[tokio::test]
async fn initialize_response_is_coerced_to_full_sync() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut child = spawn_router(dir.path());
    let mut stdin = child.stdin.take().expect("router stdin");
    let mut stdout = BufReader::new(child.stdout.take().expect("router stdout"));

    // The echo server bounces this back, so it re-enters the proxy on the
    // server→editor path where the sync coercion lives.
    let body = br#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{"textDocumentSync":{"openClose":true,"change":2},"hoverProvider":true}}}"#;
    send_frame(&mut stdin, body).await;

    let (len, rewritten) = read_frame(&mut stdout).await;
    assert_eq!(len, rewritten.len());

    let envelope: Value = serde_json::from_slice(&rewritten).expect("parse rewritten frame");
    assert_eq!(envelope["result"]["capabilities"]["textDocumentSync"], 1);
    assert_eq!(
        envelope["result"]["capabilities"]["hoverProvider"],
        Value::Bool(true)
    );

    drop(stdin);
    let _ = tokio::time::timeout(IO_TIMEOUT, child.wait()).await;
}

#[tokio::test]
async fn non_kubernetes_documents_produce_no_nudge() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut child = spawn_router(dir.path());
    let mut stdin = child.stdin.take().expect("router stdin");
    let mut stdout = BufReader::new(child.stdout.take().expect("router stdout"));

    let did_open = serde_json::to_vec(&serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didOpen",
        "params": {
            "textDocument": {
                "uri": "file:///plain.yaml",
                "languageId": "yaml",
                "version": 1,
                "text": "hello: world\n"
            }
        }
    }))
    .expect("marshal didOpen");
    send_frame(&mut stdin, &did_open).await;

    let marker = br#"{"jsonrpc":"2.0","id":9,"method":"shutdown"}"#;
    send_frame(&mut stdin, marker).await;

    // Had a nudge been injected, a workspace/didChangeConfiguration frame
    // would come back between these two.
    let (_, first) = read_frame(&mut stdout).await;
    assert_eq!(first, did_open);
    let (_, second) = read_frame(&mut stdout).await;
    assert_eq!(second, marker.as_slice());

    drop(stdin);
    let _ = tokio::time::timeout(IO_TIMEOUT, child.wait()).await;
}
