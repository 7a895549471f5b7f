use orcai_core::{HttpSummarizer, OrcaiConfig, OrcaiError, Summarizer};
use orcai_protocol::{CaptureReport, TRANSCRIPT_VERSION};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

struct Captured {
    request_line: String,
    authorization: Option<String>,
    body: Value,
}

/// Serves exactly one request with the given status and body, then hands the listener back
/// so the test can check that no further connection arrived.
fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<(TcpListener, Captured)>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let captured = respond(stream, status, body);
        (listener, captured)
    });
    (endpoint, handle)
}

fn respond(stream: TcpStream, status: u16, body: &str) -> Captured {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.parse().unwrap(),
                "authorization" => authorization = Some(value.to_string()),
                _ => {}
            }
        }
    }

    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).unwrap();

    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).unwrap();
    stream.flush().unwrap();

    Captured {
        request_line: request_line.trim_end().to_string(),
        authorization,
        body: serde_json::from_slice(&payload).unwrap(),
    }
}

fn report() -> CaptureReport {
    let mut file_changes = BTreeMap::new();
    file_changes.insert(
        "/etc/nginx/nginx.conf".to_string(),
        Some("--- before\n+++ after\n@@ -1 +1,2 @@\n a\n+b\n".to_string()),
    );
    CaptureReport {
        version: TRANSCRIPT_VERSION,
        started_at: "2026-01-01T00:00:00Z".to_string(),
        finished_at: "2026-01-01T00:05:00Z".to_string(),
        shell: Some("/bin/bash".to_string()),
        commands: vec!["apt install -y nginx".to_string()],
        file_changes,
        scripts: BTreeMap::new(),
    }
}

fn config(endpoint: String) -> OrcaiConfig {
    OrcaiConfig {
        api_endpoint: Some(endpoint),
        api_key: Some("sk-test".to_string()),
        model: Some("gpt-4o".to_string()),
        context_length: Some(1024),
    }
}

#[test]
fn successful_handoff_returns_playbook() {
    let (endpoint, server) = serve_once(
        200,
        r#"{"choices":[{"message":{"role":"assistant","content":"- hosts: all\n  tasks: []\n"}}]}"#,
    );

    let artifact = HttpSummarizer::new(config(endpoint))
        .summarize(&report())
        .unwrap();
    assert_eq!(artifact, "- hosts: all\n  tasks: []\n");

    let (_listener, captured) = server.join().unwrap();
    assert_eq!(captured.request_line, "POST /v1/chat/completions HTTP/1.1");
    assert_eq!(captured.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(captured.body["model"], "gpt-4o");
    assert_eq!(captured.body["max_tokens"], 1024);
    assert_eq!(captured.body["messages"][0]["role"], "system");
    assert_eq!(captured.body["messages"][1]["role"], "user");
    let prompt = captured.body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("apt install -y nginx"));
    assert!(prompt.contains("/etc/nginx/nginx.conf"));
}

#[test]
fn server_error_is_reported_without_retry() {
    let (endpoint, server) = serve_once(500, r#"{"error":{"message":"overloaded"}}"#);

    let err = HttpSummarizer::new(config(endpoint))
        .summarize(&report())
        .unwrap_err();
    match &err {
        OrcaiError::UpstreamError { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_handoff_failure());

    let (listener, _captured) = server.join().unwrap();
    listener.set_nonblocking(true).unwrap();
    let second = listener.accept();
    assert!(
        matches!(&second, Err(e) if e.kind() == std::io::ErrorKind::WouldBlock),
        "a second request was made"
    );
}

#[test]
fn success_without_content_is_an_upstream_error() {
    let (endpoint, server) = serve_once(200, r#"{"choices":[]}"#);

    let err = HttpSummarizer::new(config(endpoint))
        .summarize(&report())
        .unwrap_err();
    assert!(matches!(err, OrcaiError::UpstreamError { status: 200, .. }));
    server.join().unwrap();
}
