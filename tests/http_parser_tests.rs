//! End-to-end HTTP server scenarios (§8 I5, I6, S3, S4) driven over an
//! in-memory duplex stream against a live dispatcher.

use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use x3270sh::config::Config;
use x3270sh::dispatcher::{self, Dispatcher};
use x3270sh::engine::StubEngine;
use x3270sh::http::{self, registry::Registry, HttpConfig};

struct RawResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

async fn read_response<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> RawResponse {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed.split_once(':').unwrap();
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap();
        }
        headers.push((name, value));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await.unwrap();
    }
    RawResponse { status, headers, body: String::from_utf8_lossy(&body).into_owned() }
}

fn spawn_dispatcher() -> mpsc::UnboundedSender<dispatcher::DispatcherEvent> {
    let dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), None);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(dispatcher::run(dispatcher, rx));
    tx
}

fn make_config(required_cookie: Option<String>) -> Arc<HttpConfig> {
    Arc::new(HttpConfig {
        registry: Arc::new(Registry::new()),
        engine: Arc::new(StubEngine::new()),
        required_cookie,
        request_cap: x3270sh::constants::DEFAULT_REQUEST_CAP,
    })
}

#[tokio::test]
async fn bare_dir_path_redirects_and_trailing_slash_lists() {
    let dispatcher_tx = spawn_dispatcher();
    let config = make_config(None);
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(http::run_session(server, dispatcher_tx, config));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"GET /3270 HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let response = read_response(&mut reader).await;
    assert_eq!(response.status, 301);
    assert!(response.headers.iter().any(|(k, v)| k == "Location" && v == "/3270/"));

    write_half.write_all(b"GET /3270/ HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let response = read_response(&mut reader).await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn rest_text_endpoint_returns_cursor_text() {
    let dispatcher_tx = spawn_dispatcher();
    let config = make_config(None);
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(http::run_session(server, dispatcher_tx, config));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half
        .write_all(b"GET /3270/rest/text/Query(Cursor) HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut reader).await;
    assert_eq!(response.status, 200);
    assert!(response.headers.iter().any(|(k, v)| k == "Content-Type" && v.starts_with("text/plain")));
    assert_eq!(response.body, "0 0\n");
}

#[tokio::test]
async fn missing_host_yields_error_response_with_connection_closed() {
    let dispatcher_tx = spawn_dispatcher();
    let config = make_config(None);
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(http::run_session(server, dispatcher_tx, config));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    // No Host header on an HTTP/1.1 request: must draw a 4xx and close.
    write_half.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let response = read_response(&mut reader).await;
    assert!((400..500).contains(&response.status));

    // The session must have closed: a further write either fails or the
    // peer never answers it.
    let wrote_more = write_half.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    if wrote_more.is_ok() {
        let mut probe = [0u8; 1];
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), reader.read(&mut probe)).await;
        assert!(matches!(timed_out, Ok(Ok(0))) || timed_out.is_err());
    }
}

#[tokio::test]
async fn non_http_input_gets_a_bare_400_with_no_framing() {
    let dispatcher_tx = spawn_dispatcher();
    let config = make_config(None);
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(http::run_session(server, dispatcher_tx, config));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    // A request line starting with whitespace is not recognized as HTTP at
    // all; the reply must not carry a status-line or headers.
    write_half.write_all(b" not an http request\r\n\r\n").await.unwrap();

    let mut body = Vec::new();
    tokio::time::timeout(std::time::Duration::from_millis(500), reader.read_to_end(&mut body)).await.unwrap().unwrap();
    assert_eq!(body, b"400 Bad Request\n");
}

#[tokio::test]
async fn bad_cookie_is_rejected_with_randomized_delay() {
    let dispatcher_tx = spawn_dispatcher();
    let config = make_config(Some("correct-horse".to_string()));
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(http::run_session(server, dispatcher_tx, config));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    let started = Instant::now();
    write_half
        .write_all(b"GET /3270/ HTTP/1.1\r\nHost: localhost\r\nCookie: x3270-security=wrong\r\n\r\n")
        .await
        .unwrap();
    let response = read_response(&mut reader).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status, 403);
    assert!(elapsed.as_millis() >= 1000, "expected >= 1000ms delay, got {elapsed:?}");
    assert!(elapsed.as_millis() <= 2500, "expected <= ~2000ms delay, got {elapsed:?}");
}
