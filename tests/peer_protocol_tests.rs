//! End-to-end peer-session scenarios (§8 S1, S2) driven over an in-memory
//! duplex stream against a live dispatcher.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use x3270sh::config::Config;
use x3270sh::dispatcher::task::SourceId;
use x3270sh::dispatcher::{self, Dispatcher};
use x3270sh::engine::StubEngine;
use x3270sh::json;
use x3270sh::peer;

async fn spawn_dispatcher() -> mpsc::UnboundedSender<dispatcher::DispatcherEvent> {
    let dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), None);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(dispatcher::run(dispatcher, rx));
    tx
}

#[tokio::test]
async fn json_mode_round_trip_reports_success() {
    let dispatcher_tx = spawn_dispatcher().await;
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(peer::run_session(server, SourceId(1), dispatcher_tx, peer::DEFAULT_PEER_REQUEST_CAP));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"{\"action\":\"Set\",\"args\":[\"monoCase\",\"true\"]}\n").await.unwrap();

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let value = json::parse(line.trim_end()).unwrap();

    assert_eq!(value.object_member("success").unwrap().as_bool(), Some(true));
    assert_eq!(value.object_member("result").unwrap().array_length(), 0);
    assert_eq!(value.object_member("result-err").unwrap().array_length(), 0);
    assert!(!value.object_member("status").unwrap().as_str().unwrap().is_empty());
}

#[tokio::test]
async fn incomplete_json_is_buffered_until_newline_arrives() {
    let dispatcher_tx = spawn_dispatcher().await;
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(peer::run_session(server, SourceId(2), dispatcher_tx, peer::DEFAULT_PEER_REQUEST_CAP));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"{\"action\":\"Quit\"").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    write_half.write_all(b"}\n").await.unwrap();

    let mut line = String::new();
    let read = tokio::time::timeout(std::time::Duration::from_secs(1), reader.read_line(&mut line)).await;
    assert!(read.is_ok(), "expected exactly one response, not a premature parse error");
    let value = json::parse(line.trim_end()).unwrap();
    assert_eq!(value.object_member("success").unwrap().as_bool(), Some(true));
}

#[tokio::test]
async fn native_syntax_multiple_commands_complete_independently() {
    let dispatcher_tx = spawn_dispatcher().await;
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(peer::run_session(server, SourceId(3), dispatcher_tx, peer::DEFAULT_PEER_REQUEST_CAP));

    let (read_half, mut write_half) = tokio::io::split(client);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(b"Query(Cursor)\n").await.unwrap();

    let mut data_line = String::new();
    reader.read_line(&mut data_line).await.unwrap();
    assert!(data_line.starts_with("data: "));

    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let mut trailer = String::new();
    reader.read_line(&mut trailer).await.unwrap();
    assert_eq!(trailer.trim_end(), "ok");
}
