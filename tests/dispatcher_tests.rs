//! End-to-end dispatcher wiring scenarios (§8 S5, S6): pass-through actions
//! routed between two independent peer sessions, and an `-Async` child that
//! completes immediately rather than blocking on the child's exit.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use x3270sh::config::Config;
use x3270sh::dispatcher::task::SourceId;
use x3270sh::dispatcher::{self, Dispatcher};
use x3270sh::engine::StubEngine;
use x3270sh::json;
use x3270sh::launcher::{self, LauncherConfig};
use x3270sh::peer;

#[tokio::test]
async fn pass_through_round_trip_across_two_peer_sessions() {
    let dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), None);
    let (dispatcher_tx, dispatcher_rx) = mpsc::unbounded_channel();
    tokio::spawn(dispatcher::run(dispatcher, dispatcher_rx));

    let (registrar_client, registrar_server) = tokio::io::duplex(4096);
    tokio::spawn(peer::run_session(registrar_server, SourceId(10), dispatcher_tx.clone(), peer::DEFAULT_PEER_REQUEST_CAP));
    let (registrar_read, mut registrar_write) = tokio::io::split(registrar_client);
    let mut registrar_reader = BufReader::new(registrar_read);

    let (invoker_client, invoker_server) = tokio::io::duplex(4096);
    tokio::spawn(peer::run_session(invoker_server, SourceId(11), dispatcher_tx.clone(), peer::DEFAULT_PEER_REQUEST_CAP));
    let (invoker_read, mut invoker_write) = tokio::io::split(invoker_client);
    let mut invoker_reader = BufReader::new(invoker_read);

    registrar_write.write_all(b"Register(Widget)\n").await.unwrap();
    let mut status = String::new();
    registrar_reader.read_line(&mut status).await.unwrap();
    let mut trailer = String::new();
    registrar_reader.read_line(&mut trailer).await.unwrap();
    assert_eq!(trailer.trim_end(), "ok");

    invoker_write.write_all(b"Widget(hello)\n").await.unwrap();

    let mut passthru_line = String::new();
    registrar_reader.read_line(&mut passthru_line).await.unwrap();
    assert!(passthru_line.starts_with("passthru: "));
    let payload = json::parse(passthru_line.trim_start_matches("passthru: ").trim_end()).unwrap();
    assert_eq!(payload.object_member("action").unwrap().as_str().unwrap(), "Widget");
    assert_eq!(payload.object_member("args").unwrap().array_element(0).unwrap().as_str().unwrap(), "hello");
    let p_tag = payload.object_member("p-tag").unwrap().as_str().unwrap().into_owned();

    registrar_write.write_all(format!("Succeed({p_tag},done)\n").as_bytes()).await.unwrap();
    let mut succeed_status = String::new();
    registrar_reader.read_line(&mut succeed_status).await.unwrap();
    let mut succeed_trailer = String::new();
    registrar_reader.read_line(&mut succeed_trailer).await.unwrap();
    assert_eq!(succeed_trailer.trim_end(), "ok");

    let mut data_line = String::new();
    invoker_reader.read_line(&mut data_line).await.unwrap();
    assert_eq!(data_line.trim_end(), "data: done");
    let mut invoker_status = String::new();
    invoker_reader.read_line(&mut invoker_status).await.unwrap();
    let mut invoker_trailer = String::new();
    invoker_reader.read_line(&mut invoker_trailer).await.unwrap();
    assert_eq!(invoker_trailer.trim_end(), "ok");
}

#[tokio::test]
async fn script_async_completes_without_waiting_for_child_exit() {
    let mut dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), None);
    let (dispatcher_tx, dispatcher_rx) = mpsc::unbounded_channel();
    let (launcher_tx, launcher_rx) = mpsc::unbounded_channel();
    dispatcher.set_launcher_sender(launcher_tx);
    tokio::spawn(dispatcher::run(dispatcher, dispatcher_rx));
    let launcher_config = LauncherConfig {
        cookie_file: None,
        engine: Arc::new(StubEngine::new()),
        http_registry: Arc::new(x3270sh::http::registry::Registry::new()),
        required_cookie: None,
        request_cap: x3270sh::constants::DEFAULT_REQUEST_CAP,
    };
    tokio::spawn(launcher::run(launcher_rx, dispatcher_tx.clone(), launcher_config));

    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let handle = x3270sh::dispatcher::source::SourceHandle::new(output_tx, x3270sh::dispatcher::source::Capabilities::empty());
    let source_id = SourceId(20);
    dispatcher_tx.send(dispatcher::DispatcherEvent::RegisterSource { source_id, handle }).unwrap();

    // `sleep 5` would block for five seconds if the dispatcher waited on the
    // child; -Async must hand back control immediately instead.
    dispatcher_tx
        .send(dispatcher::DispatcherEvent::Commands {
            source_id,
            cause: x3270sh::dispatcher::task::Cause::Peer,
            new_queue: false,
            commands: vec![("Script".to_string(), vec!["-Async".to_string(), "sleep".to_string(), "5".to_string()])],
        })
        .unwrap();

    let completion = tokio::time::timeout(Duration::from_millis(500), output_rx.recv()).await;
    let output = completion.expect("Script(-Async,...) must complete immediately").unwrap();
    match output {
        x3270sh::dispatcher::source::SourceOutput::Complete { success, .. } => assert!(success),
        other => panic!("expected an immediate completion, got {other:?}"),
    }
}
