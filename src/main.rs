//! x3270sh entry point: parses CLI options, loads the security cookie,
//! wires the dispatcher/launcher/peer/HTTP subsystems together, and runs
//! until a `Quit`/`Exit` action or the last source disappears (§6.7).

use std::sync::Arc;
use tokio::sync::mpsc;
use x3270sh::bind::BindSpec;
use x3270sh::config::{CliOptions, Config};
use x3270sh::constants::DEFAULT_SOCKET_PATH_PREFIX;
use x3270sh::dispatcher::{self, Dispatcher};
use x3270sh::engine::StubEngine;
use x3270sh::http::{self, registry::Registry, HttpConfig};
use x3270sh::launcher::{self, LauncherConfig};
use x3270sh::peer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = CliOptions::parse(&args).unwrap_or_else(|e| {
        eprintln!("x3270sh: {e}");
        std::process::exit(1);
    });

    let required_cookie = match &options.cookiefile {
        Some(path) => match x3270sh::cookie::load_or_generate(std::path::Path::new(path)) {
            Ok(token) => Some(token),
            Err(e) => {
                eprintln!("x3270sh: cookie file error: {e}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let config = Config::new();
    let engine = Arc::new(StubEngine::new());
    let mut dispatcher = Dispatcher::new(config, engine.clone(), required_cookie.clone());

    let (dispatcher_tx, dispatcher_rx) = mpsc::unbounded_channel();
    let (launcher_tx, launcher_rx) = mpsc::unbounded_channel();
    dispatcher.set_launcher_sender(launcher_tx);

    let launcher_config = LauncherConfig {
        cookie_file: options.cookiefile.as_ref().map(std::path::PathBuf::from),
        engine: engine.clone(),
        http_registry: Arc::new(Registry::new()),
        required_cookie: required_cookie.clone(),
        request_cap: x3270sh::constants::DEFAULT_REQUEST_CAP,
    };
    tokio::spawn(launcher::run(launcher_rx, dispatcher_tx.clone(), launcher_config));

    if let Some(spec) = &options.scriptport {
        spawn_peer_listener(spec, dispatcher_tx.clone()).await?;
    }

    if options.socket {
        spawn_unix_listener(dispatcher_tx.clone()).await?;
    }

    if let Some(spec) = &options.httpd {
        spawn_http_listener(spec, dispatcher_tx.clone(), engine.clone(), required_cookie.clone()).await?;
    }

    log::info!("x3270sh: control plane ready");
    dispatcher::run(dispatcher, dispatcher_rx).await;
    log::info!("x3270sh: shutting down");
    Ok(())
}

async fn spawn_peer_listener(spec: &str, dispatcher_tx: mpsc::UnboundedSender<x3270sh::dispatcher::DispatcherEvent>) -> anyhow::Result<()> {
    let bind = BindSpec::parse(spec)?;
    let addr = bind.resolve()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("x3270sh: peer listener bound on {addr}");
    let next_source_id = std::sync::atomic::AtomicU64::new(0);
    tokio::spawn(peer::run_tcp_listener(listener, dispatcher_tx, peer::DEFAULT_PEER_REQUEST_CAP, move || {
        x3270sh::dispatcher::task::SourceId(next_source_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }));
    Ok(())
}

#[cfg(unix)]
async fn spawn_unix_listener(dispatcher_tx: mpsc::UnboundedSender<x3270sh::dispatcher::DispatcherEvent>) -> anyhow::Result<()> {
    let path = format!("{DEFAULT_SOCKET_PATH_PREFIX}{}", std::process::id());
    let _ = std::fs::remove_file(&path);
    let listener = tokio::net::UnixListener::bind(&path)?;
    log::info!("x3270sh: Unix socket listener bound on {path}");
    let next_source_id = std::sync::atomic::AtomicU64::new(1 << 16);
    tokio::spawn(peer::run_unix_listener(listener, dispatcher_tx, peer::DEFAULT_PEER_REQUEST_CAP, move || {
        x3270sh::dispatcher::task::SourceId(next_source_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }));
    Ok(())
}

#[cfg(not(unix))]
async fn spawn_unix_listener(_dispatcher_tx: mpsc::UnboundedSender<x3270sh::dispatcher::DispatcherEvent>) -> anyhow::Result<()> {
    log::warn!("x3270sh: -socket requested but this platform has no Unix domain sockets");
    Ok(())
}

async fn spawn_http_listener(
    spec: &str,
    dispatcher_tx: mpsc::UnboundedSender<x3270sh::dispatcher::DispatcherEvent>,
    engine: Arc<StubEngine>,
    required_cookie: Option<String>,
) -> anyhow::Result<()> {
    let bind = BindSpec::parse(spec)?;
    let addr = bind.resolve()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("x3270sh: HTTP listener bound on {addr}");
    let config = Arc::new(HttpConfig {
        registry: Arc::new(Registry::new()),
        engine,
        required_cookie,
        request_cap: x3270sh::constants::DEFAULT_REQUEST_CAP,
    });
    tokio::spawn(http::run_tcp_listener(listener, dispatcher_tx, config));
    Ok(())
}
