//! Child-script launcher: spawns the program named by `Script(...)`, wires
//! it up with loopback listeners and environment variables, captures its
//! stdout/stderr on dedicated tasks, and reports its lifetime back to the
//! dispatcher (§4.6).
//!
//! Stdout/stderr capture follows the teacher's background-read-loop
//! pattern (a dedicated task draining a line reader and forwarding each
//! line onward) rather than the OS-thread-plus-channel version `network.rs`
//! uses, since this whole core already runs on one Tokio runtime.

use crate::bind::BindSpec;
use crate::constants::{ENV_X3270COOKIEFILE, ENV_X3270PORT, ENV_X3270URL};
use crate::dispatcher::task::SourceId;
use crate::dispatcher::{DispatcherEvent, LauncherRequest};
use crate::engine::EngineHandle;
use crate::error::LauncherError;
use crate::http::{self, registry::Registry, HttpConfig};
use crate::peer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Configuration the launcher needs but that does not belong on every
/// individual [`LauncherRequest`].
#[derive(Clone)]
pub struct LauncherConfig {
    pub cookie_file: Option<std::path::PathBuf>,
    /// Shared engine handle, so a child's own peer/HTTP sessions see the same
    /// emulator state as the parent's listeners (§4.6's "child talks back").
    pub engine: Arc<dyn EngineHandle>,
    pub http_registry: Arc<Registry>,
    pub required_cookie: Option<String>,
    pub request_cap: usize,
}

/// Source id namespace for peer sessions a child dials back into, kept
/// disjoint from the top-level peer/Unix/HTTP ranges assigned in `main.rs`.
static NEXT_CHILD_PEER_SOURCE: AtomicU64 = AtomicU64::new(1 << 40);

fn next_child_peer_source_id() -> SourceId {
    SourceId(NEXT_CHILD_PEER_SOURCE.fetch_add(1, Ordering::Relaxed))
}

/// Runs the launcher's event loop: for every [`LauncherRequest`] received,
/// spawns the child and its plumbing, then reports completion back to the
/// dispatcher via `dispatcher_tx`.
pub async fn run(
    mut requests: mpsc::UnboundedReceiver<LauncherRequest>,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    config: LauncherConfig,
) {
    while let Some(request) = requests.recv().await {
        let dispatcher_tx = dispatcher_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = spawn_and_supervise(request.clone(), dispatcher_tx.clone(), config).await {
                let _ = dispatcher_tx.send(DispatcherEvent::ChildExited {
                    task_id: request.task_id,
                    success: false,
                    message: e.to_string(),
                });
            }
        });
    }
}

async fn spawn_and_supervise(
    request: LauncherRequest,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    config: LauncherConfig,
) -> Result<(), LauncherError> {
    let peer_listener = bind_ephemeral_loopback().await?;
    let http_listener = bind_ephemeral_loopback().await?;
    let peer_port = peer_listener.local_addr().map_err(|e| LauncherError::ListenerBindFailed { reason: e.to_string() })?.port();
    let http_port = http_listener.local_addr().map_err(|e| LauncherError::ListenerBindFailed { reason: e.to_string() })?.port();

    let mut command = Command::new(&request.program);
    command.args(&request.args);
    command.env(ENV_X3270PORT, peer_port.to_string());
    command.env(ENV_X3270URL, format!("http://127.0.0.1:{http_port}/3270/rest/"));
    if let Some(cookie_file) = &config.cookie_file {
        command.env(ENV_X3270COOKIEFILE, cookie_file.display().to_string());
    }
    install_posix_pipe_env(&mut command);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| LauncherError::SpawnFailed { program: request.program.clone(), reason: e.to_string() })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    if let Some(stdout) = stdout {
        spawn_line_forwarder(stdout, request.task_id, dispatcher_tx.clone(), false);
    }
    if let Some(stderr) = stderr {
        spawn_line_forwarder(stderr, request.task_id, dispatcher_tx.clone(), true);
    }

    let http_config = Arc::new(HttpConfig {
        registry: config.http_registry.clone(),
        engine: config.engine.clone(),
        required_cookie: config.required_cookie.clone(),
        request_cap: config.request_cap,
    });

    let peer_task = if request.single {
        tokio::spawn(accept_single_peer_session(peer_listener, dispatcher_tx.clone(), config.request_cap))
    } else {
        tokio::spawn(peer::run_tcp_listener(peer_listener, dispatcher_tx.clone(), config.request_cap, next_child_peer_source_id))
    };
    let http_task = if request.single {
        tokio::spawn(accept_single_http_session(http_listener, dispatcher_tx.clone(), http_config))
    } else {
        tokio::spawn(http::run_tcp_listener(http_listener, dispatcher_tx.clone(), http_config))
    };

    let status = child
        .wait()
        .await
        .map_err(|e| LauncherError::SpawnFailed { program: request.program.clone(), reason: e.to_string() })?;

    // The child is gone; stop accepting on its loopback listeners.
    peer_task.abort();
    http_task.abort();

    let (success, message) = describe_exit(&request.program, status);
    if !request.r#async {
        let _ = dispatcher_tx.send(DispatcherEvent::ChildExited { task_id: request.task_id, success, message });
    } else if !success {
        let _ = dispatcher_tx.send(DispatcherEvent::ChildOutputLine { task_id: request.task_id, line: message, is_stderr: true });
    }
    Ok(())
}

#[cfg(unix)]
fn install_posix_pipe_env(command: &mut Command) {
    // A full POSIX implementation would create a pipe pair and pass the raw
    // FDs via X3270OUTPUT/X3270INPUT; this crate's peer transport instead
    // always offers the TCP listener above, which every target platform can use.
    let _ = command;
}

#[cfg(not(unix))]
fn install_posix_pipe_env(_command: &mut Command) {}

async fn bind_ephemeral_loopback() -> Result<TcpListener, LauncherError> {
    let spec = BindSpec { host: "127.0.0.1".to_string(), port: 0 };
    // Port 0 means "any free port"; resolve() still validates host syntax, so
    // bind directly on the parsed host to honor the ephemeral-port request.
    TcpListener::bind(("127.0.0.1", spec.port))
        .await
        .map_err(|e| LauncherError::ListenerBindFailed { reason: e.to_string() })
}

/// `-Single` accepts exactly one connection on the child's peer listener and
/// runs a real session on it, rather than one connection-per-loop forever.
async fn accept_single_peer_session(
    listener: TcpListener,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    request_cap: usize,
) {
    if let Ok((stream, _addr)) = listener.accept().await {
        peer::run_session(stream, next_child_peer_source_id(), dispatcher_tx, request_cap).await;
    }
}

/// `-Single` counterpart for the child's HTTP listener.
async fn accept_single_http_session(
    listener: TcpListener,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    config: Arc<HttpConfig>,
) {
    if let Ok((stream, _addr)) = listener.accept().await {
        http::run_session(stream, dispatcher_tx, config).await;
    }
}

fn spawn_line_forwarder(
    reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    task_id: crate::dispatcher::task::TaskId,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    is_stderr: bool,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if dispatcher_tx.send(DispatcherEvent::ChildOutputLine { task_id, line, is_stderr }).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    });
}

fn describe_exit(program: &str, status: std::process::ExitStatus) -> (bool, String) {
    if status.success() {
        return (true, String::new());
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let err = LauncherError::KilledBySignal { program: program.to_string(), signal };
            return (false, err.to_string());
        }
    }
    let code = status.code().unwrap_or(-1);
    let err = LauncherError::NonZeroExit { program: program.to_string(), code };
    (false, err.to_string())
}
