//! The s3270 peer protocol: a dual native-syntax/JSON-mode line protocol
//! exported over stdio, a Unix domain socket, or a TCP listener (§4.2, §6.1,
//! §6.2). Framing and response shaping are transport-agnostic; each
//! transport only supplies an `AsyncRead + AsyncWrite` stream.

use crate::constants::DEFAULT_REQUEST_CAP;
use crate::dispatcher::source::{Capabilities, SourceHandle, SourceOutput};
use crate::dispatcher::task::{Cause, SourceId};
use crate::dispatcher::DispatcherEvent;
use crate::error::PeerError;
use crate::json::Json;
use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

/// Splits a native-syntax line (`Name(arg1,arg2,...) Name2(...)`) into a
/// sequence of `(action, args)` pairs.
pub fn parse_native_line(line: &str) -> Result<Vec<(String, Vec<String>)>, PeerError> {
    let mut commands = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'(' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name = line[name_start..i].to_string();
        if name.is_empty() {
            return Err(PeerError::NativeSyntax { line: line.to_string(), reason: "expected action name".to_string() });
        }
        let mut args = Vec::new();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'(' {
            i += 1;
            loop {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b')' {
                    i += 1;
                    break;
                }
                if i >= bytes.len() {
                    return Err(PeerError::NativeSyntax { line: line.to_string(), reason: "unterminated argument list".to_string() });
                }
                let (arg, next) = parse_native_token(line, i)?;
                args.push(arg);
                i = next;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b',' {
                    i += 1;
                } else if i < bytes.len() && bytes[i] == b')' {
                    i += 1;
                    break;
                } else if i >= bytes.len() {
                    return Err(PeerError::NativeSyntax { line: line.to_string(), reason: "unterminated argument list".to_string() });
                }
            }
        }
        commands.push((name, args));
    }
    Ok(commands)
}

fn parse_native_token(line: &str, start: usize) -> Result<(String, usize), PeerError> {
    let bytes = line.as_bytes();
    if bytes[start] == b'"' {
        let mut i = start + 1;
        let mut out = String::new();
        loop {
            if i >= bytes.len() {
                return Err(PeerError::NativeSyntax { line: line.to_string(), reason: "unterminated quoted string".to_string() });
            }
            match bytes[i] {
                b'"' => {
                    i += 1;
                    break;
                }
                b'\\' if i + 1 < bytes.len() => {
                    out.push(bytes[i + 1] as char);
                    i += 2;
                }
                b => {
                    out.push(b as char);
                    i += 1;
                }
            }
        }
        Ok((out, i))
    } else {
        let token_start = start;
        let mut i = start;
        while i < bytes.len() && bytes[i] != b',' && bytes[i] != b')' {
            i += 1;
        }
        Ok((line[token_start..i].trim_end().to_string(), i))
    }
}

/// Quotes a single argument per the native-syntax rules (§4.2 "Quoting").
pub fn quote_token(token: &str) -> String {
    let needs_quoting = token.is_empty()
        || token.contains(' ')
        || token.contains(',')
        || token.contains('(')
        || token.contains(')')
        || token.starts_with('"');
    if !needs_quoting {
        return token.to_string();
    }
    let mut out = String::from("\"");
    for c in token.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Renders a completed action's plain-mode response body (everything up to
/// but not including the final status line / `ok`/`error` trailer, which the
/// caller appends as each `SourceOutput` line arrives).
pub fn plain_line_prefix(output: &SourceOutput) -> Option<(String, bool)> {
    match output {
        SourceOutput::Data(line) => Some((format!("data: {line}"), false)),
        SourceOutput::ErrorData(line) => Some((format!("errd: {line}"), false)),
        SourceOutput::InputPrompt { prompt } => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(prompt);
            Some((format!("inpt: {encoded}"), false))
        }
        SourceOutput::InputPromptNoEcho { prompt_b64 } => Some((format!("inpw: {prompt_b64}"), false)),
        SourceOutput::PassThrough { action, p_tag, args } => {
            let mut obj = Json::new_object();
            obj.object_set("action", Json::string(action.clone()));
            obj.object_set("p-tag", Json::string(p_tag.clone()));
            let mut arr = Json::new_array();
            for a in args {
                arr.array_append(Json::string(a.clone()));
            }
            obj.object_set("args", arr);
            Some((format!("passthru: {}", crate::json::write_oneline(&obj)), false))
        }
        SourceOutput::Complete { .. } => None,
    }
}

/// Accumulates a JSON-mode response as `SourceOutput`s arrive, matching
/// §6.2's `{result, result-err, status, success}` shape.
#[derive(Default)]
pub struct JsonResponseBuilder {
    result: Vec<String>,
    result_err: Vec<bool>,
}

impl JsonResponseBuilder {
    pub fn push(&mut self, output: &SourceOutput) -> Option<String> {
        match output {
            SourceOutput::Data(line) => {
                self.result.push(line.clone());
                self.result_err.push(false);
                None
            }
            SourceOutput::ErrorData(line) => {
                self.result.push(line.clone());
                self.result_err.push(true);
                None
            }
            SourceOutput::Complete { status_line, success } => {
                let mut obj = Json::new_object();
                let result = Json::Array(self.result.drain(..).map(Json::string).collect());
                let result_err = Json::Array(self.result_err.drain(..).map(Json::Boolean).collect());
                obj.object_set("result", result);
                obj.object_set("result-err", result_err);
                obj.object_set("status", Json::string(status_line.clone()));
                obj.object_set("success", Json::Boolean(*success));
                Some(crate::json::write_oneline(&obj))
            }
            _ => None,
        }
    }
}

/// Runs one peer session to completion: frames input, dispatches commands,
/// and writes shaped responses back out.
pub async fn run_session<S>(
    stream: S,
    source_id: SourceId,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    request_cap: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let handle = SourceHandle::new(output_tx, Capabilities::empty());
    let _ = dispatcher_tx.send(DispatcherEvent::RegisterSource { source_id, handle });

    let mut json_builder = JsonResponseBuilder::default();
    let mut pending_json_mode = false;
    let mut line_buf = Vec::new();

    loop {
        tokio::select! {
            read_result = reader.read_until(b'\n', &mut line_buf) => {
                match read_result {
                    Ok(0) => break,
                    Ok(_) => {
                        if line_buf.len() > request_cap {
                            log::warn!("peer session: input line exceeded {request_cap} bytes, closing");
                            break;
                        }
                        let line = String::from_utf8_lossy(&line_buf).trim_end_matches(['\n', '\r']).to_string();
                        line_buf.clear();
                        if line.trim().is_empty() {
                            continue;
                        }
                        let trimmed = line.trim_start();
                        let looks_json = matches!(trimmed.chars().next(), Some('{') | Some('[') | Some('"'));
                        if looks_json {
                            pending_json_mode = true;
                            match crate::json::try_parse(line.as_bytes()) {
                                Ok(value) => {
                                    for (name, args) in commands_from_json(&value) {
                                        let _ = dispatcher_tx.send(DispatcherEvent::Commands {
                                            source_id,
                                            cause: Cause::Peer,
                                            new_queue: false,
                                            commands: vec![(name, args)],
                                        });
                                    }
                                }
                                Err(e) => {
                                    let _ = dispatcher_tx.send(DispatcherEvent::Commands {
                                        source_id,
                                        cause: Cause::Peer,
                                        new_queue: false,
                                        commands: vec![("Fail".to_string(), vec!["__parse__".to_string(), e.to_string()])],
                                    });
                                }
                            }
                        } else {
                            pending_json_mode = false;
                            match parse_native_line(&line) {
                                Ok(commands) => {
                                    let _ = dispatcher_tx.send(DispatcherEvent::Commands {
                                        source_id,
                                        cause: Cause::Peer,
                                        new_queue: false,
                                        commands,
                                    });
                                }
                                Err(e) => {
                                    if write_half.write_all(format!("data: {e}\nerror\n").as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
            output = output_rx.recv() => {
                match output {
                    Some(SourceOutput::Complete { status_line, success }) => {
                        let wrote = if pending_json_mode {
                            json_builder.push(&SourceOutput::Complete { status_line, success })
                                .map(|s| format!("{s}\n"))
                        } else {
                            Some(format!("{status_line}\n{}\n", if success { "ok" } else { "error" }))
                        };
                        if let Some(text) = wrote {
                            if write_half.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(other) => {
                        if pending_json_mode {
                            json_builder.push(&other);
                        } else if let Some((text, _)) = plain_line_prefix(&other) {
                            if write_half.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = dispatcher_tx.send(DispatcherEvent::SourceClosed { source_id });
}

fn commands_from_json(value: &Json) -> Vec<(String, Vec<String>)> {
    match value {
        Json::Array(items) => items.iter().flat_map(commands_from_json).collect(),
        Json::Object(_) => {
            let action = value.object_member("action").and_then(|v| v.as_str()).map(|s| s.to_string());
            let args = value
                .object_member("args")
                .and_then(Json::as_array)
                .map(|items| items.iter().map(stringify_scalar).collect())
                .unwrap_or_default();
            match action {
                Some(name) => vec![(name, args)],
                None => Vec::new(),
            }
        }
        Json::String(_) => value.as_str().map(|s| vec![(s.to_string(), Vec::new())]).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn stringify_scalar(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::Boolean(b) => b.to_string(),
        Json::Integer(i) => i.to_string(),
        Json::Double(d) => format!("{d}"),
        Json::String(_) => value.as_str().map(|s| s.into_owned()).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Accepts connections on a TCP listener bound per the `-scriptport` bind
/// spec, spawning one session task per connection.
pub async fn run_tcp_listener(
    listener: TcpListener,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    request_cap: usize,
    next_source_id: impl Fn() -> SourceId + Send + Sync + 'static,
) {
    let next_source_id = std::sync::Arc::new(next_source_id);
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let source_id = next_source_id();
                let dispatcher_tx = dispatcher_tx.clone();
                tokio::spawn(async move {
                    run_session(stream, source_id, dispatcher_tx, request_cap).await;
                });
            }
            Err(e) => {
                log::warn!("peer TCP listener: accept failed: {e}");
                break;
            }
        }
    }
}

/// Accepts connections on a Unix domain socket (default `/tmp/x3sck.<pid>`).
#[cfg(unix)]
pub async fn run_unix_listener(
    listener: UnixListener,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    request_cap: usize,
    next_source_id: impl Fn() -> SourceId + Send + Sync + 'static,
) {
    let next_source_id = std::sync::Arc::new(next_source_id);
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let source_id = next_source_id();
                let dispatcher_tx = dispatcher_tx.clone();
                tokio::spawn(async move {
                    run_session(stream, source_id, dispatcher_tx, request_cap).await;
                });
            }
            Err(e) => {
                log::warn!("peer Unix listener: accept failed: {e}");
                break;
            }
        }
    }
}

/// Runs a single peer session over the process's own stdin/stdout, used
/// when no `-scriptport`/`-socket` is configured but a child still needs a
/// control channel (the top-level "no listener" peer mode).
pub async fn run_stdio(
    source_id: SourceId,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    request_cap: usize,
    shutdown: oneshot::Receiver<()>,
) {
    let stdio = StdioStream::new();
    tokio::select! {
        _ = run_session(stdio, source_id, dispatcher_tx, request_cap) => {}
        _ = shutdown => {}
    }
}

/// A minimal duplex wrapper combining stdin/stdout into one `AsyncRead +
/// AsyncWrite` value, since the two are separate types in `tokio::io`.
struct StdioStream {
    stdin: tokio::io::Stdin,
    stdout: tokio::io::Stdout,
}

impl StdioStream {
    fn new() -> Self {
        StdioStream { stdin: tokio::io::stdin(), stdout: tokio::io::stdout() }
    }
}

impl AsyncRead for StdioStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.stdin).poll_read(cx, buf)
    }
}

impl AsyncWrite for StdioStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.stdout).poll_write(cx, buf)
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.stdout).poll_flush(cx)
    }

    fn poll_shutdown(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.stdout).poll_shutdown(cx)
    }
}

/// Default request-buffer cap for peer sessions, mirroring the HTTP parser's.
pub const DEFAULT_PEER_REQUEST_CAP: usize = DEFAULT_REQUEST_CAP;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_native_command() {
        let commands = parse_native_line("Set(monoCase,true)").unwrap();
        assert_eq!(commands, vec![("Set".to_string(), vec!["monoCase".to_string(), "true".to_string()])]);
    }

    #[test]
    fn parses_multiple_commands_on_one_line() {
        let commands = parse_native_line("Clear() Enter()").unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0, "Clear");
        assert_eq!(commands[1].0, "Enter");
    }

    #[test]
    fn parses_quoted_argument_with_comma() {
        let commands = parse_native_line(r#"String("a,b")"#).unwrap();
        assert_eq!(commands[0].1, vec!["a,b".to_string()]);
    }

    #[test]
    fn quoting_wraps_tokens_with_special_characters() {
        assert_eq!(quote_token("plain"), "plain");
        assert_eq!(quote_token("a,b"), "\"a,b\"");
        assert_eq!(quote_token(""), "\"\"");
    }

    #[test]
    fn json_response_builder_accumulates_and_flushes() {
        let mut builder = JsonResponseBuilder::default();
        assert!(builder.push(&SourceOutput::Data("hello".to_string())).is_none());
        let flushed = builder
            .push(&SourceOutput::Complete { status_line: "U U U U N N 2 24 80 0 0 0".to_string(), success: true })
            .unwrap();
        assert!(flushed.contains("\"result\":[\"hello\"]"));
        assert!(flushed.contains("\"success\":true"));
    }

    #[test]
    fn commands_from_json_object_extracts_action_and_args() {
        let value = crate::json::parse(r#"{"action":"Set","args":["monoCase","true"]}"#).unwrap();
        let commands = commands_from_json(&value);
        assert_eq!(commands, vec![("Set".to_string(), vec!["monoCase".to_string(), "true".to_string()])]);
    }
}
