//! The embedded HTTP/1.1 server: per-connection sessions, the registry
//! dispatch, and the REST action adapters (§4.4, §4.5).

pub mod registry;
pub mod request;
pub mod response;
pub mod rest;

use crate::constants::{BAD_COOKIE_DELAY_MAX_MS, BAD_COOKIE_DELAY_MIN_MS, HTTP_COOKIE_NAME, HTTP_IDLE_TIMEOUT};
use crate::dispatcher::task::SourceId;
use crate::dispatcher::DispatcherEvent;
use crate::engine::EngineHandle;
use crate::error::HttpError;
use rand::Rng;
use registry::{EntryKind, Registry, ResolvedRoute, VerbMask};
use request::{read_request, HttpMethod, HttpRequest};
use response::{write_response, HttpResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Shared, process-wide HTTP server configuration.
pub struct HttpConfig {
    pub registry: Arc<Registry>,
    pub engine: Arc<dyn EngineHandle>,
    pub required_cookie: Option<String>,
    pub request_cap: usize,
}

static NEXT_HTTP_SOURCE: AtomicU64 = AtomicU64::new(1 << 32);

fn next_http_source_id() -> SourceId {
    SourceId(NEXT_HTTP_SOURCE.fetch_add(1, Ordering::Relaxed))
}

pub async fn run_tcp_listener(
    listener: TcpListener,
    dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>,
    config: Arc<HttpConfig>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let dispatcher_tx = dispatcher_tx.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    run_session(stream, dispatcher_tx, config).await;
                });
            }
            Err(e) => {
                log::warn!("HTTP listener: accept failed: {e}");
                break;
            }
        }
    }
}

pub async fn run_session<S>(stream: S, dispatcher_tx: mpsc::UnboundedSender<DispatcherEvent>, config: Arc<HttpConfig>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let request = match tokio::time::timeout(HTTP_IDLE_TIMEOUT, read_request(&mut reader, config.request_cap)).await {
            Ok(Ok(request)) => request,
            Ok(Err(HttpError::NotHttp)) => {
                // Not HTTP at all (leading whitespace, no request line): reply
                // with the bare status text, no status-line/header framing,
                // so a non-HTTP client isn't misled into thinking it spoke HTTP.
                let _ = write_half.write_all(b"400 Bad Request\n").await;
                let _ = write_half.flush().await;
                break;
            }
            Ok(Err(e)) => {
                let response = map_parse_error(&e);
                let _ = write_response(&mut write_half, &response, false).await;
                break;
            }
            Err(_) => break,
        };

        if let Some(expected) = &config.required_cookie {
            if !cookie_presented_matches(&request, expected) {
                let delay = rand::thread_rng().gen_range(BAD_COOKIE_DELAY_MIN_MS..=BAD_COOKIE_DELAY_MAX_MS);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                let _ = write_response(&mut write_half, &HttpResponse::forbidden().with_close(true), request.method == HttpMethod::Head).await;
                break;
            }
        }

        let close = request.close;
        let is_head = request.method == HttpMethod::Head;
        let response = handle_request(&request, &dispatcher_tx, &config).await.with_close(close);
        if write_response(&mut write_half, &response, is_head).await.is_err() {
            break;
        }
        if close {
            break;
        }
    }
}

fn cookie_presented_matches(request: &HttpRequest, expected: &str) -> bool {
    let Some(header) = request.header("Cookie") else { return false };
    for pair in header.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(&format!("{HTTP_COOKIE_NAME}=")) {
            return crate::cookie::matches(expected, value);
        }
    }
    false
}

fn map_parse_error(error: &HttpError) -> HttpResponse {
    match error {
        HttpError::RequestTooLarge { .. } => HttpResponse::payload_too_large().with_close(true),
        HttpError::UnknownVerb | HttpError::BadRequest { .. } | HttpError::MissingHost | HttpError::DuplicateHeader { .. } => {
            HttpResponse::bad_request(&error.to_string()).with_close(true)
        }
        HttpError::UnsupportedVerb => HttpResponse::not_implemented().with_close(true),
        _ => HttpResponse::bad_request(&error.to_string()).with_close(true),
    }
}

async fn handle_request(
    request: &HttpRequest,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
    config: &Arc<HttpConfig>,
) -> HttpResponse {
    let route = match config.registry.resolve(&request.path) {
        Some(route) => route,
        None => return HttpResponse::not_found(),
    };
    match route {
        ResolvedRoute::DirRedirect(to) => HttpResponse::redirect(to),
        ResolvedRoute::Entry { entry, remainder } => {
            let verb_bit = match request.method {
                HttpMethod::Get => VerbMask::GET,
                HttpMethod::Head => VerbMask::HEAD,
                HttpMethod::Post => VerbMask::POST,
            };
            if !entry.verbs.contains(verb_bit) {
                return HttpResponse::not_implemented();
            }
            match &entry.kind {
                EntryKind::Dir => HttpResponse::html(200, "OK", config.registry.render_dir_listing(&entry.path)),
                EntryKind::FixedText(text) => HttpResponse::new(200, "OK", entry.content_type, text.clone().into_bytes()),
                EntryKind::FixedBinary(bytes) => HttpResponse::new(200, "OK", entry.content_type, bytes.clone()),
                EntryKind::DynTerm => handle_dyn_term(&entry.path, request, dispatcher_tx, config).await,
                EntryKind::DynNonterm => handle_dyn_nonterm(&entry.path, remainder.unwrap_or_default(), dispatcher_tx, config).await,
            }
        }
    }
}

async fn handle_dyn_term(
    path: &str,
    request: &HttpRequest,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
    config: &Arc<HttpConfig>,
) -> HttpResponse {
    match path {
        "/3270/screen.html" => HttpResponse::html(200, "OK", config.engine.screen_as_html()),
        "/3270/interact.html" => render_interact_page(request, dispatcher_tx, config).await,
        "/3270/rest/post" => handle_rest_post(request, dispatcher_tx, config).await,
        _ => HttpResponse::not_found(),
    }
}

async fn render_interact_page(
    request: &HttpRequest,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
    _config: &Arc<HttpConfig>,
) -> HttpResponse {
    let form = "<form method=\"get\"><input name=\"action\" placeholder=\"Query(Cursor)\"/><button type=\"submit\">Run</button></form>";
    match request.query_param("action") {
        None => HttpResponse::html(200, "OK", format!("<html><body>{form}</body></html>")),
        Some(action) => match rest::run_action(action, next_http_source_id(), dispatcher_tx).await {
            Ok(outcome) => HttpResponse::html(200, "OK", format!("<html><body>{form}{}</body></html>", rest::render_html(action, &outcome))),
            Err(e) => HttpResponse::bad_request(&e.to_string()),
        },
    }
}

async fn handle_rest_post(
    request: &HttpRequest,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
    _config: &Arc<HttpConfig>,
) -> HttpResponse {
    let action = String::from_utf8_lossy(&request.body).into_owned();
    let reply_format = request.content_type.as_deref().unwrap_or("text/plain");
    match rest::run_action(action.trim(), next_http_source_id(), dispatcher_tx).await {
        Ok(outcome) => shape_response(reply_format, &action, &outcome),
        Err(e) => HttpResponse::bad_request(&e.to_string()),
    }
}

async fn handle_dyn_nonterm(
    path: &str,
    remainder: String,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
    _config: &Arc<HttpConfig>,
) -> HttpResponse {
    if remainder.is_empty() {
        return HttpResponse::bad_request("missing action");
    }
    let outcome = match rest::run_action(&remainder, next_http_source_id(), dispatcher_tx).await {
        Ok(outcome) => outcome,
        Err(e) => return HttpResponse::bad_request(&e.to_string()),
    };
    match path {
        "/3270/rest/text" => HttpResponse::text(200, "OK", rest::render_text(&outcome)),
        "/3270/rest/stext" => HttpResponse::text(200, "OK", rest::render_stext(&outcome)),
        "/3270/rest/html" => HttpResponse::html(200, "OK", rest::render_html(&remainder, &outcome)),
        "/3270/rest/json" => HttpResponse::json(200, "OK", rest::render_json(&outcome)),
        _ => HttpResponse::not_found(),
    }
}

fn shape_response(content_type: &str, action: &str, outcome: &rest::RestOutcome) -> HttpResponse {
    if content_type.contains("json") {
        HttpResponse::json(200, "OK", rest::render_json(outcome))
    } else if content_type.contains("html") {
        HttpResponse::html(200, "OK", rest::render_html(action, outcome))
    } else {
        HttpResponse::text(200, "OK", rest::render_text(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_parses_named_value() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            path: "/3270".to_string(),
            query: Vec::new(),
            http_1_1: true,
            headers: vec![("Cookie".to_string(), "x3270-security=abc".to_string())],
            content_type: None,
            body: Vec::new(),
            close: false,
        };
        assert!(cookie_presented_matches(&request, "abc"));
        assert!(!cookie_presented_matches(&request, "xyz"));
    }
}
