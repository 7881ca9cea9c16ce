//! REST adapters: translate one decoded action string into a dispatcher
//! call and shape the result for the four REST content types (§4.5).
//!
//! The spec's `to3270(...) -> {COMPLETE, PENDING, INVALID, FAILURE}`
//! interface collapses here to a single `run_action` future: every REST
//! call already runs inside its own Tokio task, so waiting out a PENDING
//! completion is just awaiting the channel rather than registering a
//! separate callback. An action that tries to open an input request (which
//! REST has no transport for) resolves as a failure rather than hanging.

use crate::dispatcher::source::{Capabilities, SourceHandle, SourceOutput};
use crate::dispatcher::task::SourceId;
use crate::dispatcher::DispatcherEvent;
use crate::error::HttpError;
use crate::json::Json;
use crate::peer;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct RestOutcome {
    pub lines: Vec<String>,
    pub errs: Vec<bool>,
    pub status: String,
    pub success: bool,
}

/// Runs one decoded action string (native syntax, e.g. `Query(Cursor)`)
/// against the dispatcher and collects its full result.
pub async fn run_action(
    action_text: &str,
    source_id: SourceId,
    dispatcher_tx: &mpsc::UnboundedSender<DispatcherEvent>,
) -> Result<RestOutcome, HttpError> {
    let commands = peer::parse_native_line(action_text)
        .map_err(|e| HttpError::BadRequest { reason: e.to_string() })?;
    if commands.is_empty() {
        return Err(HttpError::BadRequest { reason: "empty action".to_string() });
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = SourceHandle::new(tx, Capabilities::empty());
    let _ = dispatcher_tx.send(DispatcherEvent::RegisterSource { source_id, handle });
    let _ = dispatcher_tx.send(DispatcherEvent::Commands {
        source_id,
        cause: crate::dispatcher::task::Cause::Http,
        new_queue: true,
        commands,
    });

    let mut lines = Vec::new();
    let mut errs = Vec::new();
    let outcome = loop {
        match rx.recv().await {
            Some(SourceOutput::Data(line)) => {
                lines.push(line);
                errs.push(false);
            }
            Some(SourceOutput::ErrorData(line)) => {
                lines.push(line);
                errs.push(true);
            }
            Some(SourceOutput::InputPrompt { .. }) | Some(SourceOutput::InputPromptNoEcho { .. }) => {
                break Err(HttpError::BadRequest { reason: "action requires interactive input, unsupported over REST".to_string() });
            }
            Some(SourceOutput::PassThrough { .. }) => {
                // Pass-through invocations aren't resolvable from a one-shot
                // REST call; treat as an immediate failure.
                break Err(HttpError::BadRequest { reason: "action invoked a pass-through registration".to_string() });
            }
            Some(SourceOutput::Complete { status_line, success }) => {
                break Ok(RestOutcome { lines: lines.clone(), errs: errs.clone(), status: status_line, success });
            }
            None => break Err(HttpError::BadRequest { reason: "dispatcher closed before completing the action".to_string() }),
        }
    };
    let _ = dispatcher_tx.send(DispatcherEvent::SourceClosed { source_id });
    outcome
}

pub fn render_text(outcome: &RestOutcome) -> String {
    let mut body = outcome.lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    body
}

pub fn render_stext(outcome: &RestOutcome) -> String {
    format!("{}\n\n{}", outcome.status, render_text(outcome))
}

pub fn render_html(action: &str, outcome: &RestOutcome) -> String {
    let mut items = String::new();
    for (line, is_err) in outcome.lines.iter().zip(outcome.errs.iter()) {
        let class = if *is_err { "errd" } else { "data" };
        items.push_str(&format!("<li class=\"{class}\">{}</li>", html_escape(line)));
    }
    format!(
        "<html><body><h1>{}</h1><ul>{}</ul><p>status: {}</p><p>success: {}</p></body></html>",
        html_escape(action),
        items,
        html_escape(&outcome.status),
        outcome.success,
    )
}

pub fn render_json(outcome: &RestOutcome) -> String {
    let mut obj = Json::new_object();
    obj.object_set("result", Json::Array(outcome.lines.iter().cloned().map(Json::string).collect()));
    obj.object_set("result-err", Json::Array(outcome.errs.iter().copied().map(Json::Boolean).collect()));
    obj.object_set("status", Json::string(outcome.status.clone()));
    obj.object_set("success", Json::Boolean(outcome.success));
    crate::json::write_oneline(&obj)
}

pub fn error_envelope_text(message: &str) -> String {
    format!("{message}\n")
}

pub fn error_envelope_html(status: u16, reason: &str) -> String {
    format!("<html><body><h1>{status} {reason}</h1></body></html>")
}

pub fn error_envelope_json(message: &str, status_line: &str) -> String {
    let mut obj = Json::new_object();
    obj.object_set("result", Json::Array(vec![Json::string(message.to_string())]));
    obj.object_set("result-err", Json::Array(vec![Json::Boolean(true)]));
    obj.object_set("status", Json::string(status_line.to_string()));
    obj.object_set("success", Json::Boolean(false));
    crate::json::write_oneline(&obj)
}

fn html_escape(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_outcome() -> RestOutcome {
        RestOutcome {
            lines: vec!["0 0".to_string()],
            errs: vec![false],
            status: "U U U U N N 2 24 80 0 0 0".to_string(),
            success: true,
        }
    }

    #[test]
    fn render_text_joins_lines_with_trailing_newline() {
        assert_eq!(render_text(&sample_outcome()), "0 0\n");
    }

    #[test]
    fn render_stext_prefixes_status_line() {
        let rendered = render_stext(&sample_outcome());
        assert!(rendered.starts_with("U U U U N N 2 24 80 0 0 0\n\n"));
    }

    #[test]
    fn render_json_contains_expected_fields() {
        let rendered = render_json(&sample_outcome());
        assert!(rendered.contains("\"result\":[\"0 0\"]"));
        assert!(rendered.contains("\"success\":true"));
    }

    #[test]
    fn render_html_escapes_special_characters() {
        let mut outcome = sample_outcome();
        outcome.lines = vec!["<script>".to_string()];
        outcome.errs = vec![false];
        let rendered = render_html("Query(Cursor)", &outcome);
        assert!(rendered.contains("&lt;script&gt;"));
    }
}
