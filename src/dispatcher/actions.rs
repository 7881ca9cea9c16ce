//! Built-in action handlers: `Set`, `Query`, `Cookie`, `Capabilities`,
//! `Register`, `Succeed`, `Fail`, `ResumeInput`, `Quit`, `Exit`.
//!
//! `Script` is handled directly in [`super::Dispatcher`] rather than here,
//! since spawning a child is inherently asynchronous (§4.6), unlike the rest
//! of this table which completes synchronously against in-memory state.

use crate::config::ConfigValue;
use crate::dispatcher::task::TaskId;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// What running one built-in action produced.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The action ran to completion; these lines become the task's result.
    Complete { lines: Vec<String>, success: bool },
    /// The action registered a pass-through invocation and suspended the task.
    PassThrough { p_tag: String },
    /// The action is waiting on an input request.
    AwaitingInput,
}

type ActionHandler = fn(&mut Dispatcher, TaskId, &[String]) -> Result<ActionOutcome, DispatchError>;

/// Looks up a built-in handler by action name.
pub fn lookup(name: &str) -> Option<ActionHandler> {
    match name {
        "Set" => Some(action_set),
        "Query" => Some(action_query),
        "Cookie" => Some(action_cookie),
        "Capabilities" => Some(action_capabilities),
        "Register" => Some(action_register),
        "Succeed" => Some(action_succeed),
        "Fail" => Some(action_fail),
        "ResumeInput" => Some(action_resume_input),
        "Quit" => Some(action_quit),
        "Exit" => Some(action_quit),
        _ => None,
    }
}

fn action_set(dispatcher: &mut Dispatcher, _task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    let name = args.first().ok_or_else(|| DispatchError::ActionFailed {
        name: "Set".to_string(),
        message: "Set requires a property name".to_string(),
    })?;
    match args.get(1) {
        None => {
            let value = dispatcher
                .config
                .get(name)
                .map(display_config_value)
                .unwrap_or_default();
            Ok(ActionOutcome::Complete { lines: vec![value], success: true })
        }
        Some(value) => {
            dispatcher.config.set(name, coerce_config_value(value));
            Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
        }
    }
}

fn display_config_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::String(s) => s.clone(),
        ConfigValue::Integer(i) => i.to_string(),
        ConfigValue::Boolean(b) => b.to_string(),
    }
}

fn coerce_config_value(raw: &str) -> ConfigValue {
    if let Ok(i) = raw.parse::<i64>() {
        ConfigValue::Integer(i)
    } else if raw == "true" || raw == "false" {
        ConfigValue::Boolean(raw == "true")
    } else {
        ConfigValue::String(raw.to_string())
    }
}

fn action_query(dispatcher: &mut Dispatcher, _task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    dispatcher
        .engine
        .run_action("Query", args)
        .map(|result| ActionOutcome::Complete { lines: vec![result], success: true })
        .map_err(|e| DispatchError::ActionFailed { name: "Query".to_string(), message: e.to_string() })
}

fn action_cookie(dispatcher: &mut Dispatcher, task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    let task_ref = dispatcher.tasks.get(&task).ok_or_else(|| DispatchError::ActionFailed {
        name: "Cookie".to_string(),
        message: "no such task".to_string(),
    })?;
    let source_id = task_ref.source_id;

    if dispatcher.sources_seen_first_command.contains(&source_id) {
        return Err(DispatchError::ActionFailed {
            name: "Cookie".to_string(),
            message: "Cookie() is only valid as the first command of a session".to_string(),
        });
    }
    dispatcher.sources_seen_first_command.insert(source_id);

    let presented = args.first().map(String::as_str).unwrap_or("");
    match &dispatcher.required_cookie {
        Some(expected) if crate::cookie::matches(expected, presented) => {
            dispatcher.authenticated_sources.insert(source_id);
            Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
        }
        Some(_) => Err(DispatchError::CookieRequired),
        None => {
            dispatcher.authenticated_sources.insert(source_id);
            Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
        }
    }
}

fn action_capabilities(
    dispatcher: &mut Dispatcher,
    task: TaskId,
    args: &[String],
) -> Result<ActionOutcome, DispatchError> {
    let source_id = dispatcher
        .tasks
        .get(&task)
        .ok_or_else(|| DispatchError::ActionFailed {
            name: "Capabilities".to_string(),
            message: "no such task".to_string(),
        })?
        .source_id;

    let mut capabilities = crate::dispatcher::source::Capabilities::empty();
    for keyword in args {
        match keyword.as_str() {
            "interactive" => capabilities |= crate::dispatcher::source::Capabilities::INTERACTIVE,
            "errd" => capabilities |= crate::dispatcher::source::Capabilities::ERRD,
            "pwinput" => capabilities |= crate::dispatcher::source::Capabilities::PWINPUT,
            other => {
                return Err(DispatchError::ActionFailed {
                    name: "Capabilities".to_string(),
                    message: format!("unknown capability '{other}'"),
                })
            }
        }
    }
    dispatcher.source_capabilities.insert(source_id, capabilities);
    Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
}

fn action_register(dispatcher: &mut Dispatcher, task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    let name = args.first().ok_or_else(|| DispatchError::ActionFailed {
        name: "Register".to_string(),
        message: "Register requires an action name".to_string(),
    })?;
    let source_id = dispatcher
        .tasks
        .get(&task)
        .ok_or_else(|| DispatchError::ActionFailed {
            name: "Register".to_string(),
            message: "no such task".to_string(),
        })?
        .source_id;
    dispatcher.pass_through_registry.insert(name.clone(), source_id);
    Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
}

fn action_succeed(dispatcher: &mut Dispatcher, _task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    resolve_pass_through(dispatcher, args, true)
}

fn action_fail(dispatcher: &mut Dispatcher, _task: TaskId, args: &[String]) -> Result<ActionOutcome, DispatchError> {
    resolve_pass_through(dispatcher, args, false)
}

fn resolve_pass_through(
    dispatcher: &mut Dispatcher,
    args: &[String],
    success: bool,
) -> Result<ActionOutcome, DispatchError> {
    let action_name = if success { "Succeed" } else { "Fail" };
    let p_tag = args.first().ok_or_else(|| DispatchError::ActionFailed {
        name: action_name.to_string(),
        message: "missing p-tag".to_string(),
    })?;
    let text = args.get(1).cloned().unwrap_or_default();
    let waiting_task = dispatcher
        .pending_pass_throughs
        .remove(p_tag)
        .ok_or_else(|| DispatchError::NoSuchRequest { tag: p_tag.clone() })?;
    dispatcher.resume_pass_through(waiting_task, text, success);
    Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
}

fn action_resume_input(
    dispatcher: &mut Dispatcher,
    task: TaskId,
    args: &[String],
) -> Result<ActionOutcome, DispatchError> {
    let source_id = dispatcher
        .tasks
        .get(&task)
        .ok_or_else(|| DispatchError::ActionFailed {
            name: "ResumeInput".to_string(),
            message: "no such task".to_string(),
        })?
        .source_id;
    let waiting_task = dispatcher.pending_inputs.remove(&source_id).ok_or_else(|| DispatchError::ActionFailed {
        name: "ResumeInput".to_string(),
        message: "no input request is pending on this session".to_string(),
    })?;
    let raw = args.first().map(String::as_str).unwrap_or("");
    if raw == "-Abort" {
        dispatcher.abort_input(waiting_task);
    } else {
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, raw)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default();
        dispatcher.resume_input(waiting_task, decoded);
    }
    Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
}

fn action_quit(dispatcher: &mut Dispatcher, _task: TaskId, _args: &[String]) -> Result<ActionOutcome, DispatchError> {
    dispatcher.shutdown_requested = true;
    Ok(ActionOutcome::Complete { lines: Vec::new(), success: true })
}
