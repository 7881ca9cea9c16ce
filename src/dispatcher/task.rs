//! Task and queue primitives. A [`Task`] is one unit of work contributed by
//! a source (peer session, HTTP session, or the launcher); tasks live on a
//! [`TaskQueue`] and queues form a stack (§3, §4.1).

use crate::engine::StatusLine;
use std::collections::VecDeque;

/// Monotonically increasing task identifier. Replaces the intrusive
/// linked-list node the original C dispatcher threads through every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Monotonically increasing queue identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub u64);

/// Monotonically increasing source identifier (a peer session, HTTP
/// session, or launcher-owned child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// What originated a task, matching the teacher's cause enumeration for
/// tracing but trimmed to what this control plane actually dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    Peer,
    Http,
    Script,
    Command,
    Idle,
}

/// An input request a task is currently blocked on (§4.1 "Input requests").
#[derive(Debug, Clone)]
pub struct PendingInput {
    pub prompt: String,
    pub echo: bool,
}

/// A pass-through invocation awaiting `Succeed`/`Fail` from the registering
/// script (§4.1 "Pass-through actions").
#[derive(Debug, Clone)]
pub struct PendingPassThrough {
    pub p_tag: String,
    pub registering_source: SourceId,
}

/// One unit of work on the dispatcher's stack.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub source_id: SourceId,
    pub queue_id: QueueId,
    pub cause: Cause,
    pub result_lines: Vec<(String, bool)>,
    pub pending_input: Option<PendingInput>,
    pub pending_pass_through: Option<PendingPassThrough>,
    pub holds_keyboard_lock: bool,
}

impl Task {
    pub fn new(id: TaskId, source_id: SourceId, queue_id: QueueId, cause: Cause) -> Self {
        Task {
            id,
            source_id,
            queue_id,
            cause,
            result_lines: Vec::new(),
            pending_input: None,
            pending_pass_through: None,
            holds_keyboard_lock: false,
        }
    }

    pub fn push_output(&mut self, line: impl Into<String>, success: bool) {
        self.result_lines.push((line.into(), success));
    }

    pub fn is_suspended(&self) -> bool {
        self.pending_input.is_some() || self.pending_pass_through.is_some()
    }
}

/// A FIFO queue of tasks for a single source. Queues form a stack: a new
/// queue (`NEW_TASKQ`) is pushed so a nested invocation (e.g. a macro run
/// from a script) drains completely before its parent queue resumes.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pub id_seed: u64,
    pub tasks: VecDeque<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue::default()
    }

    pub fn front(&self) -> Option<TaskId> {
        self.tasks.front().copied()
    }

    pub fn push_back(&mut self, task_id: TaskId) {
        self.tasks.push_back(task_id);
    }

    pub fn pop_front(&mut self) -> Option<TaskId> {
        self.tasks.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Renders a plain-mode response: the task's accumulated output lines (with
/// `data:`/`errd:` prefixes already applied by the caller), the status
/// line, and a final `ok`/`error` trailer.
pub fn render_plain_trailer(status: &StatusLine, success: bool) -> String {
    format!("{status}\n{}", if success { "ok" } else { "error" })
}
