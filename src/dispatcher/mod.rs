//! The task dispatcher: a single-threaded, cooperative event loop that owns
//! all mutable control-plane state and serializes every action against the
//! emulator engine (§4.1, §5).
//!
//! The dispatcher itself never touches a socket. Every source (a peer
//! session, an HTTP session, the launcher) only ever talks to it through an
//! `mpsc::UnboundedSender<DispatcherEvent>`; the dispatcher talks back to a
//! source only through the `SourceHandle` it was registered with. This is
//! the async equivalent of the teacher's "one thread owns engine state,
//! everyone else posts to a channel" pattern in `network.rs`.

pub mod actions;
pub mod queue;
pub mod source;
pub mod task;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::error::DispatchError;
use actions::ActionOutcome;
use queue::QueueStack;
use source::{Capabilities, SourceHandle, SourceOutput};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use task::{Cause, PendingInput, PendingPassThrough, QueueId, SourceId, Task, TaskId};
use tokio::sync::mpsc;

/// A request to spawn a child script, handed off to the launcher.
#[derive(Debug, Clone)]
pub struct LauncherRequest {
    pub task_id: TaskId,
    pub program: String,
    pub args: Vec<String>,
    pub r#async: bool,
    pub no_lock: bool,
    pub single: bool,
}

/// Everything the dispatcher can be told from the outside.
pub enum DispatcherEvent {
    /// A new source came online and should be routed output via `handle`.
    RegisterSource { source_id: SourceId, handle: SourceHandle },
    /// A source disappeared; abort anything it has pending.
    SourceClosed { source_id: SourceId },
    /// One or more commands to run, in order, on behalf of `source_id`.
    Commands { source_id: SourceId, cause: Cause, new_queue: bool, commands: Vec<(String, Vec<String>)> },
    /// A previously dispatched `Script()` child has exited.
    ChildExited { task_id: TaskId, success: bool, message: String },
    /// One line of stdout/stderr captured from a running child, forwarded
    /// to the originating source immediately rather than buffered until exit.
    ChildOutputLine { task_id: TaskId, line: String, is_stderr: bool },
}

/// Owns all control-plane state. Created once and driven by [`run`] inside a
/// single Tokio task.
pub struct Dispatcher {
    pub config: Config,
    pub engine: Arc<dyn EngineHandle>,
    pub required_cookie: Option<String>,

    next_task_id: u64,
    pub tasks: HashMap<TaskId, Task>,
    queues: QueueStack,
    sources: HashMap<SourceId, SourceHandle>,

    pub sources_seen_first_command: HashSet<SourceId>,
    pub authenticated_sources: HashSet<SourceId>,
    pub source_capabilities: HashMap<SourceId, Capabilities>,

    pub pass_through_registry: HashMap<String, SourceId>,
    pub pending_pass_throughs: HashMap<String, TaskId>,
    pub pending_inputs: HashMap<SourceId, TaskId>,
    next_p_tag: u64,

    launcher_tx: Option<mpsc::UnboundedSender<LauncherRequest>>,

    pub shutdown_requested: bool,
}

impl Dispatcher {
    pub fn new(config: Config, engine: Arc<dyn EngineHandle>, required_cookie: Option<String>) -> Self {
        Dispatcher {
            config,
            engine,
            required_cookie,
            next_task_id: 0,
            tasks: HashMap::new(),
            queues: QueueStack::new(),
            sources: HashMap::new(),
            sources_seen_first_command: HashSet::new(),
            authenticated_sources: HashSet::new(),
            source_capabilities: HashMap::new(),
            pass_through_registry: HashMap::new(),
            pending_pass_throughs: HashMap::new(),
            pending_inputs: HashMap::new(),
            next_p_tag: 0,
            launcher_tx: None,
            shutdown_requested: false,
        }
    }

    pub fn set_launcher_sender(&mut self, tx: mpsc::UnboundedSender<LauncherRequest>) {
        self.launcher_tx = Some(tx);
    }

    fn capabilities_of(&self, source_id: SourceId) -> Capabilities {
        self.source_capabilities.get(&source_id).copied().unwrap_or_default()
    }

    fn handle_for(&self, source_id: SourceId) -> Option<&SourceHandle> {
        self.sources.get(&source_id)
    }

    fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    fn allocate_p_tag(&mut self) -> String {
        let tag = format!("p{}", self.next_p_tag);
        self.next_p_tag += 1;
        tag
    }

    fn queue_for(&mut self, new_queue: bool) -> QueueId {
        if new_queue {
            self.queues.push_new_queue()
        } else {
            self.queues.current_queue()
        }
    }

    /// Runs one command to completion or suspension against a freshly
    /// allocated task, and returns that task's id.
    fn dispatch_command(
        &mut self,
        source_id: SourceId,
        cause: Cause,
        queue_id: QueueId,
        name: String,
        args: Vec<String>,
    ) -> TaskId {
        let task_id = self.allocate_task_id();
        let task = Task::new(task_id, source_id, queue_id, cause);
        self.tasks.insert(task_id, task);
        self.queues.enqueue(queue_id, task_id);

        if name != "Cookie" && self.required_cookie.is_some() && !self.authenticated_sources.contains(&source_id) {
            self.finish_task(task_id, vec![DispatchError::CookieRequired.to_string()], false);
            return task_id;
        }

        if let Some(registering_source) = self.pass_through_registry.get(&name).copied() {
            let p_tag = self.allocate_p_tag();
            self.pending_pass_throughs.insert(p_tag.clone(), task_id);
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.pending_pass_through =
                    Some(PendingPassThrough { p_tag: p_tag.clone(), registering_source });
            }
            if let Some(handle) = self.handle_for(registering_source) {
                handle.send(SourceOutput::PassThrough { action: name, p_tag, args });
            }
            return task_id;
        }

        if name == "Script" {
            self.dispatch_script(task_id, args);
            return task_id;
        }

        let outcome = match actions::lookup(&name) {
            Some(handler) => handler(self, task_id, &args),
            None => Err(DispatchError::UnknownAction { name: name.clone() }),
        };

        match outcome {
            Ok(ActionOutcome::Complete { lines, success }) => {
                self.finish_task(task_id, lines, success);
            }
            Ok(ActionOutcome::PassThrough { .. }) | Ok(ActionOutcome::AwaitingInput) => {
                // Handlers that suspend register their own pending state
                // (e.g. ResumeInput bookkeeping); nothing further to do here.
            }
            Err(e) => {
                self.finish_task(task_id, vec![e.to_string()], false);
            }
        }

        task_id
    }

    fn dispatch_script(&mut self, task_id: TaskId, args: Vec<String>) {
        let mut program = None;
        let mut program_args = Vec::new();
        let mut r#async = false;
        let mut no_lock = false;
        let mut single = false;
        for arg in args {
            match arg.as_str() {
                "-Async" => r#async = true,
                "-NoLock" => no_lock = true,
                "-Single" => single = true,
                "-NoStdoutRedirect" | "-Interactive" => {}
                "-ShareConsole" => log::warn!("Script: -ShareConsole is Windows-only, ignoring"),
                other if program.is_none() => program = Some(other.to_string()),
                other => program_args.push(other.to_string()),
            }
        }
        let Some(program) = program else {
            self.finish_task(task_id, vec!["Script requires a program name".to_string()], false);
            return;
        };

        if !no_lock {
            self.engine.disable_keyboard();
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.holds_keyboard_lock = true;
            }
        }

        match &self.launcher_tx {
            Some(tx) => {
                let _ = tx.send(LauncherRequest {
                    task_id,
                    program,
                    args: program_args,
                    r#async,
                    no_lock,
                    single,
                });
                if r#async {
                    // -Async returns immediately; the eventual exit is
                    // reported out-of-band via ChildExited.
                    self.finish_task(task_id, Vec::new(), true);
                }
            }
            None => {
                self.finish_task(task_id, vec!["no launcher configured".to_string()], false);
            }
        }
    }

    /// Completes a task: emits its output lines, status line, and trailer to
    /// its originating source, then removes it from its queue.
    fn finish_task(&mut self, task_id: TaskId, lines: Vec<String>, success: bool) {
        let Some(task) = self.tasks.remove(&task_id) else { return };
        if task.holds_keyboard_lock {
            self.engine.enable_keyboard();
        }
        let capabilities = self.capabilities_of(task.source_id);
        if let Some(handle) = self.handle_for(task.source_id) {
            for line in lines {
                if !success && capabilities.contains(Capabilities::ERRD) {
                    handle.send(SourceOutput::ErrorData(line));
                } else {
                    handle.send(SourceOutput::Data(line));
                }
            }
            let status_line = self.engine.status_line().to_string();
            handle.send(SourceOutput::Complete { status_line, success });
        }
        self.queues.complete_front(task.queue_id);
    }

    pub fn resume_pass_through(&mut self, task_id: TaskId, text: String, success: bool) {
        let lines = if text.is_empty() { Vec::new() } else { vec![text] };
        self.finish_task(task_id, lines, success);
    }

    pub fn resume_input(&mut self, task_id: TaskId, data: String) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.pending_input = None;
        }
        self.finish_task(task_id, vec![data], true);
    }

    pub fn abort_input(&mut self, task_id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.pending_input = None;
        }
        self.finish_task(task_id, Vec::new(), false);
    }

    fn handle_event(&mut self, event: DispatcherEvent) {
        match event {
            DispatcherEvent::RegisterSource { source_id, handle } => {
                self.source_capabilities.insert(source_id, handle.capabilities);
                self.sources.insert(source_id, handle);
            }
            DispatcherEvent::SourceClosed { source_id } => {
                self.pass_through_registry.retain(|_, sid| *sid != source_id);
                if let Some(task_id) = self.pending_inputs.remove(&source_id) {
                    self.abort_input(task_id);
                }
                self.sources.remove(&source_id);
                self.source_capabilities.remove(&source_id);
                self.authenticated_sources.remove(&source_id);
                self.sources_seen_first_command.remove(&source_id);
            }
            DispatcherEvent::Commands { source_id, cause, new_queue, commands } => {
                let queue_id = self.queue_for(new_queue);
                for (name, args) in commands {
                    self.dispatch_command(source_id, cause, queue_id, name, args);
                }
            }
            DispatcherEvent::ChildExited { task_id, success, message } => {
                let lines = if message.is_empty() { Vec::new() } else { vec![message] };
                if self.tasks.contains_key(&task_id) {
                    self.finish_task(task_id, lines, success);
                }
            }
            DispatcherEvent::ChildOutputLine { task_id, line, is_stderr } => {
                if let Some(task) = self.tasks.get(&task_id) {
                    let capabilities = self.capabilities_of(task.source_id);
                    if let Some(handle) = self.handle_for(task.source_id) {
                        if is_stderr && capabilities.contains(Capabilities::ERRD) {
                            handle.send(SourceOutput::ErrorData(line));
                        } else {
                            handle.send(SourceOutput::Data(line));
                        }
                    }
                }
            }
        }
    }
}

/// Drives the dispatcher's event loop until a `Quit`/`Exit` action sets
/// `shutdown_requested`, or the channel closes (all sources gone).
pub async fn run(mut dispatcher: Dispatcher, mut events: mpsc::UnboundedReceiver<DispatcherEvent>) {
    while let Some(event) = events.recv().await {
        dispatcher.handle_event(event);
        if dispatcher.shutdown_requested {
            log::info!("dispatcher: shutdown requested, draining remaining events");
            events.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;

    fn make_dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<SourceOutput>, SourceId) {
        let mut dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), None);
        let (tx, rx) = mpsc::unbounded_channel();
        let source_id = SourceId(1);
        dispatcher.handle_event(DispatcherEvent::RegisterSource {
            source_id,
            handle: SourceHandle::new(tx, Capabilities::empty()),
        });
        (dispatcher, rx, source_id)
    }

    #[test]
    fn query_action_completes_with_engine_result() {
        let (mut dispatcher, mut rx, source_id) = make_dispatcher();
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Query".to_string(), vec!["Cursor".to_string()])],
        });
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, SourceOutput::Data(ref s) if s == "0 0"));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, SourceOutput::Complete { success: true, .. }));
    }

    #[test]
    fn unknown_action_fails() {
        let (mut dispatcher, mut rx, source_id) = make_dispatcher();
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Bogus".to_string(), vec![])],
        });
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, SourceOutput::Data(_)));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, SourceOutput::Complete { success: false, .. }));
    }

    #[test]
    fn pass_through_round_trip() {
        let (mut dispatcher, mut rx, source_id) = make_dispatcher();
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Register".to_string(), vec!["Widget".to_string()])],
        });
        // Consume the Register() completion.
        let _ = rx.try_recv();
        let _ = rx.try_recv();

        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Widget".to_string(), vec!["hello".to_string()])],
        });
        let passthru = rx.try_recv().unwrap();
        let p_tag = match passthru {
            SourceOutput::PassThrough { p_tag, args, .. } => {
                assert_eq!(args, vec!["hello".to_string()]);
                p_tag
            }
            other => panic!("expected pass-through, got {other:?}"),
        };

        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Succeed".to_string(), vec![p_tag, "done".to_string()])],
        });
        // Succeed()'s own completion, then the resumed Widget() completion.
        let _ = rx.try_recv();
        let _ = rx.try_recv();
        let widget_output = rx.try_recv().unwrap();
        assert!(matches!(widget_output, SourceOutput::Data(ref s) if s == "done"));
    }

    #[test]
    fn action_before_cookie_is_rejected_when_cookie_required() {
        let mut dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), Some("secret".to_string()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source_id = SourceId(1);
        dispatcher.handle_event(DispatcherEvent::RegisterSource {
            source_id,
            handle: SourceHandle::new(tx, Capabilities::empty()),
        });
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Query".to_string(), vec!["Cursor".to_string()])],
        });
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, SourceOutput::Data(_)));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, SourceOutput::Complete { success: false, .. }));
    }

    #[test]
    fn action_after_valid_cookie_succeeds_when_cookie_required() {
        let mut dispatcher = Dispatcher::new(Config::new(), Arc::new(StubEngine::new()), Some("secret".to_string()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source_id = SourceId(1);
        dispatcher.handle_event(DispatcherEvent::RegisterSource {
            source_id,
            handle: SourceHandle::new(tx, Capabilities::empty()),
        });
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Cookie".to_string(), vec!["secret".to_string()])],
        });
        let cookie_complete = rx.try_recv().unwrap();
        assert!(matches!(cookie_complete, SourceOutput::Complete { success: true, .. }));

        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Query".to_string(), vec!["Cursor".to_string()])],
        });
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, SourceOutput::Data(_)));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, SourceOutput::Complete { success: true, .. }));
    }

    #[test]
    fn cookie_rejects_second_occurrence() {
        let (mut dispatcher, mut rx, source_id) = make_dispatcher();
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Cookie".to_string(), vec!["x".to_string()])],
        });
        let _ = rx.try_recv();
        let _ = rx.try_recv();
        dispatcher.handle_event(DispatcherEvent::Commands {
            source_id,
            cause: Cause::Peer,
            new_queue: false,
            commands: vec![("Cookie".to_string(), vec!["y".to_string()])],
        });
        let _ = rx.try_recv();
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, SourceOutput::Complete { success: false, .. }));
    }
}
