//! The injectable seam standing in for the out-of-scope TN3270/5250 screen
//! engine. The dispatcher, peer protocol, HTTP server, and launcher are all
//! built against `dyn EngineHandle` so they can be exercised without a real
//! terminal engine; [`StubEngine`] backs tests and the REST/HTML demo paths.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// One field of the 12-field status line (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub keyboard_locked: bool,
    pub formatted_3270: bool,
    pub field_protected: bool,
    pub connection_state: ConnectionState,
    pub emulator_mode: EmulatorMode,
    pub model_number: u8,
    pub rows: u16,
    pub columns: u16,
    pub cursor_row: u16,
    pub cursor_col: u16,
    pub window_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Resolving,
    Connected,
    TlsHandshake,
}

impl ConnectionState {
    fn as_field(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "N",
            ConnectionState::Resolving => "R",
            ConnectionState::Connected => "C",
            ConnectionState::TlsHandshake => "T",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorMode {
    NotConnected,
    Ansi,
    Tn3270,
    Tn3270E,
}

impl EmulatorMode {
    fn as_field(&self) -> &'static str {
        match self {
            EmulatorMode::NotConnected => "N",
            EmulatorMode::Ansi => "A",
            EmulatorMode::Tn3270 => "I",
            EmulatorMode::Tn3270E => "E",
        }
    }
}

impl fmt::Display for StatusLine {
    /// Renders the fixed 12-field, whitespace-separated status line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            if self.keyboard_locked { "L" } else { "U" },
            if self.formatted_3270 { "F" } else { "U" },
            if self.formatted_3270 { "F" } else { "U" },
            if self.field_protected { "P" } else { "U" },
            self.connection_state.as_field(),
            self.emulator_mode.as_field(),
            self.model_number,
            self.rows,
            self.columns,
            self.cursor_row,
            self.cursor_col,
            self.window_id,
        )
    }
}

/// Failure returned by an engine action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineActionError {
    pub message: String,
}

impl fmt::Display for EngineActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EngineActionError {}

impl EngineActionError {
    pub fn new(message: impl Into<String>) -> Self {
        EngineActionError { message: message.into() }
    }
}

/// The engine-facing seam. A real terminal engine would implement this trait
/// directly; [`StubEngine`] is the in-tree implementation used for tests and
/// for the REST/HTML demo paths that need *some* backing behavior.
pub trait EngineHandle: Send + Sync {
    /// Runs a built-in engine action (e.g. `Query(...)`) and returns its
    /// textual result, or an error if the action name or arguments are invalid.
    fn run_action(&self, name: &str, args: &[String]) -> Result<String, EngineActionError>;

    /// Synthesizes the current 12-field status line.
    fn status_line(&self) -> StatusLine;

    /// Disables keyboard input, called when a `Script()` task takes the lock.
    fn disable_keyboard(&self);

    /// Re-enables keyboard input.
    fn enable_keyboard(&self);

    /// Renders the current screen as an HTML fragment for `/3270/screen.html`.
    fn screen_as_html(&self) -> String;
}

/// A minimal, deterministic `EngineHandle` with no real terminal behind it.
/// `Query(...)` answers a small fixed set of introspection keywords, matching
/// x3270's built-in `Query` action closely enough to exercise the REST/peer
/// surfaces end to end.
pub struct StubEngine {
    keyboard_locked: AtomicBool,
    window_id: AtomicU32,
}

impl Default for StubEngine {
    fn default() -> Self {
        StubEngine { keyboard_locked: AtomicBool::new(false), window_id: AtomicU32::new(1) }
    }
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EngineHandle for StubEngine {
    fn run_action(&self, name: &str, args: &[String]) -> Result<String, EngineActionError> {
        match name {
            "Query" => {
                let keyword = args.first().map(String::as_str).unwrap_or("");
                match keyword {
                    "" | "All" => Ok("x3270sh stub engine".to_string()),
                    "Cursor" => Ok("0 0".to_string()),
                    "Host" => Ok(String::new()),
                    "LocalEncoding" => Ok("UTF-8".to_string()),
                    "ScreenCurSize" => Ok("24 80".to_string()),
                    "ScreenDepth" => Ok("4".to_string()),
                    other => Err(EngineActionError::new(format!("unknown Query keyword '{other}'"))),
                }
            }
            other => Err(EngineActionError::new(format!("unsupported engine action '{other}'"))),
        }
    }

    fn status_line(&self) -> StatusLine {
        StatusLine {
            keyboard_locked: self.keyboard_locked.load(Ordering::Relaxed),
            formatted_3270: false,
            field_protected: false,
            connection_state: ConnectionState::NotConnected,
            emulator_mode: EmulatorMode::NotConnected,
            model_number: 2,
            rows: 24,
            columns: 80,
            cursor_row: 0,
            cursor_col: 0,
            window_id: self.window_id.load(Ordering::Relaxed) as u64,
        }
    }

    fn disable_keyboard(&self) {
        self.keyboard_locked.store(true, Ordering::Relaxed);
    }

    fn enable_keyboard(&self) {
        self.keyboard_locked.store(false, Ordering::Relaxed);
    }

    fn screen_as_html(&self) -> String {
        "<pre class=\"x3270-screen\"></pre>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_has_twelve_fields() {
        let engine = StubEngine::new();
        let line = engine.status_line().to_string();
        assert_eq!(line.split(' ').count(), 12);
    }

    #[test]
    fn keyboard_lock_reflects_in_status_line() {
        let engine = StubEngine::new();
        assert!(!engine.status_line().keyboard_locked);
        engine.disable_keyboard();
        assert!(engine.status_line().keyboard_locked);
        engine.enable_keyboard();
        assert!(!engine.status_line().keyboard_locked);
    }

    #[test]
    fn query_cursor_returns_row_and_column() {
        let engine = StubEngine::new();
        let result = engine.run_action("Query", &["Cursor".to_string()]).unwrap();
        assert_eq!(result, "0 0");
    }

    #[test]
    fn unknown_action_is_an_error() {
        let engine = StubEngine::new();
        assert!(engine.run_action("Frobnicate", &[]).is_err());
    }
}
