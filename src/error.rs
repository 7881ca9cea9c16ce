//! Structured error types for the x3270 scripting control plane.
//!
//! Mirrors the layering of a top-level error enum over per-subsystem error
//! enums: each subsystem gets its own type with a `Display` impl and a
//! `From` conversion into [`CoreError`], so call sites can use `?` without
//! manual wrapping.

use std::fmt;
use std::error::Error as StdError;
use std::io;

/// Top-level error type for control-plane operations.
#[derive(Debug)]
pub enum CoreError {
    /// JSON parsing/serialization errors.
    Json(JsonError),
    /// Peer protocol framing errors.
    Peer(PeerError),
    /// HTTP/1.1 parsing and routing errors.
    Http(HttpError),
    /// Task dispatcher errors.
    Dispatch(DispatchError),
    /// Child-script launcher errors.
    Launcher(LauncherError),
    /// Configuration errors.
    Config(ConfigError),
    /// Bind-specification parsing errors.
    Bind(BindError),
    /// x3270 session URI parsing errors.
    Uri(UriError),
    /// Cookie file errors.
    Cookie(CookieError),
    /// Underlying I/O error with no more specific classification.
    Io(io::Error),
}

/// JSON engine errors, one variant per `JE_*` code in the original C library.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonError {
    /// Malformed UTF-8 in the input.
    Utf8 { offset: usize },
    /// Input does not conform to RFC 8259 grammar.
    Syntax { offset: usize, line: usize, column: usize, message: String },
    /// Input is a valid prefix of a JSON value but is not yet complete.
    Incomplete { offset: usize },
    /// A number does not fit in i64 or f64.
    Overflow { offset: usize },
    /// Trailing non-whitespace data after a complete top-level value.
    Extra { offset: usize },
}

/// Peer protocol (s3270 line protocol) errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerError {
    /// The native-syntax parser could not tokenize a line.
    NativeSyntax { line: String, reason: String },
    /// A `Cookie(...)` command appeared somewhere other than first on the session.
    CookieNotFirst,
    /// The session sent EOF while a JSON value was still incomplete.
    UnsolicitedEof,
    /// The configured request accumulator exceeded its bound.
    BufferOverflow { limit: usize },
}

/// HTTP/1.1 parsing and routing errors.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpError {
    /// The request line could not be parsed as HTTP at all.
    NotHttp,
    /// The request line or headers were syntactically invalid.
    BadRequest { reason: String },
    /// `Host:` was missing on an HTTP/1.1 request.
    MissingHost,
    /// A header field name was duplicated.
    DuplicateHeader { name: String },
    /// Request exceeded the configured raw-buffer cap.
    RequestTooLarge { limit: usize },
    /// The verb is not recognized at all.
    UnknownVerb,
    /// The verb is recognized but not supported on this path.
    UnsupportedVerb,
    /// No registry entry matches the path.
    NotFound,
    /// The security cookie was absent or did not match.
    Forbidden,
}

/// Task dispatcher errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The named action has no handler and was not registered as pass-through.
    UnknownAction { name: String },
    /// An action handler returned failure.
    ActionFailed { name: String, message: String },
    /// A `ResumeInput`/`Succeed`/`Fail` referenced a tag with no matching pending task.
    NoSuchRequest { tag: String },
    /// The session presented no cookie, or the wrong one, before its first action.
    CookieRequired,
}

/// Child-script launcher errors.
#[derive(Debug, Clone, PartialEq)]
pub enum LauncherError {
    /// The child process could not be spawned.
    SpawnFailed { program: String, reason: String },
    /// A loopback listener could not be bound for the child.
    ListenerBindFailed { reason: String },
    /// The child exited with a non-zero status.
    NonZeroExit { program: String, code: i32 },
    /// The child was killed by a signal.
    KilledBySignal { program: String, signal: i32 },
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A configuration parameter had an invalid value.
    InvalidParameter { parameter: String, value: String, reason: String },
    /// A required configuration parameter was missing.
    MissingRequired { parameter: String },
}

/// Bind-specification parsing errors.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// The spec did not match the `[host]:port` grammar.
    Malformed { spec: String },
    /// The port was out of the 1..=65535 range.
    InvalidPort { spec: String },
    /// The host portion could not be resolved.
    ResolutionFailed { host: String, reason: String },
}

/// x3270 session URI parsing errors.
#[derive(Debug, Clone, PartialEq)]
pub enum UriError {
    /// The scheme was not one of `telnet[s]`/`tn3270[s]`.
    UnknownScheme { scheme: String },
    /// The authority component was malformed.
    BadAuthority { authority: String },
    /// A recognized query key had an invalid value.
    BadQuery { key: String, value: String },
}

/// Cookie file errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieError {
    /// The file contained a character outside the allowed set.
    InvalidCharacter { path: String, character: char },
    /// The token length was not exactly 64 characters.
    WrongLength { path: String, length: usize },
    /// The file could not be read or written.
    Io { path: String, reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Json(e) => write!(f, "JSON error: {e}"),
            CoreError::Peer(e) => write!(f, "peer protocol error: {e}"),
            CoreError::Http(e) => write!(f, "HTTP error: {e}"),
            CoreError::Dispatch(e) => write!(f, "dispatch error: {e}"),
            CoreError::Launcher(e) => write!(f, "launcher error: {e}"),
            CoreError::Config(e) => write!(f, "configuration error: {e}"),
            CoreError::Bind(e) => write!(f, "bind spec error: {e}"),
            CoreError::Uri(e) => write!(f, "URI error: {e}"),
            CoreError::Cookie(e) => write!(f, "cookie file error: {e}"),
            CoreError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonError::Utf8 { offset } => write!(f, "invalid UTF-8 at byte offset {offset}"),
            JsonError::Syntax { offset, line, column, message } =>
                write!(f, "syntax error at {line}:{column} (offset {offset}): {message}"),
            JsonError::Incomplete { offset } => write!(f, "incomplete value, stopped at offset {offset}"),
            JsonError::Overflow { offset } => write!(f, "number overflow at offset {offset}"),
            JsonError::Extra { offset } => write!(f, "trailing data at offset {offset}"),
        }
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::NativeSyntax { line, reason } => write!(f, "cannot parse '{line}': {reason}"),
            PeerError::CookieNotFirst => write!(f, "Cookie() is only valid as the first command of a session"),
            PeerError::UnsolicitedEof => write!(f, "connection closed with an incomplete JSON value pending"),
            PeerError::BufferOverflow { limit } => write!(f, "input line exceeded {limit} bytes"),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::NotHttp => write!(f, "request does not look like HTTP"),
            HttpError::BadRequest { reason } => write!(f, "bad request: {reason}"),
            HttpError::MissingHost => write!(f, "HTTP/1.1 request missing Host header"),
            HttpError::DuplicateHeader { name } => write!(f, "duplicate header field: {name}"),
            HttpError::RequestTooLarge { limit } => write!(f, "request exceeds {limit}-byte cap"),
            HttpError::UnknownVerb => write!(f, "unrecognized HTTP verb"),
            HttpError::UnsupportedVerb => write!(f, "verb not supported on this path"),
            HttpError::NotFound => write!(f, "no registry entry for path"),
            HttpError::Forbidden => write!(f, "missing or incorrect security cookie"),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownAction { name } => write!(f, "unknown action '{name}'"),
            DispatchError::ActionFailed { name, message } => write!(f, "action '{name}' failed: {message}"),
            DispatchError::NoSuchRequest { tag } => write!(f, "no pending request for tag '{tag}'"),
            DispatchError::CookieRequired => write!(f, "session must present its cookie before any action"),
        }
    }
}

impl fmt::Display for LauncherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LauncherError::SpawnFailed { program, reason } => write!(f, "failed to spawn '{program}': {reason}"),
            LauncherError::ListenerBindFailed { reason } => write!(f, "failed to bind child listener: {reason}"),
            LauncherError::NonZeroExit { program, code } => write!(f, "Script '{program}' exited with status {code}"),
            LauncherError::KilledBySignal { program, signal } => write!(f, "Script '{program}' killed by signal {signal}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } =>
                write!(f, "invalid value '{value}' for '{parameter}': {reason}"),
            ConfigError::MissingRequired { parameter } => write!(f, "missing required parameter '{parameter}'"),
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Malformed { spec } => write!(f, "malformed bind spec '{spec}'"),
            BindError::InvalidPort { spec } => write!(f, "port out of range in '{spec}'"),
            BindError::ResolutionFailed { host, reason } => write!(f, "could not resolve '{host}': {reason}"),
        }
    }
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::UnknownScheme { scheme } => write!(f, "unknown scheme '{scheme}'"),
            UriError::BadAuthority { authority } => write!(f, "malformed authority '{authority}'"),
            UriError::BadQuery { key, value } => write!(f, "invalid value '{value}' for query '{key}'"),
        }
    }
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieError::InvalidCharacter { path, character } =>
                write!(f, "'{path}' contains disallowed character '{character}'"),
            CookieError::WrongLength { path, length } =>
                write!(f, "'{path}' token has length {length}, expected 64"),
            CookieError::Io { path, reason } => write!(f, "I/O error on '{path}': {reason}"),
        }
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CoreError::Json(e) => Some(e),
            CoreError::Peer(e) => Some(e),
            CoreError::Http(e) => Some(e),
            CoreError::Dispatch(e) => Some(e),
            CoreError::Launcher(e) => Some(e),
            CoreError::Config(e) => Some(e),
            CoreError::Bind(e) => Some(e),
            CoreError::Uri(e) => Some(e),
            CoreError::Cookie(e) => Some(e),
            CoreError::Io(e) => Some(e),
        }
    }
}

impl StdError for JsonError {}
impl StdError for PeerError {}
impl StdError for HttpError {}
impl StdError for DispatchError {}
impl StdError for LauncherError {}
impl StdError for ConfigError {}
impl StdError for BindError {}
impl StdError for UriError {}
impl StdError for CookieError {}

impl From<JsonError> for CoreError { fn from(e: JsonError) -> Self { CoreError::Json(e) } }
impl From<PeerError> for CoreError { fn from(e: PeerError) -> Self { CoreError::Peer(e) } }
impl From<HttpError> for CoreError { fn from(e: HttpError) -> Self { CoreError::Http(e) } }
impl From<DispatchError> for CoreError { fn from(e: DispatchError) -> Self { CoreError::Dispatch(e) } }
impl From<LauncherError> for CoreError { fn from(e: LauncherError) -> Self { CoreError::Launcher(e) } }
impl From<ConfigError> for CoreError { fn from(e: ConfigError) -> Self { CoreError::Config(e) } }
impl From<BindError> for CoreError { fn from(e: BindError) -> Self { CoreError::Bind(e) } }
impl From<UriError> for CoreError { fn from(e: UriError) -> Self { CoreError::Uri(e) } }
impl From<CookieError> for CoreError { fn from(e: CookieError) -> Self { CoreError::Cookie(e) } }
impl From<io::Error> for CoreError { fn from(e: io::Error) -> Self { CoreError::Io(e) } }

/// Result type alias for control-plane operations.
pub type CoreResult<T> = Result<T, CoreError>;
