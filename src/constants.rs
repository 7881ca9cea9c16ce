//! Shared constants for the control plane.

/// Default raw-request buffer cap for both the peer framer's line accumulator
/// and the HTTP parser, in bytes.
pub const DEFAULT_REQUEST_CAP: usize = 8192;

/// Header name under which the security cookie is presented on HTTP requests.
pub const HTTP_COOKIE_NAME: &str = "x3270-security";

/// Length, in characters, of a generated or accepted cookie token.
pub const COOKIE_TOKEN_LENGTH: usize = 64;

/// Characters allowed in a cookie token.
pub const COOKIE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.";

/// Characters that must never appear in a cookie file, even though they sit
/// outside `COOKIE_ALPHABET` anyway; kept distinct so the validator can give
/// a precise reason.
pub const COOKIE_DISALLOWED: &[char] = &['=', ';', '"', '\\', '(', ')', ',', '#', '@', ':', '?'];

/// Default Unix domain socket path template; `{pid}` is substituted at startup.
pub const DEFAULT_SOCKET_PATH_PREFIX: &str = "/tmp/x3sck.";

/// Environment variable carrying the child's peer TCP port.
pub const ENV_X3270PORT: &str = "X3270PORT";
/// Environment variable carrying the child's output (emulator→script) FD.
pub const ENV_X3270OUTPUT: &str = "X3270OUTPUT";
/// Environment variable carrying the child's input (script→emulator) FD.
pub const ENV_X3270INPUT: &str = "X3270INPUT";
/// Environment variable carrying the child's base REST URL.
pub const ENV_X3270URL: &str = "X3270URL";
/// Environment variable carrying the path to the cookie file.
pub const ENV_X3270COOKIEFILE: &str = "X3270COOKIEFILE";

/// Idle timeout for an HTTP session with no in-flight request.
pub const HTTP_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Minimum and maximum randomized delay before closing a connection that
/// presented a missing or incorrect security cookie.
pub const BAD_COOKIE_DELAY_MIN_MS: u64 = 1000;
pub const BAD_COOKIE_DELAY_MAX_MS: u64 = 2000;

/// Default TCP port for plaintext and TLS x3270 session URIs.
pub const DEFAULT_TELNET_PORT: u16 = 23;
pub const DEFAULT_TELNETS_PORT: u16 = 992;
