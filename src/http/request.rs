//! Request-line/header/body parsing for the HTTP/1.1 server (§4.4).

use crate::error::HttpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path with consecutive slashes collapsed and percent-decoding applied.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub http_1_1: bool,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub close: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Reads and parses one request off `reader`, enforcing `cap` on the raw
/// header block and on `Content-Length`.
pub async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    cap: usize,
) -> Result<HttpRequest, HttpError> {
    let mut raw_lines = Vec::new();
    let mut total = 0usize;
    loop {
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|_| HttpError::BadRequest { reason: "connection error while reading headers".to_string() })?;
        if n == 0 {
            if raw_lines.is_empty() {
                return Err(HttpError::NotHttp);
            }
            return Err(HttpError::BadRequest { reason: "connection closed mid-headers".to_string() });
        }
        total += n;
        if total > cap {
            return Err(HttpError::RequestTooLarge { limit: cap });
        }
        let trimmed_len = line.len() - if line.ends_with(b"\n") { 1 } else { 0 };
        let line = &line[..trimmed_len];
        let trimmed_len = line.len() - if line.ends_with(b"\r") { 1 } else { 0 };
        let text = String::from_utf8_lossy(&line[..trimmed_len]).into_owned();
        if text.is_empty() {
            break;
        }
        raw_lines.push(text);
    }

    if raw_lines.is_empty() {
        return Err(HttpError::NotHttp);
    }
    let request_line = raw_lines.remove(0);
    if request_line.starts_with(' ') || request_line.starts_with('\t') {
        return Err(HttpError::NotHttp);
    }
    let mut parts = request_line.split(' ');
    let verb = parts.next().ok_or(HttpError::NotHttp)?;
    let uri = parts.next().ok_or_else(|| HttpError::BadRequest { reason: "missing URI".to_string() })?;
    let version = parts.next();

    let method = match verb {
        "GET" => HttpMethod::Get,
        "HEAD" => HttpMethod::Head,
        "POST" => HttpMethod::Post,
        "PUT" | "DELETE" | "OPTIONS" | "PATCH" | "TRACE" | "CONNECT" => return Err(HttpError::UnsupportedVerb),
        _ => return Err(HttpError::UnknownVerb),
    };

    let http_1_1 = matches!(version, Some(v) if v.eq_ignore_ascii_case("HTTP/1.1"));
    let (path, query) = split_uri(uri)?;

    let mut headers = Vec::new();
    let mut content_length: usize = 0;
    let mut content_type = None;
    let mut close = !http_1_1;
    let mut has_host = false;

    for line in raw_lines {
        let idx = line.find(':').ok_or_else(|| HttpError::BadRequest { reason: format!("malformed header '{line}'") })?;
        let name = line[..idx].trim_end();
        if name.is_empty() || name.chars().any(|c| c.is_control() || c == ' ') {
            return Err(HttpError::BadRequest { reason: format!("malformed header name '{name}'") });
        }
        let value = line[idx + 1..].trim().to_string();
        if headers.iter().any(|(k, _): &(String, String)| k.eq_ignore_ascii_case(name)) {
            return Err(HttpError::DuplicateHeader { name: name.to_string() });
        }
        if name.eq_ignore_ascii_case("host") {
            has_host = true;
        }
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().map_err(|_| HttpError::BadRequest { reason: "bad Content-Length".to_string() })?;
        }
        if name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.clone());
        }
        if name.eq_ignore_ascii_case("connection") && value.eq_ignore_ascii_case("close") {
            close = true;
        }
        headers.push((name.to_string(), value));
    }

    if http_1_1 && !has_host {
        return Err(HttpError::MissingHost);
    }
    if content_length > cap {
        return Err(HttpError::RequestTooLarge { limit: cap });
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader
            .read_exact(&mut body)
            .await
            .map_err(|_| HttpError::BadRequest { reason: "connection closed mid-body".to_string() })?;
    }

    Ok(HttpRequest { method, path, query, http_1_1, headers, content_type, body, close })
}

fn split_uri(uri: &str) -> Result<(String, Vec<(String, String)>), HttpError> {
    let without_scheme = if let Some(rest) = uri.strip_prefix("http://") {
        match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "/",
        }
    } else {
        uri
    };
    let without_fragment = without_scheme.split('#').next().unwrap_or("");
    let (raw_path, raw_query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };
    let decoded_path = percent_decode(raw_path).map_err(|_| HttpError::BadRequest { reason: "bad percent-encoding in path".to_string() })?;
    let path = collapse_slashes(&decoded_path);

    let mut query = Vec::new();
    if let Some(raw_query) = raw_query {
        for pair in raw_query.split('&').filter(|s| !s.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode(k).map_err(|_| HttpError::BadRequest { reason: "bad percent-encoding in query".to_string() })?;
            let value = percent_decode(v).map_err(|_| HttpError::BadRequest { reason: "bad percent-encoding in query".to_string() })?;
            query.push((key, value));
        }
    }
    Ok((path, query))
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn percent_decode(input: &str) -> Result<String, ()> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if i + 2 >= bytes.len() {
                    return Err(());
                }
                let hi = hex_digit(bytes[i + 1]).ok_or(())?;
                let lo = hex_digit(bytes[i + 2]).ok_or(())?;
                out.push(hi * 16 + lo);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_simple_get_request() {
        let raw = b"GET /3270/rest/text/Query(Cursor) HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec();
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        let request = read_request(&mut reader, 8192).await.unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.path, "/3270/rest/text/Query(Cursor)");
        assert!(request.http_1_1);
    }

    #[tokio::test]
    async fn rejects_missing_host_on_http_1_1() {
        let raw = b"GET / HTTP/1.1\r\n\r\n".to_vec();
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        assert!(matches!(read_request(&mut reader, 8192).await, Err(HttpError::MissingHost)));
    }

    #[tokio::test]
    async fn rejects_duplicate_header() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n".to_vec();
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        assert!(matches!(read_request(&mut reader, 8192).await, Err(HttpError::DuplicateHeader { .. })));
    }

    #[tokio::test]
    async fn reads_declared_body_length() {
        let raw = b"POST /3270/rest/post HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        let request = read_request(&mut reader, 8192).await.unwrap();
        assert_eq!(request.body, b"hello");
    }

    #[tokio::test]
    async fn oversized_content_length_is_rejected_before_reading_body() {
        let raw = b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 999999\r\n\r\n".to_vec();
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        assert!(matches!(read_request(&mut reader, 8192).await, Err(HttpError::RequestTooLarge { .. })));
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(collapse_slashes("/3270//rest///text"), "/3270/rest/text");
    }

    #[test]
    fn percent_decodes_path_components() {
        let (path, _) = split_uri("/3270/rest/text/Query%28Cursor%29").unwrap();
        assert_eq!(path, "/3270/rest/text/Query(Cursor)");
    }
}
