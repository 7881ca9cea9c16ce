//! Response formatting and wire writing for the HTTP/1.1 server (§4.4).

use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub close: bool,
    pub extra_headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &'static str, content_type: &'static str, body: Vec<u8>) -> Self {
        HttpResponse { status, reason, content_type, body, close: false, extra_headers: Vec::new() }
    }

    pub fn text(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self::new(status, reason, "text/plain", body.into().into_bytes())
    }

    pub fn html(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self::new(status, reason, "text/html", body.into().into_bytes())
    }

    pub fn json(status: u16, reason: &'static str, body: impl Into<String>) -> Self {
        Self::new(status, reason, "application/json", body.into().into_bytes())
    }

    pub fn with_close(mut self, close: bool) -> Self {
        self.close = close;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        let location = location.into();
        Self::html(301, "Moved Permanently", format!("<h1>301 Moved Permanently</h1><p>{location}</p>"))
            .with_header("Location", location)
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found", "404 Not Found\n")
    }

    pub fn forbidden() -> Self {
        Self::text(403, "Forbidden", "403 Forbidden\n")
    }

    pub fn not_implemented() -> Self {
        Self::text(501, "Not Implemented", "501 Not Implemented\n")
    }

    pub fn bad_request(reason: &str) -> Self {
        Self::text(400, "Bad Request", format!("400 Bad Request: {reason}\n"))
    }

    pub fn payload_too_large() -> Self {
        Self::text(413, "Payload Too Large", "413 Payload Too Large\n")
    }
}

/// Writes `response` to `writer`. When `is_head` is set, the body is
/// withheld but `Content-Length` still reflects its would-be length.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &HttpResponse,
    is_head: bool,
) -> std::io::Result<()> {
    let mut head = String::new();
    head.push_str(&format!("HTTP/1.1 {} {}\r\n", response.status, response.reason));
    head.push_str(&format!("Date: {}\r\n", rfc1123_now()));
    head.push_str("Server: x3270sh\r\n");
    if response.close {
        head.push_str("Connection: close\r\n");
    }
    let charset = if response.content_type.starts_with("text/") || response.content_type == "application/json" {
        "; charset=utf-8"
    } else {
        ""
    };
    head.push_str(&format!("Content-Type: {}{}\r\n", response.content_type, charset));
    head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    for (name, value) in &response.extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    if !is_head {
        writer.write_all(&response.body).await?;
    }
    writer.flush().await
}

fn rfc1123_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
