//! Response writer (§4.7): status line, server identity, RFC 1123 `Date`,
//! user headers, then body — grounded on
//! `original_source/src/transport/http/HttpResponse.cpp` for header
//! ordering and reason phrases.

use crate::buffer::Buffer;

use super::request::Version;

/// Status codes this engine emits itself; handlers may still write
/// arbitrary codes via [`HttpResponse::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// 100 Continue
    pub const CONTINUE: StatusCode = StatusCode(100);
    /// 101 Switching Protocols
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);
    /// 200 OK
    pub const OK: StatusCode = StatusCode(200);
    /// 204 No Content
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    /// 400 Bad Request
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    fn reason(self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            413 => "Content Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

/// A response a handler builds and hands back to the framer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    /// Set once a `Connection: close` header is added; the Connection
    /// closes once this response finishes draining.
    pub(crate) close_after_send: bool,
}

impl HttpResponse {
    /// Starts a response with the given status and no headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            close_after_send: false,
        }
    }

    /// Adds a header. `Connection: close` (case-insensitive) marks the
    /// response to close the connection once sent.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("connection") {
            let value = value.into();
            self.close_after_send = value.eq_ignore_ascii_case("close");
            self.headers.push((name, value));
        } else {
            self.headers.push((name, value.into()));
        }
        self
    }

    /// Sets the body, implicitly adding `Content-Length`.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Marks the connection to close after this response is sent.
    pub fn close(mut self) -> Self {
        self.close_after_send = true;
        self
    }

    /// Serializes the status line, ambient headers, user headers, and
    /// body into `out`, in the order the framer always uses.
    pub fn write_to(&self, version: Version, out: &mut Buffer) {
        out.write(format!("{} {} {}\r\n", version, self.status.0, self.status.reason()).as_bytes());
        out.write(b"Server: conduit\r\n");
        out.write(format!("Date: {}\r\n", httpdate::fmt_http_date(std::time::SystemTime::now())).as_bytes());

        let mut wrote_content_length = false;
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                wrote_content_length = true;
            }
            out.write(format!("{name}: {value}\r\n").as_bytes());
        }
        if !wrote_content_length && !self.body.is_empty() {
            out.write(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        } else if !wrote_content_length && self.status.0 != 204 && self.status.0 != 304 {
            out.write(b"Content-Length: 0\r\n");
        }
        if self.close_after_send && !self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("connection")) {
            out.write(b"Connection: Close\r\n");
        }

        out.write(b"\r\n");
        out.write(&self.body);
    }

    /// A 400 Bad Request with `Connection: Close`, per §4.7's malformed
    /// request / oversized header / bad chunk error path.
    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST)
            .header("Content-Type", "text/plain")
            .header("Connection", "Close")
            .body(message.as_bytes().to_vec())
    }

    /// A 404 Not Found for unmatched routes (§4.10).
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/plain")
            .body(b"Not Found".to_vec())
    }

    /// A 500 for a handler that returned an error (§7).
    pub fn internal_error(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "text/plain")
            .body(message.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_includes_content_length_and_date() {
        let resp = HttpResponse::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(b"pong".to_vec());

        let mut out = Buffer::new();
        resp.write_to(Version::Http11, &mut out);
        let written = out.peek(out.len()).unwrap();
        let text = String::from_utf8_lossy(written);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\npong"));
    }
}
