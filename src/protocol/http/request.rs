//! Request-line, header, and body accumulation (§4.7).
//!
//! Unlike `parser::h1::request::H1Request`, which borrows
//! `&'buf str` slices directly out of one contiguous packet, this parser
//! owns its strings. A Connection's inbound `Buffer` compacts and regrows
//! across reads, so anything the protocol Context needs to outlive a
//! single `feed` call must not borrow from it.

use std::fmt::Display;

use crate::buffer::Buffer;
use crate::error::ParseError;

use super::{BodyMode, MAX_CHUNK_BYTES};
use super::chunked::ChunkedReader;

/// The two methods this engine accepts; anything else is a 400 (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

/// HTTP version on the request line. Only 1.0 and 1.1 are recognized;
/// anything else fails the request line (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    Http11,
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        })
    }
}

/// A fully-parsed HTTP request handed to the registered handler.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The request method.
    pub method: Method,
    /// The request target (path + query), unparsed.
    pub target: String,
    /// The declared HTTP version.
    pub version: Version,
    /// Header name/value pairs in wire order, names lower-cased.
    pub headers: Vec<(String, String)>,
    /// The fully reassembled body (possibly empty).
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Accumulates a request across possibly many `feed` calls.
#[derive(Debug, Default)]
pub(super) struct PartialRequest {
    method: Option<Method>,
    target: Option<String>,
    version: Option<Version>,
    headers: Vec<(String, String)>,
    pub(super) body: Vec<u8>,
    pub(super) header_bytes_seen: usize,
    pub(super) expects_continue: bool,
    content_length: Option<usize>,
    chunked: bool,
}

impl PartialRequest {
    pub(super) fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let line = trim_crlf(line);
        let text = std::str::from_utf8(line).map_err(|_| ParseError::BadRequestLine)?;
        let mut parts = text.splitn(3, ' ');
        let method = parts.next().ok_or(ParseError::BadRequestLine)?;
        let target = parts.next().ok_or(ParseError::BadRequestLine)?;
        let version = parts.next().ok_or(ParseError::BadRequestLine)?;

        self.method = Some(match method {
            "GET" => Method::Get,
            "POST" => Method::Post,
            _ => return Err(ParseError::BadRequestLine),
        });
        self.target = Some(target.to_string());
        self.version = Some(match version {
            "HTTP/1.0" => Version::Http10,
            "HTTP/1.1" => Version::Http11,
            _ => return Err(ParseError::BadRequestLine),
        });
        Ok(())
    }

    pub(super) fn parse_header_line(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let line = trim_crlf(line);
        let text = std::str::from_utf8(line).map_err(|_| ParseError::BadHeader)?;
        let (name, value) = text.split_once(':').ok_or(ParseError::BadHeader)?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(ParseError::BadHeader);
        }

        if name.eq_ignore_ascii_case("content-length") {
            self.content_length = Some(value.parse().map_err(|_| ParseError::BadHeader)?);
        } else if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
            self.chunked = true;
        } else if name.eq_ignore_ascii_case("expect") && value.eq_ignore_ascii_case("100-continue") {
            self.expects_continue = true;
        }

        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        Ok(())
    }

    pub(super) fn body_mode(&self) -> Result<BodyMode, ParseError> {
        if self.chunked {
            Ok(BodyMode::Chunked(ChunkedReader::new(MAX_CHUNK_BYTES)))
        } else if let Some(n) = self.content_length {
            Ok(BodyMode::Length(n))
        } else {
            Ok(BodyMode::None)
        }
    }

    pub(super) fn finish(&mut self) -> HttpRequest {
        HttpRequest {
            method: self.method.expect("request line already parsed"),
            target: self.target.take().expect("request line already parsed"),
            version: self.version.expect("request line already parsed"),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        }
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}

/// Scans the readable span of `buf` for a `\n`-terminated line and returns
/// how many bytes (including the terminator) the line occupies, or `None`
/// if no complete line is buffered yet.
pub(super) fn peek_line_len(buf: &Buffer) -> Option<usize> {
    let data = buf.peek(buf.len())?;
    data.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}
