//! HTTP/1.1 request parsing and response writing (§4.7).
//!
//! Supplements a method/target/version-only parser
//! (`parser::h1::request::H1Request`) with headers, `Content-Length`,
//! chunked transfer-encoding, the 100-continue flow, and a response
//! writer — grounded on `original_source/src/transport/http/HttpContext.cpp`
//! and `HttpResponse.cpp` for the exact status/Date/header ordering.

mod chunked;
pub mod request;
pub mod response;

use crate::buffer::Buffer;
use crate::error::ParseError;

pub use request::{HttpRequest, Method, Version};
pub use response::HttpResponse;

use self::chunked::ChunkedReader;

const MAX_HEADER_BYTES: usize = 4096;
const MAX_CHUNK_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug)]
enum BodyMode {
    None,
    Length(usize),
    Chunked(ChunkedReader),
}

#[derive(Debug)]
enum Phase {
    RequestLine,
    Headers,
    Body(BodyMode),
    Done,
}

/// Parse-in-progress or complete HTTP request state for one Connection,
/// plus the 100-continue flag (§3 HttpContext).
#[derive(Debug)]
pub struct HttpContext {
    phase: Phase,
    partial: request::PartialRequest,
    continue_sent: bool,
}

impl HttpContext {
    /// A context with no request parsed yet.
    pub fn new() -> Self {
        Self {
            phase: Phase::RequestLine,
            partial: request::PartialRequest::default(),
            continue_sent: false,
        }
    }

    /// Resets state so the connection is ready to parse the next
    /// keep-alive request (§9 Open Question (b): sequential only, no
    /// pipelining).
    pub fn reset_for_next_request(&mut self) {
        self.phase = Phase::RequestLine;
        self.partial = request::PartialRequest::default();
        self.continue_sent = false;
    }

    /// Attempts to advance parsing using bytes available in `inbound`.
    /// Returns `Ok(Some(request))` once a complete request has been
    /// parsed, `Ok(None)` if more bytes are needed, or an error the
    /// caller should translate into a 400 response.
    ///
    /// When the request carries `Expect: 100-continue`, the caller is
    /// responsible for checking [`wants_100_continue`](Self::wants_100_continue)
    /// after this returns `Ok(None)` and writing the interim response once.
    pub fn feed(&mut self, inbound: &mut Buffer) -> Result<Option<HttpRequest>, ParseError> {
        loop {
            match &mut self.phase {
                Phase::RequestLine => {
                    let Some(consumed) = request::peek_line_len(inbound) else {
                        if inbound.len() > MAX_HEADER_BYTES {
                            return Err(ParseError::HeadersTooLarge);
                        }
                        return Ok(None);
                    };
                    let line = inbound.peek(consumed).unwrap().to_vec();
                    inbound.skip(consumed);
                    self.partial.parse_request_line(&line)?;
                    self.phase = Phase::Headers;
                }
                Phase::Headers => {
                    loop {
                        let Some(consumed) = request::peek_line_len(inbound) else {
                            if self.partial.header_bytes_seen > MAX_HEADER_BYTES {
                                return Err(ParseError::HeadersTooLarge);
                            }
                            return Ok(None);
                        };
                        let line = inbound.peek(consumed).unwrap().to_vec();
                        inbound.skip(consumed);
                        self.partial.header_bytes_seen += consumed;
                        if self.partial.header_bytes_seen > MAX_HEADER_BYTES {
                            return Err(ParseError::HeadersTooLarge);
                        }

                        if line == b"\r\n" || line == b"\n" {
                            let mode = self.partial.body_mode()?;
                            self.phase = Phase::Body(mode);
                            break;
                        }
                        self.partial.parse_header_line(&line)?;
                    }
                }
                Phase::Body(BodyMode::None) => {
                    self.phase = Phase::Done;
                }
                Phase::Body(BodyMode::Length(remaining)) => {
                    let take = (*remaining).min(inbound.len());
                    if take == 0 && *remaining > 0 {
                        return Ok(None);
                    }
                    if take > 0 {
                        let bytes = inbound.read(take).unwrap().to_vec();
                        self.partial.body.extend_from_slice(&bytes);
                        *remaining -= take;
                    }
                    if *remaining == 0 {
                        self.phase = Phase::Done;
                    } else {
                        return Ok(None);
                    }
                }
                Phase::Body(BodyMode::Chunked(reader)) => {
                    match reader.feed(inbound, &mut self.partial.body)? {
                        chunked::ChunkedOutcome::NeedMore => return Ok(None),
                        chunked::ChunkedOutcome::Done => self.phase = Phase::Done,
                    }
                }
                Phase::Done => {
                    let request = self.partial.finish();
                    self.phase = Phase::RequestLine;
                    self.partial = request::PartialRequest::default();
                    self.continue_sent = false;
                    return Ok(Some(request));
                }
            }
        }
    }

    /// Whether the in-progress request asked for `100-continue` and the
    /// interim response has not yet been sent.
    pub fn wants_100_continue(&self) -> bool {
        matches!(self.phase, Phase::Body(_)) && self.partial.expects_continue && !self.continue_sent
    }

    /// Marks the 100-continue interim response as sent.
    pub fn mark_100_continue_sent(&mut self) {
        self.continue_sent = true;
    }
}

impl Default for HttpContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(ctx: &mut HttpContext, data: &[u8]) -> Result<Option<HttpRequest>, ParseError> {
        let mut buf = Buffer::new();
        buf.write(data);
        ctx.feed(&mut buf)
    }

    #[test]
    fn simple_get_parses_in_one_pass() {
        let mut ctx = HttpContext::new();
        let req = feed_all(&mut ctx, b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/ping");
        assert_eq!(req.header("host"), Some("x"));
    }

    #[test]
    fn oversized_header_region_is_rejected() {
        let mut ctx = HttpContext::new();
        let mut line = b"GET / HTTP/1.1\r\n".to_vec();
        line.extend(std::iter::repeat(b'a').take(4097));
        let err = feed_all(&mut ctx, &line).unwrap_err();
        assert!(matches!(err, ParseError::HeadersTooLarge));
    }

    #[test]
    fn chunked_body_reassembles_across_feeds() {
        let mut ctx = HttpContext::new();
        let mut buf = Buffer::new();
        buf.write(b"POST /x HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(ctx.feed(&mut buf).unwrap().is_none());
        buf.write(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n");
        let req = ctx.feed(&mut buf).unwrap().unwrap();
        assert_eq!(req.body, b"hello world");
    }
}
