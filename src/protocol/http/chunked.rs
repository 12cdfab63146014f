//! Chunked transfer-encoding decode (§4.7): `hex-size CRLF bytes CRLF`,
//! terminated by a zero-size chunk. Maximum single chunk size 4 MiB.

use crate::buffer::Buffer;
use crate::error::ParseError;

use super::request::peek_line_len;

#[derive(Debug, Clone, Copy)]
enum State {
    Size,
    Data(usize),
    DataCrlf,
    TrailerBlank,
}

/// Incremental chunked-body reader, holding just enough state to resume
/// across `feed` calls as bytes trickle in.
#[derive(Debug)]
pub(super) struct ChunkedReader {
    state: State,
    max_chunk: usize,
}

pub(super) enum ChunkedOutcome {
    NeedMore,
    Done,
}

impl ChunkedReader {
    pub(super) fn new(max_chunk: usize) -> Self {
        Self {
            state: State::Size,
            max_chunk,
        }
    }

    pub(super) fn feed(
        &mut self,
        inbound: &mut Buffer,
        body: &mut Vec<u8>,
    ) -> Result<ChunkedOutcome, ParseError> {
        loop {
            match self.state {
                State::Size => {
                    let Some(n) = peek_line_len(inbound) else {
                        return Ok(ChunkedOutcome::NeedMore);
                    };
                    let line = inbound.read(n).unwrap().to_vec();
                    let hex = trim_crlf(&line);
                    let hex = hex
                        .split(|&b| b == b';')
                        .next()
                        .unwrap_or(hex);
                    let text = std::str::from_utf8(hex).map_err(|_| ParseError::BadChunk)?;
                    let size =
                        usize::from_str_radix(text.trim(), 16).map_err(|_| ParseError::BadChunk)?;
                    if size > self.max_chunk {
                        return Err(ParseError::BadChunk);
                    }
                    if size == 0 {
                        self.state = State::TrailerBlank;
                    } else {
                        self.state = State::Data(size);
                    }
                }
                State::Data(remaining) => {
                    let take = remaining.min(inbound.len());
                    if take == 0 {
                        return Ok(ChunkedOutcome::NeedMore);
                    }
                    let bytes = inbound.read(take).unwrap().to_vec();
                    body.extend_from_slice(&bytes);
                    let left = remaining - take;
                    self.state = if left == 0 {
                        State::DataCrlf
                    } else {
                        State::Data(left)
                    };
                    if left != 0 {
                        return Ok(ChunkedOutcome::NeedMore);
                    }
                }
                State::DataCrlf => {
                    let Some(n) = peek_line_len(inbound) else {
                        return Ok(ChunkedOutcome::NeedMore);
                    };
                    inbound.skip(n);
                    self.state = State::Size;
                }
                State::TrailerBlank => {
                    let Some(n) = peek_line_len(inbound) else {
                        return Ok(ChunkedOutcome::NeedMore);
                    };
                    let line = inbound.read(n).unwrap().to_vec();
                    if trim_crlf(&line).is_empty() {
                        return Ok(ChunkedOutcome::Done);
                    }
                    // A trailer header; discarded (trailers are out of scope).
                }
            }
        }
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}
