use crate::http::request::{Method, Request};
use thiserror::Error;

/// Longest request path accepted, matching the platform `PATH_MAX`.
pub const MAX_PATH: usize = 4096;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No line terminator yet; more bytes are needed
    #[error("request line incomplete")]
    Incomplete,

    /// No line terminator within the configured maximum
    #[error("request line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("empty request line")]
    Empty,

    #[error("request line is not valid UTF-8")]
    InvalidEncoding,

    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),

    #[error("request line has no path")]
    MissingPath,

    #[error("request path is {len} bytes, limit is {limit}")]
    PathTooLong { len: usize, limit: usize },
}

/// Returns the length of the first complete line in `buf`, terminator included.
///
/// `Incomplete` means the caller should wait for more bytes. `LineTooLong`
/// means `max_line` bytes arrived without a terminator and the line must be
/// discarded rather than parsed.
pub fn find_line_end(buf: &[u8], max_line: usize) -> Result<usize, ParseError> {
    let window = &buf[..buf.len().min(max_line)];

    match window.iter().position(|&b| b == b'\n') {
        Some(pos) => Ok(pos + 1),
        None if buf.len() >= max_line => Err(ParseError::LineTooLong { limit: max_line }),
        None => Err(ParseError::Incomplete),
    }
}

/// Decodes a request line with the default path limit.
pub fn decode(buf: &[u8]) -> Result<Request, ParseError> {
    decode_with_limit(buf, MAX_PATH)
}

/// Decodes `METHOD SP PATH [SP VERSION]`.
///
/// Only the first line of `buf` is looked at. Tokens are separated by runs of
/// spaces. Paths longer than `max_path` are rejected, never truncated.
pub fn decode_with_limit(buf: &[u8], max_path: usize) -> Result<Request, ParseError> {
    let line = match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => &buf[..pos],
        None => buf,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;

    let mut tokens = line.split(' ').filter(|t| !t.is_empty());

    let method_token = tokens.next().ok_or(ParseError::Empty)?;
    let method = Method::from_token(method_token);
    if method != Method::GET {
        return Err(ParseError::UnsupportedMethod(method_token.to_string()));
    }

    let path = tokens.next().ok_or(ParseError::MissingPath)?;
    if path.len() > max_path {
        return Err(ParseError::PathTooLong {
            len: path.len(),
            limit: max_path,
        });
    }

    let version = tokens.next().unwrap_or_default();

    Ok(Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
    })
}
