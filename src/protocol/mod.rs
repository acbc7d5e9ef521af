//! Wire protocol: CRLF-framed single-line headers with length-prefixed
//! payloads. Payloads are byte-counted, so values may safely contain CRLF.

pub mod request;
pub mod response;

pub use request::Request;
pub use response::{DataItem, Response};

use std::io::Cursor;
use std::str;

use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// Not enough data is buffered to parse an entire frame. The caller
    /// should read more bytes and retry; `in_body` tells whether the header
    /// line was already complete.
    #[error("not enough data is available to parse an entire frame")]
    Incomplete { in_body: bool },
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Invalid command format")]
    InvalidCommandFormat,
    #[error("Invalid value length")]
    InvalidValueLength,
    #[error("Invalid response format")]
    InvalidResponseFormat,
}

/// Returns the next CRLF-terminated line, without its terminator, and
/// advances the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let end = src.get_ref().len();

    let line_end = src.get_ref()[start..end]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete { in_body: false })?;

    src.set_position((line_end + CRLF.len()) as u64);
    Ok(&src.get_ref()[start..line_end])
}

/// Returns exactly `len` payload bytes and consumes the trailing CRLF. The
/// declared length and the actual framing must agree.
fn get_payload<'a>(src: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let available = src.get_ref().len() - start;
    if available < len + CRLF.len() {
        return Err(Error::Incomplete { in_body: true });
    }

    src.set_position((start + len + CRLF.len()) as u64);
    if &src.get_ref()[start + len..start + len + CRLF.len()] != CRLF {
        return Err(Error::InvalidValueLength);
    }
    Ok(&src.get_ref()[start..start + len])
}

/// Keys and hash fields are restricted to `[A-Za-z0-9_]+`.
fn is_valid_key(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
}

fn parse_unsigned<T: str::FromStr>(token: &str) -> Result<T, Error> {
    if token.is_empty() || !token.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(Error::InvalidCommandFormat);
    }
    token.parse().map_err(|_| Error::InvalidCommandFormat)
}

/// Range bounds may be negative; they are clamped by the storage layer.
fn parse_index(token: &str) -> Result<i64, Error> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(Error::InvalidCommandFormat);
    }
    token.parse().map_err(|_| Error::InvalidCommandFormat)
}
