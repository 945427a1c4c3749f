//! Streaming RESP2 parser.
//!
//! [`parse`] takes a byte buffer and returns `Ok((RespValue, bytes_consumed))`,
//! `Err(Incomplete)` when more data is needed, or `Err(Protocol(…))` on
//! malformed input. Bulk strings are sliced out of the ref-counted `Bytes`
//! buffer without copying.

use bytes::Bytes;
use memchr::memchr;

use crate::error::{Error, Result};
use crate::resp::types::RespValue;

/// Parse one RESP value from the front of `buf`.
///
/// Returns `(value, bytes_consumed)` on success.
/// Returns `Err(Incomplete)` when the buffer is too short;
/// callers should read more data and retry.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    if buf.is_empty() {
        return Err(Error::Incomplete);
    }

    match buf[0] {
        b'+' => parse_simple_string(buf),
        b'-' => parse_error(buf),
        b':' => parse_integer(buf),
        b'$' => parse_bulk_string(buf),
        b'*' => parse_array(buf),
        other => Err(Error::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

/// Convenience wrapper: parse from a byte slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Read the line starting at `buf[offset]` up to `\r\n`.
/// Returns `(line_bytes, index_after_crlf)`.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let cr = match memchr(b'\r', &buf[offset..]) {
        Some(pos) => offset + pos,
        None => return Err(Error::Incomplete),
    };
    if cr + 1 >= buf.len() {
        return Err(Error::Incomplete);
    }
    if buf[cr + 1] != b'\n' {
        return Err(Error::Protocol("expected \\n after \\r".into()));
    }
    Ok((&buf[offset..cr], cr + 2))
}

/// Parse a signed decimal integer without allocating.
fn parse_int(bytes: &[u8]) -> Result<i64> {
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        Some(_) => (false, bytes),
        None => return Err(Error::Protocol("empty integer".into())),
    };
    if digits.is_empty() {
        return Err(Error::Protocol("integer has no digits".into()));
    }

    // Accumulate negatively so i64::MIN parses without overflow.
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(Error::Protocol(format!("invalid byte in integer: 0x{b:02x}")));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub((b - b'0') as i64))
            .ok_or_else(|| Error::Protocol("integer overflow".into()))?;
    }

    if negative {
        Ok(n)
    } else {
        n.checked_neg()
            .ok_or_else(|| Error::Protocol("integer overflow".into()))
    }
}

fn utf8_line(line: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| Error::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

// ── Type parsers ──────────────────────────────────────────────────

/// `+<string>\r\n`
fn parse_simple_string(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let s = match line {
        b"OK" => "OK".to_string(),
        b"QUEUED" => "QUEUED".to_string(),
        _ => utf8_line(line, "simple string")?,
    };
    Ok((RespValue::SimpleString(s), next))
}

/// `-<error message>\r\n`
fn parse_error(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    Ok((RespValue::Error(utf8_line(line, "error")?), next))
}

/// `:<integer>\r\n`
fn parse_integer(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    Ok((RespValue::Integer(parse_int(line)?), next))
}

/// `$<length>\r\n<data>\r\n`  or  `$-1\r\n`
fn parse_bulk_string(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let len = parse_int(line)?;
    if len < 0 {
        return Ok((RespValue::Null, next));
    }

    let data_end = next + len as usize;
    if buf.len() < data_end + 2 {
        return Err(Error::Incomplete);
    }
    if buf[data_end] != b'\r' || buf[data_end + 1] != b'\n' {
        return Err(Error::Protocol(
            "bulk string not terminated by \\r\\n".into(),
        ));
    }

    Ok((RespValue::BulkString(buf.slice(next..data_end)), data_end + 2))
}

/// `*<count>\r\n<elements>`  or  `*-1\r\n`
fn parse_array(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int(line)?;
    if count < 0 {
        return Ok((RespValue::Null, next));
    }

    // Each element takes at least 3 bytes; don't trust a huge count for capacity.
    let count = count as usize;
    let mut elements = Vec::with_capacity(count.min((buf.len() - next) / 3 + 1));
    for _ in 0..count {
        let sub = buf.slice(next..);
        let (val, consumed) = parse(&sub)?;
        elements.push(val);
        next += consumed;
    }
    Ok((RespValue::Array(elements), next))
}

// ── Tests ──────────────────────────────────────────────────────────
