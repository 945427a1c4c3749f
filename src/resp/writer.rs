//! RESP command serializer.
//!
//! Commands go on the wire as an array of bulk strings:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

/// Bytes needed to encode `args`, used to reserve once before writing.
fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    // '*' + max digits + \r\n, then '$' + len + \r\n + data + \r\n per arg
    let mut cap = 1 + 20 + 2;
    for arg in args {
        cap += 1 + 20 + 2 + arg.as_ref().len() + 2;
    }
    cap
}

/// Append one encoded command to `buf`.
///
/// Appending (rather than returning a fresh `Vec`) lets the transport
/// accumulate a whole batch in its write queue and flush it with one write.
pub fn write_command<A: AsRef<[u8]>>(buf: &mut Vec<u8>, args: &[A]) {
    buf.reserve(encoded_len(args));
    let mut itoa_buf = Buffer::new();

    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Encode a single command into a fresh buffer.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_command(&mut buf, args);
    buf
}

// ── Tests ──────────────────────────────────────────────────────────
