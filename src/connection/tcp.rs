//! Async TCP transport to a Redis server.
//!
//! Wraps a `tokio::net::TcpStream` with a read buffer, a write queue and a
//! count of replies the server still owes us. Commands are queued by
//! [`Transport::send`] without touching the socket and go out together on
//! [`Transport::flush`]; replies come back strictly in send order.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cmd::{self, Command};
use crate::convert;
use crate::error::{Error, Result};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::resp::writer::write_command;

/// Default initial read buffer capacity (64 KB).
const DEFAULT_BUF_CAPACITY: usize = 64 * 1024;

/// Default maximum read buffer size (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// Position in the write queue, used to undo a half-built batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMark {
    out_len: usize,
    pending: usize,
}

/// A single connection's wire state.
pub struct Transport {
    stream: TcpStream,
    /// Data read from the socket but not yet consumed by the parser.
    buf: BytesMut,
    /// Encoded commands not yet written.
    out: Vec<u8>,
    /// Replies owed by the server for commands already queued.
    pending: usize,
    /// Set on any I/O or protocol failure; the connection must be dropped.
    broken: bool,
    read_timeout: Option<Duration>,
    max_buf_size: usize,
}

impl Transport {
    /// Connect to `addr` (e.g. "127.0.0.1:6379").
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok(); // Disable Nagle for low latency
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            out: Vec::new(),
            pending: 0,
            broken: false,
            read_timeout: None,
            max_buf_size: DEFAULT_MAX_BUF_SIZE,
        })
    }

    /// Connect, giving up after `timeout`.
    pub async fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        match tokio::time::timeout(timeout, Self::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "connection to {addr} timed out after {timeout:?}"
            ))),
        }
    }

    /// Bound every socket read; `None` waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn set_max_buf_size(&mut self, max: usize) {
        self.max_buf_size = max;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Queue a command. No I/O happens until [`flush`](Self::flush).
    pub fn send(&mut self, cmd: &Command) -> Result<()> {
        if cmd.is_empty() {
            return Err(Error::InvalidArgument("empty command".into()));
        }
        write_command(&mut self.out, cmd.as_args());
        self.pending += 1;
        Ok(())
    }

    pub fn mark(&self) -> QueueMark {
        QueueMark {
            out_len: self.out.len(),
            pending: self.pending,
        }
    }

    /// Drop everything queued since `mark`. Only valid while nothing has
    /// been flushed in between.
    pub fn rollback(&mut self, mark: QueueMark) {
        if self.out.len() >= mark.out_len {
            self.out.truncate(mark.out_len);
            self.pending = mark.pending;
        }
    }

    /// Write every queued command.
    pub async fn flush(&mut self) -> Result<()> {
        if self.broken {
            return Err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection is broken",
            )));
        }
        if self.out.is_empty() {
            return Ok(());
        }
        // A write cut short by cancellation leaves a torn command on the
        // wire, so the flag is only cleared once the write completes.
        self.broken = true;
        self.stream.write_all(&self.out).await?;
        self.broken = false;
        self.out.clear();
        Ok(())
    }

    /// Read one reply, error replies included as [`RespValue::Error`].
    pub async fn read_reply(&mut self) -> Result<RespValue> {
        match self.read_value().await {
            Ok(value) => {
                self.pending = self.pending.saturating_sub(1);
                Ok(value)
            }
            Err(e) => {
                if e.is_fatal() {
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    /// Send, flush, then read every outstanding reply.
    ///
    /// Returns the last reply, unless one of the replies read was an error,
    /// in which case the first such error wins. This is how `EXEC` reports a
    /// command that failed while being queued.
    pub async fn execute(&mut self, cmd: &Command) -> Result<RespValue> {
        self.send(cmd)?;
        self.flush().await?;

        let mut first_err = None;
        let mut last = RespValue::Null;
        while self.pending > 0 {
            match self.read_reply().await? {
                RespValue::Error(msg) => {
                    if first_err.is_none() {
                        first_err = Some(Error::redis(msg));
                    }
                }
                value => last = value,
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(last),
        }
    }

    /// Flush and throw away every outstanding reply.
    pub async fn discard_pending(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        self.flush().await?;
        let owed = self.pending;
        while self.pending > 0 {
            self.read_reply().await?;
        }
        tracing::debug!(replies = owed, "discarded pending replies");
        Ok(())
    }

    /// `AUTH <password>`; the reply must be `OK`.
    pub async fn auth(&mut self, password: &str) -> Result<()> {
        convert::ok(self.execute(&cmd::auth(password)).await)
    }

    /// Select a database index. Database 0 is the default and sends nothing.
    pub async fn select_db(&mut self, db: u16) -> Result<()> {
        if db == 0 {
            return Ok(());
        }
        convert::ok(self.execute(&cmd::select(db)).await)
    }

    /// Send PING and verify response.
    pub async fn ping(&mut self) -> Result<bool> {
        let reply = self.execute(&cmd::ping()).await?;
        Ok(matches!(reply, RespValue::SimpleString(ref s) if s == "PONG"))
    }

    /// Shut the socket down. Errors are ignored; the peer may already be gone.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    async fn read_value(&mut self) -> Result<RespValue> {
        loop {
            if !self.buf.is_empty() {
                // Freeze so bulk strings can be sliced out without copying,
                // then put back whatever the parser did not consume.
                let snapshot = self.buf.split().freeze();
                match parse(&snapshot) {
                    Ok((value, consumed)) => {
                        if consumed < snapshot.len() {
                            self.buf.extend_from_slice(&snapshot[consumed..]);
                        }
                        return Ok(value);
                    }
                    Err(Error::Incomplete) => {
                        self.buf.extend_from_slice(&snapshot);
                    }
                    Err(e) => {
                        self.buf.extend_from_slice(&snapshot);
                        return Err(e);
                    }
                }
            }

            self.reserve_read_space()?;
            let n = match self.read_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, self.stream.read_buf(&mut self.buf)).await
                    {
                        Ok(read) => read?,
                        Err(_) => {
                            return Err(Error::Timeout(format!(
                                "no reply within {timeout:?}"
                            )))
                        }
                    }
                }
                None => self.stream.read_buf(&mut self.buf).await?,
            };
            if n == 0 {
                return Err(Error::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    fn reserve_read_space(&mut self) -> Result<()> {
        if self.buf.capacity() - self.buf.len() >= 4096 {
            return Ok(());
        }
        let new_cap = (self.buf.capacity() * 2).max(DEFAULT_BUF_CAPACITY);
        if new_cap > self.max_buf_size {
            if self.buf.capacity() >= self.max_buf_size {
                return Err(Error::Protocol(format!(
                    "RESP message too large: buffer would exceed {} bytes",
                    self.max_buf_size
                )));
            }
            self.buf.reserve(self.max_buf_size - self.buf.capacity());
        } else {
            self.buf.reserve(new_cap - self.buf.capacity());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.stream.peer_addr().ok())
            .field("pending", &self.pending)
            .field("queued_bytes", &self.out.len())
            .field("broken", &self.broken)
            .finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
