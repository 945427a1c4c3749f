use std::io;

use thiserror::Error;

// ── Error taxonomy ─────────────────────────────────────────────────
//
//  Error
//  ├── Connection / Protocol / Timeout   (fatal to the connection)
//  ├── Redis { kind, message }           (server replied with an error)
//  │   ├── NoAuth / AuthNotSet / WrongPass   (drive auth renegotiation)
//  │   └── WrongType / ExecAbort / …
//  ├── Nil                               (no data, not a failure)
//  ├── PoolExhausted / PoolClosed        (capacity, retry with backoff)
//  └── InvalidArgument / Type / Config   (local, no I/O performed)

/// Structured Redis error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// NOAUTH Authentication required.
    NoAuth,
    /// AUTH was sent to a server that has no password configured.
    AuthNotSet,
    /// WRONGPASS invalid username-password pair
    WrongPass,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// EXECABORT Transaction discarded because of previous errors.
    ExecAbort,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOSCRIPT No matching script
    NoScript,
    /// BUSY Redis is busy running a script
    Busy,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Classify a Redis error message (e.g. "NOAUTH Authentication required.").
    ///
    /// This is the only place that knows the exact server wording of the
    /// authentication errors, which differs between server versions.
    pub fn from_error_msg(msg: &str) -> Self {
        if msg.starts_with("NOAUTH") {
            Self::NoAuth
        } else if is_auth_not_set_msg(msg) {
            Self::AuthNotSet
        } else if msg.starts_with("WRONGPASS") {
            Self::WrongPass
        } else if msg.starts_with("WRONGTYPE") {
            Self::WrongType
        } else if msg.starts_with("EXECABORT") {
            Self::ExecAbort
        } else if msg.starts_with("LOADING") {
            Self::Loading
        } else if msg.starts_with("READONLY") {
            Self::ReadOnly
        } else if msg.starts_with("NOSCRIPT") {
            Self::NoScript
        } else if msg.starts_with("BUSY") {
            Self::Busy
        } else if msg.starts_with("ERR") {
            Self::Err
        } else {
            let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
            Self::Other(prefix.to_string())
        }
    }
}

/// Redis <= 5: "ERR Client sent AUTH, but no password is set"
/// Redis >= 6: "ERR AUTH <password> called without any password configured for the default user. …"
fn is_auth_not_set_msg(msg: &str) -> bool {
    msg.starts_with("ERR Client sent AUTH, but no password is set")
        || (msg.starts_with("ERR AUTH") && msg.contains("without any password configured"))
}

/// All error variants for typedis.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP / IO level errors
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    /// RESP protocol parse errors
    #[error("protocol error: {0}")]
    Protocol(String),
    /// RESP parser needs more data; used as control flow by the transport.
    #[error("incomplete RESP message")]
    Incomplete,
    /// Redis returned an error reply
    #[error("redis error: {message}")]
    Redis {
        kind: RedisErrorKind,
        message: String,
    },
    /// The server answered with a nil reply (missing key, field, member…).
    #[error("nil reply")]
    Nil,
    /// The open-connection ceiling is reached; the pool does not queue waiters.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// The pool has been shut down.
    #[error("connection pool is shut down")]
    PoolClosed,
    /// Arguments rejected locally, before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Reply could not be converted to the requested type
    #[error("type error: {0}")]
    Type(String),
    /// Connect or read timed out
    #[error("timeout: {0}")]
    Timeout(String),
    /// Malformed connection URL or configuration
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::from_error_msg(&message);
        Self::Redis { kind, message }
    }

    /// The Redis error kind, if this is a server error reply.
    pub fn redis_kind(&self) -> Option<&RedisErrorKind> {
        match self {
            Self::Redis { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True for the nil sentinel: the call succeeded but there was no data.
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// True when the server demands authentication.
    pub fn is_no_auth(&self) -> bool {
        self.redis_kind() == Some(&RedisErrorKind::NoAuth)
    }

    /// True when the server rejected an AUTH because it has no password.
    pub fn is_auth_not_set(&self) -> bool {
        self.redis_kind() == Some(&RedisErrorKind::AuthNotSet)
    }

    /// True when the connection that produced this error must not be reused.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Protocol(_) | Self::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ──────────────────────────────────────────────────────────
