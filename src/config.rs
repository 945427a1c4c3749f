//! Connection and pool configuration.
//!
//! Connection URLs take the form `redis://[user:pass@]host[:port][/db]`.
//! Only the password part of the userinfo is used; AUTH is always sent in
//! its single-argument form.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Address used by [`ConnectionConfig::from_env`] when `REDIS_URL` is unset.
pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Environment variable consulted by [`ConnectionConfig::from_env`].
pub const URL_ENV_VAR: &str = "REDIS_URL";

/// Everything needed to open one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Password sent with AUTH (the URL username, if any, is dropped).
    pub password: Option<String>,
    /// Database index selected after connecting.
    pub db: u16,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-reply read timeout in milliseconds (0 = wait forever).
    pub read_timeout_ms: u64,
    /// Maximum read buffer size per connection in bytes.
    pub max_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            password: None,
            db: 0,
            connect_timeout_ms: 5000,
            read_timeout_ms: 0,
            max_buffer_size: crate::connection::tcp::DEFAULT_MAX_BUF_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Parse a `redis://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::Config(format!("invalid URL, missing ://: {url}")))?;

        match scheme {
            "redis" => {}
            "rediss" => {
                return Err(Error::Config("TLS (rediss://) is not supported".into()));
            }
            _ => return Err(Error::Config(format!("unknown URL scheme: {scheme}"))),
        }

        let mut config = Self::default();
        let (host_part, db_part) = split_path(rest);

        if let Some(db_str) = db_part {
            config.db = db_str
                .parse()
                .map_err(|_| Error::Config(format!("invalid db number: {db_str}")))?;
        }

        let host_port = match host_part.rsplit_once('@') {
            Some((userinfo, hp)) => {
                config.password = parse_password(userinfo);
                hp
            }
            None => host_part,
        };

        let (host, port) = parse_host_port(host_port)?;
        config.host = host;
        config.port = port;
        Ok(config)
    }

    /// Read the URL from `REDIS_URL`, falling back to the local default.
    pub fn from_env() -> Result<Self> {
        match std::env::var(URL_ENV_VAR) {
            Ok(url) if !url.is_empty() => Self::from_url(&url),
            _ => Self::from_url(DEFAULT_URL),
        }
    }

    /// The address as "host:port", suitable for `TcpStream::connect`.
    pub fn primary_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Key under which the credential cache remembers this server.
    pub fn credential_key(&self) -> String {
        self.primary_addr()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when reads may block indefinitely.
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Pool sizing and idle eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Ceiling on connections open at once, leased or idle. 0 = unlimited.
    pub max_open_connections: usize,
    /// Idle connections kept for reuse; extras are closed on return.
    pub max_idle_connections: usize,
    /// Idle connections older than this are closed. Zero disables eviction.
    pub idle_timeout: Duration,
}

impl PoolConfig {
    pub const UNLIMITED: usize = 0;

    pub fn max_open(mut self, n: usize) -> Self {
        self.max_open_connections = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle_connections = n;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub(crate) fn is_at_capacity(&self, open: usize) -> bool {
        self.max_open_connections != Self::UNLIMITED && open >= self.max_open_connections
    }

    pub(crate) fn is_expired(&self, idle_for: Duration) -> bool {
        !self.idle_timeout.is_zero() && idle_for > self.idle_timeout
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_connections: Self::UNLIMITED,
            max_idle_connections: 10,
            idle_timeout: Duration::ZERO,
        }
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (before_path, Some(path)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// Extract the password from `user:pass`, `:pass` or a bare `pass`.
fn parse_password(userinfo: &str) -> Option<String> {
    // a bare `user@` carries no password
    let (_user, pass) = userinfo.split_once(':')?;
    (!pass.is_empty()).then(|| pass.to_string())
}

/// Parse `host[:port]` or `[ipv6]:port`.
fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(bracketed) = s.strip_prefix('[') {
        let close = bracketed
            .find(']')
            .ok_or_else(|| Error::Config(format!("unclosed IPv6 bracket: {s}")))?;
        let host = &bracketed[..close];
        let port = match bracketed[close + 1..].strip_prefix(':') {
            Some(port_str) => parse_port(port_str)?,
            None => DEFAULT_PORT,
        };
        (host.to_string(), port)
    } else if let Some((h, p)) = s.rsplit_once(':') {
        match p.parse::<u16>() {
            Ok(port) => (h.to_string(), port),
            // bare IPv6 without brackets
            Err(_) if h.contains(':') => (s.to_string(), DEFAULT_PORT),
            Err(_) => return Err(Error::Config(format!("invalid port: {p}"))),
        }
    } else {
        (s.to_string(), DEFAULT_PORT)
    };

    if host.is_empty() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    Ok((host, port))
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| Error::Config(format!("invalid port: {s}")))
}

// ── Tests ──────────────────────────────────────────────────────────
