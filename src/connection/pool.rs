//! Fail-fast connection pool.
//!
//! Leasing never waits: when the open-connection ceiling is reached the
//! caller gets [`Error::PoolExhausted`] and decides how to back off. The
//! idle set and the open count live under one `parking_lot::Mutex` (sync,
//! held very briefly) so connections can be returned from `Drop`.

use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::batch::{Pipeline, Transaction};
use crate::config::PoolConfig;
use crate::connection::connector::Connector;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::resp::types::RespValue;

/// Boxed future borrowed from a leased connection, as returned by
/// [`Pool::with_connection`] callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A pooled connection and when it was handed back.
struct IdleConnection {
    conn: Connection,
    since: Instant,
}

struct PoolState {
    /// Most recently returned first.
    idle: VecDeque<IdleConnection>,
    /// Idle plus leased.
    open: usize,
    closed: bool,
}

struct PoolInner {
    connector: Connector,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle. Clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Pool for the server at `url` (`redis://[:password@]host[:port][/db]`).
    pub fn new(url: &str, config: PoolConfig) -> Result<Self> {
        Ok(Self::with_connector(Connector::from_url(url)?, config))
    }

    pub fn with_connector(connector: Connector, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_idle_connections),
                    open: 0,
                    closed: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Lease a connection, reusing an idle one when possible.
    ///
    /// Fails with [`Error::PoolExhausted`] instead of waiting when the
    /// open-connection ceiling is reached.
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        let (reused, expired) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            let expired = self.inner.take_expired(&mut state);
            let next = state.idle.pop_front();
            match next {
                Some(idle) => (Some(idle.conn), expired),
                None if self.inner.config.is_at_capacity(state.open) => {
                    let open = state.open;
                    drop(state);
                    drop(expired);
                    tracing::warn!(open, "connection pool exhausted");
                    return Err(Error::PoolExhausted);
                }
                None => {
                    state.open += 1;
                    (None, expired)
                }
            }
        };
        if !expired.is_empty() {
            tracing::debug!(evicted = expired.len(), "closed idle connections past timeout");
            drop(expired);
        }

        let conn = match reused {
            Some(conn) => conn,
            None => {
                let slot = Reservation::new(&self.inner);
                let conn = self.inner.connector.connect().await?;
                slot.keep();
                conn
            }
        };

        // Wrapped first so a cancelled or failed drain still gives the
        // connection back (or closes it if the drain broke it).
        let mut pooled = PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
        };
        pooled.drain_pending().await?;
        Ok(pooled)
    }

    /// Give a leased connection back. `None` is accepted and does nothing.
    pub fn return_connection(&self, conn: Option<PooledConnection>) {
        if let Some(conn) = conn {
            conn.release();
        }
    }

    /// Connections waiting in the idle set.
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Connections counted against the ceiling, idle and leased.
    pub fn open_count(&self) -> usize {
        self.inner.state.lock().open
    }

    /// Close every idle connection and stop accepting returns.
    ///
    /// Leased connections are left alone; they are closed when they come
    /// back. Further leases fail with [`Error::PoolClosed`].
    pub fn shutdown(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.open = state.open.saturating_sub(idle.len());
            idle
        };
        tracing::debug!(closed = idle.len(), "pool shut down");
    }

    /// Lease a connection for the duration of `f`.
    ///
    /// ```ignore
    /// let n = pool
    ///     .with_connection(|conn| Box::pin(async move { conn.incr("hits").await }))
    ///     .await?;
    /// ```
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.get_connection().await?;
        f(&mut conn).await
    }

    /// Lease a connection and run [`Connection::transaction`] on it.
    pub async fn transaction<F>(&self, f: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<()>,
    {
        let mut conn = self.get_connection().await?;
        conn.transaction(f).await
    }

    /// Lease a connection and run [`Connection::pipelined`] on it.
    pub async fn pipelined<F>(&self, f: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Pipeline<'_>) -> Result<()>,
    {
        let mut conn = self.get_connection().await?;
        conn.pipelined(f).await
    }

    /// Lease a connection and run [`Connection::pipelined_discarding`] on it.
    pub async fn pipelined_discarding<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Pipeline<'_>) -> Result<()>,
    {
        let mut conn = self.get_connection().await?;
        conn.pipelined_discarding(f).await
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("addr", &self.inner.connector.config().primary_addr())
            .field("config", &self.inner.config)
            .field("open", &state.open)
            .field("idle", &state.idle.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl PoolInner {
    /// Pull idle connections past the idle timeout out of the set. The
    /// caller drops them once the lock is released.
    fn take_expired(&self, state: &mut PoolState) -> VecDeque<IdleConnection> {
        if self.config.idle_timeout.is_zero() || state.idle.is_empty() {
            return VecDeque::new();
        }
        let (fresh, expired): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.idle)
            .into_iter()
            .partition(|idle| !self.config.is_expired(idle.since.elapsed()));
        state.idle = fresh;
        state.open = state.open.saturating_sub(expired.len());
        expired
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.open = state.open.saturating_sub(1);
    }

    /// Take back a leased connection. Its idle time starts now. Broken
    /// connections and returns past the idle ceiling or after shutdown are
    /// closed instead.
    fn put(&self, conn: Connection) {
        let mut state = self.state.lock();
        let reason = if state.closed {
            "pool shut down"
        } else if conn.is_broken() {
            "broken"
        } else if state.idle.len() >= self.config.max_idle_connections {
            "idle set full"
        } else {
            state.idle.push_front(IdleConnection {
                conn,
                since: Instant::now(),
            });
            return;
        };
        state.open = state.open.saturating_sub(1);
        drop(state);

        if conn.is_broken() {
            tracing::warn!(conn = conn.id(), "discarding broken connection");
        } else {
            tracing::debug!(conn = conn.id(), reason, "closing returned connection");
        }
    }
}

/// An open-count slot taken before connecting, given back unless the
/// connect succeeds.
struct Reservation<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl<'a> Reservation<'a> {
    fn new(pool: &'a PoolInner) -> Self {
        Self { pool, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

/// A leased connection. Dropping it returns the connection to its pool.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Return the connection to the pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Take the connection out of the pool for good. It no longer counts
    /// against the open ceiling.
    pub fn detach(mut self) -> Connection {
        let conn = self.conn.take().expect("connection already taken");
        self.pool.release_slot();
        conn
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already taken")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already taken")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
