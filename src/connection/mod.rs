//! Raw connections: immediate, pipelined and transactional execution over
//! one socket, with transparent re-authentication.

pub mod connector;
pub mod pool;
pub mod tcp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::batch::{Pipeline, Transaction};
use crate::cmd::{self, Command};
use crate::convert;
use crate::credentials::CredentialCache;
use crate::error::{Error, Result};
use crate::resp::types::RespValue;

pub use connector::Connector;
pub use pool::{Pool, PooledConnection};
pub use tcp::Transport;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One server connection and the password it was opened with.
///
/// Authentication state is not tracked. When a command is answered with
/// `NOAUTH` and a password is known, the connection authenticates and
/// retries that command once.
pub struct Connection {
    transport: Transport,
    password: Option<String>,
    /// Credential-cache key of the server.
    host: String,
    credentials: Arc<CredentialCache>,
    /// Replies still owed by a `pipelined_discarding` call.
    discarded: usize,
    id: u64,
}

impl Connection {
    pub(crate) fn new(
        transport: Transport,
        password: Option<String>,
        host: String,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            transport,
            password,
            host,
            credentials,
            discarded: 0,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Open an unpooled connection to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        Connector::from_url(url)?.connect().await
    }

    /// Process-unique identifier, stable for the connection's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Replies the server still owes on this connection.
    pub fn pending(&self) -> usize {
        self.transport.pending()
    }

    /// True once an I/O or protocol failure has made the connection unusable.
    pub fn is_broken(&self) -> bool {
        self.transport.is_broken()
    }

    /// Queue a command without touching the network.
    pub fn send(&mut self, cmd: &Command) -> Result<()> {
        self.transport.send(cmd)
    }

    /// Write every queued command.
    pub async fn flush(&mut self) -> Result<()> {
        self.transport.flush().await
    }

    /// Read the next reply. A server error reply comes back as `Err`.
    pub async fn receive(&mut self) -> Result<RespValue> {
        self.skip_discarded().await?;
        self.transport.read_reply().await?.into_result()
    }

    /// Send, flush and wait for the reply.
    ///
    /// Replies to commands queued earlier with [`send`](Self::send) are read
    /// first; the first error among them wins, otherwise the reply to `cmd`
    /// is returned.
    pub async fn execute(&mut self, cmd: &Command) -> Result<RespValue> {
        self.skip_discarded().await?;
        match self.transport.execute(cmd).await {
            Err(e) if e.is_no_auth() => self.reauthenticate_and_retry(cmd, e).await,
            other => other,
        }
    }

    async fn reauthenticate_and_retry(
        &mut self,
        cmd: &Command,
        no_auth: Error,
    ) -> Result<RespValue> {
        self.credentials.remove(&self.host);
        let Some(password) = self.password.clone() else {
            return Err(no_auth);
        };

        tracing::debug!(
            conn = self.id,
            host = %self.host,
            command = cmd.name(),
            "server demands auth, authenticating and retrying once"
        );
        if let Err(e) = self.transport.auth(&password).await {
            if e.is_auth_not_set() {
                self.credentials.add(&self.host);
            }
            return Err(e);
        }
        self.transport.execute(cmd).await
    }

    /// Queue `MULTI`. Pair with [`exec`](Self::exec).
    pub fn multi(&mut self) -> Result<()> {
        self.transport.send(&cmd::multi())
    }

    /// Send `EXEC` and return the transaction's reply array.
    pub async fn exec(&mut self) -> Result<Vec<RespValue>> {
        self.skip_discarded().await?;
        convert::values(self.transport.execute(&cmd::exec()).await)
    }

    /// Run `f` between `MULTI` and `EXEC` and return the `EXEC` replies.
    ///
    /// `f` only queues commands. If it fails, nothing it queued is sent.
    pub async fn transaction<F>(&mut self, f: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<()>,
    {
        self.drain_pending().await?;
        let mut tx = Transaction::begin(&mut self.transport)?;
        if let Err(e) = f(&mut tx) {
            tx.rollback();
            return Err(e);
        }
        tx.commit().await
    }

    /// Run `f`, flush once, and return one reply per queued command.
    pub async fn pipelined<F>(&mut self, f: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Pipeline<'_>) -> Result<()>,
    {
        self.drain_pending().await?;
        let mut pipeline = Pipeline::new(&mut self.transport);
        if let Err(e) = f(&mut pipeline) {
            pipeline.rollback();
            return Err(e);
        }
        let replies = pipeline.drain().await;
        if replies.is_err() {
            // replies behind the failed one are skipped before the next read
            self.discarded = self.transport.pending();
        }
        replies
    }

    /// Like [`pipelined`](Self::pipelined) but never reads the replies.
    ///
    /// Per-command errors are not observable; only a failed flush is
    /// reported. The unread replies are skipped before this connection's
    /// next read.
    pub async fn pipelined_discarding<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Pipeline<'_>) -> Result<()>,
    {
        self.drain_pending().await?;
        let mut pipeline = Pipeline::new(&mut self.transport);
        if let Err(e) = f(&mut pipeline) {
            pipeline.rollback();
            return Err(e);
        }
        let sent = pipeline.pending();
        pipeline.flush().await?;
        self.discarded += sent;
        Ok(())
    }

    /// Read and drop every reply still owed, whoever queued it.
    pub(crate) async fn drain_pending(&mut self) -> Result<()> {
        self.transport.discard_pending().await?;
        self.discarded = 0;
        Ok(())
    }

    async fn skip_discarded(&mut self) -> Result<()> {
        while self.discarded > 0 {
            self.transport.read_reply().await?;
            self.discarded -= 1;
        }
        Ok(())
    }

    /// Shut the socket down.
    pub async fn close(self) {
        tracing::debug!(conn = self.id, "closing connection");
        self.transport.close().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("has_password", &self.password.is_some())
            .field("transport", &self.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers each read with the next canned chunk.
    async fn canned_server(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            for response in responses {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        addr
    }

    async fn connection(addr: &str, password: Option<&str>) -> (Connection, Arc<CredentialCache>) {
        let transport = Transport::connect(addr).await.unwrap();
        let cache = Arc::new(CredentialCache::new());
        let conn = Connection::new(
            transport,
            password.map(str::to_string),
            addr.to_string(),
            cache.clone(),
        );
        (conn, cache)
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let addr = canned_server(vec![]).await;
        let (a, _) = connection(&addr, None).await;
        let addr = canned_server(vec![]).await;
        let (b, _) = connection(&addr, None).await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn send_flush_receive() {
        let addr = canned_server(vec!["+OK\r\n-ERR nope\r\n"]).await;
        let (mut conn, _) = connection(&addr, None).await;
        conn.send(&cmd::set("k", "v")).unwrap();
        conn.send(&Command::new("BOGUS")).unwrap();
        assert_eq!(conn.pending(), 2);
        conn.flush().await.unwrap();
        assert_eq!(
            conn.receive().await.unwrap(),
            RespValue::SimpleString("OK".into())
        );
        assert!(matches!(conn.receive().await, Err(Error::Redis { .. })));
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn noauth_triggers_single_auth_and_retry() {
        let addr = canned_server(vec![
            "-NOAUTH Authentication required.\r\n",
            "+OK\r\n",
            "$3\r\nbar\r\n",
        ])
        .await;
        let (mut conn, cache) = connection(&addr, Some("secret")).await;
        cache.add(&addr);

        let reply = conn.execute(&cmd::get("foo")).await.unwrap();
        assert_eq!(reply.as_str(), Some("bar"));
        assert!(!cache.contains(&addr));
    }

    #[tokio::test]
    async fn noauth_without_password_is_returned() {
        let addr = canned_server(vec!["-NOAUTH Authentication required.\r\n"]).await;
        let (mut conn, _) = connection(&addr, None).await;
        let err = conn.execute(&cmd::get("foo")).await.unwrap_err();
        assert!(err.is_no_auth());
    }

    #[tokio::test]
    async fn failed_auth_is_not_retried() {
        let addr = canned_server(vec![
            "-NOAUTH Authentication required.\r\n",
            "-WRONGPASS invalid username-password pair\r\n",
        ])
        .await;
        let (mut conn, _) = connection(&addr, Some("wrong")).await;
        let err = conn.execute(&cmd::get("foo")).await.unwrap_err();
        assert_eq!(
            err.redis_kind(),
            Some(&crate::error::RedisErrorKind::WrongPass)
        );
    }

    #[tokio::test]
    async fn second_noauth_after_retry_is_surfaced() {
        let addr = canned_server(vec![
            "-NOAUTH Authentication required.\r\n",
            "+OK\r\n",
            "-NOAUTH Authentication required.\r\n",
        ])
        .await;
        let (mut conn, _) = connection(&addr, Some("pw")).await;
        let err = conn.execute(&cmd::get("foo")).await.unwrap_err();
        assert!(err.is_no_auth());
    }

    #[tokio::test]
    async fn multi_exec_by_hand() {
        let addr = canned_server(vec!["+OK\r\n+QUEUED\r\n*1\r\n:1\r\n"]).await;
        let (mut conn, _) = connection(&addr, None).await;
        conn.multi().unwrap();
        conn.send(&cmd::incr("n")).unwrap();
        let replies = conn.exec().await.unwrap();
        assert_eq!(replies, vec![RespValue::Integer(1)]);
    }

    #[tokio::test]
    async fn failing_callback_sends_nothing() {
        let addr = canned_server(vec![":1\r\n"]).await;
        let (mut conn, _) = connection(&addr, None).await;
        let err = conn
            .transaction(|tx| {
                use crate::batch::BatchCommands;
                tx.incr("a")?;
                tx.hmget::<_, &str>("h", &[])
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(conn.pending(), 0);
        // the next command is the first thing the server sees
        assert_eq!(
            conn.execute(&cmd::incr("")).await.unwrap(),
            RespValue::Integer(1)
        );
    }

    #[tokio::test]
    async fn discarded_replies_are_skipped() {
        let addr = canned_server(vec!["+OK\r\n-ERR ignored\r\n", "$1\r\nv\r\n"]).await;
        let (mut conn, _) = connection(&addr, None).await;
        conn.pipelined_discarding(|p| {
            use crate::batch::BatchCommands;
            p.set("k", "v")?;
            p.incr("k")
        })
        .await
        .unwrap();
        assert_eq!(conn.pending(), 2);

        let reply = conn.execute(&cmd::get("k")).await.unwrap();
        assert_eq!(reply.as_str(), Some("v"));
        assert_eq!(conn.pending(), 0);
    }

    #[tokio::test]
    async fn failed_pipeline_leftovers_do_not_reach_next_command() {
        let addr = canned_server(vec![
            "+OK\r\n-WRONGTYPE bad\r\n-ERR leftover\r\n",
            "$1\r\nv\r\n",
        ])
        .await;
        let (mut conn, _) = connection(&addr, None).await;
        let err = conn
            .pipelined(|p| {
                use crate::batch::BatchCommands;
                p.set("a", "1")?;
                p.incr("s")?;
                p.incr("b")
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.redis_kind(),
            Some(&crate::error::RedisErrorKind::WrongType)
        );
        assert_eq!(conn.pending(), 1);

        let reply = conn.execute(&cmd::get("k")).await.unwrap();
        assert_eq!(reply.as_str(), Some("v"));
        assert_eq!(conn.pending(), 0);
    }
}
