//! Opens authenticated connections.
//!
//! The connector is the pool's connection generator. It consults the
//! credential cache so that hosts known to run without a password are not
//! sent a pointless AUTH, and corrects the cache whenever the server
//! disagrees with it.

use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::connection::tcp::Transport;
use crate::connection::Connection;
use crate::credentials::CredentialCache;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Connector {
    config: ConnectionConfig,
    credentials: Arc<CredentialCache>,
}

impl Connector {
    /// A connector sharing the process-wide credential cache.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_credentials(config, CredentialCache::global())
    }

    /// A connector with its own credential cache (tests, isolated tenants).
    pub fn with_credentials(config: ConnectionConfig, credentials: Arc<CredentialCache>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(ConnectionConfig::from_url(url)?))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Dial, authenticate and select the configured database.
    pub async fn connect(&self) -> Result<Connection> {
        let addr = self.config.primary_addr();
        let host = self.config.credential_key();

        let mut transport = Transport::connect_timeout(&addr, self.config.connect_timeout()).await?;
        transport.set_read_timeout(self.config.read_timeout());
        transport.set_max_buf_size(self.config.max_buffer_size);

        let password = self.config.password.as_deref();
        let stripped = password.is_some() && self.credentials.contains(&host);

        if let Some(password) = password.filter(|_| !stripped) {
            match transport.auth(password).await {
                Ok(()) => {}
                Err(e) if e.is_auth_not_set() => {
                    // The server has no password; remember it and carry on.
                    self.credentials.add(&host);
                }
                Err(e) => return Err(e),
            }
        }

        match transport.select_db(self.config.db).await {
            Ok(()) => {}
            Err(e) if e.is_no_auth() && stripped => {
                tracing::debug!(%host, "cached as passwordless but demanded auth, retrying");
                self.credentials.remove(&host);
                if let Some(password) = password {
                    transport.auth(password).await?;
                }
                transport.select_db(self.config.db).await?;
            }
            Err(e) => return Err(e),
        }

        let conn = Connection::new(
            transport,
            self.config.password.clone(),
            host,
            self.credentials.clone(),
        );
        tracing::debug!(conn = conn.id(), addr = %addr, db = self.config.db, "connected");
        Ok(conn)
    }
}
