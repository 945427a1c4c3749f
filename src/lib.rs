//! Async Redis client with a fail-fast connection pool, pipelining,
//! `MULTI`/`EXEC` transactions and transparent re-authentication.
//!
//! ```ignore
//! use typedis::{BatchCommands, Commands, Pool, PoolConfig};
//!
//! let pool = Pool::new("redis://:secret@127.0.0.1:6379/0", PoolConfig::default().max_open(16))?;
//!
//! let mut conn = pool.get_connection().await?;
//! conn.set("counter", 1).await?;
//! let replies = conn
//!     .transaction(|tx| {
//!         tx.incr("counter")?;
//!         tx.expire("counter", 60)
//!     })
//!     .await?;
//! ```

pub mod batch;
pub mod cmd;
pub mod commands;
pub mod config;
pub mod connection;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod resp;

pub use batch::{BatchCommands, Pipeline, Transaction};
pub use cmd::{Command, Limit, ToArg};
pub use commands::Commands;
pub use config::{ConnectionConfig, PoolConfig};
pub use connection::pool::BoxFuture;
pub use connection::{Connection, Connector, Pool, PooledConnection};
pub use convert::ZMember;
pub use credentials::CredentialCache;
pub use error::{Error, RedisErrorKind, Result};
pub use resp::RespValue;
