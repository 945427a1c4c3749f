//! Shared helpers for integration tests.
//!
//! Two kinds of server are available:
//!
//! * [`MockServer`]: an in-process RESP server with a small in-memory
//!   keyspace, `MULTI`/`EXEC`, a `requirepass` switch and a command log. Used
//!   for pool, pipeline, transaction and auth behaviour.
//! * A real Redis at `REDIS_URL` (default `redis://127.0.0.1:6379`) for the
//!   command tests. Those tests are skipped when no server answers `PING`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use typedis::{Commands, ConnectionConfig, Connector, CredentialCache, Pool, PoolConfig};

/// Global counter for generating unique key prefixes per test.
static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Return a unique prefix for test keys to avoid collisions between tests.
pub fn test_prefix() -> String {
    let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("typedis_test_{}_{}", std::process::id(), id)
}

/// Route library logs to the test output. `RUST_LOG=typedis=debug` shows
/// connects, re-authentication and pool evictions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Live server ────────────────────────────────────────────────────

pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into())
}

/// A pool on the live server, or `None` (test skipped) if it is not reachable.
pub async fn live_pool() -> Option<Pool> {
    init_tracing();
    let url = redis_url();
    let pool = Pool::new(&url, PoolConfig::default().max_open(32)).ok()?;
    let mut probe = pool.clone();
    match tokio::time::timeout(Duration::from_secs(1), probe.ping()).await {
        Ok(Ok(true)) => Some(pool),
        _ => {
            eprintln!("skipping: no Redis server answering at {url}");
            None
        }
    }
}

// ── Mock server ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

#[derive(Default)]
struct MockState {
    keys: HashMap<String, Value>,
    password: Option<String>,
    log: Vec<String>,
    accepted: usize,
}

/// Per-connection protocol state.
#[derive(Default)]
struct Session {
    authed: bool,
    queued: Option<Vec<Vec<String>>>,
    dirty: bool,
}

pub struct MockServer {
    pub addr: String,
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(MockState::default()));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                shared.lock().accepted += 1;
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self { addr, state }
    }

    /// Start with `requirepass` already set.
    pub async fn with_password(password: &str) -> Self {
        let server = Self::start().await;
        server.require_pass(Some(password));
        server
    }

    /// Change `requirepass` at runtime. Existing sessions that never
    /// authenticated start getting `NOAUTH`.
    pub fn require_pass(&self, password: Option<&str>) {
        self.state.lock().password = password.map(str::to_string);
    }

    pub fn url(&self, password: Option<&str>) -> String {
        match password {
            Some(pw) => format!("redis://:{pw}@{}", self.addr),
            None => format!("redis://{}", self.addr),
        }
    }

    /// A connector with its own credential cache.
    pub fn connector(&self, password: Option<&str>) -> (Connector, Arc<CredentialCache>) {
        let config = ConnectionConfig::from_url(&self.url(password)).unwrap();
        let cache = Arc::new(CredentialCache::new());
        (Connector::with_credentials(config, cache.clone()), cache)
    }

    pub fn pool(&self, password: Option<&str>, config: PoolConfig) -> Pool {
        Pool::with_connector(self.connector(password).0, config)
    }

    /// Every command received so far, as space-joined words.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// How many commands named `name` were received.
    pub fn count(&self, name: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|c| c.split(' ').next() == Some(name))
            .count()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.lock().accepted
    }
}

async fn serve(mut socket: tokio::net::TcpStream, state: Arc<Mutex<MockState>>) {
    let mut session = Session::default();
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; 4096];
    loop {
        let mut out = Vec::new();
        while let Ok((value, consumed)) = typedis::resp::parse_slice(&buf) {
            buf.drain(..consumed);
            let args: Vec<String> = value
                .into_array()
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if args.is_empty() {
                continue;
            }
            let mut state = state.lock();
            state.log.push(args.join(" "));
            out.extend(handle(&mut state, &mut session, args));
        }
        if !out.is_empty() && socket.write_all(&out).await.is_err() {
            return;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn handle(state: &mut MockState, session: &mut Session, args: Vec<String>) -> Vec<u8> {
    let name = args[0].to_uppercase();

    if name == "AUTH" {
        return match (&state.password, args.get(1)) {
            (None, _) => error("ERR Client sent AUTH, but no password is set"),
            (Some(pw), Some(given)) if pw == given => {
                session.authed = true;
                simple("OK")
            }
            _ => error("WRONGPASS invalid username-password pair or user is disabled."),
        };
    }
    if state.password.is_some() && !session.authed {
        return error("NOAUTH Authentication required.");
    }

    match name.as_str() {
        "MULTI" => {
            if session.queued.is_some() {
                return error("ERR MULTI calls can not be nested");
            }
            session.queued = Some(Vec::new());
            session.dirty = false;
            simple("OK")
        }
        "EXEC" => {
            let Some(queued) = session.queued.take() else {
                return error("ERR EXEC without MULTI");
            };
            if std::mem::take(&mut session.dirty) {
                return error("EXECABORT Transaction discarded because of previous errors.");
            }
            let replies: Vec<Vec<u8>> = queued.into_iter().map(|cmd| execute(state, cmd)).collect();
            array(replies)
        }
        "DISCARD" => {
            session.queued = None;
            simple("OK")
        }
        _ if session.queued.is_some() => {
            if !is_known(&name) {
                session.dirty = true;
                return error(&format!("ERR unknown command '{}'", args[0]));
            }
            if let Some(queued) = session.queued.as_mut() {
                queued.push(args);
            }
            simple("QUEUED")
        }
        _ => execute(state, args),
    }
}

const KNOWN: &[&str] = &[
    "PING", "SELECT", "FLUSHDB", "GET", "SET", "DEL", "EXISTS", "INCR", "HSET", "HGET", "HMSET",
    "HMGET", "HGETALL", "LPUSH", "RPUSH", "LRANGE", "LLEN", "LPOP",
];

fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

fn execute(state: &mut MockState, args: Vec<String>) -> Vec<u8> {
    let name = args[0].to_uppercase();
    let keys = &mut state.keys;
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();

    match name.as_str() {
        "PING" => simple("PONG"),
        "SELECT" => simple("OK"),
        "FLUSHDB" => {
            keys.clear();
            simple("OK")
        }
        "GET" => match keys.get(&arg(1)) {
            Some(Value::Str(s)) => bulk(s),
            Some(_) => wrong_type(),
            None => nil(),
        },
        "SET" => {
            keys.insert(arg(1), Value::Str(arg(2)));
            simple("OK")
        }
        "DEL" => integer(args[1..].iter().filter(|k| keys.remove(*k).is_some()).count() as i64),
        "EXISTS" => integer(i64::from(keys.contains_key(&arg(1)))),
        "INCR" => {
            let entry = keys.entry(arg(1)).or_insert_with(|| Value::Str("0".into()));
            match entry {
                Value::Str(s) => match s.parse::<i64>() {
                    Ok(n) => {
                        *s = (n + 1).to_string();
                        integer(n + 1)
                    }
                    Err(_) => error("ERR value is not an integer or out of range"),
                },
                _ => wrong_type(),
            }
        }
        "HSET" | "HMSET" => {
            let entry = keys.entry(arg(1)).or_insert_with(|| Value::Hash(HashMap::new()));
            let Value::Hash(hash) = entry else {
                return wrong_type();
            };
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                if let [field, value] = pair {
                    if hash.insert(field.clone(), value.clone()).is_none() {
                        added += 1;
                    }
                }
            }
            if name == "HMSET" {
                simple("OK")
            } else {
                integer(added)
            }
        }
        "HGET" => match keys.get(&arg(1)) {
            Some(Value::Hash(h)) => h.get(&arg(2)).map_or_else(nil, |v| bulk(v)),
            Some(_) => wrong_type(),
            None => nil(),
        },
        "HMGET" => match keys.get(&arg(1)) {
            Some(Value::Hash(h)) => array(
                args[2..]
                    .iter()
                    .map(|f| h.get(f).map_or_else(nil, |v| bulk(v)))
                    .collect(),
            ),
            Some(_) => wrong_type(),
            None => array(args[2..].iter().map(|_| nil()).collect()),
        },
        "HGETALL" => match keys.get(&arg(1)) {
            Some(Value::Hash(h)) => array(
                h.iter()
                    .flat_map(|(f, v)| [bulk(f), bulk(v)])
                    .collect(),
            ),
            Some(_) => wrong_type(),
            None => array(Vec::new()),
        },
        "LPUSH" | "RPUSH" => {
            let entry = keys.entry(arg(1)).or_insert_with(|| Value::List(VecDeque::new()));
            let Value::List(list) = entry else {
                return wrong_type();
            };
            for value in &args[2..] {
                if name == "LPUSH" {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            integer(list.len() as i64)
        }
        "LPOP" => match keys.get_mut(&arg(1)) {
            Some(Value::List(list)) => list.pop_front().map_or_else(nil, |v| bulk(&v)),
            Some(_) => wrong_type(),
            None => nil(),
        },
        "LLEN" => match keys.get(&arg(1)) {
            Some(Value::List(list)) => integer(list.len() as i64),
            Some(_) => wrong_type(),
            None => integer(0),
        },
        "LRANGE" => match keys.get(&arg(1)) {
            Some(Value::List(list)) => {
                let len = list.len() as i64;
                let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
                let start = norm(arg(2).parse().unwrap_or(0));
                let stop = norm(arg(3).parse().unwrap_or(-1)).min(len - 1);
                array(
                    (start..=stop)
                        .filter_map(|i| list.get(i as usize))
                        .map(|v| bulk(v))
                        .collect(),
                )
            }
            Some(_) => wrong_type(),
            None => array(Vec::new()),
        },
        _ => error(&format!("ERR unknown command '{}'", args[0])),
    }
}

// ── RESP encoding ──

fn simple(s: &str) -> Vec<u8> {
    format!("+{s}\r\n").into_bytes()
}

fn error(s: &str) -> Vec<u8> {
    format!("-{s}\r\n").into_bytes()
}

fn integer(n: i64) -> Vec<u8> {
    format!(":{n}\r\n").into_bytes()
}

fn bulk(s: &str) -> Vec<u8> {
    format!("${}\r\n{s}\r\n", s.len()).into_bytes()
}

fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

fn wrong_type() -> Vec<u8> {
    error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend(item);
    }
    out
}
