//! Command construction.
//!
//! [`Command`] owns its encoded arguments; [`ToArg`] turns Rust values into
//! binary-safe bulk strings. The free functions below build every command
//! the typed and batch layers issue, so both layers agree on argument order
//! and local validation.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Something that can be sent as one bulk-string argument.
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

macro_rules! int_to_arg {
    ($($t:ty),*) => {$(
        impl ToArg for $t {
            fn to_arg(&self) -> Vec<u8> {
                itoa::Buffer::new().format(*self).as_bytes().to_vec()
            }
        }
    )*};
}

int_to_arg!(i16, i32, i64, isize, u16, u32, u64, usize);

impl ToArg for f64 {
    fn to_arg(&self) -> Vec<u8> {
        if self.is_infinite() {
            return if *self > 0.0 { b"+inf".to_vec() } else { b"-inf".to_vec() };
        }
        self.to_string().into_bytes()
    }
}

impl ToArg for f32 {
    fn to_arg(&self) -> Vec<u8> {
        f64::from(*self).to_arg()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Vec<u8> {
        (**self).to_arg()
    }
}

/// A command name plus its arguments, ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    /// No name and no arguments; the transport refuses to send it.
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self { args: Vec::new() }
    }

    pub fn arg<A: ToArg>(mut self, arg: A) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Append every item of `args`, flattened.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    pub fn push<A: ToArg>(&mut self, arg: A) {
        self.args.push(arg.to_arg());
    }

    /// The command name, for logs.
    pub fn name(&self) -> &str {
        self.args
            .first()
            .and_then(|n| std::str::from_utf8(n).ok())
            .unwrap_or("")
    }

    pub fn as_args(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// `LIMIT offset count` for the by-score range commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: i64,
    pub count: i64,
}

impl Limit {
    pub fn new(offset: i64, count: i64) -> Self {
        Self { offset, count }
    }
}

fn require<T>(items: &[T], what: &str) -> Result<()> {
    if items.is_empty() {
        return Err(Error::InvalidArgument(format!("at least one {what} is required")));
    }
    Ok(())
}

fn with_scan_options(mut cmd: Command, pattern: Option<&str>, count: Option<usize>) -> Command {
    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        cmd = cmd.arg("MATCH").arg(pattern);
    }
    if let Some(count) = count.filter(|&c| c > 0) {
        cmd = cmd.arg("COUNT").arg(count);
    }
    cmd
}

// ── Connection / transactions ──────────────────────────────────────

pub fn auth(password: &str) -> Command {
    Command::new("AUTH").arg(password)
}

pub fn select(db: u16) -> Command {
    Command::new("SELECT").arg(db)
}

pub fn ping() -> Command {
    Command::new("PING")
}

pub fn multi() -> Command {
    Command::new("MULTI")
}

pub fn exec() -> Command {
    Command::new("EXEC")
}

// ── Keys ───────────────────────────────────────────────────────────

pub fn del<K: ToArg>(keys: &[K]) -> Result<Command> {
    require(keys, "key")?;
    Ok(Command::new("DEL").args(keys))
}

pub fn exists<K: ToArg>(key: K) -> Command {
    Command::new("EXISTS").arg(key)
}

pub fn expire<K: ToArg>(key: K, seconds: i64) -> Command {
    Command::new("EXPIRE").arg(key).arg(seconds)
}

pub fn ttl<K: ToArg>(key: K) -> Command {
    Command::new("TTL").arg(key)
}

pub fn rename<K: ToArg, N: ToArg>(key: K, new_key: N) -> Command {
    Command::new("RENAME").arg(key).arg(new_key)
}

pub fn renamenx<K: ToArg, N: ToArg>(key: K, new_key: N) -> Command {
    Command::new("RENAMENX").arg(key).arg(new_key)
}

pub fn scan(cursor: u64, pattern: Option<&str>, count: Option<usize>) -> Command {
    with_scan_options(Command::new("SCAN").arg(cursor), pattern, count)
}

// ── Strings ────────────────────────────────────────────────────────

pub fn get<K: ToArg>(key: K) -> Command {
    Command::new("GET").arg(key)
}

pub fn set<K: ToArg, V: ToArg>(key: K, value: V) -> Command {
    Command::new("SET").arg(key).arg(value)
}

pub fn setex<K: ToArg, V: ToArg>(key: K, seconds: i64, value: V) -> Command {
    Command::new("SETEX").arg(key).arg(seconds).arg(value)
}

pub fn setnx<K: ToArg, V: ToArg>(key: K, value: V) -> Command {
    Command::new("SETNX").arg(key).arg(value)
}

pub fn incr<K: ToArg>(key: K) -> Command {
    Command::new("INCR").arg(key)
}

// ── Hashes ─────────────────────────────────────────────────────────

pub fn hget<K: ToArg, F: ToArg>(key: K, field: F) -> Command {
    Command::new("HGET").arg(key).arg(field)
}

pub fn hgetall<K: ToArg>(key: K) -> Command {
    Command::new("HGETALL").arg(key)
}

pub fn hincrby<K: ToArg, F: ToArg>(key: K, field: F, delta: i64) -> Command {
    Command::new("HINCRBY").arg(key).arg(field).arg(delta)
}

pub fn hset<K: ToArg, F: ToArg, V: ToArg>(key: K, field: F, value: V) -> Command {
    Command::new("HSET").arg(key).arg(field).arg(value)
}

pub fn hmget<K: ToArg, F: ToArg>(key: K, fields: &[F]) -> Result<Command> {
    require(fields, "field")?;
    Ok(Command::new("HMGET").arg(key).args(fields))
}

pub fn hmset<K, I, F, V>(key: K, pairs: I) -> Result<Command>
where
    K: ToArg,
    I: IntoIterator<Item = (F, V)>,
    F: ToArg,
    V: ToArg,
{
    let mut cmd = Command::new("HMSET").arg(key);
    for (field, value) in pairs {
        cmd.push(field);
        cmd.push(value);
    }
    if cmd.len() == 2 {
        return Err(Error::InvalidArgument(
            "at least one field/value pair is required".into(),
        ));
    }
    Ok(cmd)
}

pub fn hdel<K: ToArg, F: ToArg>(key: K, field: F) -> Command {
    Command::new("HDEL").arg(key).arg(field)
}

// ── Lists ──────────────────────────────────────────────────────────

pub fn blpop<K: ToArg>(keys: &[K], timeout_secs: u64) -> Result<Command> {
    require(keys, "key")?;
    Ok(Command::new("BLPOP").args(keys).arg(timeout_secs))
}

pub fn brpop<K: ToArg>(keys: &[K], timeout_secs: u64) -> Result<Command> {
    require(keys, "key")?;
    Ok(Command::new("BRPOP").args(keys).arg(timeout_secs))
}

pub fn lindex<K: ToArg>(key: K, index: i64) -> Command {
    Command::new("LINDEX").arg(key).arg(index)
}

pub fn llen<K: ToArg>(key: K) -> Command {
    Command::new("LLEN").arg(key)
}

pub fn lpop<K: ToArg>(key: K) -> Command {
    Command::new("LPOP").arg(key)
}

pub fn lpush<K: ToArg, V: ToArg>(key: K, values: &[V]) -> Result<Command> {
    require(values, "value")?;
    Ok(Command::new("LPUSH").arg(key).args(values))
}

pub fn ltrim<K: ToArg>(key: K, start: i64, stop: i64) -> Command {
    Command::new("LTRIM").arg(key).arg(start).arg(stop)
}

pub fn lrange<K: ToArg>(key: K, start: i64, stop: i64) -> Command {
    Command::new("LRANGE").arg(key).arg(start).arg(stop)
}

pub fn rpop<K: ToArg>(key: K) -> Command {
    Command::new("RPOP").arg(key)
}

pub fn rpush<K: ToArg, V: ToArg>(key: K, values: &[V]) -> Result<Command> {
    require(values, "value")?;
    Ok(Command::new("RPUSH").arg(key).args(values))
}

pub fn lrem<K: ToArg, V: ToArg>(key: K, count: i64, value: V) -> Command {
    Command::new("LREM").arg(key).arg(count).arg(value)
}

// ── Sets ───────────────────────────────────────────────────────────

pub fn sadd<K: ToArg, M: ToArg>(key: K, members: &[M]) -> Result<Command> {
    require(members, "member")?;
    Ok(Command::new("SADD").arg(key).args(members))
}

pub fn scard<K: ToArg>(key: K) -> Command {
    Command::new("SCARD").arg(key)
}

pub fn srem<K: ToArg, M: ToArg>(key: K, members: &[M]) -> Result<Command> {
    require(members, "member")?;
    Ok(Command::new("SREM").arg(key).args(members))
}

pub fn spop<K: ToArg>(key: K) -> Command {
    Command::new("SPOP").arg(key)
}

pub fn smembers<K: ToArg>(key: K) -> Command {
    Command::new("SMEMBERS").arg(key)
}

pub fn srandmember<K: ToArg>(key: K, count: i64) -> Command {
    Command::new("SRANDMEMBER").arg(key).arg(count)
}

pub fn sdiff<K: ToArg>(keys: &[K]) -> Result<Command> {
    require(keys, "key")?;
    Ok(Command::new("SDIFF").args(keys))
}

pub fn sismember<K: ToArg, M: ToArg>(key: K, member: M) -> Command {
    Command::new("SISMEMBER").arg(key).arg(member)
}

pub fn smove<S: ToArg, D: ToArg, M: ToArg>(source: S, destination: D, member: M) -> Command {
    Command::new("SMOVE").arg(source).arg(destination).arg(member)
}

pub fn sscan<K: ToArg>(key: K, cursor: u64, pattern: Option<&str>, count: Option<usize>) -> Command {
    with_scan_options(Command::new("SSCAN").arg(key).arg(cursor), pattern, count)
}

// ── Sorted sets ────────────────────────────────────────────────────

pub fn zadd<K: ToArg, M: ToArg>(key: K, members: &[(f64, M)]) -> Result<Command> {
    require(members, "score/member pair")?;
    let mut cmd = Command::new("ZADD").arg(key);
    for (score, member) in members {
        cmd.push(score);
        cmd.push(member);
    }
    Ok(cmd)
}

pub fn zcard<K: ToArg>(key: K) -> Command {
    Command::new("ZCARD").arg(key)
}

pub fn zrange<K: ToArg>(key: K, start: i64, stop: i64, with_scores: bool) -> Command {
    let cmd = Command::new("ZRANGE").arg(key).arg(start).arg(stop);
    if with_scores {
        cmd.arg("WITHSCORES")
    } else {
        cmd
    }
}

pub fn zrevrange<K: ToArg>(key: K, start: i64, stop: i64, with_scores: bool) -> Command {
    let cmd = Command::new("ZREVRANGE").arg(key).arg(start).arg(stop);
    if with_scores {
        cmd.arg("WITHSCORES")
    } else {
        cmd
    }
}

fn by_score(
    name: &str,
    key: impl ToArg,
    first: &str,
    second: &str,
    with_scores: bool,
    limit: Option<Limit>,
) -> Command {
    let mut cmd = Command::new(name).arg(key).arg(first).arg(second);
    if with_scores {
        cmd.push("WITHSCORES");
    }
    if let Some(Limit { offset, count }) = limit {
        cmd = cmd.arg("LIMIT").arg(offset).arg(count);
    }
    cmd
}

/// Bounds are passed through verbatim, so `-inf`, `+inf` and `(1.5` work.
pub fn zrangebyscore<K: ToArg>(
    key: K,
    min: &str,
    max: &str,
    with_scores: bool,
    limit: Option<Limit>,
) -> Command {
    by_score("ZRANGEBYSCORE", key, min, max, with_scores, limit)
}

/// Note the server expects `max` before `min`.
pub fn zrevrangebyscore<K: ToArg>(
    key: K,
    max: &str,
    min: &str,
    with_scores: bool,
    limit: Option<Limit>,
) -> Command {
    by_score("ZREVRANGEBYSCORE", key, max, min, with_scores, limit)
}

pub fn zrank<K: ToArg, M: ToArg>(key: K, member: M) -> Command {
    Command::new("ZRANK").arg(key).arg(member)
}

pub fn zrem<K: ToArg, M: ToArg>(key: K, members: &[M]) -> Result<Command> {
    require(members, "member")?;
    Ok(Command::new("ZREM").arg(key).args(members))
}

pub fn zremrangebyrank<K: ToArg>(key: K, start: i64, stop: i64) -> Command {
    Command::new("ZREMRANGEBYRANK").arg(key).arg(start).arg(stop)
}

pub fn zscore<K: ToArg, M: ToArg>(key: K, member: M) -> Command {
    Command::new("ZSCORE").arg(key).arg(member)
}

pub fn zincrby<K: ToArg, M: ToArg>(key: K, increment: f64, member: M) -> Command {
    Command::new("ZINCRBY").arg(key).arg(increment).arg(member)
}

pub fn zscan<K: ToArg>(key: K, cursor: u64, pattern: Option<&str>, count: Option<usize>) -> Command {
    with_scan_options(Command::new("ZSCAN").arg(key).arg(cursor), pattern, count)
}

// ── HyperLogLog ────────────────────────────────────────────────────

pub fn pfadd<K: ToArg, E: ToArg>(key: K, elements: &[E]) -> Command {
    Command::new("PFADD").arg(key).args(elements)
}

pub fn pfcount<K: ToArg>(key: K) -> Command {
    Command::new("PFCOUNT").arg(key)
}

pub fn pfmerge<D: ToArg, S: ToArg>(destination: D, sources: &[S]) -> Command {
    Command::new("PFMERGE").arg(destination).args(sources)
}
