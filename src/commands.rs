//! Typed command surface.
//!
//! [`Commands`] has one required method, [`call`](Commands::call), which
//! runs a single command and returns its raw reply. Every typed method is a
//! default method built from a [`cmd`] constructor and a [`convert`]
//! helper, so a connection and a pool expose exactly the same API:
//!
//! ```ignore
//! use typedis::{Commands, Pool, PoolConfig};
//!
//! let mut pool = Pool::new("redis://127.0.0.1:6379", PoolConfig::default())?;
//! pool.set("greeting", "hello").await?;
//! assert_eq!(pool.get("greeting").await?, "hello");
//! ```
//!
//! On a pool every call leases a connection and releases it afterwards; use
//! [`Pool::get_connection`] to issue several commands on one connection.

use std::collections::HashMap;

use crate::cmd::{self, Command, Limit, ToArg};
use crate::connection::{Connection, Pool};
use crate::convert::{self, ZMember};
use crate::error::Result;
use crate::resp::types::RespValue;

#[allow(async_fn_in_trait)]
pub trait Commands {
    /// Run one command and return its reply. Server error replies are
    /// returned as `Err`.
    async fn call(&mut self, cmd: Command) -> Result<RespValue>;

    async fn ping(&mut self) -> Result<bool> {
        let reply = self.call(cmd::ping()).await?;
        Ok(matches!(reply, RespValue::SimpleString(ref s) if s == "PONG"))
    }

    // ── Keys ──

    /// Number of keys removed.
    async fn del<K: ToArg>(&mut self, keys: &[K]) -> Result<i64> {
        convert::int(self.call(cmd::del(keys)?).await)
    }

    async fn exists<K: ToArg>(&mut self, key: K) -> Result<bool> {
        convert::boolean(self.call(cmd::exists(key)).await)
    }

    /// False if the key does not exist.
    async fn expire<K: ToArg>(&mut self, key: K, seconds: i64) -> Result<bool> {
        convert::boolean(self.call(cmd::expire(key, seconds)).await)
    }

    /// Remaining time to live in seconds; `-1` without expiry, `-2` if
    /// the key does not exist.
    async fn ttl<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::ttl(key)).await)
    }

    async fn rename<K: ToArg, N: ToArg>(&mut self, key: K, new_key: N) -> Result<()> {
        convert::ok(self.call(cmd::rename(key, new_key)).await)
    }

    async fn renamenx<K: ToArg, N: ToArg>(&mut self, key: K, new_key: N) -> Result<bool> {
        convert::boolean(self.call(cmd::renamenx(key, new_key)).await)
    }

    /// One `SCAN` step. Returns the next cursor (0 when done) and the keys.
    async fn scan(
        &mut self,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<String>)> {
        convert::scan_page(self.call(cmd::scan(cursor, pattern, count)).await)
    }

    // ── Strings ──

    /// [`Error::Nil`](crate::Error::Nil) if the key does not exist.
    async fn get<K: ToArg>(&mut self, key: K) -> Result<String> {
        convert::string(self.call(cmd::get(key)).await)
    }

    async fn set<K: ToArg, V: ToArg>(&mut self, key: K, value: V) -> Result<()> {
        convert::ok(self.call(cmd::set(key, value)).await)
    }

    async fn setex<K: ToArg, V: ToArg>(&mut self, key: K, seconds: i64, value: V) -> Result<()> {
        convert::ok(self.call(cmd::setex(key, seconds, value)).await)
    }

    async fn setnx<K: ToArg, V: ToArg>(&mut self, key: K, value: V) -> Result<bool> {
        convert::boolean(self.call(cmd::setnx(key, value)).await)
    }

    async fn incr<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::incr(key)).await)
    }

    // ── Hashes ──

    async fn hget<K: ToArg, F: ToArg>(&mut self, key: K, field: F) -> Result<String> {
        convert::string(self.call(cmd::hget(key, field)).await)
    }

    async fn hgetall<K: ToArg>(&mut self, key: K) -> Result<HashMap<String, String>> {
        convert::string_map(self.call(cmd::hgetall(key)).await)
    }

    async fn hincrby<K: ToArg, F: ToArg>(&mut self, key: K, field: F, delta: i64) -> Result<i64> {
        convert::int(self.call(cmd::hincrby(key, field, delta)).await)
    }

    /// True if the field is new.
    async fn hset<K: ToArg, F: ToArg, V: ToArg>(&mut self, key: K, field: F, value: V) -> Result<bool> {
        convert::boolean(self.call(cmd::hset(key, field, value)).await)
    }

    /// Requested fields mapped to their values; missing fields map to `""`.
    async fn hmget<K, F>(&mut self, key: K, fields: &[F]) -> Result<HashMap<String, String>>
    where
        K: ToArg,
        F: ToArg + AsRef<str>,
    {
        let reply = self.call(cmd::hmget(key, fields)?).await;
        convert::splice_map(fields, reply)
    }

    async fn hmset<K, I, F, V>(&mut self, key: K, pairs: I) -> Result<()>
    where
        K: ToArg,
        I: IntoIterator<Item = (F, V)>,
        F: ToArg,
        V: ToArg,
    {
        convert::ok(self.call(cmd::hmset(key, pairs)?).await)
    }

    async fn hdel<K: ToArg, F: ToArg>(&mut self, key: K, field: F) -> Result<bool> {
        convert::boolean(self.call(cmd::hdel(key, field)).await)
    }

    // ── Lists ──

    /// Blocks up to `timeout_secs` (0 = forever). Returns the key popped
    /// from and the value; a timeout is [`Error::Nil`](crate::Error::Nil).
    async fn blpop<K: ToArg>(&mut self, keys: &[K], timeout_secs: u64) -> Result<(String, String)> {
        convert::key_value(self.call(cmd::blpop(keys, timeout_secs)?).await)
    }

    async fn brpop<K: ToArg>(&mut self, keys: &[K], timeout_secs: u64) -> Result<(String, String)> {
        convert::key_value(self.call(cmd::brpop(keys, timeout_secs)?).await)
    }

    async fn lindex<K: ToArg>(&mut self, key: K, index: i64) -> Result<String> {
        convert::string(self.call(cmd::lindex(key, index)).await)
    }

    async fn llen<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::llen(key)).await)
    }

    async fn lpop<K: ToArg>(&mut self, key: K) -> Result<String> {
        convert::string(self.call(cmd::lpop(key)).await)
    }

    /// Length of the list after the push.
    async fn lpush<K: ToArg, V: ToArg>(&mut self, key: K, values: &[V]) -> Result<i64> {
        convert::int(self.call(cmd::lpush(key, values)?).await)
    }

    async fn ltrim<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        convert::ok(self.call(cmd::ltrim(key, start, stop)).await)
    }

    async fn lrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::lrange(key, start, stop)).await)
    }

    async fn rpop<K: ToArg>(&mut self, key: K) -> Result<String> {
        convert::string(self.call(cmd::rpop(key)).await)
    }

    async fn rpush<K: ToArg, V: ToArg>(&mut self, key: K, values: &[V]) -> Result<i64> {
        convert::int(self.call(cmd::rpush(key, values)?).await)
    }

    /// Number of elements removed.
    async fn lrem<K: ToArg, V: ToArg>(&mut self, key: K, count: i64, value: V) -> Result<i64> {
        convert::int(self.call(cmd::lrem(key, count, value)).await)
    }

    // ── Sets ──

    async fn sadd<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<i64> {
        convert::int(self.call(cmd::sadd(key, members)?).await)
    }

    async fn scard<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::scard(key)).await)
    }

    async fn srem<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<i64> {
        convert::int(self.call(cmd::srem(key, members)?).await)
    }

    async fn spop<K: ToArg>(&mut self, key: K) -> Result<String> {
        convert::string(self.call(cmd::spop(key)).await)
    }

    async fn smembers<K: ToArg>(&mut self, key: K) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::smembers(key)).await)
    }

    /// Up to `count` random members; a negative count allows repeats.
    async fn srandmember<K: ToArg>(&mut self, key: K, count: i64) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::srandmember(key, count)).await)
    }

    /// Members of the first set missing from all the others.
    async fn sdiff<K: ToArg>(&mut self, keys: &[K]) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::sdiff(keys)?).await)
    }

    async fn sismember<K: ToArg, M: ToArg>(&mut self, key: K, member: M) -> Result<bool> {
        convert::boolean(self.call(cmd::sismember(key, member)).await)
    }

    async fn smove<S: ToArg, D: ToArg, M: ToArg>(
        &mut self,
        source: S,
        destination: D,
        member: M,
    ) -> Result<bool> {
        convert::boolean(self.call(cmd::smove(source, destination, member)).await)
    }

    async fn sscan<K: ToArg>(
        &mut self,
        key: K,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<String>)> {
        convert::scan_page(self.call(cmd::sscan(key, cursor, pattern, count)).await)
    }

    // ── Sorted sets ──

    /// Number of members added (score updates are not counted).
    async fn zadd<K: ToArg, M: ToArg>(&mut self, key: K, members: &[(f64, M)]) -> Result<i64> {
        convert::int(self.call(cmd::zadd(key, members)?).await)
    }

    async fn zcard<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::zcard(key)).await)
    }

    async fn zrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrange(key, start, stop, false)).await)
    }

    async fn zrange_with_scores<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrange(key, start, stop, true)).await)
    }

    async fn zrevrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrevrange(key, start, stop, false)).await)
    }

    async fn zrevrange_with_scores<K: ToArg>(
        &mut self,
        key: K,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrevrange(key, start, stop, true)).await)
    }

    /// Score bounds are strings so `-inf`, `+inf` and exclusive `(1.5`
    /// bounds can be expressed.
    async fn zrangebyscore<K: ToArg>(&mut self, key: K, min: &str, max: &str) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrangebyscore(key, min, max, false, None)).await)
    }

    async fn zrangebyscore_with_scores<K: ToArg>(
        &mut self,
        key: K,
        min: &str,
        max: &str,
    ) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrangebyscore(key, min, max, true, None)).await)
    }

    async fn zrangebyscore_with_limit<K: ToArg>(
        &mut self,
        key: K,
        min: &str,
        max: &str,
        limit: Limit,
    ) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrangebyscore(key, min, max, false, Some(limit))).await)
    }

    async fn zrangebyscore_with_scores_with_limit<K: ToArg>(
        &mut self,
        key: K,
        min: &str,
        max: &str,
        limit: Limit,
    ) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrangebyscore(key, min, max, true, Some(limit))).await)
    }

    async fn zrevrangebyscore<K: ToArg>(&mut self, key: K, max: &str, min: &str) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrevrangebyscore(key, max, min, false, None)).await)
    }

    async fn zrevrangebyscore_with_scores<K: ToArg>(
        &mut self,
        key: K,
        max: &str,
        min: &str,
    ) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrevrangebyscore(key, max, min, true, None)).await)
    }

    async fn zrevrangebyscore_with_limit<K: ToArg>(
        &mut self,
        key: K,
        max: &str,
        min: &str,
        limit: Limit,
    ) -> Result<Vec<String>> {
        convert::strings(self.call(cmd::zrevrangebyscore(key, max, min, false, Some(limit))).await)
    }

    async fn zrevrangebyscore_with_scores_with_limit<K: ToArg>(
        &mut self,
        key: K,
        max: &str,
        min: &str,
        limit: Limit,
    ) -> Result<Vec<ZMember>> {
        convert::z_members(self.call(cmd::zrevrangebyscore(key, max, min, true, Some(limit))).await)
    }

    /// [`Error::Nil`](crate::Error::Nil) if the member is absent.
    async fn zrank<K: ToArg, M: ToArg>(&mut self, key: K, member: M) -> Result<i64> {
        convert::int(self.call(cmd::zrank(key, member)).await)
    }

    /// Removing nothing is not an error: an empty `members` returns 0
    /// without a round-trip.
    async fn zrem<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        convert::int(self.call(cmd::zrem(key, members)?).await)
    }

    async fn zremrangebyrank<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<i64> {
        convert::int(self.call(cmd::zremrangebyrank(key, start, stop)).await)
    }

    async fn zscore<K: ToArg, M: ToArg>(&mut self, key: K, member: M) -> Result<f64> {
        convert::float(self.call(cmd::zscore(key, member)).await)
    }

    /// The member's new score.
    async fn zincrby<K: ToArg, M: ToArg>(&mut self, key: K, increment: f64, member: M) -> Result<f64> {
        convert::float(self.call(cmd::zincrby(key, increment, member)).await)
    }

    async fn zscan<K: ToArg>(
        &mut self,
        key: K,
        cursor: u64,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(u64, Vec<ZMember>)> {
        convert::zscan_page(self.call(cmd::zscan(key, cursor, pattern, count)).await)
    }

    // ── HyperLogLog ──

    /// True if the estimated cardinality changed.
    async fn pfadd<K: ToArg, E: ToArg>(&mut self, key: K, elements: &[E]) -> Result<bool> {
        convert::boolean(self.call(cmd::pfadd(key, elements)).await)
    }

    async fn pfcount<K: ToArg>(&mut self, key: K) -> Result<i64> {
        convert::int(self.call(cmd::pfcount(key)).await)
    }

    async fn pfmerge<D: ToArg, S: ToArg>(&mut self, destination: D, sources: &[S]) -> Result<bool> {
        convert::ok(self.call(cmd::pfmerge(destination, sources)).await)?;
        Ok(true)
    }
}

impl Commands for Connection {
    async fn call(&mut self, cmd: Command) -> Result<RespValue> {
        self.execute(&cmd).await
    }
}

/// Each call leases its own connection.
impl Commands for Pool {
    async fn call(&mut self, cmd: Command) -> Result<RespValue> {
        let mut conn = self.get_connection().await?;
        conn.execute(&cmd).await
    }
}
