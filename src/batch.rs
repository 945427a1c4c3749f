//! Send-only batch executors.
//!
//! A [`Pipeline`] or [`Transaction`] borrows a connection's transport for
//! the duration of one `pipelined`/`transaction` call. Its methods only
//! queue commands; replies are read after the callback returns. Every
//! queued command bumps the pending counter, and a command rejected by local
//! validation queues nothing, so draining always reads exactly as many
//! replies as the server owes.

use crate::cmd::{self, Command, Limit, ToArg};
use crate::connection::tcp::{QueueMark, Transport};
use crate::convert;
use crate::error::Result;
use crate::resp::types::RespValue;

/// The send-only command set available inside batch callbacks.
///
/// Each method queues one command and returns immediately. The reply shows
/// up at the same position in the batch result.
pub trait BatchCommands {
    fn queue(&mut self, cmd: Command) -> Result<()>;

    // ── Keys ──

    fn del<K: ToArg>(&mut self, keys: &[K]) -> Result<()> {
        self.queue(cmd::del(keys)?)
    }

    fn exists<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::exists(key))
    }

    fn expire<K: ToArg>(&mut self, key: K, seconds: i64) -> Result<()> {
        self.queue(cmd::expire(key, seconds))
    }

    fn ttl<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::ttl(key))
    }

    fn rename<K: ToArg, N: ToArg>(&mut self, key: K, new_key: N) -> Result<()> {
        self.queue(cmd::rename(key, new_key))
    }

    fn renamenx<K: ToArg, N: ToArg>(&mut self, key: K, new_key: N) -> Result<()> {
        self.queue(cmd::renamenx(key, new_key))
    }

    // ── Strings ──

    fn get<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::get(key))
    }

    fn set<K: ToArg, V: ToArg>(&mut self, key: K, value: V) -> Result<()> {
        self.queue(cmd::set(key, value))
    }

    fn setex<K: ToArg, V: ToArg>(&mut self, key: K, seconds: i64, value: V) -> Result<()> {
        self.queue(cmd::setex(key, seconds, value))
    }

    fn setnx<K: ToArg, V: ToArg>(&mut self, key: K, value: V) -> Result<()> {
        self.queue(cmd::setnx(key, value))
    }

    fn incr<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::incr(key))
    }

    // ── Hashes ──

    fn hget<K: ToArg, F: ToArg>(&mut self, key: K, field: F) -> Result<()> {
        self.queue(cmd::hget(key, field))
    }

    fn hgetall<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::hgetall(key))
    }

    fn hincrby<K: ToArg, F: ToArg>(&mut self, key: K, field: F, delta: i64) -> Result<()> {
        self.queue(cmd::hincrby(key, field, delta))
    }

    fn hset<K: ToArg, F: ToArg, V: ToArg>(&mut self, key: K, field: F, value: V) -> Result<()> {
        self.queue(cmd::hset(key, field, value))
    }

    fn hmget<K: ToArg, F: ToArg>(&mut self, key: K, fields: &[F]) -> Result<()> {
        self.queue(cmd::hmget(key, fields)?)
    }

    fn hmset<K, I, F, V>(&mut self, key: K, pairs: I) -> Result<()>
    where
        K: ToArg,
        I: IntoIterator<Item = (F, V)>,
        F: ToArg,
        V: ToArg,
    {
        self.queue(cmd::hmset(key, pairs)?)
    }

    fn hdel<K: ToArg, F: ToArg>(&mut self, key: K, field: F) -> Result<()> {
        self.queue(cmd::hdel(key, field))
    }

    // ── Lists ──

    fn lpop<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::lpop(key))
    }

    fn lpush<K: ToArg, V: ToArg>(&mut self, key: K, values: &[V]) -> Result<()> {
        self.queue(cmd::lpush(key, values)?)
    }

    fn ltrim<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::ltrim(key, start, stop))
    }

    fn lrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::lrange(key, start, stop))
    }

    fn rpop<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::rpop(key))
    }

    fn rpush<K: ToArg, V: ToArg>(&mut self, key: K, values: &[V]) -> Result<()> {
        self.queue(cmd::rpush(key, values)?)
    }

    // ── Sets ──

    fn sadd<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<()> {
        self.queue(cmd::sadd(key, members)?)
    }

    fn srem<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<()> {
        self.queue(cmd::srem(key, members)?)
    }

    fn spop<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::spop(key))
    }

    fn smembers<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::smembers(key))
    }

    fn smove<S: ToArg, D: ToArg, M: ToArg>(&mut self, source: S, destination: D, member: M) -> Result<()> {
        self.queue(cmd::smove(source, destination, member))
    }

    fn srandmember<K: ToArg>(&mut self, key: K, count: i64) -> Result<()> {
        self.queue(cmd::srandmember(key, count))
    }

    fn sdiff<K: ToArg>(&mut self, keys: &[K]) -> Result<()> {
        self.queue(cmd::sdiff(keys)?)
    }

    // ── Sorted sets ──

    fn zadd<K: ToArg, M: ToArg>(&mut self, key: K, members: &[(f64, M)]) -> Result<()> {
        self.queue(cmd::zadd(key, members)?)
    }

    fn zcard<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::zcard(key))
    }

    fn zrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::zrange(key, start, stop, false))
    }

    fn zrange_with_scores<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::zrange(key, start, stop, true))
    }

    fn zrangebyscore<K: ToArg>(&mut self, key: K, min: &str, max: &str) -> Result<()> {
        self.queue(cmd::zrangebyscore(key, min, max, false, None))
    }

    fn zrangebyscore_with_scores<K: ToArg>(&mut self, key: K, min: &str, max: &str) -> Result<()> {
        self.queue(cmd::zrangebyscore(key, min, max, true, None))
    }

    fn zrangebyscore_with_limit<K: ToArg>(
        &mut self,
        key: K,
        min: &str,
        max: &str,
        limit: Limit,
    ) -> Result<()> {
        self.queue(cmd::zrangebyscore(key, min, max, false, Some(limit)))
    }

    fn zrangebyscore_with_scores_with_limit<K: ToArg>(
        &mut self,
        key: K,
        min: &str,
        max: &str,
        limit: Limit,
    ) -> Result<()> {
        self.queue(cmd::zrangebyscore(key, min, max, true, Some(limit)))
    }

    fn zrevrange<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::zrevrange(key, start, stop, false))
    }

    fn zrevrange_with_scores<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::zrevrange(key, start, stop, true))
    }

    fn zrevrangebyscore<K: ToArg>(&mut self, key: K, max: &str, min: &str) -> Result<()> {
        self.queue(cmd::zrevrangebyscore(key, max, min, false, None))
    }

    fn zrevrangebyscore_with_scores<K: ToArg>(&mut self, key: K, max: &str, min: &str) -> Result<()> {
        self.queue(cmd::zrevrangebyscore(key, max, min, true, None))
    }

    fn zrevrangebyscore_with_limit<K: ToArg>(
        &mut self,
        key: K,
        max: &str,
        min: &str,
        limit: Limit,
    ) -> Result<()> {
        self.queue(cmd::zrevrangebyscore(key, max, min, false, Some(limit)))
    }

    fn zrevrangebyscore_with_scores_with_limit<K: ToArg>(
        &mut self,
        key: K,
        max: &str,
        min: &str,
        limit: Limit,
    ) -> Result<()> {
        self.queue(cmd::zrevrangebyscore(key, max, min, true, Some(limit)))
    }

    fn zrank<K: ToArg, M: ToArg>(&mut self, key: K, member: M) -> Result<()> {
        self.queue(cmd::zrank(key, member))
    }

    fn zrem<K: ToArg, M: ToArg>(&mut self, key: K, members: &[M]) -> Result<()> {
        self.queue(cmd::zrem(key, members)?)
    }

    fn zremrangebyrank<K: ToArg>(&mut self, key: K, start: i64, stop: i64) -> Result<()> {
        self.queue(cmd::zremrangebyrank(key, start, stop))
    }

    fn zscore<K: ToArg, M: ToArg>(&mut self, key: K, member: M) -> Result<()> {
        self.queue(cmd::zscore(key, member))
    }

    fn zincrby<K: ToArg, M: ToArg>(&mut self, key: K, increment: f64, member: M) -> Result<()> {
        self.queue(cmd::zincrby(key, increment, member))
    }

    // ── HyperLogLog ──

    fn pfadd<K: ToArg, E: ToArg>(&mut self, key: K, elements: &[E]) -> Result<()> {
        self.queue(cmd::pfadd(key, elements))
    }

    fn pfcount<K: ToArg>(&mut self, key: K) -> Result<()> {
        self.queue(cmd::pfcount(key))
    }

    fn pfmerge<D: ToArg, S: ToArg>(&mut self, destination: D, sources: &[S]) -> Result<()> {
        self.queue(cmd::pfmerge(destination, sources))
    }
}

/// Commands queued for one round-trip; replies come back as a list.
pub struct Pipeline<'a> {
    transport: &'a mut Transport,
    pending: usize,
    mark: QueueMark,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(transport: &'a mut Transport) -> Self {
        let mark = transport.mark();
        Self {
            transport,
            pending: 0,
            mark,
        }
    }

    /// Commands queued through this pipeline and not yet drained.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Forget everything queued since the pipeline was created.
    pub(crate) fn rollback(mut self) {
        let queued = self.pending;
        self.transport.rollback(self.mark);
        tracing::debug!(queued, "batch callback failed, queue rolled back");
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.transport.flush().await
    }

    /// Read exactly `pending` replies in send order.
    ///
    /// An empty pipeline returns at once without touching the socket. The
    /// first error reply or transport failure aborts the drain; replies
    /// still owed stay counted on the transport and are discarded before the
    /// connection is used again.
    pub(crate) async fn drain(&mut self) -> Result<Vec<RespValue>> {
        if self.pending == 0 {
            return Ok(Vec::new());
        }
        self.transport.flush().await?;

        let mut replies = Vec::with_capacity(self.pending);
        for _ in 0..self.pending {
            replies.push(self.transport.read_reply().await?.into_result()?);
        }
        self.pending = 0;
        Ok(replies)
    }
}

impl BatchCommands for Pipeline<'_> {
    fn queue(&mut self, cmd: Command) -> Result<()> {
        self.transport.send(&cmd)?;
        self.pending += 1;
        Ok(())
    }
}

/// Commands wrapped in `MULTI` … `EXEC` and applied atomically.
///
/// Replies are not available per command; the `EXEC` reply array is the
/// result of the whole transaction.
pub struct Transaction<'a> {
    inner: Pipeline<'a>,
}

impl<'a> Transaction<'a> {
    /// Queue `MULTI`. The mark is taken first so a rollback removes it too.
    pub(crate) fn begin(transport: &'a mut Transport) -> Result<Self> {
        let mut inner = Pipeline::new(transport);
        inner.transport.send(&cmd::multi())?;
        Ok(Self { inner })
    }

    /// Commands queued inside the transaction, `MULTI` excluded.
    pub fn pending(&self) -> usize {
        self.inner.pending
    }

    pub(crate) fn rollback(self) {
        self.inner.rollback();
    }

    /// Send `EXEC` and return its reply array.
    ///
    /// A command the server refused to queue fails the whole call with that
    /// command's error. A nil `EXEC` reply (transaction aborted) is
    /// [`Error::Nil`](crate::Error::Nil).
    pub(crate) async fn commit(mut self) -> Result<Vec<RespValue>> {
        let queued = self.inner.pending;
        let reply = self.inner.transport.execute(&cmd::exec()).await;
        tracing::trace!(queued, ok = reply.is_ok(), "transaction executed");
        convert::values(reply)
    }
}

impl BatchCommands for Transaction<'_> {
    fn queue(&mut self, cmd: Command) -> Result<()> {
        self.inner.queue(cmd)
    }
}
