//! Integration tests: pipelined execution against the mock server.

mod common;

use bytes::Bytes;
use common::*;
use typedis::{BatchCommands, Commands, Error, PoolConfig, RedisErrorKind, RespValue};

#[tokio::test]
async fn pipeline_set_get() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());

    let results = pool
        .pipelined(|p| {
            p.set("a", "hello")?;
            p.set("b", "world")?;
            p.get("a")?;
            p.get("b")
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0], RespValue::SimpleString("OK".into()));
    assert_eq!(results[1], RespValue::SimpleString("OK".into()));
    assert_eq!(results[2], RespValue::BulkString(Bytes::from_static(b"hello")));
    assert_eq!(results[3], RespValue::BulkString(Bytes::from_static(b"world")));
    assert_eq!(server.log(), ["SET a hello", "SET b world", "GET a", "GET b"]);
}

#[tokio::test]
async fn pipeline_empty() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());

    let results = pool.pipelined(|_| Ok(())).await.unwrap();
    assert!(results.is_empty());
    assert!(server.log().is_empty());
}

#[tokio::test]
async fn pipeline_counts_pending_commands() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());
    let mut conn = pool.get_connection().await.unwrap();

    let results = conn
        .pipelined(|p| {
            p.rpush("l", &["x", "y"])?;
            assert_eq!(p.pending(), 1);
            p.lrange("l", 0, -1)?;
            p.rpush("l", &["z"])?;
            assert_eq!(p.pending(), 3);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(results[0], RespValue::Integer(2));
    assert_eq!(results[1].clone().into_array().map(|a| a.len()), Some(2));
    assert_eq!(results[2], RespValue::Integer(3));
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn pipeline_error_reply_surfaces_and_connection_recovers() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default().max_open(1));

    let err = pool
        .pipelined(|p| {
            p.set("s", "text")?;
            p.lpush("s", &["x"])?;
            p.incr("counter")
        })
        .await
        .unwrap_err();
    assert_eq!(err.redis_kind(), Some(&RedisErrorKind::WrongType));

    // same connection, with the unread INCR reply skipped
    let mut pool = pool;
    assert_eq!(pool.get("counter").await.unwrap(), "1");
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn pipeline_callback_error_sends_nothing() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());

    let err = pool
        .pipelined(|p| {
            p.set("a", "1")?;
            let none: &[&str] = &[];
            p.del(none)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(server.log().is_empty());
}

#[tokio::test]
async fn pipeline_discarding_applies_writes() {
    let server = MockServer::start().await;
    let mut pool = server.pool(None, PoolConfig::default().max_open(1));

    pool.pipelined_discarding(|p| {
        p.set("a", "1")?;
        p.hset("h", "f", "v")?;
        p.incr("a")
    })
    .await
    .unwrap();

    assert_eq!(pool.get("a").await.unwrap(), "2");
    assert_eq!(pool.hget("h", "f").await.unwrap(), "v");
}

#[tokio::test]
async fn manual_send_flush_receive() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());
    let mut conn = pool.get_connection().await.unwrap();

    conn.send(&typedis::cmd::set("k", "v")).unwrap();
    conn.send(&typedis::cmd::get("k")).unwrap();
    conn.flush().await.unwrap();
    assert_eq!(conn.receive().await.unwrap(), RespValue::SimpleString("OK".into()));
    assert_eq!(conn.receive().await.unwrap().as_str(), Some("v"));
}

#[tokio::test]
async fn pipeline_replies_arrive_in_order() {
    let server = MockServer::start().await;
    let pool = server.pool(None, PoolConfig::default());

    let results = pool
        .pipelined(|p| {
            for i in 0..5 {
                p.lpush("queue", &[i])?;
            }
            Ok(())
        })
        .await
        .unwrap();

    let lengths: Vec<_> = results.iter().map(|r| r.as_int()).collect();
    assert_eq!(lengths, [Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert_eq!(server.count("LPUSH"), 5);
}
