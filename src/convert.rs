//! Reply conversion helpers.
//!
//! Each helper takes the raw `Result<RespValue>` of a call and projects it
//! into a Rust type, passing errors through untouched so the typed layer can
//! chain them without ceremony. Nil replies become [`Error::Nil`].

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::resp::types::RespValue;

/// One sorted-set member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ZMember {
    pub member: String,
    pub score: f64,
}

fn unexpected(want: &str, got: &RespValue) -> Error {
    Error::Type(format!("expected {want}, got {}", got.type_name()))
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Type(format!("reply is not valid UTF-8: {e}")))
}

fn parse_num<T: std::str::FromStr>(bytes: &[u8], want: &str) -> Result<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            Error::Type(format!(
                "cannot parse {:?} as {want}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

pub fn int(reply: Result<RespValue>) -> Result<i64> {
    match reply? {
        RespValue::Integer(n) => Ok(n),
        RespValue::BulkString(b) => parse_num(&b, "integer"),
        RespValue::SimpleString(s) => parse_num(s.as_bytes(), "integer"),
        RespValue::Null => Err(Error::Nil),
        RespValue::Error(msg) => Err(Error::redis(msg)),
        other => Err(unexpected("integer", &other)),
    }
}

pub fn boolean(reply: Result<RespValue>) -> Result<bool> {
    match reply? {
        RespValue::Integer(n) => Ok(n != 0),
        RespValue::BulkString(b) => match &b[..] {
            b"1" | b"true" => Ok(true),
            b"0" | b"false" => Ok(false),
            _ => Err(Error::Type(format!(
                "cannot parse {:?} as bool",
                String::from_utf8_lossy(&b)
            ))),
        },
        RespValue::Null => Err(Error::Nil),
        RespValue::Error(msg) => Err(Error::redis(msg)),
        other => Err(unexpected("integer", &other)),
    }
}

pub fn string(reply: Result<RespValue>) -> Result<String> {
    match reply? {
        RespValue::BulkString(b) => utf8(&b),
        RespValue::SimpleString(s) => Ok(s),
        RespValue::Null => Err(Error::Nil),
        RespValue::Error(msg) => Err(Error::redis(msg)),
        other => Err(unexpected("string", &other)),
    }
}

/// An array of strings; nil elements become `""`.
pub fn strings(reply: Result<RespValue>) -> Result<Vec<String>> {
    values(reply)?
        .into_iter()
        .map(|v| match v {
            RespValue::Null => Ok(String::new()),
            v => string(Ok(v)),
        })
        .collect()
}

pub fn float(reply: Result<RespValue>) -> Result<f64> {
    match reply? {
        RespValue::BulkString(b) => parse_num(&b, "float"),
        RespValue::SimpleString(s) => parse_num(s.as_bytes(), "float"),
        RespValue::Integer(n) => Ok(n as f64),
        RespValue::Null => Err(Error::Nil),
        RespValue::Error(msg) => Err(Error::redis(msg)),
        other => Err(unexpected("float", &other)),
    }
}

pub fn values(reply: Result<RespValue>) -> Result<Vec<RespValue>> {
    match reply? {
        RespValue::Array(items) => Ok(items),
        RespValue::Null => Err(Error::Nil),
        RespValue::Error(msg) => Err(Error::redis(msg)),
        other => Err(unexpected("array", &other)),
    }
}

/// The status reply must be exactly `OK`.
pub fn ok(reply: Result<RespValue>) -> Result<()> {
    let status = string(reply)?;
    if status != "OK" {
        return Err(Error::Type(format!("result is {status} rather than OK")));
    }
    Ok(())
}

/// Alternating field/value arrays such as the `HGETALL` reply.
pub fn string_map(reply: Result<RespValue>) -> Result<HashMap<String, String>> {
    let flat = strings(reply)?;
    if flat.len() % 2 != 0 {
        return Err(Error::Type(
            "cannot convert reply to map as it has an odd number of values".into(),
        ));
    }
    let mut map = HashMap::with_capacity(flat.len() / 2);
    let mut it = flat.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        map.insert(k, v);
    }
    Ok(map)
}

/// Pair the requested `fields` with the positional `HMGET` reply.
/// Missing fields map to `""`.
pub fn splice_map<F: AsRef<str>>(
    fields: &[F],
    reply: Result<RespValue>,
) -> Result<HashMap<String, String>> {
    let vals = strings(reply)?;
    if vals.len() != fields.len() {
        return Err(Error::Type(format!(
            "cannot splice {} fields with {} values",
            fields.len(),
            vals.len()
        )));
    }
    Ok(fields
        .iter()
        .map(|f| f.as_ref().to_string())
        .zip(vals)
        .collect())
}

/// `member score member score …` as returned with `WITHSCORES`.
pub fn z_members(reply: Result<RespValue>) -> Result<Vec<ZMember>> {
    let flat = values(reply)?;
    if flat.len() % 2 != 0 {
        return Err(Error::Type(
            "sorted set values with scores are odd-numbered".into(),
        ));
    }
    let mut members = Vec::with_capacity(flat.len() / 2);
    let mut it = flat.into_iter();
    while let (Some(member), Some(score)) = (it.next(), it.next()) {
        members.push(ZMember {
            member: string(Ok(member))?,
            score: float(Ok(score))?,
        });
    }
    Ok(members)
}

/// The `[key, value]` pair from `BLPOP`/`BRPOP`. A timeout yields `Nil`.
pub fn key_value(reply: Result<RespValue>) -> Result<(String, String)> {
    let mut pair = values(reply)?.into_iter();
    match (pair.next(), pair.next(), pair.next()) {
        (Some(k), Some(v), None) => Ok((string(Ok(k))?, string(Ok(v))?)),
        _ => Err(Error::Type("expected a two-element array".into())),
    }
}

fn cursor_page(reply: Result<RespValue>) -> Result<(u64, RespValue)> {
    let mut page = values(reply)?.into_iter();
    let cursor = match page.next() {
        Some(c) => {
            let n = int(Ok(c))?;
            u64::try_from(n).map_err(|_| Error::Type(format!("negative cursor {n}")))?
        }
        None => return Ok((0, RespValue::Array(Vec::new()))),
    };
    Ok((cursor, page.next().unwrap_or(RespValue::Array(Vec::new()))))
}

/// `[cursor, [item…]]` from `SCAN`/`SSCAN`.
pub fn scan_page(reply: Result<RespValue>) -> Result<(u64, Vec<String>)> {
    let (cursor, items) = cursor_page(reply)?;
    Ok((cursor, strings(Ok(items))?))
}

/// `[cursor, [member score …]]` from `ZSCAN`.
pub fn zscan_page(reply: Result<RespValue>) -> Result<(u64, Vec<ZMember>)> {
    let (cursor, items) = cursor_page(reply)?;
    Ok((cursor, z_members(Ok(items))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn arr(items: Vec<RespValue>) -> Result<RespValue> {
        Ok(RespValue::Array(items))
    }

    #[test]
    fn int_conversions() {
        assert_eq!(int(Ok(RespValue::Integer(5))).unwrap(), 5);
        assert_eq!(int(Ok(bulk("-12"))).unwrap(), -12);
        assert!(int(Ok(RespValue::Null)).unwrap_err().is_nil());
        assert!(matches!(int(Ok(bulk("x"))), Err(Error::Type(_))));
        assert!(matches!(
            int(Ok(RespValue::Error("WRONGTYPE nope".into()))),
            Err(Error::Redis { .. })
        ));
        assert!(matches!(int(Err(Error::PoolExhausted)), Err(Error::PoolExhausted)));
    }

    #[test]
    fn boolean_conversions() {
        assert!(boolean(Ok(RespValue::Integer(1))).unwrap());
        assert!(!boolean(Ok(RespValue::Integer(0))).unwrap());
        assert!(boolean(Ok(bulk("1"))).unwrap());
        assert!(boolean(Ok(RespValue::Null)).unwrap_err().is_nil());
    }

    #[test]
    fn string_nil_is_distinct_from_empty() {
        assert_eq!(string(Ok(bulk(""))).unwrap(), "");
        assert!(string(Ok(RespValue::Null)).unwrap_err().is_nil());
        assert_eq!(string(Ok(RespValue::SimpleString("OK".into()))).unwrap(), "OK");
        assert!(matches!(
            string(Ok(RespValue::BulkString(Bytes::from_static(&[0xff])))),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn strings_turn_nil_elements_into_empty() {
        let v = strings(arr(vec![bulk("a"), RespValue::Null, bulk("c")])).unwrap();
        assert_eq!(v, ["a", "", "c"]);
    }

    #[test]
    fn float_conversions() {
        assert_eq!(float(Ok(bulk("1.5"))).unwrap(), 1.5);
        assert_eq!(float(Ok(bulk("inf"))).unwrap(), f64::INFINITY);
        assert_eq!(float(Ok(RespValue::Integer(3))).unwrap(), 3.0);
        assert!(float(Ok(RespValue::Null)).unwrap_err().is_nil());
    }

    #[test]
    fn ok_status() {
        ok(Ok(RespValue::SimpleString("OK".into()))).unwrap();
        let err = ok(Ok(RespValue::SimpleString("QUEUED".into()))).unwrap_err();
        assert_eq!(err.to_string(), "type error: result is QUEUED rather than OK");
    }

    #[test]
    fn string_map_pairs() {
        let m = string_map(arr(vec![bulk("f1"), bulk("v1"), bulk("f2"), bulk("v2")])).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["f1"], "v1");
        assert_eq!(m["f2"], "v2");
        assert!(string_map(arr(vec![bulk("f1")])).is_err());
        assert!(string_map(arr(vec![])).unwrap().is_empty());
    }

    #[test]
    fn splice_map_fills_missing_with_empty() {
        let m = splice_map(&["a", "b"], arr(vec![bulk("1"), RespValue::Null])).unwrap();
        assert_eq!(m["a"], "1");
        assert_eq!(m["b"], "");
        assert!(splice_map(&["a"], arr(vec![])).is_err());
    }

    #[test]
    fn z_members_pairs() {
        let z = z_members(arr(vec![bulk("one"), bulk("1"), bulk("two"), bulk("2.5")])).unwrap();
        assert_eq!(
            z,
            vec![
                ZMember { member: "one".into(), score: 1.0 },
                ZMember { member: "two".into(), score: 2.5 },
            ]
        );
        assert!(z_members(arr(vec![bulk("one")])).is_err());
    }

    #[test]
    fn key_value_pop() {
        let (k, v) = key_value(arr(vec![bulk("list"), bulk("x")])).unwrap();
        assert_eq!((k.as_str(), v.as_str()), ("list", "x"));
        assert!(key_value(Ok(RespValue::Null)).unwrap_err().is_nil());
    }

    #[test]
    fn scan_pages() {
        let (cursor, keys) =
            scan_page(arr(vec![bulk("17"), RespValue::Array(vec![bulk("a"), bulk("b")])])).unwrap();
        assert_eq!(cursor, 17);
        assert_eq!(keys, ["a", "b"]);

        let (cursor, members) =
            zscan_page(arr(vec![bulk("0"), RespValue::Array(vec![bulk("m"), bulk("4")])]))
                .unwrap();
        assert_eq!(cursor, 0);
        assert_eq!(members, vec![ZMember { member: "m".into(), score: 4.0 }]);

        let (cursor, keys) = scan_page(arr(vec![])).unwrap();
        assert_eq!((cursor, keys.len()), (0, 0));
    }
}
