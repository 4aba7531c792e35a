//! Typed key records
//!
//! A record is `[type byte][key string][payload]`. Collection payloads are a
//! count followed by that many strings (pairs for hashes). Sorted-set scores
//! are stored as 8-byte big-endian IEEE-754 doubles.

use super::encoding::{ensure, read_plain_length, read_string, write_length, write_string};
use super::{TYPE_HASH, TYPE_LIST, TYPE_SET, TYPE_STRING, TYPE_ZSET};
use crate::error::{PersistError, Result};
use crate::store::Value;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{HashMap, HashSet, VecDeque};

/// Upper bound for pre-allocation from an untrusted count
const MAX_PREALLOC: u64 = 1024;

/// The type byte recorded for `value`
pub fn value_type(value: &Value) -> u8 {
    match value {
        Value::String(_) => TYPE_STRING,
        Value::List(_) => TYPE_LIST,
        Value::Set(_) => TYPE_SET,
        Value::SortedSet(_) => TYPE_ZSET,
        Value::Hash(_) => TYPE_HASH,
    }
}

/// Append a full key record
pub fn write_object(buf: &mut BytesMut, key: &[u8], value: &Value) {
    buf.put_u8(value_type(value));
    write_string(buf, key);

    match value {
        Value::String(s) => write_string(buf, s),
        Value::List(list) => {
            write_length(buf, list.len() as u64);
            for item in list {
                write_string(buf, item);
            }
        }
        Value::Set(set) => {
            write_length(buf, set.len() as u64);
            for member in set {
                write_string(buf, member);
            }
        }
        Value::SortedSet(zset) => {
            write_length(buf, zset.len() as u64);
            for (member, score) in zset {
                write_string(buf, member);
                buf.put_f64(*score);
            }
        }
        Value::Hash(hash) => {
            write_length(buf, hash.len() as u64);
            for (field, value) in hash {
                write_string(buf, field);
                write_string(buf, value);
            }
        }
    }
}

/// Decode the key and payload of a record whose type byte was already read
pub fn read_object(buf: &mut Bytes, type_byte: u8) -> Result<(Bytes, Value)> {
    let key = read_string(buf)?;

    let value = match type_byte {
        TYPE_STRING => Value::String(read_string(buf)?),
        TYPE_LIST => {
            let count = read_plain_length(buf)?;
            let mut list = VecDeque::with_capacity(count.min(MAX_PREALLOC) as usize);
            for _ in 0..count {
                list.push_back(read_string(buf)?);
            }
            Value::List(list)
        }
        TYPE_SET => {
            let count = read_plain_length(buf)?;
            let mut set = HashSet::with_capacity(count.min(MAX_PREALLOC) as usize);
            for _ in 0..count {
                let member = read_string(buf)?;
                if !set.insert(member) {
                    return Err(duplicate("set member", &key));
                }
            }
            Value::Set(set)
        }
        TYPE_ZSET => {
            let count = read_plain_length(buf)?;
            let mut zset = HashMap::with_capacity(count.min(MAX_PREALLOC) as usize);
            for _ in 0..count {
                let member = read_string(buf)?;
                ensure(buf, 8)?;
                let score = buf.get_f64();
                if score.is_nan() {
                    return Err(PersistError::corrupt(format!(
                        "sorted set {:?} holds a NaN score",
                        String::from_utf8_lossy(&key)
                    )));
                }
                if zset.insert(member, score).is_some() {
                    return Err(duplicate("sorted set member", &key));
                }
            }
            Value::SortedSet(zset)
        }
        TYPE_HASH => {
            let count = read_plain_length(buf)?;
            let mut hash = HashMap::with_capacity(count.min(MAX_PREALLOC) as usize);
            for _ in 0..count {
                let field = read_string(buf)?;
                let value = read_string(buf)?;
                if hash.insert(field, value).is_some() {
                    return Err(duplicate("hash field", &key));
                }
            }
            Value::Hash(hash)
        }
        other => {
            return Err(PersistError::corrupt(format!(
                "unknown value type {}",
                other
            )))
        }
    };

    Ok((key, value))
}

fn duplicate(what: &str, key: &Bytes) -> PersistError {
    PersistError::corrupt(format!(
        "duplicate {} in {:?}",
        what,
        String::from_utf8_lossy(key)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut buf = BytesMut::new();
        write_object(&mut buf, b"key", &value);
        let mut data = buf.freeze();
        let type_byte = data.get_u8();
        let (key, decoded) = read_object(&mut data, type_byte).unwrap();
        assert_eq!(key, Bytes::from("key"));
        assert!(data.is_empty());
        decoded
    }

    #[test]
    fn test_every_kind_survives() {
        let list = Value::List(VecDeque::from(vec![
            Bytes::from("a"),
            Bytes::from("12"),
            Bytes::from(""),
        ]));
        assert_eq!(roundtrip(list.clone()), list);

        let set = Value::Set(HashSet::from([Bytes::from("x"), Bytes::from("y")]));
        assert_eq!(roundtrip(set.clone()), set);

        let hash = Value::Hash(HashMap::from([
            (Bytes::from("f1"), Bytes::from("v1")),
            (Bytes::from("f2"), Bytes::from("100")),
        ]));
        assert_eq!(roundtrip(hash.clone()), hash);

        let zset = Value::SortedSet(HashMap::from([
            (Bytes::from("low"), -3.5),
            (Bytes::from("high"), f64::INFINITY),
            (Bytes::from("tiny"), 1e-300),
        ]));
        assert_eq!(roundtrip(zset.clone()), zset);

        let binary = Value::String(Bytes::from(vec![0u8, 255, 13, 10]));
        assert_eq!(roundtrip(binary.clone()), binary);
    }

    #[test]
    fn test_type_bytes() {
        assert_eq!(value_type(&Value::string("s")), TYPE_STRING);
        assert_eq!(value_type(&Value::empty_list()), TYPE_LIST);
        assert_eq!(value_type(&Value::empty_set()), TYPE_SET);
        assert_eq!(value_type(&Value::empty_sorted_set()), TYPE_ZSET);
        assert_eq!(value_type(&Value::empty_hash()), TYPE_HASH);
    }

    #[test]
    fn test_duplicate_hash_field_rejected() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"h");
        write_length(&mut buf, 2);
        for _ in 0..2 {
            write_string(&mut buf, b"field");
            write_string(&mut buf, b"value");
        }
        let err = read_object(&mut buf.freeze(), TYPE_HASH).unwrap_err();
        assert!(matches!(err, PersistError::Corrupt(_)));
    }

    #[test]
    fn test_duplicate_set_member_rejected() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"s");
        write_length(&mut buf, 2);
        write_string(&mut buf, b"m");
        write_string(&mut buf, b"m");
        assert!(read_object(&mut buf.freeze(), TYPE_SET).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"k");
        write_string(&mut buf, b"v");
        assert!(matches!(
            read_object(&mut buf.freeze(), 9),
            Err(PersistError::Corrupt(_))
        ));
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, b"l");
        write_length(&mut buf, u32::MAX as u64);
        write_string(&mut buf, b"only one");
        assert!(matches!(
            read_object(&mut buf.freeze(), TYPE_LIST),
            Err(PersistError::UnexpectedEof)
        ));
    }
}
