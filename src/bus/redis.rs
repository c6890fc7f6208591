//! Redis Streams backend
//!
//! Each payload is stored under the field `data`. Streams are capped with
//! `MAXLEN ~`, so Redis may retain slightly more than `max_len` entries.
//!
//! Blocking reads hold the connection for up to `block`; give the relay its
//! own [`RedisBus`] instead of sharing the publisher's.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::streams::StreamReadReply;
use ::redis::{RedisError, RedisResult, Value};
use async_trait::async_trait;

use super::{BusEntry, BusError, ReadFrom, StreamBus, StreamId};

const DATA_FIELD: &str = "data";

impl From<RedisError> for BusError {
    fn from(e: RedisError) -> Self {
        BusError::Backend(e.to_string())
    }
}

/// Stream bus backed by a Redis server
#[derive(Clone)]
pub struct RedisBus {
    conn: ConnectionManager,
    max_len: usize,
}

impl RedisBus {
    /// Connect to `url` (`redis://[:password@]host:port/db`)
    pub async fn connect(url: &str, max_len: usize) -> Result<Self, BusError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(max_len, "Connected to Redis");
        Ok(Self {
            conn,
            max_len: max_len.max(1),
        })
    }

    fn unknown_group(e: &RedisError, stream: &str, group: &str) -> Option<BusError> {
        (e.code() == Some("NOGROUP")).then(|| BusError::UnknownGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })
    }
}

#[async_trait]
impl StreamBus for RedisBus {
    async fn publish(&self, stream: &str, payload: &str) -> Result<StreamId, BusError> {
        let mut conn = self.conn.clone();
        let id: String = ::redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg(DATA_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        id.parse()
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let created: RedisResult<()> = ::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                tracing::info!(stream, group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block: Duration,
    ) -> Result<Vec<BusEntry>, BusError> {
        let mut cmd = ::redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count);
        if from == ReadFrom::New && !block.is_zero() {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(stream).arg(match from {
            ReadFrom::New => ">",
            ReadFrom::Pending => "0",
        });

        let mut conn = self.conn.clone();
        let reply: RedisResult<Option<StreamReadReply>> = cmd.query_async(&mut conn).await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => return Err(Self::unknown_group(&e, stream, group).unwrap_or_else(|| e.into())),
        };

        let mut entries = Vec::new();
        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in key.ids {
                // Pending entries trimmed from the stream come back without fields
                let Some(value) = entry.map.get(DATA_FIELD) else {
                    continue;
                };
                entries.push(BusEntry {
                    id: entry.id.parse()?,
                    payload: ::redis::from_redis_value(value)?,
                });
            }
        }
        Ok(entries)
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, BusError> {
        let mut conn = self.conn.clone();
        let acked: i64 = ::redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(acked > 0)
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<BusEntry>, BusError> {
        let mut conn = self.conn.clone();
        let reply: RedisResult<Value> = ::redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(value) => parse_claimed(&value),
            Err(e) => Err(Self::unknown_group(&e, stream, group).unwrap_or_else(|| e.into())),
        }
    }

    async fn stream_len(&self, stream: &str) -> Result<usize, BusError> {
        let mut conn = self.conn.clone();
        let len: usize = ::redis::cmd("XLEN").arg(stream).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<usize, BusError> {
        let mut conn = self.conn.clone();
        let reply: RedisResult<Value> = ::redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .query_async(&mut conn)
            .await;

        let value = match reply {
            Ok(value) => value,
            Err(e) => return Err(Self::unknown_group(&e, stream, group).unwrap_or_else(|| e.into())),
        };
        match value {
            Value::Array(summary) if !summary.is_empty() => {
                Ok(::redis::from_redis_value::<usize>(&summary[0])?)
            }
            other => Err(BusError::Backend(format!(
                "unexpected XPENDING reply: {other:?}"
            ))),
        }
    }
}

/// Entries from an `XAUTOCLAIM` reply: `[cursor, [[id, [field, value, ..]], ..], ..]`
fn parse_claimed(value: &Value) -> Result<Vec<BusEntry>, BusError> {
    let unexpected = || BusError::Backend(format!("unexpected XAUTOCLAIM reply: {value:?}"));

    let Value::Array(parts) = value else {
        return Err(unexpected());
    };
    let Some(Value::Array(claimed)) = parts.get(1) else {
        return Err(unexpected());
    };

    let mut entries = Vec::with_capacity(claimed.len());
    for entry in claimed {
        let (id, fields): (String, Option<Vec<String>>) = ::redis::from_redis_value(entry)?;
        let payload = fields.and_then(|fields| {
            fields
                .chunks(2)
                .find(|pair| pair[0] == DATA_FIELD)
                .and_then(|pair| pair.get(1).cloned())
        });

        if let Some(payload) = payload {
            entries.push(BusEntry {
                id: id.parse()?,
                payload,
            });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_claimed_reply() {
        let reply = Value::Array(vec![
            bulk("0-0"),
            Value::Array(vec![
                Value::Array(vec![
                    bulk("1700000000000-0"),
                    Value::Array(vec![bulk("data"), bulk("{\"a\":1}")]),
                ]),
                Value::Array(vec![bulk("1700000000000-1"), Value::Nil]),
            ]),
            Value::Array(vec![]),
        ]);

        let entries = parse_claimed(&reply).unwrap();
        assert_eq!(
            entries,
            vec![BusEntry {
                id: StreamId::new(1_700_000_000_000, 0),
                payload: "{\"a\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_claimed_rejects_garbage() {
        assert!(parse_claimed(&Value::Nil).is_err());
        assert!(parse_claimed(&Value::Array(vec![bulk("0-0")])).is_err());
    }
}
