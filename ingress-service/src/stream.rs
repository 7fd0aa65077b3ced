//! Thin wrapper over the consumer-group stream primitives the ingress
//! pipeline needs: reading new entries, claiming entries abandoned by a
//! dead consumer, checking delivery counts, and routing to the
//! dead-letter stream.

use redis::streams::{StreamAutoClaimOptions, StreamAutoClaimReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisResult};
use redis_utils::SharedConnectionManager;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RawEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

pub struct StreamClient {
    conn: SharedConnectionManager,
    pub stream: String,
    pub dlq_stream: String,
    pub group: String,
    pub consumer: String,
}

impl StreamClient {
    pub fn new(
        conn: SharedConnectionManager,
        stream: String,
        dlq_stream: String,
        group: String,
        consumer: String,
    ) -> Self {
        Self {
            conn,
            stream,
            dlq_stream,
            group,
            consumer,
        }
    }

    /// Ensures the consumer group exists, starting from the beginning of
    /// the stream if it's being created for the first time.
    pub async fn ensure_group(&self) -> RedisResult<()> {
        let mut conn = self.conn.lock().await;
        let result: RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists, which is the common case.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reads new (never-delivered) entries for this consumer.
    pub async fn read_new(&self, batch_size: usize) -> RedisResult<Vec<RawEntry>> {
        let mut conn = self.conn.lock().await;
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(batch_size);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await?;
        Ok(flatten(reply))
    }

    /// Claims entries idle for at least `idle_ms` that belong to some other
    /// (possibly dead) consumer, transferring ownership to this one.
    pub async fn autoclaim(&self, idle_ms: i64, start: &str, count: usize) -> RedisResult<(String, Vec<RawEntry>)> {
        let mut conn = self.conn.lock().await;
        let opts = StreamAutoClaimOptions::default().count(count);
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(&self.stream, &self.group, &self.consumer, idle_ms, start, opts)
            .await?;
        let entries = reply
            .claimed
            .into_iter()
            .map(|entry| RawEntry {
                id: entry.id,
                fields: fields_as_map(&entry.map),
            })
            .collect();
        Ok((reply.cursor, entries))
    }

    /// Number of times each pending entry has been delivered, keyed by id.
    pub async fn delivery_counts(&self, ids: &[String]) -> RedisResult<HashMap<String, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.conn.lock().await;
        let pending: Vec<(String, String, i64, i64)> = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(ids.len() as i64)
            .query_async(&mut *conn)
            .await?;
        Ok(pending.into_iter().map(|(id, _, _, count)| (id, count)).collect())
    }

    pub async fn ack(&self, ids: &[String]) -> RedisResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let _: i64 = conn.xack(&self.stream, &self.group, ids).await?;
        Ok(())
    }

    /// Copies an entry that has exceeded the retry budget onto the
    /// dead-letter stream, preserving its original id for traceability.
    pub async fn send_to_dlq(&self, original_id: &str, fields: &HashMap<String, String>) -> RedisResult<()> {
        let mut conn = self.conn.lock().await;
        let mut items: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        items.push(("original_id", original_id));
        let _: String = conn.xadd(&self.dlq_stream, "*", &items).await?;
        Ok(())
    }
}

fn flatten(reply: StreamReadReply) -> Vec<RawEntry> {
    reply
        .keys
        .into_iter()
        .flat_map(|key| key.ids)
        .map(|entry| RawEntry {
            id: entry.id,
            fields: fields_as_map(&entry.map),
        })
        .collect()
}

fn fields_as_map(map: &HashMap<String, redis::Value>) -> HashMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| match v {
            redis::Value::BulkString(b) => Some((k.clone(), String::from_utf8_lossy(b).into_owned())),
            redis::Value::SimpleString(s) => Some((k.clone(), s.clone())),
            _ => None,
        })
        .collect()
}
