//! In-process stream bus

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{BusEntry, BusError, ReadFrom, StreamBus, StreamId};

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Group {
    last_delivered: StreamId,
    pending: BTreeMap<StreamId, PendingEntry>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<StreamId, String>,
    last_id: StreamId,
    groups: HashMap<String, Group>,
}

/// Split a stream into its entries and one of its groups
fn group_of<'a>(
    streams: &'a mut HashMap<String, Stream>,
    stream: &str,
    group: &str,
) -> Result<(&'a BTreeMap<StreamId, String>, &'a mut Group), BusError> {
    let unknown = || BusError::UnknownGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    };
    let Stream {
        entries, groups, ..
    } = streams.get_mut(stream).ok_or_else(unknown)?;
    let group_state = groups.get_mut(group).ok_or_else(unknown)?;
    Ok((entries, group_state))
}

/// Consumer-group streams kept in memory
///
/// Retention is exact: a stream never holds more than `max_len` entries.
/// Pending entries whose payload was trimmed are dropped from the pending
/// list the next time they would be delivered.
pub struct MemoryBus {
    streams: Mutex<HashMap<String, Stream>>,
    appended: Notify,
    max_len: usize,
}

impl MemoryBus {
    /// Create an empty bus keeping at most `max_len` entries per stream
    pub fn new(max_len: usize) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Notify::new(),
            max_len: max_len.max(1),
        }
    }

    /// Delivery count of a pending entry
    pub async fn deliveries(&self, stream: &str, group: &str, id: StreamId) -> Option<u32> {
        let streams = self.streams.lock().await;
        streams
            .get(stream)?
            .groups
            .get(group)?
            .pending
            .get(&id)
            .map(|entry| entry.deliveries)
    }

    fn read_new(
        streams: &mut HashMap<String, Stream>,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<BusEntry>, BusError> {
        let (entries, group_state) = group_of(streams, stream, group)?;

        let now = Instant::now();
        let batch: Vec<BusEntry> = entries
            .range(group_state.last_delivered..)
            .filter(|(id, _)| **id > group_state.last_delivered)
            .take(count)
            .map(|(id, payload)| BusEntry {
                id: *id,
                payload: payload.clone(),
            })
            .collect();

        for entry in &batch {
            group_state.pending.insert(
                entry.id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    deliveries: 1,
                },
            );
            group_state.last_delivered = entry.id;
        }

        Ok(batch)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl StreamBus for MemoryBus {
    async fn publish(&self, stream: &str, payload: &str) -> Result<StreamId, BusError> {
        let id = {
            let mut streams = self.streams.lock().await;
            let state = streams.entry(stream.to_string()).or_default();

            let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
            let id = StreamId::next_after(state.last_id, now_ms);
            state.entries.insert(id, payload.to_string());
            state.last_id = id;

            while state.entries.len() > self.max_len {
                state.entries.pop_first();
            }
            id
        };

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut streams = self.streams.lock().await;
        streams
            .entry(stream.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
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
        if from == ReadFrom::Pending {
            let mut streams = self.streams.lock().await;
            let (entries, group_state) = group_of(&mut streams, stream, group)?;
            return Ok(redeliver(entries, group_state, count, |pending| {
                pending.consumer == consumer
            }));
        }

        let deadline = Instant::now() + block;
        loop {
            // Register for wakeups before checking so an append between the
            // check and the wait is not missed.
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            {
                let mut streams = self.streams.lock().await;
                let batch = Self::read_new(&mut streams, stream, group, consumer, count)?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            if block.is_zero() || tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<bool, BusError> {
        let mut streams = self.streams.lock().await;
        let (_, group_state) = group_of(&mut streams, stream, group)?;
        Ok(group_state.pending.remove(&id).is_some())
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<BusEntry>, BusError> {
        let mut streams = self.streams.lock().await;
        let (entries, group_state) = group_of(&mut streams, stream, group)?;

        let now = Instant::now();
        let claimed = redeliver(entries, group_state, count, |pending| {
            now.duration_since(pending.delivered_at) >= min_idle
        });
        for entry in &claimed {
            if let Some(pending) = group_state.pending.get_mut(&entry.id) {
                pending.consumer = consumer.to_string();
            }
        }
        Ok(claimed)
    }

    async fn stream_len(&self, stream: &str) -> Result<usize, BusError> {
        let streams = self.streams.lock().await;
        Ok(streams.get(stream).map_or(0, |state| state.entries.len()))
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<usize, BusError> {
        let streams = self.streams.lock().await;
        let Some(state) = streams.get(stream) else {
            return Ok(0);
        };
        state
            .groups
            .get(group)
            .map(|group_state| group_state.pending.len())
            .ok_or_else(|| BusError::UnknownGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })
    }
}

/// Re-deliver matching pending entries in id order
///
/// Entries whose payload has been trimmed are removed from the pending list.
fn redeliver(
    entries: &BTreeMap<StreamId, String>,
    group: &mut Group,
    count: usize,
    matches: impl Fn(&PendingEntry) -> bool,
) -> Vec<BusEntry> {
    let now = Instant::now();
    let mut trimmed = Vec::new();
    let mut batch = Vec::new();

    for (id, pending) in group.pending.iter_mut() {
        if batch.len() >= count {
            break;
        }
        if !matches(pending) {
            continue;
        }
        match entries.get(id) {
            Some(payload) => {
                pending.delivered_at = now;
                pending.deliveries += 1;
                batch.push(BusEntry {
                    id: *id,
                    payload: payload.clone(),
                });
            }
            None => trimmed.push(*id),
        }
    }

    for id in trimmed {
        group.pending.remove(&id);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const STREAM: &str = "traffic";
    const GROUP: &str = "relays";

    async fn bus_with_group(max_len: usize) -> MemoryBus {
        let bus = MemoryBus::new(max_len);
        bus.ensure_group(STREAM, GROUP).await.unwrap();
        bus
    }

    async fn read_new(bus: &MemoryBus, consumer: &str, count: usize) -> Vec<BusEntry> {
        bus.read_group(STREAM, GROUP, consumer, ReadFrom::New, count, Duration::ZERO)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let bus = MemoryBus::default();
        let mut last = StreamId::ZERO;
        for i in 0..20 {
            let id = bus.publish(STREAM, &format!("{i}")).await.unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(bus.stream_len(STREAM).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_group_reads_from_beginning_once() {
        let bus = MemoryBus::default();
        bus.publish(STREAM, "before").await.unwrap();
        bus.ensure_group(STREAM, GROUP).await.unwrap();
        bus.publish(STREAM, "after").await.unwrap();

        let batch = read_new(&bus, "c1", 10).await;
        let payloads: Vec<_> = batch.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["before", "after"]);

        // Another consumer in the same group sees nothing new
        assert!(read_new(&bus, "c2", 10).await.is_empty());
        assert_eq!(bus.pending_count(STREAM, GROUP).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ensure_group_keeps_position() {
        let bus = bus_with_group(100).await;
        bus.publish(STREAM, "a").await.unwrap();
        assert_eq!(read_new(&bus, "c1", 10).await.len(), 1);

        bus.ensure_group(STREAM, GROUP).await.unwrap();
        assert!(read_new(&bus, "c1", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_count_limits_batch() {
        let bus = bus_with_group(100).await;
        for i in 0..5 {
            bus.publish(STREAM, &i.to_string()).await.unwrap();
        }

        assert_eq!(read_new(&bus, "c1", 2).await.len(), 2);
        assert_eq!(read_new(&bus, "c1", 2).await.len(), 2);
        assert_eq!(read_new(&bus, "c1", 2).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let bus = MemoryBus::default();
        bus.publish(STREAM, "a").await.unwrap();

        let err = bus
            .read_group(STREAM, "missing", "c1", ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownGroup { .. }));
    }

    #[tokio::test]
    async fn test_ack_clears_pending() {
        let bus = bus_with_group(100).await;
        bus.publish(STREAM, "a").await.unwrap();
        let batch = read_new(&bus, "c1", 10).await;

        assert!(bus.ack(STREAM, GROUP, batch[0].id).await.unwrap());
        assert!(!bus.ack(STREAM, GROUP, batch[0].id).await.unwrap());
        assert_eq!(bus.pending_count(STREAM, GROUP).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pending_read_is_per_consumer() {
        let bus = bus_with_group(100).await;
        bus.publish(STREAM, "a").await.unwrap();
        bus.publish(STREAM, "b").await.unwrap();

        let first = read_new(&bus, "c1", 1).await;
        read_new(&bus, "c2", 1).await;

        let pending = bus
            .read_group(STREAM, GROUP, "c1", ReadFrom::Pending, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(pending, first);
        assert_eq!(bus.deliveries(STREAM, GROUP, first[0].id).await, Some(2));
    }

    #[tokio::test]
    async fn test_trim_keeps_newest() {
        let bus = bus_with_group(3).await;
        for i in 0..5 {
            bus.publish(STREAM, &i.to_string()).await.unwrap();
        }
        assert_eq!(bus.stream_len(STREAM).await.unwrap(), 3);

        let payloads: Vec<_> = read_new(&bus, "c1", 10)
            .await
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(payloads, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_trimmed_pending_entries_are_dropped() {
        let bus = bus_with_group(2).await;
        bus.publish(STREAM, "a").await.unwrap();
        read_new(&bus, "c1", 10).await;

        bus.publish(STREAM, "b").await.unwrap();
        bus.publish(STREAM, "c").await.unwrap();

        let pending = bus
            .read_group(STREAM, GROUP, "c1", ReadFrom::Pending, 10, Duration::ZERO)
            .await
            .unwrap();
        assert!(pending.is_empty());
        assert_eq!(bus.pending_count(STREAM, GROUP).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_publish() {
        let bus = Arc::new(bus_with_group(100).await);

        let reader = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.read_group(STREAM, GROUP, "c1", ReadFrom::New, 10, Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish(STREAM, "late").await.unwrap();

        let batch = reader.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_read_times_out_empty() {
        let bus = bus_with_group(100).await;
        let started = Instant::now();

        let batch = bus
            .read_group(STREAM, GROUP, "c1", ReadFrom::New, 10, Duration::from_secs(2))
            .await
            .unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_idle_moves_ownership() {
        let bus = bus_with_group(100).await;
        bus.publish(STREAM, "orphan").await.unwrap();
        let batch = read_new(&bus, "dead", 10).await;

        let early = bus
            .claim_idle(STREAM, GROUP, "alive", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(early.is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        let claimed = bus
            .claim_idle(STREAM, GROUP, "alive", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert_eq!(claimed, batch);

        let pending = bus
            .read_group(STREAM, GROUP, "alive", ReadFrom::Pending, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }
}
