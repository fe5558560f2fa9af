//! Knowledge bus: single-process pub/sub for agent events.
//!
//! Topics are created on first use. Delivery is per-topic FIFO to all
//! current subscribers; there is no persistence and no replay. Slow
//! subscribers that fall behind the channel capacity lose oldest events
//! (counted in stats).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

/// Topic published after each per-file parse commit.
pub const TOPIC_PARSE_DONE: &str = "parse.done";
/// Topic published when graph mutations leave the semantic index stale.
pub const TOPIC_INDEX_DIRTY: &str = "index.dirty";
/// Topic published when an externally triggered query starts.
pub const TOPIC_QUERY_ISSUED: &str = "query.issued";

const CHANNEL_CAPACITY: usize = 1024;

/// An event on the bus. `seq` is per-topic and strictly increasing.
#[derive(Debug, Clone, Serialize)]
pub struct BusEvent {
    pub topic: String,
    pub seq: u64,
    pub payload: serde_json::Value,
}

struct Topic {
    sender: broadcast::Sender<BusEvent>,
    published: u64,
    next_seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub name: String,
    pub published: u64,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub topics: Vec<TopicStats>,
    pub total_published: u64,
}

#[derive(Default)]
pub struct KnowledgeBus {
    topics: Mutex<HashMap<String, Topic>>,
    total_published: AtomicU64,
}

impl KnowledgeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event; returns its per-topic sequence number. Publishing
    /// to a topic with no subscribers is not an error.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) -> u64 {
        let mut topics = self.topics.lock().expect("bus lock");
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            published: 0,
            next_seq: 0,
        });
        let seq = entry.next_seq;
        entry.next_seq += 1;
        entry.published += 1;
        self.total_published.fetch_add(1, Ordering::Relaxed);
        let _ = entry.sender.send(BusEvent {
            topic: topic.to_string(),
            seq,
            payload,
        });
        seq
    }

    /// Subscribe to a topic; events published after this call are delivered
    /// in publication order.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusEvent> {
        let mut topics = self.topics.lock().expect("bus lock");
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            published: 0,
            next_seq: 0,
        });
        entry.sender.subscribe()
    }

    /// Drop a topic. Existing subscribers see the channel close.
    pub fn clear_topic(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .expect("bus lock")
            .remove(topic)
            .is_some()
    }

    pub fn stats(&self) -> BusStats {
        let topics = self.topics.lock().expect("bus lock");
        let mut list: Vec<TopicStats> = topics
            .iter()
            .map(|(name, t)| TopicStats {
                name: name.clone(),
                published: t.published,
                subscribers: t.sender.receiver_count(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        BusStats {
            topics: list,
            total_published: self.total_published.load(Ordering::Relaxed),
        }
    }
}
