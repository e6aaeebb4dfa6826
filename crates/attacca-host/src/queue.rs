//! Coalescing parameter transport.
//!
//! A `ReducingQueue` carries keyed updates between the main thread and the
//! audio thread with last-writer-wins coalescing: writing twice to the same
//! key before the consumer drains replaces the pending value instead of
//! queuing it. This bounds memory and guarantees the consumer never falls
//! behind regardless of the producer's update rate.
//!
//! The channel is built from pre-allocated `HashMap` buffers rotated through
//! two lock-free `ArrayQueue`s (ready + spare). Each side only ever mutates a
//! buffer it exclusively owns, so no mutex is shared across the thread
//! boundary.

use clap_sys::id::clap_id;
use crossbeam::queue::ArrayQueue;
use std::collections::HashMap;
use std::sync::Arc;

/// Values that can be coalesced under the same key.
///
/// The default merge is plain replacement; implementors override `update`
/// when distinct components of the value must merge field-by-field (a value
/// change and a gesture notification for the same parameter do not overwrite
/// each other).
pub trait CoalesceValue: Copy {
    fn update(&mut self, newer: &Self) {
        *self = *newer;
    }
}

/// The shared half of the channel.
///
/// `consume` may be called from any thread, but never from two threads at
/// once; the host protocol guarantees this (the main thread only drains the
/// main-to-audio queues while the plugin is inactive).
pub struct ReducingQueue<V> {
    ready: ArrayQueue<HashMap<clap_id, V>>,
    spare: ArrayQueue<HashMap<clap_id, V>>,
}

/// The producing half. Owned by exactly one thread.
pub struct ReducingQueueProducer<V> {
    local: HashMap<clap_id, V>,
    queue: Arc<ReducingQueue<V>>,
}

impl<V: CoalesceValue> ReducingQueue<V> {
    /// Create a channel whose buffers hold `capacity` entries without
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> (ReducingQueueProducer<V>, Arc<Self>) {
        let queue = Arc::new(Self {
            ready: ArrayQueue::new(1),
            spare: ArrayQueue::new(2),
        });
        for _ in 0..2 {
            let _ = queue.spare.push(HashMap::with_capacity(capacity));
        }
        let producer = ReducingQueueProducer {
            local: HashMap::with_capacity(capacity),
            queue: Arc::clone(&queue),
        };
        (producer, queue)
    }

    /// Drain all pending entries, if any were published.
    pub fn consume(&self, mut f: impl FnMut(clap_id, V)) {
        if let Some(mut map) = self.ready.pop() {
            for (key, value) in map.drain() {
                f(key, value);
            }
            let _ = self.spare.push(map);
        }
    }
}

impl<V: CoalesceValue> ReducingQueueProducer<V> {
    /// Stage an update, replacing any pending value for the same key.
    pub fn set(&mut self, key: clap_id, value: V) {
        self.local.insert(key, value);
    }

    /// Stage an update, merging with any pending value for the same key.
    pub fn set_or_update(&mut self, key: clap_id, value: V) {
        self.local
            .entry(key)
            .and_modify(|pending| pending.update(&value))
            .or_insert(value);
    }

    /// Drop every staged and published update. Used when the plugin the
    /// updates were destined for goes away.
    pub fn clear(&mut self) {
        self.local.clear();
        self.queue.consume(|_, _| {});
    }

    /// Hand the staged updates to the consumer.
    ///
    /// If the consumer has not drained the previous batch yet, the staged
    /// updates stay local and keep coalescing; they are handed over on a
    /// later call.
    pub fn publish(&mut self) {
        if self.local.is_empty() || self.queue.ready.is_full() {
            return;
        }
        let Some(mut replacement) = self.queue.spare.pop() else {
            return;
        };
        std::mem::swap(&mut self.local, &mut replacement);
        if let Err(rejected) = self.queue.ready.push(replacement) {
            // The consumer raced us to the slot; merge back and retry on the
            // next publish.
            for (key, value) in rejected {
                self.set_or_update(key, value);
            }
        }
    }
}
