//! Per-user signal buffers
//!
//! The buffer store is the only shared mutable state in the engine. Each
//! `(user, signal)` key owns a bounded ring of recent readings behind its
//! own lock, so concurrent writers to the same key serialize while
//! unrelated users and signals proceed in parallel. Reads always return
//! snapshot clones, never references into a live ring.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::RejectReason;
use crate::models::{Reading, SignalType};

/// Key for one ring: a user's stream of one signal type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BufferKey {
    user_id: String,
    signal_type: SignalType,
}

/// Bounded FIFO ring of readings
#[derive(Debug, Default)]
struct Ring {
    readings: VecDeque<Reading>,
}

/// Thread-safe store of per-(user, signal) reading rings
///
/// Capacity applies per key. Eviction is oldest-first: after N+k inserts a
/// ring holds exactly the last N readings.
#[derive(Debug)]
pub struct SignalBufferStore {
    capacity: usize,
    rings: RwLock<HashMap<BufferKey, Arc<Mutex<Ring>>>>,
}

impl SignalBufferStore {
    pub fn new(capacity: usize) -> Self {
        SignalBufferStore {
            capacity: capacity.max(1),
            rings: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ring_for(&self, key: BufferKey) -> Arc<Mutex<Ring>> {
        if let Some(ring) = self.rings.read().expect("buffer map poisoned").get(&key) {
            return Arc::clone(ring);
        }
        let mut map = self.rings.write().expect("buffer map poisoned");
        Arc::clone(map.entry(key).or_default())
    }

    /// Append a reading, evicting the oldest entry at capacity
    ///
    /// Rejects non-finite values; a rejected reading never enters the ring.
    pub fn ingest(&self, reading: Reading) -> Result<(), RejectReason> {
        if !reading.has_finite_value() {
            return Err(RejectReason::NonFiniteValue {
                signal_type: reading.signal_type.to_string(),
            });
        }

        let key = BufferKey {
            user_id: reading.user_id.clone(),
            signal_type: reading.signal_type,
        };
        let ring = self.ring_for(key);
        let mut guard = ring.lock().expect("ring poisoned");
        if guard.readings.len() == self.capacity {
            let evicted = guard.readings.pop_front();
            trace!(
                user = %reading.user_id,
                signal = %reading.signal_type,
                evicted_ts = ?evicted.map(|r| r.timestamp),
                "Ring at capacity, evicted oldest reading"
            );
        }
        guard.readings.push_back(reading);
        Ok(())
    }

    /// The most recent `limit` readings for a key, oldest first
    ///
    /// Snapshot copy; does not mutate the ring and never blocks writers for
    /// longer than the clone.
    pub fn recent(&self, user_id: &str, signal_type: SignalType, limit: usize) -> Vec<Reading> {
        let key = BufferKey {
            user_id: user_id.to_string(),
            signal_type,
        };
        let ring = match self.rings.read().expect("buffer map poisoned").get(&key) {
            Some(ring) => Arc::clone(ring),
            None => return Vec::new(),
        };
        let guard = ring.lock().expect("ring poisoned");
        let skip = guard.readings.len().saturating_sub(limit);
        guard.readings.iter().skip(skip).cloned().collect()
    }

    /// Number of buffered readings for a key
    pub fn len(&self, user_id: &str, signal_type: SignalType) -> usize {
        let key = BufferKey {
            user_id: user_id.to_string(),
            signal_type,
        };
        self.rings
            .read()
            .expect("buffer map poisoned")
            .get(&key)
            .map(|ring| ring.lock().expect("ring poisoned").readings.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, user_id: &str, signal_type: SignalType) -> bool {
        self.len(user_id, signal_type) == 0
    }

    /// Newest reading per (device, signal) for a user
    ///
    /// This is the fusion resolver's input: the latest value each connected
    /// device reported for each signal.
    pub fn latest_per_device(&self, user_id: &str) -> HashMap<String, Vec<Reading>> {
        let mut by_device: HashMap<String, HashMap<SignalType, Reading>> = HashMap::new();

        let rings: Vec<Arc<Mutex<Ring>>> = self
            .rings
            .read()
            .expect("buffer map poisoned")
            .iter()
            .filter(|(key, _)| key.user_id == user_id)
            .map(|(_, ring)| Arc::clone(ring))
            .collect();

        for ring in rings {
            let guard = ring.lock().expect("ring poisoned");
            for reading in guard.readings.iter() {
                let slot = by_device
                    .entry(reading.device_id.clone())
                    .or_default()
                    .entry(reading.signal_type);
                match slot {
                    std::collections::hash_map::Entry::Occupied(mut existing) => {
                        if reading.timestamp > existing.get().timestamp {
                            existing.insert(reading.clone());
                        }
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        vacant.insert(reading.clone());
                    }
                }
            }
        }

        by_device
            .into_iter()
            .map(|(device, readings)| (device, readings.into_values().collect()))
            .collect()
    }

    /// Devices currently contributing readings for a user
    pub fn connected_devices(&self, user_id: &str) -> usize {
        self.latest_per_device(user_id).len()
    }

    /// Drop readings older than the cutoff across all rings
    ///
    /// Driven by the periodic sweep. Returns the number of pruned readings.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let rings: Vec<Arc<Mutex<Ring>>> = self
            .rings
            .read()
            .expect("buffer map poisoned")
            .values()
            .map(Arc::clone)
            .collect();

        let mut pruned = 0;
        for ring in rings {
            let mut guard = ring.lock().expect("ring poisoned");
            while guard
                .readings
                .front()
                .map(|r| r.timestamp < cutoff)
                .unwrap_or(false)
            {
                guard.readings.pop_front();
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, "Pruned stale readings");
        }
        pruned
    }

    /// Total readings across all rings (diagnostics)
    pub fn total_len(&self) -> usize {
        self.rings
            .read()
            .expect("buffer map poisoned")
            .values()
            .map(|ring| ring.lock().expect("ring poisoned").readings.len())
            .sum()
    }
}
