use std::collections::{HashMap, VecDeque};

use bytes::Bytes;

use super::EntityId;

/// Distinct entities and aliases that may hold queued updates at once.
pub const MAX_PENDING_KEYS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Id(EntityId),
    Alias(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEncoding {
    Plain,
    Optimized,
}

/// Property block for an entity that was not resolvable on arrival. The
/// entity reference has already been consumed from `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub encoding: UpdateEncoding,
    pub payload: Bytes,
    seq: u64,
}

impl PendingUpdate {
    pub fn new(encoding: UpdateEncoding, payload: Bytes) -> Self {
        Self {
            encoding,
            payload,
            seq: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingUpdates {
    queues: HashMap<PendingKey, VecDeque<PendingUpdate>>,
    max_depth: usize,
    next_seq: u64,
}

impl PendingUpdates {
    pub fn new(max_depth: usize) -> Self {
        Self {
            queues: HashMap::new(),
            max_depth: max_depth.max(1),
            next_seq: 0,
        }
    }

    /// Queues `update`, returning the oldest entry if the queue was full.
    /// A new key past `MAX_PENDING_KEYS` evicts the key waiting longest.
    pub fn push(&mut self, key: PendingKey, mut update: PendingUpdate) -> Option<PendingUpdate> {
        update.seq = self.next_seq;
        self.next_seq += 1;

        if !self.queues.contains_key(&key) && self.queues.len() >= MAX_PENDING_KEYS {
            let stalest = self
                .queues
                .iter()
                .min_by_key(|(_, queue)| queue.front().map_or(u64::MAX, |update| update.seq))
                .map(|(key, _)| *key);
            if let Some(stalest) = stalest {
                let evicted = self.queues.remove(&stalest).map_or(0, |queue| queue.len());
                log::warn!("Too many unresolved entities, dropped {evicted} updates for {stalest:?}");
            }
        }

        let queue = self.queues.entry(key).or_default();
        let dropped = if queue.len() >= self.max_depth {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(update);
        dropped
    }

    /// Removes the queues for `keys`, merged in arrival order.
    pub fn take(&mut self, keys: &[PendingKey]) -> Vec<PendingUpdate> {
        let mut merged: Vec<PendingUpdate> = keys
            .iter()
            .filter_map(|key| self.queues.remove(key))
            .flatten()
            .collect();
        merged.sort_by_key(|update| update.seq);
        merged
    }

    /// Drops everything queued under `key`, returning how many updates that was.
    pub fn discard(&mut self, key: PendingKey) -> usize {
        self.queues.remove(&key).map_or(0, |queue| queue.len())
    }

    pub fn queued(&self, key: PendingKey) -> usize {
        self.queues.get(&key).map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(byte: u8) -> PendingUpdate {
        PendingUpdate::new(UpdateEncoding::Plain, Bytes::from(vec![byte]))
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let mut pending = PendingUpdates::new(2);
        assert!(pending.push(PendingKey::Id(1), update(1)).is_none());
        assert!(pending.push(PendingKey::Id(1), update(2)).is_none());
        let dropped = pending.push(PendingKey::Id(1), update(3)).unwrap();
        assert_eq!(&dropped.payload[..], &[1]);
        assert_eq!(pending.queued(PendingKey::Id(1)), 2);
    }

    #[test]
    fn take_merges_in_arrival_order() {
        let mut pending = PendingUpdates::new(8);
        pending.push(PendingKey::Alias(3), update(1));
        pending.push(PendingKey::Id(9), update(2));
        pending.push(PendingKey::Alias(3), update(3));
        pending.push(PendingKey::Id(5), update(4));

        let merged = pending.take(&[PendingKey::Id(9), PendingKey::Alias(3)]);
        let order: Vec<u8> = merged.iter().map(|u| u.payload[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(pending.len(), 1);
        assert!(pending.take(&[PendingKey::Id(9)]).is_empty());
    }

    #[test]
    fn key_count_is_bounded() {
        let mut pending = PendingUpdates::new(4);
        for id in 0..MAX_PENDING_KEYS as EntityId {
            pending.push(PendingKey::Id(id), update(1));
        }
        pending.push(PendingKey::Id(0), update(2));
        pending.push(PendingKey::Id(-1), update(3));

        // id 0 still holds the oldest entry, so its whole queue goes
        assert_eq!(pending.len(), MAX_PENDING_KEYS);
        assert_eq!(pending.queued(PendingKey::Id(0)), 0);
        assert_eq!(pending.queued(PendingKey::Id(1)), 1);
        assert_eq!(pending.queued(PendingKey::Id(-1)), 1);
        assert_eq!(pending.discard(PendingKey::Id(1)), 1);
        assert_eq!(pending.discard(PendingKey::Id(1)), 0);
    }
}
