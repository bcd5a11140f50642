use std::collections::{BTreeMap, HashMap};

use backscroll_client::{MessageId, MessageRecord, OrderingKey};

/// Inclusive ordering-key span that eviction must leave untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepRange {
    pub from: OrderingKey,
    pub to: OrderingKey,
}

impl KeepRange {
    pub fn new(from: OrderingKey, to: OrderingKey) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    pub fn contains(&self, key: OrderingKey) -> bool {
        self.from <= key && key <= self.to
    }
}

/// Outcome of one cache upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Bounded, deduplicated, ordering-keyed store for one conversation's messages.
///
/// Iterating in key order always yields a strictly increasing sequence with
/// unique ids, regardless of insertion order or duplicate insertions.
pub struct MessageCache {
    by_key: BTreeMap<OrderingKey, MessageRecord>,
    key_by_id: HashMap<MessageId, OrderingKey>,
    max_size: usize,
}

impl MessageCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            by_key: BTreeMap::new(),
            key_by_id: HashMap::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn has(&self, id: MessageId) -> bool {
        self.key_by_id.contains_key(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&MessageRecord> {
        let key = self.key_by_id.get(&id)?;
        self.by_key.get(key)
    }

    pub fn oldest_key(&self) -> Option<OrderingKey> {
        self.by_key.keys().next().copied()
    }

    pub fn newest_key(&self) -> Option<OrderingKey> {
        self.by_key.keys().next_back().copied()
    }

    pub fn ordered(&self) -> impl Iterator<Item = &MessageRecord> {
        self.by_key.values()
    }

    pub fn ordered_messages(&self) -> Vec<MessageRecord> {
        self.by_key.values().cloned().collect()
    }

    pub fn ordered_slice(&self, from: OrderingKey, to: OrderingKey) -> Vec<&MessageRecord> {
        self.by_key.range(from..=to).map(|(_, record)| record).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = OrderingKey> + '_ {
        self.by_key.keys().copied()
    }

    /// Inserts every record whose id is not already present.
    ///
    /// Re-inserting a known id is a per-message no-op and never disturbs
    /// ordering. An id re-appearing under a different key, or two ids
    /// claiming the same key, is a programming error upstream.
    pub fn upsert(&mut self, messages: &[MessageRecord]) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();

        for message in messages {
            if let Some(existing_key) = self.key_by_id.get(&message.id) {
                debug_assert_eq!(
                    *existing_key, message.ordering_key,
                    "message {} re-inserted under a different ordering key",
                    message.id
                );
                outcome.duplicates += 1;
                continue;
            }

            if let Some(occupant) = self.by_key.get(&message.ordering_key) {
                debug_assert!(
                    false,
                    "ordering key {} already held by message {}",
                    message.ordering_key, occupant.id
                );
                tracing::warn!(
                    ordering_key = %message.ordering_key,
                    incoming_id = %message.id,
                    occupant_id = %occupant.id,
                    "skipping record with conflicting ordering key"
                );
                outcome.duplicates += 1;
                continue;
            }

            self.key_by_id.insert(message.id, message.ordering_key);
            self.by_key.insert(message.ordering_key, message.clone());
            outcome.inserted += 1;
        }

        outcome
    }

    /// Removes entries outside `keep` until the cache fits its budget.
    ///
    /// The entry farthest from the kept span goes first, which drains the
    /// below-range side oldest-first and the above-range side newest-first.
    /// Entries inside `keep` are never evicted, even if the cache stays over
    /// budget. Returns the number of evicted entries.
    pub fn evict_if_over_capacity(&mut self, keep: KeepRange) -> usize {
        let mut evicted = 0usize;

        while self.by_key.len() > self.max_size {
            let below = self
                .oldest_key()
                .filter(|key| *key < keep.from);
            let above = self
                .newest_key()
                .filter(|key| *key > keep.to);

            let victim = match (below, above) {
                (Some(below_key), Some(above_key)) => {
                    let below_distance = keep.from.as_i64().saturating_sub(below_key.as_i64());
                    let above_distance = above_key.as_i64().saturating_sub(keep.to.as_i64());
                    if above_distance > below_distance {
                        above_key
                    } else {
                        below_key
                    }
                }
                (Some(below_key), None) => below_key,
                (None, Some(above_key)) => above_key,
                (None, None) => break,
            };

            if let Some(record) = self.by_key.remove(&victim) {
                self.key_by_id.remove(&record.id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = self.len(),
                keep_from = %keep.from,
                keep_to = %keep.to,
                "evicted cache entries outside the keep range"
            );
        }

        evicted
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.key_by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use backscroll_client::{ConversationId, MessageId, SenderId};

    use super::*;

    fn record(conversation_id: ConversationId, key: i64) -> MessageRecord {
        MessageRecord::new(
            MessageId::generate(),
            conversation_id,
            OrderingKey::new(key),
            SenderId::generate(),
            format!("message-{key}"),
        )
    }

    fn assert_strictly_increasing(cache: &MessageCache) {
        let keys: Vec<_> = cache.keys().collect();
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn ordering_holds_under_out_of_order_and_duplicate_upserts() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(100);

        let newest: Vec<_> = (50..60).map(|key| record(conversation_id, key)).collect();
        let oldest: Vec<_> = (10..20).map(|key| record(conversation_id, key)).collect();
        let middle: Vec<_> = (30..40).map(|key| record(conversation_id, key)).collect();

        cache.upsert(&newest);
        cache.upsert(&oldest);
        cache.upsert(&middle);
        let replay = cache.upsert(&newest);

        assert_eq!(cache.len(), 30);
        assert_eq!(replay.inserted, 0);
        assert_eq!(replay.duplicates, 10);
        assert_strictly_increasing(&cache);
    }

    #[test]
    fn duplicate_id_is_a_per_message_noop() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(10);
        let original = record(conversation_id, 5);

        cache.upsert(std::slice::from_ref(&original));
        let mut replay = original.clone();
        replay.content = "mutated copy".to_string();
        let outcome = cache.upsert(std::slice::from_ref(&replay));

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.duplicates, 1);
        // The cached record is immutable once stored.
        assert_eq!(
            cache.get(original.id).map(|stored| stored.content.as_str()),
            Some("message-5")
        );
    }

    #[test]
    fn ordered_slice_is_inclusive() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(100);
        let records: Vec<_> = (1..=9).map(|key| record(conversation_id, key)).collect();
        cache.upsert(&records);

        let slice = cache.ordered_slice(OrderingKey::new(3), OrderingKey::new(6));
        let keys: Vec<_> = slice.iter().map(|message| message.ordering_key.0).collect();
        assert_eq!(keys, vec![3, 4, 5, 6]);
    }

    #[test]
    fn eviction_never_touches_the_keep_range() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(10);
        let records: Vec<_> = (1..=30).map(|key| record(conversation_id, key)).collect();
        cache.upsert(&records);

        let keep = KeepRange::new(OrderingKey::new(21), OrderingKey::new(30));
        let evicted = cache.evict_if_over_capacity(keep);

        assert_eq!(evicted, 20);
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.oldest_key(), Some(OrderingKey::new(21)));
        assert_eq!(cache.newest_key(), Some(OrderingKey::new(30)));
        assert_strictly_increasing(&cache);
    }

    #[test]
    fn eviction_drains_the_farther_side_first() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(5);
        // Keys 1..=4 sit far below the kept span, 10..=13 hug it from above.
        let below: Vec<_> = (1..=4).map(|key| record(conversation_id, key)).collect();
        let kept: Vec<_> = (6..=8).map(|key| record(conversation_id, key)).collect();
        let above: Vec<_> = (10..=13).map(|key| record(conversation_id, key)).collect();
        cache.upsert(&below);
        cache.upsert(&kept);
        cache.upsert(&above);

        let keep = KeepRange::new(OrderingKey::new(6), OrderingKey::new(8));
        cache.evict_if_over_capacity(keep);

        assert_eq!(cache.len(), 5);
        // The far-below oldest keys go before the close-above newest ones.
        assert!(!cache.keys().any(|key| key.0 <= 2));
        assert!(cache.keys().any(|key| key.0 == 10));
    }

    #[test]
    fn keep_range_larger_than_budget_stops_eviction() {
        let conversation_id = ConversationId::generate();
        let mut cache = MessageCache::new(3);
        let records: Vec<_> = (1..=8).map(|key| record(conversation_id, key)).collect();
        cache.upsert(&records);

        let keep = KeepRange::new(OrderingKey::new(1), OrderingKey::new(6));
        let evicted = cache.evict_if_over_capacity(keep);

        // Only the two entries outside the span may go; kept entries survive
        // even though the cache stays over budget.
        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 6);
        assert!(cache.keys().all(|key| keep.contains(key)));
    }
}
