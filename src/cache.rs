//! TTL-aware store of full upstream answers, keyed by question section.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

use crate::dns_message::{remaining_ttl, CacheKey, Message};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Message,
    pub inserted_at: Instant,
    pub original_ttl: u32,
}

impl CacheEntry {
    /// Fresh while no more than `original_ttl` seconds have passed since insertion.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) <= Duration::from_secs(u64::from(self.original_ttl))
    }

    pub fn remaining_ttl(&self, now: Instant) -> u32 {
        remaining_ttl(self.inserted_at, self.original_ttl, now)
    }
}

/// Shared answer cache.
///
/// Entries live until overwritten; nothing is evicted. Each `store` replaces
/// the whole entry in a single map operation, so concurrent readers see either
/// the old entry or the new one.
#[derive(Debug, Default)]
pub struct AnswerCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl AnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &[u8]) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Cache `response` under `key`, taking its TTL from the first answer record.
    pub fn store(&self, key: CacheKey, response: Message, now: Instant) -> Result<()> {
        let original_ttl = response.extract_ttl()?;
        trace!(name = %response.question.name, original_ttl, "caching answer");

        self.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: now,
                original_ttl,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dns_question_and_answer::{DnsAnswer, RecordClass, RecordType};
    use crate::error::ProxyError;

    fn answer_with_ttl(ttl: u32, ip: [u8; 4]) -> Message {
        let query = Message::query(0x4242, "example.com", RecordType::A, RecordClass::IN).unwrap();
        Message::response(&query, &[DnsAnswer::new_a_record("example.com", ttl, ip)]).unwrap()
    }

    #[test]
    fn test_freshness_boundary() {
        let cache = AnswerCache::new();
        let response = answer_with_ttl(300, [1, 2, 3, 4]);
        let key = response.question_key();
        let t0 = Instant::now();

        cache.store(key.clone(), response, t0).unwrap();
        let entry = cache.lookup(&key).unwrap();

        assert_eq!(entry.original_ttl, 300);
        assert!(entry.is_fresh(t0));
        assert!(entry.is_fresh(t0 + Duration::from_secs(300)));
        assert!(!entry.is_fresh(t0 + Duration::from_secs(301)));
        assert_eq!(entry.remaining_ttl(t0 + Duration::from_secs(100)), 200);
        assert_eq!(entry.remaining_ttl(t0 + Duration::from_secs(500)), 0);
    }

    #[test]
    fn test_store_overwrites_previous_entry() {
        let cache = AnswerCache::new();
        let first = answer_with_ttl(60, [1, 1, 1, 1]);
        let second = answer_with_ttl(120, [2, 2, 2, 2]);
        let key = first.question_key();
        let t0 = Instant::now();

        cache.store(key.clone(), first, t0).unwrap();
        cache.store(key.clone(), second.clone(), t0 + Duration::from_secs(5)).unwrap();

        let entry = cache.lookup(&key).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(entry.response, second);
        assert_eq!(entry.original_ttl, 120);
        assert_eq!(entry.inserted_at, t0 + Duration::from_secs(5));
    }

    #[test]
    fn test_store_rejects_query_direction() {
        let cache = AnswerCache::new();
        let query = Message::query(1, "example.com", RecordType::A, RecordClass::IN).unwrap();

        let err = cache.store(query.question_key(), query, Instant::now()).unwrap_err();
        assert!(matches!(err, ProxyError::NotAResponse));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_miss() {
        let cache = AnswerCache::new();
        assert!(cache.lookup(b"\x00\x00\x01\x00\x01").is_none());
    }

    #[test]
    fn test_concurrent_stores_leave_one_whole_entry() {
        let cache = Arc::new(AnswerCache::new());
        let t0 = Instant::now();
        let writes: Vec<(u32, [u8; 4])> = (1..=16u8).map(|i| (u32::from(i) * 10, [i, i, i, i])).collect();
        let key = answer_with_ttl(1, [0, 0, 0, 0]).question_key();

        let handles: Vec<_> = writes
            .iter()
            .copied()
            .map(|(ttl, ip)| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cache.store(key.clone(), answer_with_ttl(ttl, ip), t0).unwrap();
                        let seen = cache.lookup(&key).unwrap();
                        assert_eq!(seen.response.extract_ttl().unwrap(), seen.original_ttl);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = cache.lookup(&key).unwrap();
        assert_eq!(cache.len(), 1);
        let winner = writes
            .iter()
            .find(|(ttl, _)| *ttl == entry.original_ttl)
            .expect("stored ttl belongs to one of the writers");
        assert_eq!(entry.response, answer_with_ttl(winner.0, winner.1));
    }
}
