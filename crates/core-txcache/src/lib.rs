//! Transaction cache: maps a transaction id to its in-progress
//! record, with bucket-bounded eviction so an aborted tag stream (a
//! client disconnect mid-transaction) can't grow a bucket unbounded.

use core_scratch::{Scratch, ScratchSlice};
use std::time::Instant;

pub const DEFAULT_HASH_SIZE: usize = 5000;
pub const DEFAULT_BUCKET_CAP: usize = 5;

/// One in-progress (or just-completed, pre-reset) transaction. `slots`
/// is `[fconf][slot_index] -> Option<ScratchSlice>`; literal slots
/// never get an entry written but still reserve a `None` so indices
/// line up with the compiled template.
#[derive(Debug)]
pub struct TxRec {
    pub id: u32,
    pub tags_seen: u64,
    pub t_last: Instant,
    pub seq: u64,
    matches: Vec<Vec<Option<ScratchSlice>>>,
    pub scratch: Scratch,
    pub key: Option<Vec<u8>>,
}

impl TxRec {
    fn new(id: u32, scratch_size: usize, slot_counts: &[usize]) -> Self {
        Self {
            id,
            tags_seen: 0,
            t_last: Instant::now(),
            seq: 0,
            matches: slot_counts.iter().map(|&n| vec![None; n]).collect(),
            scratch: Scratch::new(scratch_size),
            key: None,
        }
    }

    pub fn matched(&self, fconf: usize, slot: usize) -> Option<ScratchSlice> {
        self.matches[fconf][slot]
    }

    pub fn is_matched(&self, fconf: usize, slot: usize) -> bool {
        self.matches[fconf][slot].is_some()
    }

    /// First-tag-wins: only writes if the slot is still empty. Returns
    /// whether the write happened.
    pub fn try_set(&mut self, fconf: usize, slot: usize, value: ScratchSlice) -> bool {
        let cell = &mut self.matches[fconf][slot];
        if cell.is_some() {
            return false;
        }
        *cell = Some(value);
        true
    }

    fn reset(&mut self) {
        for fconf in &mut self.matches {
            fconf.iter_mut().for_each(|m| *m = None);
        }
        self.scratch.reset();
        self.tags_seen = 0;
        self.seq = 0;
        self.key = None;
        self.t_last = Instant::now();
    }
}

struct Bucket {
    records: Vec<TxRec>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

/// Open-addressed-by-bucket hash, `bucket = txId mod hash_size`. Each
/// bucket is a small `Vec` standing in for a per-bucket list; a soft
/// per-bucket cap triggers eviction of the oldest non-empty record on
/// the next miss.
pub struct TransactionCache {
    buckets: Vec<Bucket>,
    bucket_cap: usize,
    scratch_size: usize,
    slot_counts: Vec<usize>,
    current_count: usize,
}

impl TransactionCache {
    pub fn new(hash_size: usize, bucket_cap: usize, scratch_size: usize, slot_counts: Vec<usize>) -> Self {
        Self {
            buckets: (0..hash_size.max(1)).map(|_| Bucket::new()).collect(),
            bucket_cap,
            scratch_size,
            slot_counts,
            current_count: 0,
        }
    }

    pub fn current_transaction_count(&self) -> usize {
        self.current_count
    }

    /// Returns the existing record for `id`, or allocates a fresh one,
    /// evicting the oldest non-empty record in the bucket first if the
    /// bucket is already at capacity.
    pub fn get(&mut self, id: u32) -> &mut TxRec {
        let bucket_index = (id as usize) % self.buckets.len();
        let bucket = &mut self.buckets[bucket_index];

        if let Some(pos) = bucket.records.iter().position(|r| r.id == id) {
            return &mut bucket.records[pos];
        }

        if bucket.records.len() >= self.bucket_cap {
            // Evict the oldest record that has seen at least one tag —
            // a brand-new empty record must never be discarded before
            // its first tag arrives.
            let victim = bucket
                .records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.tags_seen != 0)
                .min_by_key(|(_, r)| r.t_last)
                .map(|(idx, _)| idx);
            if let Some(idx) = victim {
                bucket.records.swap_remove(idx);
                self.current_count -= 1;
            }
        }

        bucket
            .records
            .push(TxRec::new(id, self.scratch_size, &self.slot_counts));
        self.current_count += 1;
        bucket.records.last_mut().unwrap()
    }

    /// Resets `id`'s record in place, preserving `id` for reuse since
    /// the reader may assign sequential ids.
    pub fn reset(&mut self, id: u32) {
        let bucket_index = (id as usize) % self.buckets.len();
        if let Some(rec) = self.buckets[bucket_index]
            .records
            .iter_mut()
            .find(|r| r.id == id)
        {
            rec.reset();
        }
    }

    /// Resets and frees every record in every bucket.
    pub fn drain(&mut self) {
        for bucket in &mut self.buckets {
            bucket.records.clear();
        }
        self.current_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(hash_size: usize, cap: usize) -> TransactionCache {
        TransactionCache::new(hash_size, cap, 256, vec![2])
    }

    #[test]
    fn get_allocates_on_miss_and_reuses_on_hit() {
        let mut c = cache(8, 5);
        let rec = c.get(3);
        assert_eq!(rec.id, 3);
        rec.tags_seen = 7;
        let rec2 = c.get(3);
        assert_eq!(rec2.tags_seen, 7);
        assert_eq!(c.current_transaction_count(), 1);
    }

    #[test]
    fn reset_clears_matches_and_preserves_id() {
        let mut c = cache(8, 5);
        {
            let rec = c.get(9);
            rec.try_set(0, 0, ScratchSlice::Main { offset: 0, len: 3 });
            rec.tags_seen = 1;
        }
        c.reset(9);
        let rec = c.get(9);
        assert_eq!(rec.id, 9);
        assert_eq!(rec.tags_seen, 0);
        assert!(!rec.is_matched(0, 0));
    }

    #[test]
    fn first_tag_wins_within_a_slot() {
        let mut c = cache(8, 5);
        let rec = c.get(1);
        assert!(rec.try_set(0, 0, ScratchSlice::Main { offset: 0, len: 1 }));
        assert!(!rec.try_set(0, 0, ScratchSlice::Main { offset: 1, len: 1 }));
        assert_eq!(
            rec.matched(0, 0),
            Some(ScratchSlice::Main { offset: 0, len: 1 })
        );
    }

    #[test]
    fn cache_bound_evicts_non_empty_records_over_cap() {
        // hash_size=1 forces every id into the same bucket.
        let mut c = cache(1, 3);
        for id in 0..100u32 {
            let rec = c.get(id);
            rec.tags_seen = 1; // mark as seen so it's evictable
        }
        assert!(c.current_transaction_count() <= 3);
    }

    #[test]
    fn never_evicts_a_brand_new_empty_record() {
        let mut c = cache(1, 1);
        {
            let rec = c.get(1);
            rec.tags_seen = 1;
        }
        // Second id collides into the same bucket, at cap; the
        // existing record (tags_seen=1) is evictable so this succeeds.
        let rec2 = c.get(2);
        assert_eq!(rec2.id, 2);
        assert_eq!(c.current_transaction_count(), 1);
    }

    #[test]
    fn drain_clears_all_buckets() {
        let mut c = cache(4, 5);
        c.get(1);
        c.get(2);
        c.get(5); // collides with 1 in a 4-bucket table
        assert!(c.current_transaction_count() > 0);
        c.drain();
        assert_eq!(c.current_transaction_count(), 0);
    }
}
