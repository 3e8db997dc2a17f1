//! The two-table core of the map.
//!
//! While a resize is in progress there are two bucket arrays: the current one, and the old one
//! that is being drained into it. Entries are never copied between them. Migrating a bucket just
//! relinks the entries of its chain into the chains of the current table.
//!
//! Every old bucket is in one of two states. Either it still holds all the entries whose hash
//! falls into it under the old mask, or it is empty and those entries live in the current table.
//! A bucket's keys are never split across the two tables, so a lookup only ever needs to walk one
//! chain.

mod arena;
mod buckets;

use self::arena::{Arena, Entry, Link};
pub use self::buckets::Buckets;
pub(crate) use self::buckets::buckets_for;
use core::mem;

#[cfg(any(test, miri))]
pub(crate) const R: usize = 4;
/// The number of old buckets moved over on each mutating operation.
#[cfg(not(any(test, miri)))]
pub(crate) const R: usize = 8;

pub(crate) type Iter<'a, K, V> = arena::Iter<'a, K, V>;
pub(crate) type IterMut<'a, K, V> = arena::IterMut<'a, K, V>;
pub(crate) type IntoIter<K, V> = arena::IntoIter<K, V>;
#[cfg(feature = "rayon")]
pub(crate) use self::arena::Slot;

/// A chained hash table that can be in the middle of moving to a table twice its size.
#[derive(Clone)]
pub(crate) struct RawTable<K, V> {
    entries: Arena<K, V>,
    table: Buckets,
    leftovers: Option<OldTable>,
}

#[derive(Clone)]
struct OldTable {
    buckets: Buckets,
    // Buckets [0, migrated) have all been moved over.
    migrated: usize,
}

// Moves every entry in bucket `index` of `old` into `table`.
//
// Moving an empty bucket does nothing, so this may safely be repeated.
fn migrate<K, V>(entries: &mut Arena<K, V>, table: &mut Buckets, old: &mut Buckets, index: usize) {
    let mut link = old.take(index);
    while let Some(l) = link {
        let entry = entries.get_mut(l);
        link = entry.next;
        let to = table.index_of(entry.hash);
        entry.next = table.set_head(to, Some(l));
    }
}

impl<K, V> RawTable<K, V> {
    /// Creates an empty table with `buckets` buckets.
    pub(crate) fn with_buckets(buckets: usize) -> Self {
        Self {
            entries: Arena::new(),
            table: Buckets::with_len(buckets),
            leftovers: None,
        }
    }

    /// Returns the number of entries in the table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of buckets in the current table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn buckets(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn is_split(&self) -> bool {
        self.leftovers.is_some()
    }

    /// Moves the next `R` old buckets over, and retires the old table once it is empty.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn carry(&mut self) {
        let done = match self.leftovers {
            Some(ref mut lo) => {
                let end = usize::min(lo.migrated + R, lo.buckets.len());
                for index in lo.migrated..end {
                    migrate(&mut self.entries, &mut self.table, &mut lo.buckets, index);
                }
                lo.migrated = end;
                end == lo.buckets.len()
            }
            None => return,
        };
        if done {
            // The resize is finally fully complete.
            let _ = self.leftovers.take();
            tracing::debug!(buckets = self.table.len(), len = self.len(), "resize complete");
        }
    }

    /// Makes sure that the entries that hash like `hash` all live in the current table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn ensure_migrated(&mut self, hash: u64) {
        if let Some(ref mut lo) = self.leftovers {
            let index = lo.buckets.index_of(hash);
            if index >= lo.migrated {
                migrate(&mut self.entries, &mut self.table, &mut lo.buckets, index);
            }
        }
    }

    /// Returns true if entries that hash like `hash` are still linked from the old table.
    #[inline]
    pub(crate) fn resident_in_old(&self, hash: u64) -> bool {
        match self.leftovers {
            Some(ref lo) => {
                let index = lo.buckets.index_of(hash);
                // Buckets past the cursor may have been moved early by `ensure_migrated`, in
                // which case they are empty and the current table is authoritative.
                index >= lo.migrated && !lo.buckets.is_empty_at(index)
            }
            None => false,
        }
    }

    // Returns the head of the one chain that may hold an entry with this hash.
    #[inline]
    fn chain(&self, hash: u64) -> Option<Link> {
        match self.leftovers {
            Some(ref lo) if self.resident_in_old(hash) => lo.buckets.head(lo.buckets.index_of(hash)),
            _ => self.table.head(self.table.index_of(hash)),
        }
    }

    /// Searches for an entry, without moving anything.
    #[inline]
    pub(crate) fn find(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<Link> {
        let mut link = self.chain(hash);
        while let Some(l) = link {
            let entry = self.entries.get(l);
            if entry.hash == hash && eq(&entry.key) {
                return Some(l);
            }
            link = entry.next;
        }
        None
    }

    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn get(&self, link: Link) -> (&K, &V) {
        let entry = self.entries.get(link);
        (&entry.key, &entry.value)
    }

    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn get_mut(&mut self, link: Link) -> (&K, &mut V) {
        let entry = self.entries.get_mut(link);
        (&entry.key, &mut entry.value)
    }

    /// Removes the entry that matches `eq`, if any.
    pub(crate) fn remove(&mut self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        self.carry();
        self.ensure_migrated(hash);

        let index = self.table.index_of(hash);
        let mut prev: Option<Link> = None;
        let mut link = self.table.head(index);
        while let Some(l) = link {
            let entry = self.entries.get(l);
            if entry.hash == hash && eq(&entry.key) {
                let next = entry.next;
                match prev {
                    Some(p) => self.entries.get_mut(p).next = next,
                    None => {
                        let _ = self.table.set_head(index, next);
                    }
                }
                let entry = self.entries.remove(l);
                return Some((entry.key, entry.value));
            }
            prev = Some(l);
            link = entry.next;
        }
        None
    }

    /// Swaps in `buckets` as the current table and starts draining the previous one into it.
    ///
    /// `buckets` must be twice as long as the current table, and no resize may be in progress.
    pub(crate) fn start_resize(&mut self, buckets: Buckets) {
        debug_assert!(
            self.leftovers.is_none(),
            "resize while elements are still left over"
        );
        debug_assert_eq!(buckets.len(), self.table.len() * 2);

        let old = mem::replace(&mut self.table, buckets);
        tracing::debug!(
            from = old.len(),
            to = self.table.len(),
            len = self.len(),
            "starting resize"
        );
        if self.len() != 0 {
            self.leftovers = Some(OldTable {
                buckets: old,
                migrated: 0,
            });
        }
    }

    /// Removes all entries, keeping the current number of buckets.
    pub(crate) fn clear(&mut self) {
        let _ = self.leftovers.take();
        self.table.clear();
        self.entries.clear();
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.entries.iter_mut()
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn chunks(&self) -> &[alloc::vec::Vec<Slot<K, V>>] {
        self.entries.chunks()
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn chunks_mut(&mut self) -> &mut [alloc::vec::Vec<Slot<K, V>>] {
        self.entries.chunks_mut()
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn into_chunks(self) -> alloc::vec::Vec<alloc::vec::Vec<Slot<K, V>>> {
        self.entries.into_chunks()
    }
}

impl<K: Eq, V> RawTable<K, V> {
    /// Inserts `key`, or updates its value if it is already present.
    ///
    /// Returns the previous value, if any.
    pub(crate) fn insert(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        self.carry();
        self.ensure_migrated(hash);

        let index = self.table.index_of(hash);
        let mut tail: Option<Link> = None;
        let mut link = self.table.head(index);
        while let Some(l) = link {
            let entry = self.entries.get_mut(l);
            if entry.hash == hash && entry.key == key {
                return Some(mem::replace(&mut entry.value, value));
            }
            tail = Some(l);
            link = entry.next;
        }

        let new = self.entries.insert(Entry {
            hash,
            key,
            value,
            next: None,
        });
        match tail {
            Some(t) => self.entries.get_mut(t).next = Some(new),
            None => {
                let _ = self.table.set_head(index, Some(new));
            }
        }
        None
    }
}

impl<K, V> IntoIterator for RawTable<K, V> {
    type Item = (K, V);
    type IntoIter = core::iter::Map<IntoIter<K, V>, fn(Entry<K, V>) -> (K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        let pair: fn(Entry<K, V>) -> (K, V) = |e| (e.key, e.value);
        self.entries.into_iter().map(pair)
    }
}

#[cfg(test)]
impl<K, V> RawTable<K, V> {
    pub(crate) fn migrated(&self) -> Option<usize> {
        self.leftovers.as_ref().map(|lo| lo.migrated)
    }

    pub(crate) fn old_buckets(&self) -> Option<usize> {
        self.leftovers.as_ref().map(|lo| lo.buckets.len())
    }

    pub(crate) fn migrate_bucket(&mut self, index: usize) {
        if let Some(ref mut lo) = self.leftovers {
            migrate(&mut self.entries, &mut self.table, &mut lo.buckets, index);
        }
    }

    fn walk(&self, mut link: Option<Link>) -> std::vec::Vec<Link> {
        let mut links = std::vec::Vec::new();
        while let Some(l) = link {
            links.push(l);
            link = self.entries.get(l).next;
        }
        links
    }

    /// Returns the keys chained in bucket `index` of the current table.
    pub(crate) fn chain_keys(&self, index: usize) -> std::vec::Vec<&K> {
        self.walk(self.table.head(index))
            .into_iter()
            .map(|l| &self.entries.get(l).key)
            .collect()
    }

    /// Checks every structural invariant of the two tables.
    pub(crate) fn check(&self) {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        assert!(self.table.len().is_power_of_two());
        assert!(self.table.len() >= buckets::MIN_BUCKETS);

        let mut old_owned = HashSet::new();
        if let Some(ref lo) = self.leftovers {
            assert_eq!(lo.buckets.len() * 2, self.table.len());
            assert!(lo.migrated < lo.buckets.len());
            for index in 0..lo.buckets.len() {
                let links = self.walk(lo.buckets.head(index));
                if index < lo.migrated {
                    assert!(links.is_empty(), "old bucket {} below the cursor", index);
                }
                if !links.is_empty() {
                    old_owned.insert(index);
                }
                for l in links {
                    assert_eq!(lo.buckets.index_of(self.entries.get(l).hash), index);
                    assert!(seen.insert(l), "entry reachable twice");
                }
            }
        }

        for index in 0..self.table.len() {
            for l in self.walk(self.table.head(index)) {
                let hash = self.entries.get(l).hash;
                assert_eq!(self.table.index_of(hash), index);
                if let Some(ref lo) = self.leftovers {
                    assert!(
                        !old_owned.contains(&lo.buckets.index_of(hash)),
                        "bucket split across both tables"
                    );
                }
                assert!(seen.insert(l), "entry reachable twice");
            }
        }

        assert_eq!(seen.len(), self.len(), "entry unreachable");
    }
}
