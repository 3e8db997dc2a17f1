//! Chunked storage for map entries.
//!
//! Entries are linked into bucket chains by index rather than by pointer. The arena grows by
//! adding chunks, each as large as all the previous chunks together, and never reallocates a
//! chunk once it exists. Growing the arena therefore never moves (or copies) an entry, which
//! would otherwise reintroduce exactly the kind of all-at-once pause the map is trying to avoid.

use alloc::vec::{self, Vec};
use core::iter::FusedIterator;
use core::mem;
use core::num::NonZeroUsize;
use core::slice;

/// log2 of the number of slots in the first chunk.
const FIRST_CHUNK_LOG2: u32 = 4;
const FIRST_CHUNK: usize = 1 << FIRST_CHUNK_LOG2;

/// The position of an entry in the arena.
///
/// Stored off-by-one so that `Option<Link>` is the size of a `usize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Link(NonZeroUsize);

impl Link {
    #[inline]
    fn new(index: usize) -> Self {
        Link(NonZeroUsize::new(index.wrapping_add(1)).expect("arena index overflow"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0.get() - 1
    }
}

/// A single key-value pair, along with its cached hash and the next entry in its chain.
#[derive(Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Option<Link>,
}

#[derive(Clone)]
pub(crate) enum Slot<K, V> {
    Occupied(Entry<K, V>),
    Vacant { next_free: Option<Link> },
}

impl<K, V> Slot<K, V> {
    #[cfg(feature = "rayon")]
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn occupied(&self) -> Option<&Entry<K, V>> {
        match self {
            Slot::Occupied(e) => Some(e),
            Slot::Vacant { .. } => None,
        }
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn occupied_mut(&mut self) -> Option<&mut Entry<K, V>> {
        match self {
            Slot::Occupied(e) => Some(e),
            Slot::Vacant { .. } => None,
        }
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn into_occupied(self) -> Option<Entry<K, V>> {
        match self {
            Slot::Occupied(e) => Some(e),
            Slot::Vacant { .. } => None,
        }
    }
}

// Returns the number of slots in chunk `chunk`.
//
// Chunk 0 has FIRST_CHUNK slots, and every chunk after that doubles the total.
#[inline]
fn chunk_capacity(chunk: usize) -> usize {
    if chunk == 0 {
        FIRST_CHUNK
    } else {
        FIRST_CHUNK << (chunk - 1)
    }
}

// Returns the global index of the first slot of chunk `chunk`.
#[inline]
fn chunk_start(chunk: usize) -> usize {
    if chunk == 0 {
        0
    } else {
        chunk_capacity(chunk)
    }
}

// Returns the chunk holding slot `index`, and the offset of the slot within that chunk.
#[inline]
fn locate(index: usize) -> (usize, usize) {
    let multiplier = index >> FIRST_CHUNK_LOG2;
    if multiplier == 0 {
        (0, index)
    } else {
        let floor_log2 = (usize::BITS - 1 - multiplier.leading_zeros()) as usize;
        let chunk = floor_log2 + 1;
        (chunk, index - chunk_start(chunk))
    }
}

pub(crate) struct Arena<K, V> {
    chunks: Vec<Vec<Slot<K, V>>>,
    // Head of the list of vacated slots, threaded through `Slot::Vacant`.
    free: Option<Link>,
    // Number of slots ever handed out, i.e. the index of the next fresh slot.
    pushed: usize,
    len: usize,
}

impl<K, V> Arena<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            chunks: Vec::new(),
            free: None,
            pushed: 0,
            len: 0,
        }
    }

    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `entry` and returns where it ended up.
    pub(crate) fn insert(&mut self, entry: Entry<K, V>) -> Link {
        self.len += 1;

        if let Some(link) = self.free {
            match mem::replace(self.slot_mut(link), Slot::Occupied(entry)) {
                Slot::Vacant { next_free } => self.free = next_free,
                Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
            }
            return link;
        }

        let index = self.pushed;
        let (chunk, _) = locate(index);
        if chunk == self.chunks.len() {
            self.chunks.push(Vec::with_capacity(chunk_capacity(chunk)));
        }
        self.chunks[chunk].push(Slot::Occupied(entry));
        self.pushed += 1;
        Link::new(index)
    }

    /// Takes the entry at `link` out of the arena and recycles its slot.
    pub(crate) fn remove(&mut self, link: Link) -> Entry<K, V> {
        let next_free = self.free;
        match mem::replace(self.slot_mut(link), Slot::Vacant { next_free }) {
            Slot::Occupied(entry) => {
                self.free = Some(link);
                self.len -= 1;
                entry
            }
            Slot::Vacant { .. } => unreachable!("removed an entry twice"),
        }
    }

    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn get(&self, link: Link) -> &Entry<K, V> {
        let (chunk, offset) = locate(link.index());
        match self.chunks[chunk][offset] {
            Slot::Occupied(ref entry) => entry,
            Slot::Vacant { .. } => unreachable!("dangling link"),
        }
    }

    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn get_mut(&mut self, link: Link) -> &mut Entry<K, V> {
        match self.slot_mut(link) {
            Slot::Occupied(entry) => entry,
            Slot::Vacant { .. } => unreachable!("dangling link"),
        }
    }

    #[inline]
    fn slot_mut(&mut self, link: Link) -> &mut Slot<K, V> {
        let (chunk, offset) = locate(link.index());
        &mut self.chunks[chunk][offset]
    }

    pub(crate) fn clear(&mut self) {
        self.chunks.clear();
        self.free = None;
        self.pushed = 0;
        self.len = 0;
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn chunks(&self) -> &[Vec<Slot<K, V>>] {
        &self.chunks
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn chunks_mut(&mut self) -> &mut [Vec<Slot<K, V>>] {
        &mut self.chunks
    }

    #[cfg(feature = "rayon")]
    pub(crate) fn into_chunks(self) -> Vec<Vec<Slot<K, V>>> {
        self.chunks
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            chunks: self.chunks.iter(),
            current: [].iter(),
            remaining: self.len,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            remaining: self.len,
            chunks: self.chunks.iter_mut(),
            current: [].iter_mut(),
        }
    }
}

impl<K: Clone, V: Clone> Clone for Arena<K, V> {
    fn clone(&self) -> Self {
        // A plain Vec clone would shrink each chunk to its length, and the next push would then
        // have to reallocate it.
        let chunks = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut c = Vec::with_capacity(chunk_capacity(i));
                c.extend(chunk.iter().cloned());
                c
            })
            .collect();
        Self {
            chunks,
            free: self.free,
            pushed: self.pushed,
            len: self.len,
        }
    }
}

impl<K, V> IntoIterator for Arena<K, V> {
    type Item = Entry<K, V>;
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            remaining: self.len,
            chunks: self.chunks.into_iter(),
            current: Vec::new().into_iter(),
        }
    }
}

/// Iterator over the occupied slots of an arena, in slot order.
pub(crate) struct Iter<'a, K, V> {
    chunks: slice::Iter<'a, Vec<Slot<K, V>>>,
    current: slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            chunks: self.chunks.clone(),
            current: self.current.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for slot in &mut self.current {
                if let Slot::Occupied(entry) = slot {
                    self.remaining -= 1;
                    return Some(entry);
                }
            }
            self.current = self.chunks.next()?.iter();
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

pub(crate) struct IterMut<'a, K, V> {
    chunks: slice::IterMut<'a, Vec<Slot<K, V>>>,
    current: slice::IterMut<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = &'a mut Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for slot in &mut self.current {
                if let Slot::Occupied(entry) = slot {
                    self.remaining -= 1;
                    return Some(entry);
                }
            }
            self.current = self.chunks.next()?.iter_mut();
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

pub(crate) struct IntoIter<K, V> {
    chunks: vec::IntoIter<Vec<Slot<K, V>>>,
    current: vec::IntoIter<Slot<K, V>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for slot in &mut self.current {
                if let Slot::Occupied(entry) = slot {
                    self.remaining -= 1;
                    return Some(entry);
                }
            }
            self.current = self.chunks.next()?.into_iter();
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}
