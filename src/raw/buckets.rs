use super::arena::Link;
use alloc::boxed::Box;
use core::iter;

/// The smallest number of buckets a table will ever have.
pub(crate) const MIN_BUCKETS: usize = 16;

/// A fixed-length array of bucket heads.
///
/// Each slot is the head of a singly-linked chain of entries that live in the map's entry arena.
/// A `Buckets` never holds keys or values itself, which is what lets it be allocated on a
/// different thread than the one that owns the map.
#[derive(Clone)]
pub struct Buckets {
    heads: Box<[Option<Link>]>,
}

impl Buckets {
    /// Allocates `len` empty buckets.
    ///
    /// `len` must be a power of two no smaller than 16.
    pub fn with_len(len: usize) -> Self {
        debug_assert!(len.is_power_of_two(), "bucket count must be a power of two");
        debug_assert!(len >= MIN_BUCKETS);
        Self {
            heads: iter::repeat(None).take(len).collect(),
        }
    }

    /// Returns the number of buckets.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.heads.len() - 1
    }

    #[inline]
    pub(crate) fn index_of(&self, hash: u64) -> usize {
        hash as usize & self.mask()
    }

    #[inline]
    pub(crate) fn head(&self, index: usize) -> Option<Link> {
        self.heads[index]
    }

    /// Makes `link` the head of bucket `index`, returning the previous head.
    #[inline]
    pub(crate) fn set_head(&mut self, index: usize, link: Option<Link>) -> Option<Link> {
        core::mem::replace(&mut self.heads[index], link)
    }

    #[inline]
    pub(crate) fn take(&mut self, index: usize) -> Option<Link> {
        self.heads[index].take()
    }

    pub(crate) fn clear(&mut self) {
        for head in self.heads.iter_mut() {
            *head = None;
        }
    }

    pub(crate) fn is_empty_at(&self, index: usize) -> bool {
        self.heads[index].is_none()
    }
}

impl core::fmt::Debug for Buckets {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buckets").field("len", &self.len()).finish()
    }
}

/// Rounds a capacity hint up to a valid bucket count.
pub(crate) fn buckets_for(hint: usize) -> usize {
    usize::max(hint, MIN_BUCKETS)
        .checked_next_power_of_two()
        .expect("capacity overflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_rounds() {
        assert_eq!(buckets_for(0), 16);
        assert_eq!(buckets_for(10), 16);
        assert_eq!(buckets_for(16), 16);
        assert_eq!(buckets_for(17), 32);
        assert_eq!(buckets_for(1000), 1024);
    }

    #[test]
    fn index_uses_mask() {
        let b = Buckets::with_len(32);
        assert_eq!(b.len(), 32);
        assert_eq!(b.mask(), 31);
        assert_eq!(b.index_of(5), 5);
        assert_eq!(b.index_of(37), 5);
        assert_eq!(b.index_of(u64::MAX), 31);
        assert!((0..32).all(|i| b.is_empty_at(i)));
    }
}
