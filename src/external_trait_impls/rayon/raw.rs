use crate::raw::{RawTable, Slot};
use rayon_::prelude::*;

// Every entry lives in exactly one arena slot no matter which bucket array its chain hangs off,
// so parallel iteration splits over arena chunks and never looks at the buckets.
impl<K, V> RawTable<K, V> {
    /// Returns a parallel iterator over the entries in a `RawTable`.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn par_iter<'a>(&'a self) -> impl ParallelIterator<Item = (&'a K, &'a V)> + 'a
    where
        K: Sync,
        V: Sync,
    {
        self.chunks().par_iter().flat_map_iter(|chunk| {
            chunk
                .iter()
                .filter_map(Slot::occupied)
                .map(|e| (&e.key, &e.value))
        })
    }

    /// Returns a parallel iterator over the entries in a `RawTable`, with mutable values.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn par_iter_mut<'a>(
        &'a mut self,
    ) -> impl ParallelIterator<Item = (&'a K, &'a mut V)> + 'a
    where
        K: Send + Sync,
        V: Send,
    {
        self.chunks_mut().par_iter_mut().flat_map_iter(|chunk| {
            chunk
                .iter_mut()
                .filter_map(Slot::occupied_mut)
                .map(|e| (&e.key, &mut e.value))
        })
    }

    /// Returns a parallel iterator that moves every entry out of the `RawTable`.
    #[cfg_attr(feature = "inline-more", inline)]
    pub(crate) fn into_par_iter(self) -> impl ParallelIterator<Item = (K, V)>
    where
        K: Send,
        V: Send,
    {
        self.into_chunks().into_par_iter().flat_map_iter(|chunk| {
            chunk
                .into_iter()
                .filter_map(Slot::into_occupied)
                .map(|e| (e.key, e.value))
        })
    }
}
