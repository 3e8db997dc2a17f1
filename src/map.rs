use crate::grow::{Allocate, Claim, DefaultAllocator, PendingBuckets, BACKGROUND_CUTOFF};
use crate::raw::{self, buckets_for, Buckets, RawTable};
use core::borrow::Borrow;
use core::fmt::{self, Debug};
use core::hash::{BuildHasher, Hash, Hasher};
use core::iter::{FromIterator, FusedIterator};
use core::ops::Index;

/// Default hasher for `HashMap`.
#[cfg(feature = "ahash")]
pub type DefaultHashBuilder = hashbrown::hash_map::DefaultHashBuilder;

/// Dummy default hasher for `HashMap`.
#[cfg(not(feature = "ahash"))]
pub enum DefaultHashBuilder {}

/// A hash map that grows without ever pausing to move all of its entries at once.
///
/// When the map outgrows its table, it starts a new table of twice the size and from then on
/// moves a handful of old buckets over on every insert or removal, until the old table is empty.
/// Any bucket that an operation needs is moved on the spot, so every lookup only ever walks a
/// single chain, in whichever table currently owns that bucket.
///
/// Once the table has [`BACKGROUND_CUTOFF`] buckets or more, the next table is allocated through
/// `A` (by default a [`BackgroundAllocator`](crate::grow::BackgroundAllocator)), and the resize
/// starts only once that allocation has finished. Inserts never wait for it; the map just runs
/// over its load factor for a little while.
///
/// The load factor is fixed at 0.5.
pub struct HashMap<K, V, S = DefaultHashBuilder, A = DefaultAllocator> {
    pub(crate) hash_builder: S,
    pub(crate) table: RawTable<K, V>,
    allocator: A,
    // Grow once there are more than this many entries.
    threshold: usize,
    pending: Option<PendingBuckets>,
}

impl<K: Clone, V: Clone, S: Clone, A: Clone> Clone for HashMap<K, V, S, A> {
    fn clone(&self) -> Self {
        HashMap {
            hash_builder: self.hash_builder.clone(),
            table: self.table.clone(),
            allocator: self.allocator.clone(),
            threshold: self.threshold,
            // The clone asks for its own next table when it needs one.
            pending: None,
        }
    }
}

#[cfg_attr(feature = "inline-more", inline)]
pub(crate) fn make_hash<K: Hash + ?Sized>(hash_builder: &impl BuildHasher, val: &K) -> u64 {
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

#[cfg(feature = "ahash")]
impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty `HashMap` with 16 buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::new();
    /// assert_eq!(map.buckets(), 16);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `HashMap` that starts out with at least `capacity` buckets.
    ///
    /// The number of buckets is rounded up to a power of two, and is never less than 16. The map
    /// grows once it holds more than half as many entries as it has buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    /// let map: HashMap<&str, i32> = HashMap::with_capacity(100);
    /// assert_eq!(map.buckets(), 128);
    /// assert_eq!(map.capacity(), 64);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` which will use the given hash builder to hash keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    /// use pauseless::hash_map::DefaultHashBuilder;
    ///
    /// let s = DefaultHashBuilder::default();
    /// let mut map = HashMap::with_hasher(s);
    /// map.insert(1, 2);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty `HashMap` with at least `capacity` buckets, using `hash_builder` to hash
    /// the keys.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self::with_capacity_hasher_and_allocator(capacity, hash_builder, DefaultAllocator::default())
    }
}

impl<K, V, S, A> HashMap<K, V, S, A> {
    /// Creates an empty `HashMap` with at least `capacity` buckets, using `hash_builder` to hash
    /// the keys and `allocator` to allocate the bucket arrays of large tables.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    /// use pauseless::grow::InlineAllocator;
    /// use pauseless::hash_map::DefaultHashBuilder;
    ///
    /// let mut map =
    ///     HashMap::with_capacity_hasher_and_allocator(0, DefaultHashBuilder::default(), InlineAllocator);
    /// map.insert("a", 1);
    /// assert_eq!(map.get("a"), Some(&1));
    /// ```
    pub fn with_capacity_hasher_and_allocator(capacity: usize, hash_builder: S, allocator: A) -> Self {
        let buckets = buckets_for(capacity);
        Self {
            hash_builder,
            table: RawTable::with_buckets(buckets),
            allocator,
            threshold: buckets / 2,
            pending: None,
        }
    }

    /// Returns a reference to the map's [`BuildHasher`].
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns a reference to the map's bucket-array allocator.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Returns the number of elements the map can hold before it starts to grow.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn capacity(&self) -> usize {
        self.threshold
    }

    /// Returns the number of buckets in the current table.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn buckets(&self) -> usize {
        self.table.buckets()
    }

    /// Returns true if entries are still being moved from an old table into the current one.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn is_split(&self) -> bool {
        self.table.is_split()
    }

    /// Returns true if the next table has been requested from the allocator but not yet put to
    /// use.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn is_growing(&self) -> bool {
        self.pending.is_some()
    }

    /// An iterator visiting all keys in arbitrary order.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// An iterator visiting all values in arbitrary order.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// An iterator visiting all values mutably in arbitrary order.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// An iterator visiting all key-value pairs in arbitrary order.
    ///
    /// Entries are visited exactly once each, whether or not they have been moved to the current
    /// table yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// for i in 0..100 {
    ///     map.insert(i, i);
    /// }
    /// assert_eq!(map.iter().count(), 100);
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// An iterator visiting all key-value pairs in arbitrary order, with mutable references to
    /// the values.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns the number of elements in the map.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the map contains no elements.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears the map, removing all key-value pairs.
    ///
    /// The current number of buckets is kept, as is any table allocation already in flight.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn clear(&mut self) {
        self.table.clear();
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: Allocate,
{
    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, [`None`] is returned.
    ///
    /// If the map did have this key present, the value is updated, and the old value is
    /// returned. The key is not updated.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.is_empty(), false);
    ///
    /// map.insert(37, "b");
    /// assert_eq!(map.insert(37, "c"), Some("b"));
    /// assert_eq!(map[&37], "c");
    /// ```
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        let hash = make_hash(&self.hash_builder, &k);
        let previous = self.table.insert(hash, k, v);
        if previous.is_none() && self.table.len() > self.threshold && !self.table.is_split() {
            self.grow();
        }
        previous
    }

    /// Removes a key from the map, returning the value at the key if the key was previously in
    /// the map.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.remove_entry(k).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if the key was previously
    /// in the map.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn remove_entry<Q: ?Sized>(&mut self, k: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash(&self.hash_builder, k);
        self.table.remove(hash, |x| k.eq(x.borrow()))
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let want = self.table.buckets() * 2;
        if self.table.buckets() < BACKGROUND_CUTOFF {
            self.start_resize(Buckets::with_len(want));
            return;
        }

        let buckets = match self.pending.take() {
            None => {
                tracing::debug!(buckets = want, "requesting next table");
                self.pending = Some(self.allocator.submit(want));
                return;
            }
            Some(pending) => match pending.try_claim() {
                Claim::Ready(buckets) => buckets,
                Claim::Pending(pending) => {
                    tracing::trace!(
                        len = self.table.len(),
                        threshold = self.threshold,
                        "next table not ready yet"
                    );
                    self.pending = Some(pending);
                    return;
                }
                Claim::Failed => {
                    tracing::warn!(buckets = want, "next table allocation failed, allocating inline");
                    Buckets::with_len(want)
                }
            },
        };

        let buckets = if buckets.len() == want {
            buckets
        } else {
            tracing::warn!(
                got = buckets.len(),
                buckets = want,
                "allocator returned a table of the wrong size, allocating inline"
            );
            Buckets::with_len(want)
        };
        self.start_resize(buckets);
    }

    fn start_resize(&mut self, buckets: Buckets) {
        self.threshold *= 2;
        self.table.start_resize(buckets);
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use pauseless::HashMap;
    ///
    /// let mut map = HashMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    #[inline]
    pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.get_key_value(k).map(|(_, v)| v)
    }

    /// Returns the key-value pair corresponding to the supplied key.
    #[inline]
    pub fn get_key_value<Q: ?Sized>(&self, k: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash(&self.hash_builder, k);
        self.table
            .find(hash, |x| k.eq(x.borrow()))
            .map(|link| self.table.get(link))
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.get(k).is_some()
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// This does not move any entries between tables.
    #[cfg_attr(feature = "inline-more", inline)]
    pub fn get_mut<Q: ?Sized>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash(&self.hash_builder, k);
        let link = self.table.find(hash, |x| k.eq(x.borrow()))?;
        Some(self.table.get_mut(link).1)
    }
}

impl<K, V, S, A> PartialEq for HashMap<K, V, S, A>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        self.iter()
            .all(|(key, value)| other.get(key).map_or(false, |v| *value == *v))
    }
}

impl<K, V, S, A> Eq for HashMap<K, V, S, A>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S, A> Debug for HashMap<K, V, S, A>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, A> Default for HashMap<K, V, S, A>
where
    S: Default,
    A: Default,
{
    /// Creates an empty `HashMap<K, V, S, A>`, with the `Default` value for the hasher and
    /// allocator.
    #[cfg_attr(feature = "inline-more", inline)]
    fn default() -> Self {
        Self::with_capacity_hasher_and_allocator(0, S::default(), A::default())
    }
}

impl<K, Q: ?Sized, V, S, A> Index<&Q> for HashMap<K, V, S, A>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash,
    S: BuildHasher,
{
    type Output = V;

    /// Returns a reference to the value corresponding to the supplied key.
    ///
    /// # Panics
    ///
    /// Panics if the key is not present in the `HashMap`.
    #[cfg_attr(feature = "inline-more", inline)]
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

/// An iterator over the entries of a `HashMap`.
///
/// This `struct` is created by the [`iter`] method on [`HashMap`]. See its documentation for more.
///
/// [`iter`]: struct.HashMap.html#method.iter
/// [`HashMap`]: struct.HashMap.html
pub struct Iter<'a, K, V> {
    inner: raw::Iter<'a, K, V>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    #[cfg_attr(feature = "inline-more", inline)]
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Debug, V: Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.inner.next().map(|e| (&e.key, &e.value))
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a `HashMap`.
///
/// This `struct` is created by the [`iter_mut`] method on [`HashMap`]. See its documentation for
/// more.
///
/// [`iter_mut`]: struct.HashMap.html#method.iter_mut
/// [`HashMap`]: struct.HashMap.html
pub struct IterMut<'a, K, V> {
    inner: raw::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<(&'a K, &'a mut V)> {
        self.inner.next().map(|e| (&e.key, &mut e.value))
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An owning iterator over the entries of a `HashMap`.
///
/// This `struct` is created by the [`into_iter`] method on [`HashMap`]
/// (provided by the `IntoIterator` trait). See its documentation for more.
///
/// [`into_iter`]: struct.HashMap.html#method.into_iter
/// [`HashMap`]: struct.HashMap.html
pub struct IntoIter<K, V> {
    inner: <RawTable<K, V> as IntoIterator>::IntoIter,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<(K, V)> {
        self.inner.next()
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

/// An iterator over the keys of a `HashMap`.
///
/// This `struct` is created by the [`keys`] method on [`HashMap`]. See its documentation for more.
///
/// [`keys`]: struct.HashMap.html#method.keys
/// [`HashMap`]: struct.HashMap.html
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<K, V> Clone for Keys<'_, K, V> {
    #[cfg_attr(feature = "inline-more", inline)]
    fn clone(&self) -> Self {
        Keys {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Debug, V> fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `HashMap`.
///
/// This `struct` is created by the [`values`] method on [`HashMap`]. See its documentation for more.
///
/// [`values`]: struct.HashMap.html#method.values
/// [`HashMap`]: struct.HashMap.html
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<K, V> Clone for Values<'_, K, V> {
    #[cfg_attr(feature = "inline-more", inline)]
    fn clone(&self) -> Self {
        Values {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V: Debug> fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of a `HashMap`.
///
/// This `struct` is created by the [`values_mut`] method on [`HashMap`]. See its documentation for
/// more.
///
/// [`values_mut`]: struct.HashMap.html#method.values_mut
/// [`HashMap`]: struct.HashMap.html
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    #[cfg_attr(feature = "inline-more", inline)]
    fn next(&mut self) -> Option<&'a mut V> {
        self.inner.next().map(|(_, v)| v)
    }

    #[cfg_attr(feature = "inline-more", inline)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

impl<'a, K, V, S, A> IntoIterator for &'a HashMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    #[cfg_attr(feature = "inline-more", inline)]
    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S, A> IntoIterator for &'a mut HashMap<K, V, S, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    #[cfg_attr(feature = "inline-more", inline)]
    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

impl<K, V, S, A> IntoIterator for HashMap<K, V, S, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    /// Creates a consuming iterator, that is, one that moves each key-value pair out of the map
    /// in arbitrary order. The map cannot be used after calling this.
    #[cfg_attr(feature = "inline-more", inline)]
    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<K, V, S, A> FromIterator<(K, V)> for HashMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
    A: Allocate + Default,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S, A> Extend<(K, V)> for HashMap<K, V, S, A>
where
    K: Eq + Hash,
    S: BuildHasher,
    A: Allocate,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S, A> Extend<(&'a K, &'a V)> for HashMap<K, V, S, A>
where
    K: Eq + Hash + Copy,
    V: Copy,
    S: BuildHasher,
    A: Allocate,
{
    #[cfg_attr(feature = "inline-more", inline)]
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&key, &value)| (key, value)));
    }
}

#[allow(dead_code)]
fn assert_covariance() {
    fn map_key<'new>(v: HashMap<&'static str, u8>) -> HashMap<&'new str, u8> {
        v
    }
    fn map_val<'new>(v: HashMap<u8, &'static str>) -> HashMap<u8, &'new str> {
        v
    }
    fn iter_key<'a, 'new>(v: Iter<'a, &'static str, u8>) -> Iter<'a, &'new str, u8> {
        v
    }
    fn iter_val<'a, 'new>(v: Iter<'a, u8, &'static str>) -> Iter<'a, u8, &'new str> {
        v
    }
    fn keys_key<'a, 'new>(v: Keys<'a, &'static str, u8>) -> Keys<'a, &'new str, u8> {
        v
    }
    fn values_val<'a, 'new>(v: Values<'a, u8, &'static str>) -> Values<'a, u8, &'new str> {
        v
    }
}

#[cfg(test)]
mod test_map {
    use super::*;
    use crate::grow::InlineAllocator;
    use core::hash::BuildHasherDefault;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Hashes integers to themselves, so tests can pick the bucket a key lands in.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }

        fn finish(&self) -> u64 {
            self.0
        }
    }

    type Identity = BuildHasherDefault<IdentityHasher>;
    type IdMap<A = InlineAllocator> = HashMap<u64, u64, Identity, A>;

    fn id_map<A>(capacity: usize, allocator: A) -> IdMap<A> {
        HashMap::with_capacity_hasher_and_allocator(capacity, Identity::default(), allocator)
    }

    #[test]
    fn test_zero_capacities() {
        let m: IdMap = id_map(0, InlineAllocator);
        assert_eq!(m.buckets(), 16);
        assert_eq!(m.capacity(), 8);
        assert!(m.is_empty());
    }

    #[test]
    fn test_insert_get_remove() {
        let mut m = HashMap::new();
        assert_eq!(m.len(), 0);
        assert!(m.insert(1, 2).is_none());
        assert_eq!(m.len(), 1);
        assert!(m.insert(2, 4).is_none());
        assert_eq!(m.len(), 2);
        assert_eq!(*m.get(&1).unwrap(), 2);
        assert_eq!(*m.get(&2).unwrap(), 4);
        assert_eq!(m.insert(2, 8), Some(4));
        assert_eq!(m.len(), 2);
        assert_eq!(m.remove(&1), Some(2));
        assert_eq!(m.remove(&1), None);
        assert_eq!(m.len(), 1);
        assert!(!m.contains_key(&1));
        assert!(m.contains_key(&2));
    }

    #[test]
    fn test_missing_key_lookup_terminates() {
        let mut m: IdMap = id_map(16, InlineAllocator);
        // A long chain in bucket 0.
        for k in 0..8 {
            m.insert(k * 16, k);
        }
        assert_eq!(m.get(&(8 * 16)), None);
        assert_eq!(m.get(&1), None);
    }

    #[test]
    fn test_growth_scenario() {
        let mut m: IdMap = id_map(10, InlineAllocator);
        assert_eq!(m.buckets(), 16);
        assert_eq!(m.capacity(), 8);

        for k in 0..8 {
            assert_eq!(m.insert(k, k + 100), None);
        }
        assert!(!m.is_split());
        assert_eq!(m.buckets(), 16);
        for k in 0..8 {
            assert_eq!(m.table.chain_keys(k as usize), vec![&k]);
        }

        // Crossing the threshold starts a resize right away below the cutoff.
        m.insert(8, 108);
        assert!(m.is_split());
        assert_eq!(m.buckets(), 32);
        assert_eq!(m.capacity(), 16);
        assert_eq!(m.table.old_buckets(), Some(16));
        assert_eq!(m.table.migrated(), Some(0));
        m.table.check();

        assert!(m.table.resident_in_old(3));
        assert_eq!(m.get(&3), Some(&103));

        for k in 9..13 {
            m.insert(k, k + 100);
            m.table.check();
        }
        assert!(!m.is_split());
        assert!(!m.table.resident_in_old(3));
        assert_eq!(m.get(&3), Some(&103));
        for k in 0..13 {
            assert_eq!(m[&k], k + 100);
        }
    }

    #[test]
    fn test_capacity_doubles() {
        let mut m: IdMap = id_map(0, InlineAllocator);
        let mut buckets = m.buckets();
        for k in 0..5000 {
            m.insert(k, k);
            let now = m.buckets();
            assert!(now.is_power_of_two());
            assert!(now == buckets || now == buckets * 2);
            buckets = now;
        }
        assert!(buckets >= 8192);
    }

    #[test]
    fn test_no_loss_across_resizes() {
        let mut m = HashMap::new();
        for i in 0..2000u32 {
            m.insert(i, i * 2);
            if i % 97 == 0 {
                m.table.check();
            }
        }
        // Updates and removals in the middle of a migration.
        for i in (0..2000u32).step_by(3) {
            assert_eq!(m.insert(i, i * 3), Some(i * 2));
        }
        for i in (0..2000u32).step_by(5) {
            m.remove(&i);
        }
        m.table.check();
        for i in 0..2000u32 {
            let want = if i % 5 == 0 {
                None
            } else if i % 3 == 0 {
                Some(i * 3)
            } else {
                Some(i * 2)
            };
            assert_eq!(m.get(&i).copied(), want);
        }
        assert_eq!(m.iter().count(), m.len());
    }

    #[test]
    fn test_iterate_during_migration() {
        let mut m = HashMap::new();
        for i in 0..9 {
            m.insert(i, i);
        }
        assert!(m.is_split());
        let mut keys: Vec<_> = m.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..9).collect::<Vec<_>>());
        assert_eq!(m.values().sum::<i32>(), 36);

        for v in m.values_mut() {
            *v *= 2;
        }
        for (_, v) in &mut m {
            *v += 1;
        }
        assert_eq!(m[&4], 9);

        let mut all: Vec<_> = m.into_iter().collect();
        all.sort_unstable();
        assert_eq!(all[8], (8, 17));
    }

    #[test]
    fn test_clear() {
        let mut m = HashMap::new();
        for i in 0..100 {
            m.insert(i, i);
        }
        let buckets = m.buckets();
        m.clear();
        assert!(m.is_empty());
        assert!(!m.is_split());
        assert_eq!(m.buckets(), buckets);
        assert_eq!(m.get(&5), None);
        m.insert(5, 5);
        assert_eq!(m[&5], 5);
    }

    #[test]
    fn test_clone_mid_migration() {
        let mut m = HashMap::new();
        for i in 0..9 {
            m.insert(i, i);
        }
        assert!(m.is_split());
        let mut c = m.clone();
        assert_eq!(m, c);
        for i in 9..20 {
            c.insert(i, i);
        }
        assert_eq!(m.len(), 9);
        assert_eq!(c.len(), 20);
        c.table.check();
        m.table.check();
    }

    #[test]
    fn test_random_churn_keeps_invariants() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};
        use std::collections::HashMap as StdMap;

        let mut rng = SmallRng::seed_from_u64(7);
        let mut m: IdMap = id_map(0, InlineAllocator);
        let mut model = StdMap::new();
        for step in 0..50_000u64 {
            let k = u64::from(rng.gen::<u16>());
            if rng.gen_bool(0.6) {
                assert_eq!(m.insert(k, step), model.insert(k, step));
            } else {
                assert_eq!(m.remove(&k), model.remove(&k));
            }
            assert_eq!(m.get(&k), model.get(&k));
            if step % 1000 == 0 {
                m.table.check();
            }
        }
        m.table.check();
        assert_eq!(m.len(), model.len());
        for (k, v) in &model {
            assert_eq!(m.get(k), Some(v));
        }
    }

    #[test]
    fn test_eq_and_debug() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        a.insert(1, "one");
        b.insert(1, "one");
        assert_eq!(a, b);
        b.insert(2, "two");
        assert_ne!(a, b);
        assert_eq!(format!("{:?}", a), r#"{1: "one"}"#);
    }

    #[test]
    fn test_from_iter_and_extend() {
        let xs = [(1, 1), (2, 2), (3, 3)];
        let mut m: HashMap<_, _> = xs.iter().cloned().collect();
        assert_eq!(m.len(), 3);
        let more: HashMap<_, _> = vec![(4, 4), (5, 5)].into_iter().collect();
        m.extend(&more);
        assert_eq!(m.len(), 5);
        assert_eq!(m.get_key_value(&5), Some((&5, &5)));
        *m.get_mut(&5).unwrap() = 50;
        assert_eq!(m[&5], 50);
    }

    #[test]
    #[should_panic]
    fn test_index_nonexistent() {
        let m: HashMap<i32, i32> = HashMap::new();
        let _ = m[&1];
    }

    /// Allocates inline, but only when asked to; the first allocation is also reported.
    #[derive(Clone, Default)]
    struct Counting {
        submitted: Rc<RefCell<Vec<usize>>>,
    }

    impl Allocate for Counting {
        fn submit(&mut self, len: usize) -> PendingBuckets {
            self.submitted.borrow_mut().push(len);
            InlineAllocator.submit(len)
        }
    }

    fn fill_to_cutoff<A: Allocate>(m: &mut IdMap<A>) {
        for k in 0..(BACKGROUND_CUTOFF / 2) as u64 {
            m.insert(k, k);
        }
        assert_eq!(m.buckets(), BACKGROUND_CUTOFF);
        assert!(!m.is_growing());
    }

    #[test]
    fn test_large_table_submits_then_resizes() {
        let alloc = Counting::default();
        let mut m = id_map(BACKGROUND_CUTOFF, alloc.clone());
        fill_to_cutoff(&mut m);
        assert!(RefCell::borrow(&alloc.submitted).is_empty());

        let k = (BACKGROUND_CUTOFF / 2) as u64;
        m.insert(k, k);
        assert_eq!(*RefCell::borrow(&alloc.submitted), vec![2 * BACKGROUND_CUTOFF]);
        assert!(m.is_growing());
        assert!(!m.is_split());
        assert_eq!(m.buckets(), BACKGROUND_CUTOFF);

        // Updates do not look at the pending table.
        m.insert(k, 0);
        assert!(m.is_growing());

        m.insert(k + 1, k + 1);
        assert!(!m.is_growing());
        assert!(m.is_split());
        assert_eq!(m.buckets(), 2 * BACKGROUND_CUTOFF);
        assert_eq!(m.capacity(), BACKGROUND_CUTOFF);
        assert_eq!(RefCell::borrow(&alloc.submitted).len(), 1);
        m.table.check();
    }

    #[cfg(feature = "std")]
    mod background {
        use super::*;
        use crate::grow::{handoff, BackgroundAllocator, Handoff};

        /// Hands out pending tables that only complete when the test says so.
        #[derive(Clone, Default)]
        struct Manual {
            handoffs: Rc<RefCell<Vec<(Handoff, usize)>>>,
        }

        impl Allocate for Manual {
            fn submit(&mut self, len: usize) -> PendingBuckets {
                let (h, pending) = handoff();
                self.handoffs.borrow_mut().push((h, len));
                pending
            }
        }

        #[test_log::test]
        fn test_resize_deferred_until_ready() {
            let alloc = Manual::default();
            let mut m = id_map(BACKGROUND_CUTOFF, alloc.clone());
            fill_to_cutoff(&mut m);

            let mut next = (BACKGROUND_CUTOFF / 2) as u64;
            m.insert(next, next);
            next += 1;
            assert!(m.is_growing());

            // Nothing blocks while the allocation is outstanding; the map just runs hot.
            for _ in 0..100 {
                m.insert(next, next);
                next += 1;
                assert!(m.is_growing());
                assert!(!m.is_split());
            }
            assert_eq!(m.buckets(), BACKGROUND_CUTOFF);
            assert_eq!(RefCell::borrow(&alloc.handoffs).len(), 1);
            for k in 0..next {
                assert_eq!(m.get(&k), Some(&k));
            }

            let (h, len) = alloc.handoffs.borrow_mut().pop().unwrap();
            assert_eq!(len, 2 * BACKGROUND_CUTOFF);
            h.complete(Buckets::with_len(len));

            m.insert(next, next);
            next += 1;
            assert!(!m.is_growing());
            assert!(m.is_split());
            assert_eq!(m.buckets(), 2 * BACKGROUND_CUTOFF);
            m.table.check();

            while m.is_split() {
                m.insert(next, next);
                next += 1;
            }
            m.table.check();
            for k in 0..next {
                assert_eq!(m.get(&k), Some(&k));
            }
        }

        #[test_log::test]
        fn test_failed_allocation_falls_back_inline() {
            let alloc = Manual::default();
            let mut m = id_map(BACKGROUND_CUTOFF, alloc.clone());
            fill_to_cutoff(&mut m);

            let k = (BACKGROUND_CUTOFF / 2) as u64;
            m.insert(k, k);
            assert!(m.is_growing());
            drop(alloc.handoffs.borrow_mut().pop());

            m.insert(k + 1, k + 1);
            assert!(!m.is_growing());
            assert!(m.is_split());
            assert_eq!(m.buckets(), 2 * BACKGROUND_CUTOFF);
            m.table.check();
            for key in 0..k + 2 {
                assert_eq!(m.get(&key), Some(&key));
            }
        }

        #[test_log::test]
        fn test_wrong_size_falls_back_inline() {
            let alloc = Manual::default();
            let mut m = id_map(BACKGROUND_CUTOFF, alloc.clone());
            fill_to_cutoff(&mut m);

            let k = (BACKGROUND_CUTOFF / 2) as u64;
            m.insert(k, k);
            let (h, _) = alloc.handoffs.borrow_mut().pop().unwrap();
            h.complete(Buckets::with_len(64));

            m.insert(k + 1, k + 1);
            assert_eq!(m.buckets(), 2 * BACKGROUND_CUTOFF);
            m.table.check();
        }

        #[test_log::test]
        fn test_background_worker_end_to_end() {
            let mut m: HashMap<u64, u64, Identity, BackgroundAllocator> =
                HashMap::with_capacity_hasher_and_allocator(
                    0,
                    Identity::default(),
                    BackgroundAllocator::new(),
                );
            for k in 0..20_000 {
                m.insert(k, k);
            }
            assert!(m.allocator().worker().is_some());
            assert!(m.buckets() >= 2 * BACKGROUND_CUTOFF);
            m.table.check();
            for k in 0..20_000 {
                assert_eq!(m[&k], k);
            }
        }
    }
}
