#![cfg(not(miri))]

#[macro_use]
extern crate quickcheck;

use pauseless::HashMap as PauselessMap;

use quickcheck::Arbitrary;
use quickcheck::Gen;

use fnv::FnvHasher;
use std::hash::{BuildHasher, BuildHasherDefault};
type FnvBuilder = BuildHasherDefault<FnvHasher>;
type PauselessMapFnv<K, V> = PauselessMap<K, V, FnvBuilder>;

use pauseless::grow::Allocate;
use std::cmp::min;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::iter::FromIterator;
use std::ops::Deref;

fn set<'a, T: 'a, I>(iter: I) -> HashSet<T>
where
    I: IntoIterator<Item = &'a T>,
    T: Copy + Hash + Eq,
{
    iter.into_iter().cloned().collect()
}

quickcheck! {
    fn contains(insert: Vec<u32>) -> bool {
        let mut map = PauselessMap::new();
        for &key in &insert {
            map.insert(key, ());
        }
        insert.iter().all(|&key| map.get(&key).is_some())
    }

    fn contains_not(insert: Vec<u8>, not: Vec<u8>) -> bool {
        let mut map = PauselessMap::new();
        for &key in &insert {
            map.insert(key, ());
        }
        let nots = &set(&not) - &set(&insert);
        nots.iter().all(|&key| map.get(&key).is_none())
    }

    fn insert_remove(insert: Vec<u8>, remove: Vec<u8>) -> bool {
        let mut map = PauselessMap::new();
        for &key in &insert {
            map.insert(key, ());
        }
        for &key in &remove {
            map.remove(&key);
        }
        let elements = &set(&insert) - &set(&remove);
        map.len() == elements.len() && map.iter().count() == elements.len() &&
            elements.iter().all(|k| map.get(k).is_some())
    }

    fn with_cap(cap: u16) -> bool {
        let map: PauselessMap<u8, u8> = PauselessMap::with_capacity(cap as usize);
        map.buckets().is_power_of_two()
            && map.buckets() >= 16
            && map.buckets() >= cap as usize
            && map.buckets() < 2 * usize::max(cap as usize, 16)
            && map.capacity() == map.buckets() / 2
    }

    fn never_shrinks(insert: Vec<u16>) -> bool {
        let mut map = PauselessMap::new();
        let mut buckets = map.buckets();
        for &key in &insert {
            map.insert(key, ());
            if map.buckets() < buckets {
                return false;
            }
            buckets = map.buckets();
        }
        map.len() <= map.capacity() || map.is_split() || map.is_growing()
    }
}

use Op::*;
#[derive(Copy, Clone, Debug)]
enum Op<K, V> {
    Add(K, V),
    Remove(K),
    RemoveEntry(K),
    Update(K, V),
    ReplaceWithClone,
    Clear,
}

impl<K, V> Arbitrary for Op<K, V>
where
    K: Arbitrary,
    V: Arbitrary,
{
    fn arbitrary(g: &mut Gen) -> Self {
        // Clear is rare so that maps get a chance to grow.
        match u32::arbitrary(g) % 64 {
            0 => Clear,
            1..=3 => ReplaceWithClone,
            4..=15 => Remove(K::arbitrary(g)),
            16..=23 => RemoveEntry(K::arbitrary(g)),
            24..=31 => Update(K::arbitrary(g), V::arbitrary(g)),
            _ => Add(K::arbitrary(g), V::arbitrary(g)),
        }
    }
}

fn do_ops<K, V, S, A>(ops: &[Op<K, V>], a: &mut PauselessMap<K, V, S, A>, b: &mut HashMap<K, V>)
where
    K: Hash + Eq + Clone + Debug,
    V: Clone + PartialEq + Debug,
    S: BuildHasher + Clone,
    A: Allocate + Clone,
{
    for op in ops {
        match *op {
            Add(ref k, ref v) => {
                assert_eq!(a.insert(k.clone(), v.clone()), b.insert(k.clone(), v.clone()));
            }
            Remove(ref k) => {
                assert_eq!(a.remove(k), b.remove(k));
            }
            RemoveEntry(ref k) => {
                assert_eq!(a.remove_entry(k), b.remove_entry(k));
            }
            Update(ref k, ref v) => {
                if let Some(x) = a.get_mut(k) {
                    *x = v.clone();
                }
                if let Some(x) = b.get_mut(k) {
                    *x = v.clone();
                }
            }
            ReplaceWithClone => {
                *a = a.clone();
                *b = b.clone();
            }
            Clear => {
                a.clear();
                b.clear();
            }
        }
    }
}

fn assert_maps_equivalent<K, V, S, A>(a: &PauselessMap<K, V, S, A>, b: &HashMap<K, V>) -> bool
where
    K: Hash + Eq + Debug,
    V: Eq + Debug,
    S: BuildHasher,
{
    assert_eq!(a.len(), b.len());
    assert_eq!(a.iter().count(), b.len());
    assert_eq!(a.iter().next().is_some(), b.iter().next().is_some());
    for key in a.keys() {
        assert!(b.contains_key(key), "b does not contain {:?}", key);
    }
    for key in b.keys() {
        assert!(a.get(key).is_some(), "a does not contain {:?}", key);
    }
    for key in a.keys() {
        assert_eq!(a[key], b[key]);
    }
    true
}

quickcheck! {
    fn operations_i8(ops: Large<Vec<Op<i8, i8>>>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        assert_maps_equivalent(&map, &reference)
    }

    fn operations_i16(ops: Large<Vec<Op<i16, i8>>>) -> bool {
        let mut map = PauselessMapFnv::default();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        assert_maps_equivalent(&map, &reference)
    }

    fn operations_string(ops: Vec<Op<Alpha, i8>>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        assert_maps_equivalent(&map, &reference)
    }

    fn keys_values(ops: Large<Vec<Op<i8, i8>>>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        let mut visit = PauselessMap::new();
        for (k, v) in map.keys().zip(map.values()) {
            assert_eq!(&map[k], v);
            assert!(!visit.contains_key(k));
            visit.insert(*k, *v);
        }
        assert_eq!(visit.len(), reference.len());
        true
    }

    fn keys_values_mut(ops: Large<Vec<Op<i8, i8>>>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        let mut visit = PauselessMap::new();
        let keys = Vec::from_iter(map.keys().cloned());
        for (k, v) in keys.iter().zip(map.values_mut()) {
            assert_eq!(&reference[k], v);
            assert!(!visit.contains_key(k));
            visit.insert(*k, *v);
        }
        assert_eq!(visit.len(), reference.len());
        true
    }

    fn into_iter_drains(ops: Large<Vec<Op<i8, i8>>>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops, &mut map, &mut reference);
        let drained: HashMap<_, _> = map.into_iter().collect();
        drained == reference
    }

    fn equality(ops1: Vec<Op<i8, i8>>, removes: Vec<usize>) -> bool {
        let mut map = PauselessMap::new();
        let mut reference = HashMap::new();
        do_ops(&ops1, &mut map, &mut reference);
        let mut ops2 = ops1.clone();
        for &r in &removes {
            if !ops2.is_empty() {
                let i = r % ops2.len();
                ops2.remove(i);
            }
        }
        let mut map2 = PauselessMapFnv::default();
        let mut reference2 = HashMap::new();
        do_ops(&ops2, &mut map2, &mut reference2);
        let should = reference == reference2;
        assert_eq!(map.len() == map2.len() && map.iter().all(|(k, v)| {
            map2.get(k).map_or(false, |v2| v2 == v)
        }), should);
        true
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct Alpha(String);

impl Deref for Alpha {
    type Target = String;
    fn deref(&self) -> &String {
        &self.0
    }
}

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

impl Arbitrary for Alpha {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = usize::arbitrary(g) % usize::max(g.size(), 1);
        let len = min(len, 16);
        Alpha(
            (0..len)
                .map(|_| *g.choose(ALPHABET).unwrap() as char)
                .collect(),
        )
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new((**self).shrink().map(Alpha))
    }
}

/// quickcheck Arbitrary adaptor -- make a larger vec
#[derive(Clone, Debug)]
struct Large<T>(T);

impl<T> Deref for Large<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> Arbitrary for Large<Vec<T>>
where
    T: Arbitrary,
{
    fn arbitrary(g: &mut Gen) -> Self {
        let len = usize::arbitrary(g) % usize::max(g.size() * 10, 1);
        Large((0..len).map(|_| T::arbitrary(g)).collect())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new((**self).shrink().map(Large))
    }
}
