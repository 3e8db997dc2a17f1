use crate::grow::Allocate;
use crate::hash_map::HashMap;
use core::cmp;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use serde_::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_::ser::{Serialize, SerializeMap, Serializer};

// Size hints come from the input, so don't trust them with more than this many entries up front.
const MAX_PREALLOCATED: usize = 4096;

impl<K, V, H, A> Serialize for HashMap<K, V, H, A>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct HashMapVisitor<K, V, S, A> {
    marker: PhantomData<fn() -> HashMap<K, V, S, A>>,
}

impl<'de, K, V, S, A> Visitor<'de> for HashMapVisitor<K, V, S, A>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
    A: Allocate + Default,
{
    type Value = HashMap<K, V, S, A>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        // Two buckets per entry keeps the map under its load factor.
        let hint = cmp::min(access.size_hint().unwrap_or(0), MAX_PREALLOCATED);
        let mut map =
            HashMap::with_capacity_hasher_and_allocator(hint * 2, S::default(), A::default());

        while let Some((key, value)) = access.next_entry()? {
            map.insert(key, value);
        }

        Ok(map)
    }
}

impl<'de, K, V, S, A> Deserialize<'de> for HashMap<K, V, S, A>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
    A: Allocate + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(HashMapVisitor {
            marker: PhantomData,
        })
    }
}
