//! A `HashMap` variant that never stops to rehash.
//!
//! Most hash table implementations (including [`hashbrown`], the one in Rust's standard library)
//! must occasionally "resize" the backing memory for the map as the number of elements grows.
//! This means allocating a new table (usually of twice the size), and moving all the elements from
//! the old table to the new one. As your table gets larger, this process takes longer and longer,
//! and the one unlucky insert that triggers it has to wait for all of it.
//!
//! This crate removes both halves of that pause:
//!
//!  - **Moving** is incremental. After a resize starts, every insert and removal first moves a
//!    small fixed batch of buckets from the old table to the new one. Any bucket an operation
//!    needs before the batches get to it is moved on the spot. Entries themselves stay where they
//!    are in memory; moving a bucket only relinks its chain.
//!  - **Allocating** the new bucket array is handed off to a background thread once the table is
//!    large (see [`grow::BACKGROUND_CUTOFF`]). The map keeps accepting inserts past its load
//!    factor until that allocation is done, and only then starts the resize.
//!
//! Entries are stored in chunks, where each new chunk is as large as all earlier chunks combined.
//! Chunks never move once allocated, but a new chunk is still allocated on the inserting thread
//! when the previous ones fill up. Only bucket arrays are allocated off-thread.
//!
//! At any moment, each key is reachable through exactly one bucket chain, in either the old or
//! the new table. Lookups compute which table that is and walk a single chain.
//!
//! This approach isn't free, however:
//!
//!  - Inserts and removals are a little slower while a resize is in progress.
//!  - The old bucket array is only freed once every bucket has been moved out of it.
//!  - While a large table waits for its successor, its chains grow past the usual load factor.
//!  - Buckets are chained, so each entry carries a hash and a link alongside the key and value.
//!
//! # Benchmarks
//!
//! There is a silly, but illustrative benchmark in `benches/vroom.rs`. It just runs lots of
//! inserts back-to-back, and measures how long each one takes:
//!
//! ```console
//! $ cargo bench --bench vroom > data.txt
//! ```
//!
//! With `hashbrown`, the slowest inserts are the ones that land on a resize, and they get slower
//! every time the map doubles. With this map, the worst case stays flat.
//!
//! # Features
//!
//!  - `ahash` (default): use [`ahash`](https://crates.io/crates/ahash) as the default hasher.
//!  - `std` (default): allocate the bucket arrays of large tables on a background thread. Without
//!    it, the crate is `no_std` and every table is allocated inline.
//!  - `inline-more` (default): more aggressive inlining.
//!  - `serde`: `Serialize` and `Deserialize` for [`HashMap`].
//!  - `rayon`: parallel iterators over [`HashMap`].
//!
//! [`hashbrown`]: https://crates.io/crates/hashbrown

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
#[cfg_attr(test, macro_use)]
extern crate std;

mod external_trait_impls;
pub mod grow;
mod map;
mod raw;

pub use crate::map::HashMap;
pub use crate::raw::Buckets;

pub mod hash_map {
    //! A hash map that grows without pausing.
    pub use crate::map::*;

    #[cfg(feature = "rayon")]
    /// [rayon]-based parallel iterator types for hash maps.
    /// You will rarely need to interact with it directly unless you have need
    /// to name one of the iterator types.
    ///
    /// [rayon]: https://docs.rs/rayon/1.0/rayon
    pub mod rayon {
        pub use crate::external_trait_impls::rayon::map::*;
    }
}
