//! Partitioning functions giving keys an affinity to one shard or dispatcher.
use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use seahash::SeaHasher;

/// Select a value from a set of choices by applying [rendezvous hashing](https://en.wikipedia.org/wiki/Rendezvous_hashing).
/// Rendezvous hashing ensures minimal shuffling when the set of options changes
/// at the cost of being O(n) with n == options.len()
///
/// The hash is stable across processes, so every node routes a key to the
/// same option. Returns `None` if the set is empty.
pub fn rendezvous_select<V: Hash + ?Sized, T: Hash + Copy>(
    value: &V,
    options: &IndexSet<T>,
) -> Option<T> {
    options
        .iter()
        .map(|x| {
            let mut h = SeaHasher::new();
            value.hash(&mut h);
            x.hash(&mut h);
            (h.finish(), x)
        })
        .max_by_key(|x| x.0)
        .map(|x| *x.1)
}

/// A partitioner which just uses the value as a wrapping index
/// on the set of available options.
/// This is fast, but reassigns almost every value when the set changes.
///
/// Returns `None` if the set is empty.
pub fn index_select<T: Copy>(i: u64, options: &IndexSet<T>) -> Option<T> {
    let len = u64::try_from(options.len()).ok().filter(|l| *l > 0)?;
    let idx = usize::try_from(i % len).ok()?;
    options.get_index(idx).copied()
}
