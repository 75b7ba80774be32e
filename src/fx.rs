//! Fast, non-cryptographic hash maps and sets.

use core::hash::BuildHasherDefault;
use rustc_hash::FxHasher;
use std::collections::{HashMap, HashSet};

/// A `HashMap` using the Fx hasher.
pub type FxHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// A `HashSet` using the Fx hasher.
pub type FxHashSet<V> = HashSet<V, BuildHasherDefault<FxHasher>>;
