//! Coordinate-keyed hash containers
//!
//! Every vertex-indexed structure in the crate maps [`Vec3`] (or an
//! unordered pair of them, as a [`Segment`]) to some value.  The key hash is
//! [`Vec3::fast_hash64`], a fingerprint of the exact bit representation, so
//! lookups stay cheap while remaining correct when two distinct coordinates
//! happen to share a fingerprint (the table chains on full keys).
//!
//! Iteration order is unspecified but stable between mutations.

use crate::geom::{Segment, Vec3};
use std::collections::{hash_map, HashMap};
use std::ops::AddAssign;

/// Maps [`Vec3`] keys (compared bitwise) to arbitrary values
#[derive(Clone, Debug)]
pub struct CoordMap<V> {
    inner: HashMap<Vec3, V>,
}

impl<V> Default for CoordMap<V> {
    fn default() -> Self {
        Self { inner: HashMap::new() }
    }
}

impl<V> CoordMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { inner: HashMap::with_capacity(n) }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, key: Vec3) -> Option<&V> {
        self.inner.get(&key)
    }

    pub fn get_mut(&mut self, key: Vec3) -> Option<&mut V> {
        self.inner.get_mut(&key)
    }

    pub fn contains_key(&self, key: Vec3) -> bool {
        self.inner.contains_key(&key)
    }

    pub fn insert(&mut self, key: Vec3, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: Vec3) -> Option<V> {
        self.inner.remove(&key)
    }

    pub fn entry(&mut self, key: Vec3) -> hash_map::Entry<'_, Vec3, V> {
        self.inner.entry(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec3, &V)> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Vec3> {
        self.inner.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    pub fn for_each(&self, mut f: impl FnMut(Vec3, &V)) {
        for (k, v) in &self.inner {
            f(*k, v);
        }
    }

    pub fn for_each_key(&self, mut f: impl FnMut(Vec3)) {
        for k in self.inner.keys() {
            f(*k);
        }
    }

    pub fn for_each_value(&self, mut f: impl FnMut(&V)) {
        for v in self.inner.values() {
            f(v);
        }
    }
}

impl<V: Clone + Default> CoordMap<V> {
    /// Returns the stored value, or `V::default()` when the key is absent
    pub fn get_or_default(&self, key: Vec3) -> V {
        self.inner.get(&key).cloned().unwrap_or_default()
    }
}

impl<T> CoordMap<Vec<T>> {
    /// Appends to the slice stored under `key` with a single lookup
    pub fn append(&mut self, key: Vec3, x: T) {
        self.inner.entry(key).or_default().push(x);
    }
}

impl<V: AddAssign + Copy + Default> CoordMap<V> {
    /// Adds `x` to the value stored under `key` (zero when absent) and
    /// returns the post-add value, all in a single lookup
    pub fn add(&mut self, key: Vec3, x: V) -> V {
        let v = self.inner.entry(key).or_default();
        *v += x;
        *v
    }
}

/// Maps unordered coordinate pairs to arbitrary values
///
/// Keys are canonicalized through [`Segment::new`], so `(a, b)` and `(b, a)`
/// address the same slot.
#[derive(Clone, Debug)]
pub struct EdgeMap<V> {
    inner: HashMap<Segment, V>,
}

impl<V> Default for EdgeMap<V> {
    fn default() -> Self {
        Self { inner: HashMap::new() }
    }
}

impl<V> EdgeMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, a: Vec3, b: Vec3) -> Option<&V> {
        self.inner.get(&Segment::new(a, b))
    }

    pub fn get_seg(&self, s: Segment) -> Option<&V> {
        self.inner.get(&s)
    }

    pub fn contains(&self, s: Segment) -> bool {
        self.inner.contains_key(&s)
    }

    pub fn insert(&mut self, a: Vec3, b: Vec3, value: V) -> Option<V> {
        self.inner.insert(Segment::new(a, b), value)
    }

    pub fn insert_seg(&mut self, s: Segment, value: V) -> Option<V> {
        self.inner.insert(s, value)
    }

    pub fn remove(&mut self, s: Segment) -> Option<V> {
        self.inner.remove(&s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Segment, &V)> {
        self.inner.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(Segment, &V)) {
        for (k, v) in &self.inner {
            f(*k, v);
        }
    }
}

impl<V: Clone + Default> EdgeMap<V> {
    pub fn get_or_default(&self, s: Segment) -> V {
        self.inner.get(&s).cloned().unwrap_or_default()
    }
}

impl<T> EdgeMap<Vec<T>> {
    pub fn append(&mut self, s: Segment, x: T) {
        self.inner.entry(s).or_default().push(x);
    }
}

impl<V: AddAssign + Copy + Default> EdgeMap<V> {
    pub fn add(&mut self, s: Segment, x: V) -> V {
        let v = self.inner.entry(s).or_default();
        *v += x;
        *v
    }
}

/// Maps ordered coordinate pairs to arbitrary values
///
/// Unlike [`EdgeMap`], `(a, b)` and `(b, a)` are distinct keys; the
/// parametrization weights are directed (first vertex is the center, second
/// the neighbor).
#[derive(Clone, Debug)]
pub struct DirectedEdgeMap<V> {
    inner: HashMap<(Vec3, Vec3), V>,
}

impl<V> Default for DirectedEdgeMap<V> {
    fn default() -> Self {
        Self { inner: HashMap::new() }
    }
}

impl<V> DirectedEdgeMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, from: Vec3, to: Vec3) -> Option<&V> {
        self.inner.get(&(from, to))
    }

    pub fn insert(&mut self, from: Vec3, to: Vec3, value: V) -> Option<V> {
        self.inner.insert((from, to), value)
    }

    pub fn remove(&mut self, from: Vec3, to: Vec3) -> Option<V> {
        self.inner.remove(&(from, to))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Vec3, Vec3), &V)> {
        self.inner.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(Vec3, Vec3, &V)) {
        for ((a, b), v) in &self.inner {
            f(*a, *b, v);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    #[test]
    fn append_and_add() {
        let mut m = CoordMap::<Vec<u32>>::new();
        let k = Vec3::new(1.0, 2.0, 3.0);
        m.append(k, 7);
        m.append(k, 8);
        assert_eq!(m.get(k).unwrap(), &[7, 8]);

        let mut counts = CoordMap::<i64>::new();
        assert_eq!(counts.add(k, 2), 2);
        assert_eq!(counts.add(k, -1), 1);
        assert_eq!(counts.get_or_default(Vec3::ZERO), 0);
    }

    #[test]
    fn edge_map_is_unordered() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let mut m = EdgeMap::<f64>::new();
        m.insert(a, b, 0.5);
        assert_eq!(m.get(b, a), Some(&0.5));
    }

    #[test]
    fn agrees_with_reference_map() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1234);
        let mut fast = CoordMap::<u64>::new();
        let mut reference = BTreeMap::<[u64; 3], u64>::new();

        // A small pool of keys so that inserts, removes, and overwrites all
        // collide frequently.
        let keys: Vec<Vec3> = (0..64)
            .map(|_| {
                Vec3::new(
                    (rng.gen_range(-4i32..4) as f64) / 2.0,
                    (rng.gen_range(-4i32..4) as f64) / 2.0,
                    (rng.gen_range(-4i32..4) as f64) / 2.0,
                )
            })
            .collect();
        let ref_key = |k: Vec3| [k.x.to_bits(), k.y.to_bits(), k.z.to_bits()];

        for i in 0..10_000u64 {
            let k = keys[rng.gen_range(0..keys.len())];
            match rng.gen_range(0..3) {
                0 => {
                    assert_eq!(fast.insert(k, i), reference.insert(ref_key(k), i));
                }
                1 => {
                    assert_eq!(fast.remove(k), reference.remove(&ref_key(k)));
                }
                _ => {
                    assert_eq!(fast.get(k), reference.get(&ref_key(k)));
                }
            }
            assert_eq!(fast.len(), reference.len());
        }
    }
}
