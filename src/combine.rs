//! Combine functions for windowed aggregation.
//!
//! A [`Combiner`] describes how an accumulator is created, how it absorbs a single observation,
//! how it absorbs an already aggregated partial, and how it is finally turned into a result.
//! Keeping the two entry points apart is what allows a coarse window to be fed with the closed
//! output of a finer one instead of raw records.
//!
//! [`Combiner`]: trait.Combiner.html

use std::marker::PhantomData;

/// An associative and commutative aggregation strategy.
pub trait Combiner: Clone + 'static {
    /// A single observation.
    type Input;
    /// The accumulator, also the form of a pre-aggregated partial.
    type Acc;
    /// The finished result.
    type Output;

    /// The identity accumulator.
    fn identity(&self) -> Self::Acc;

    /// Folds a single observation into `acc`.
    fn observe(&self, acc: &mut Self::Acc, input: Self::Input);

    /// Folds a pre-aggregated partial into `acc`.
    fn merge(&self, acc: &mut Self::Acc, partial: Self::Acc);

    /// Turns a complete accumulator into the result.
    fn finish(&self, acc: Self::Acc) -> Self::Output;
}

/// Counts observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counter;

impl Combiner for Counter {
    type Input = ();
    type Acc = u64;
    type Output = u64;

    fn identity(&self) -> u64 { 0 }

    #[inline]
    fn observe(&self, acc: &mut u64, _input: ()) {
        *acc += 1;
    }

    #[inline]
    fn merge(&self, acc: &mut u64, partial: u64) {
        *acc += partial;
    }

    fn finish(&self, acc: u64) -> u64 { acc }
}

/// A set of candidates with scores, kept sorted by candidate.
#[derive(Abomonation, Clone, Debug, Default, Hash, Ord, PartialOrd, Eq, PartialEq)]
pub struct Scores<K> {
    entries: Vec<(K, u64)>,
}

impl<K: Ord> Scores<K> {
    /// An empty candidate set.
    pub fn new() -> Self {
        Scores { entries: Vec::new() }
    }

    /// Adds `score` to the score of `key`, inserting it if absent.
    pub fn add(&mut self, key: K, score: u64) {
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(position) => self.entries[position].1 += score,
            Err(position) => self.entries.insert(position, (key, score)),
        }
    }

    /// Sums the scores of `other` into this set.
    pub fn merge(&mut self, other: Scores<K>) {
        if other.entries.is_empty() {
            return;
        }
        if self.entries.is_empty() {
            *self = other;
            return;
        }
        self.entries.extend(other.entries);
        self.entries.sort_by(|x, y| x.0.cmp(&y.0));
        self.entries.dedup_by(|next, kept| {
            if next.0 == kept.0 {
                kept.1 += next.1;
                true
            } else {
                false
            }
        });
    }

    /// The score of `key`, if present.
    pub fn get(&self, key: &K) -> Option<u64> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|position| self.entries[position].1)
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tests whether there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The candidates, ordered by key.
    pub fn into_vec(self) -> Vec<(K, u64)> {
        self.entries
    }
}

/// Ranks candidates by score and keeps the best `n`.
///
/// Ties are broken by ascending key, so rankings are reproducible.
#[derive(Debug)]
pub struct TopN<K> {
    n: usize,
    _phantom: PhantomData<fn() -> K>,
}

impl<K> TopN<K> {
    /// A ranking that keeps `n` candidates.
    pub fn new(n: usize) -> Self {
        TopN { n, _phantom: PhantomData }
    }

    /// The number of candidates kept.
    pub fn n(&self) -> usize {
        self.n
    }
}

impl<K> Clone for TopN<K> {
    fn clone(&self) -> Self {
        TopN::new(self.n)
    }
}

impl<K: Ord + 'static> Combiner for TopN<K> {
    type Input = (K, u64);
    type Acc = Scores<K>;
    type Output = Vec<(K, u64)>;

    fn identity(&self) -> Scores<K> { Scores::new() }

    fn observe(&self, acc: &mut Scores<K>, (key, score): (K, u64)) {
        acc.add(key, score);
    }

    fn merge(&self, acc: &mut Scores<K>, partial: Scores<K>) {
        acc.merge(partial);
    }

    fn finish(&self, acc: Scores<K>) -> Vec<(K, u64)> {
        let mut ranked = acc.into_vec();
        ranked.sort_by(|x, y| y.1.cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        ranked.truncate(self.n);
        ranked
    }
}

/// Collects per-key counts into a sparse mapping ordered by key.
///
/// Keys that were never observed are absent rather than zero.
#[derive(Debug)]
pub struct Sparse<K> {
    _phantom: PhantomData<fn() -> K>,
}

impl<K> Sparse<K> {
    /// A new sparse collection strategy.
    pub fn new() -> Self {
        Sparse { _phantom: PhantomData }
    }
}

impl<K> Default for Sparse<K> {
    fn default() -> Self {
        Sparse::new()
    }
}

impl<K> Clone for Sparse<K> {
    fn clone(&self) -> Self {
        Sparse::new()
    }
}

impl<K: Ord + 'static> Combiner for Sparse<K> {
    type Input = (K, u64);
    type Acc = Scores<K>;
    type Output = Vec<(K, u64)>;

    fn identity(&self) -> Scores<K> { Scores::new() }

    fn observe(&self, acc: &mut Scores<K>, (key, count): (K, u64)) {
        if count > 0 {
            acc.add(key, count);
        }
    }

    fn merge(&self, acc: &mut Scores<K>, partial: Scores<K>) {
        acc.merge(partial);
    }

    fn finish(&self, acc: Scores<K>) -> Vec<(K, u64)> {
        acc.into_vec()
    }
}
