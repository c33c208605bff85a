//! Ladders of window lengths for cascading rollups.

use thiserror::Error;

/// Reasons a ladder of window lengths cannot be cascaded.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CascadeError {
    /// No window lengths were given.
    #[error("a cascade needs at least one window length")]
    Empty,
    /// A window length of zero.
    #[error("window length at level {level} is zero")]
    ZeroLength {
        /// Position in the ladder.
        level: usize,
    },
    /// Lengths must grow along the ladder.
    #[error("window length {length}s at level {level} does not exceed its predecessor")]
    NotIncreasing {
        /// Position in the ladder.
        level: usize,
        /// The offending length.
        length: u64,
    },
    /// A coarser window that no finer window can tile.
    #[error("window length {length}s is not a multiple of any finer length")]
    NoDivisor {
        /// The offending length.
        length: u64,
    },
}

/// A validated sequence of window lengths, finest first.
///
/// Each coarser level is rolled up from the closed output of a finer level whose length divides
/// it, so every closed window of the source lies entirely inside a single window of the target.
/// Of the eligible finer levels the coarsest is chosen, which keeps the number of partials per
/// coarse window smallest. A month of thirty days is therefore rolled up from days even when a
/// week level sits between them, since weeks do not tile months.
///
/// # Examples
/// ```
/// use rollup::cascade::{Cascade, CascadeError};
/// use rollup::window::{DAY, HOUR, MONTH, WEEK};
///
/// let ladder = Cascade::new(&[DAY, WEEK, MONTH]).unwrap();
/// assert_eq!(ladder.finest(), DAY);
/// assert_eq!(ladder.source(1), Some(0));
/// assert_eq!(ladder.source(2), Some(0));
///
/// assert_eq!(Cascade::new(&[WEEK, MONTH]), Err(CascadeError::NoDivisor { length: MONTH }));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cascade {
    lengths: Vec<u64>,
    sources: Vec<Option<usize>>,
}

impl Cascade {
    /// Validates `lengths` as a cascade.
    pub fn new(lengths: &[u64]) -> Result<Self, CascadeError> {
        if lengths.is_empty() {
            return Err(CascadeError::Empty);
        }
        let mut sources = Vec::with_capacity(lengths.len());
        for (level, &length) in lengths.iter().enumerate() {
            if length == 0 {
                return Err(CascadeError::ZeroLength { level });
            }
            if level == 0 {
                sources.push(None);
                continue;
            }
            if length <= lengths[level - 1] {
                return Err(CascadeError::NotIncreasing { level, length });
            }
            match (0..level).rev().find(|&finer| length % lengths[finer] == 0) {
                Some(finer) => sources.push(Some(finer)),
                None => return Err(CascadeError::NoDivisor { length }),
            }
        }
        Ok(Cascade { lengths: lengths.to_vec(), sources })
    }

    /// The finest window length, aggregated from raw records.
    pub fn finest(&self) -> u64 {
        self.lengths[0]
    }

    /// The level whose closed output feeds `level`, or `None` for the finest level.
    pub fn source(&self, level: usize) -> Option<usize> {
        self.sources.get(level).cloned().and_then(|source| source)
    }

    /// All lengths, finest first.
    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Always false; a cascade has at least one level.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}
