//! Dense ordinal maintenance.
//!
//! Columns within a project and tasks within a column carry an `index` that
//! must always be exactly `0..n-1`. Everything that reorders siblings, in
//! memory or in SQL, goes through the primitives here.

use std::ops::RangeInclusive;

/// Something positioned among siblings by a dense 0-based index
pub trait Indexed {
    fn index(&self) -> usize;
    fn set_index(&mut self, index: usize);
}

/// Moves the element at `from` so that it ends up at `to`.
///
/// This is a stable remove-and-reinsert, not a swap: the elements between
/// the two positions slide by one to make room. Out-of-range positions are
/// clamped to the last slot.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if items.is_empty() || from >= items.len() {
        return;
    }
    let to = to.min(items.len() - 1);
    if from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Rewrites every element's index to its position in the slice
pub fn renumber<T: Indexed>(items: &mut [T]) {
    for (position, item) in items.iter_mut().enumerate() {
        item.set_index(position);
    }
}

/// Returns true if the indices are exactly `{0, .., n-1}`
pub fn is_dense<I>(indices: I) -> bool
where
    I: IntoIterator<Item = usize>,
{
    let mut sorted: Vec<usize> = indices.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(position, index)| position == *index)
}

/// The sibling displacement caused by moving one item between two positions
/// of the same list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    /// Indices (before the move) of the siblings that slide
    pub range: RangeInclusive<usize>,
    /// `-1` when the item travels forward, `+1` when it travels backward
    pub delta: i64,
}

impl Shift {
    pub fn between(source: usize, destination: usize) -> Option<Self> {
        if destination > source {
            Some(Self {
                range: source + 1..=destination,
                delta: -1,
            })
        } else if destination < source {
            Some(Self {
                range: destination..=source - 1,
                delta: 1,
            })
        } else {
            None
        }
    }

    pub fn low(&self) -> usize {
        *self.range.start()
    }

    pub fn high(&self) -> usize {
        *self.range.end()
    }

    /// Applies the shift to one sibling index (the moved item excluded)
    pub fn apply(&self, index: usize) -> usize {
        if self.range.contains(&index) {
            (index as i64 + self.delta) as usize
        } else {
            index
        }
    }
}
