//! Fixed-capacity per-row neighbor selection.
//!
//! Both truncation and coarsening bound graph density by keeping, for each
//! row, only the N best neighbors seen so far: the N smallest distances or
//! the N largest weights, depending on the caller. A candidate that is not
//! strictly better than the current worst entry is rejected once the row
//! is full, so the first-seen entry wins ties against later arrivals. That
//! tie-break is part of the output contract and must not change.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Direction of "better" for a row's values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RankOrder {
    /// Smaller values are better (distances).
    SmallestFirst,
    /// Larger values are better (weights).
    LargestFirst,
}

impl RankOrder {
    /// Returns whether `candidate` is strictly better than `incumbent`.
    #[must_use]
    pub fn better(self, candidate: f32, incumbent: f32) -> bool {
        match self {
            Self::SmallestFirst => candidate < incumbent,
            Self::LargestFirst => candidate > incumbent,
        }
    }
}

/// A bounded set of `(neighbor, value)` entries for one row.
#[derive(Clone, Debug)]
pub struct BoundedRow {
    order: RankOrder,
    capacity: NonZeroUsize,
    entries: Vec<(usize, f32)>,
}

impl BoundedRow {
    /// Creates an empty row that will never hold more than `capacity`
    /// entries.
    #[must_use]
    pub fn new(order: RankOrder, capacity: NonZeroUsize) -> Self {
        Self {
            order,
            capacity,
            entries: Vec::with_capacity(capacity.get().min(64)),
        }
    }

    /// Offers a candidate entry, returning whether it was kept.
    ///
    /// A neighbor already present in the row has its value replaced only
    /// when the new value is strictly better; the row never holds the
    /// same neighbor twice. When the row is full, a candidate must be
    /// strictly better than the current worst entry to displace it.
    pub fn offer(&mut self, neighbor: usize, value: f32) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|(n, _)| *n == neighbor) {
            if self.order.better(value, existing.1) {
                existing.1 = value;
                return true;
            }
            return false;
        }
        if self.entries.len() < self.capacity.get() {
            self.entries.push((neighbor, value));
            return true;
        }
        let Some(worst) = self.worst_index() else {
            return false;
        };
        if self.order.better(value, self.entries[worst].1) {
            self.entries.remove(worst);
            self.entries.push((neighbor, value));
            return true;
        }
        false
    }

    /// Returns the current worst value, scanning the row in O(len).
    #[must_use]
    pub fn worst(&self) -> Option<f32> {
        self.worst_index().map(|idx| self.entries[idx].1)
    }

    // First-inserted entry among equal-worst values, so eviction is
    // deterministic under the documented tie-break.
    fn worst_index(&self) -> Option<usize> {
        let mut worst: Option<usize> = None;
        for (idx, &(_, value)) in self.entries.iter().enumerate() {
            match worst {
                None => worst = Some(idx),
                Some(current) if self.order.better(self.entries[current].1, value) => {
                    worst = Some(idx);
                }
                Some(_) => {}
            }
        }
        worst
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the row holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.entries.iter().copied()
    }

    /// Consumes the row, returning entries best-first; ties keep
    /// insertion order.
    #[must_use]
    pub fn into_ranked(mut self) -> Vec<(usize, f32)> {
        match self.order {
            RankOrder::SmallestFirst => self.entries.sort_by(|a, b| a.1.total_cmp(&b.1)),
            RankOrder::LargestFirst => self.entries.sort_by(|a, b| b.1.total_cmp(&a.1)),
        }
        self.entries
    }
}

/// Bounded rows for a dense, contiguous range of row keys with a uniform
/// capacity. One multi-pass block owns one `TopRows`.
#[derive(Clone, Debug)]
pub struct TopRows {
    start: usize,
    rows: Vec<BoundedRow>,
}

impl TopRows {
    /// Creates one empty row per key in `range`.
    #[must_use]
    pub fn new(range: Range<usize>, order: RankOrder, capacity: NonZeroUsize) -> Self {
        let len = range.end.saturating_sub(range.start);
        Self {
            start: range.start,
            rows: (0..len).map(|_| BoundedRow::new(order, capacity)).collect(),
        }
    }

    /// Offers a candidate to `row`, returning whether it was kept.
    /// Offers outside the covered range are rejected.
    pub fn offer(&mut self, row: usize, neighbor: usize, value: f32) -> bool {
        let Some(slot) = row
            .checked_sub(self.start)
            .and_then(|offset| self.rows.get_mut(offset))
        else {
            return false;
        };
        slot.offer(neighbor, value)
    }

    /// Returns the row for `row`, if it is inside the covered range.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&BoundedRow> {
        row.checked_sub(self.start)
            .and_then(|offset| self.rows.get(offset))
    }

    /// Consumes the set, yielding `(row_key, row)` pairs in key order.
    pub fn into_rows(self) -> impl Iterator<Item = (usize, BoundedRow)> {
        let start = self.start;
        self.rows
            .into_iter()
            .enumerate()
            .map(move |(offset, row)| (start + offset, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn fills_until_capacity_then_evicts_worst() {
        let mut row = BoundedRow::new(RankOrder::SmallestFirst, capacity(2));
        assert!(row.offer(0, 5.0));
        assert!(row.offer(1, 3.0));
        assert_eq!(row.worst(), Some(5.0));

        // 4.0 beats the current worst, 6.0 does not.
        assert!(row.offer(2, 4.0));
        assert!(!row.offer(3, 6.0));
        assert_eq!(row.into_ranked(), vec![(1, 3.0), (2, 4.0)]);
    }

    #[test]
    fn ties_favor_first_seen() {
        let mut row = BoundedRow::new(RankOrder::LargestFirst, capacity(1));
        assert!(row.offer(7, 1.0));
        // Equal value must not displace the incumbent.
        assert!(!row.offer(8, 1.0));
        assert_eq!(row.into_ranked(), vec![(7, 1.0)]);
    }

    #[test]
    fn duplicate_neighbor_keeps_best_value() {
        let mut row = BoundedRow::new(RankOrder::SmallestFirst, capacity(3));
        assert!(row.offer(4, 2.0));
        assert!(!row.offer(4, 2.5));
        assert!(row.offer(4, 1.5));
        assert_eq!(row.len(), 1);
        assert_eq!(row.into_ranked(), vec![(4, 1.5)]);
    }

    #[rstest]
    #[case(RankOrder::SmallestFirst, vec![(2, 1.0), (0, 2.0)])]
    #[case(RankOrder::LargestFirst, vec![(1, 9.0), (0, 2.0)])]
    fn ranking_respects_order(#[case] order: RankOrder, #[case] expected: Vec<(usize, f32)>) {
        let mut row = BoundedRow::new(order, capacity(2));
        row.offer(0, 2.0);
        row.offer(1, 9.0);
        row.offer(2, 1.0);
        assert_eq!(row.into_ranked(), expected);
    }

    #[test]
    fn rows_reject_keys_outside_range() {
        let mut rows = TopRows::new(10..12, RankOrder::LargestFirst, capacity(2));
        assert!(rows.offer(10, 0, 1.0));
        assert!(rows.offer(11, 0, 1.0));
        assert!(!rows.offer(9, 0, 1.0));
        assert!(!rows.offer(12, 0, 1.0));
        assert_eq!(rows.row(10).map(BoundedRow::len), Some(1));
        assert_eq!(rows.row(9).map(BoundedRow::len), None);
    }

    #[test]
    fn into_rows_yields_keys_in_order() {
        let mut rows = TopRows::new(3..6, RankOrder::SmallestFirst, capacity(1));
        rows.offer(4, 1, 0.5);
        let collected: Vec<(usize, usize)> = rows
            .into_rows()
            .map(|(key, row)| (key, row.len()))
            .collect();
        assert_eq!(collected, vec![(3, 0), (4, 1), (5, 0)]);
    }
}
