//! Restartable edge streams and the memory-bounded multi-pass scanner.
//!
//! Several stages must reduce over a similarity stream that is far larger
//! than memory. Instead of holding every row, the caller partitions the
//! key range into `P` contiguous blocks and replays the whole stream once
//! per block, retaining only the rows whose key falls inside the current
//! block. The result is identical to a single unbounded pass while peak
//! memory stays near `K/P` rows; `P` trades time for memory and never
//! affects the outcome.
//!
//! [`EdgeSource`] is the replay seam: a file-backed source reopens its
//! file on every scan, and a slice-backed source replays a slice so tests
//! can drive the same reductions without touching a disk.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::io::{self, FormatError};
use crate::types::SimilarityEdge;

/// Errors raised while scanning an edge stream.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The underlying stream failed to open or parse.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// An edge referenced a node with no entry in the active keying.
    #[error("edge references node {node} with no cluster assignment")]
    UnassignedNode {
        /// The node id without an assignment.
        node: usize,
    },
    /// An edge referenced a node beyond the catalog's key range.
    #[error("edge references node {node}, but only {limit} nodes are cataloged")]
    NodeOutOfRange {
        /// The out-of-range node id.
        node: usize,
        /// Number of cataloged nodes.
        limit: usize,
    },
    /// A downstream sink failed while consuming scanned records.
    #[error("edge sink failed: {source}")]
    Sink {
        /// Underlying sink error.
        #[source]
        source: std::io::Error,
    },
}

/// A finite edge stream that can be replayed from the start any number of
/// times. Each [`EdgeSource::scan`] call visits every record once, in
/// stream order.
pub trait EdgeSource {
    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Replays the stream, feeding every record to `visit`.
    ///
    /// # Errors
    /// Returns [`ScanError`] when the stream cannot be replayed or when
    /// `visit` fails; the scan stops at the first error.
    fn scan(
        &mut self,
        visit: &mut dyn FnMut(SimilarityEdge) -> Result<(), ScanError>,
    ) -> Result<(), ScanError>;
}

/// An [`EdgeSource`] backed by an id-normalized similarity file; the file
/// is reopened on every scan.
#[derive(Debug)]
pub struct FileEdgeSource {
    path: PathBuf,
    name: String,
}

impl FileEdgeSource {
    /// Creates a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// The file path this source replays.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EdgeSource for FileEdgeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(
        &mut self,
        visit: &mut dyn FnMut(SimilarityEdge) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        io::for_each_edge(&self.path, |edge| visit(edge))
    }
}

/// An [`EdgeSource`] that replays an in-memory slice.
#[derive(Debug)]
pub struct SliceEdgeSource<'a> {
    edges: &'a [SimilarityEdge],
}

impl<'a> SliceEdgeSource<'a> {
    /// Creates a source over `edges`.
    #[must_use]
    pub const fn new(edges: &'a [SimilarityEdge]) -> Self {
        Self { edges }
    }
}

impl EdgeSource for SliceEdgeSource<'_> {
    fn name(&self) -> &str {
        "in-memory edges"
    }

    fn scan(
        &mut self,
        visit: &mut dyn FnMut(SimilarityEdge) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        for edge in self.edges {
            visit(*edge)?;
        }
        Ok(())
    }
}

/// Partition of the key range `[0, total)` into `passes` contiguous
/// blocks: every block but the last holds `total / passes` keys, and the
/// last absorbs the remainder.
#[derive(Clone, Copy, Debug)]
pub struct PassPlan {
    total: usize,
    passes: NonZeroUsize,
}

impl PassPlan {
    /// Creates a plan for `total` keys scanned over `passes` blocks.
    #[must_use]
    pub const fn new(total: usize, passes: NonZeroUsize) -> Self {
        Self { total, passes }
    }

    /// Number of blocks in the plan.
    #[must_use]
    pub const fn passes(&self) -> usize {
        self.passes.get()
    }

    /// Iterates the contiguous key blocks in order.
    pub fn blocks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let step = self.total / self.passes.get();
        let passes = self.passes.get();
        let total = self.total;
        (0..passes).map(move |index| {
            let start = step * index;
            let end = if index + 1 == passes {
                total
            } else {
                step * (index + 1)
            };
            start..end
        })
    }
}

/// Rows retained for one block: row id to its neighbor/weight map.
/// Ordered maps keep iteration, and therefore accumulation order,
/// deterministic; a repeated `(row, neighbor)` pair overwrites.
pub type BlockRows = BTreeMap<usize, BTreeMap<usize, f32>>;

/// Replays `source` once, retaining the rows of every edge endpoint whose
/// `key` lands inside `block`. Both directions of an edge are retained
/// independently, so a row holds all of its incident neighbors.
///
/// # Errors
/// Returns [`ScanError`] when the replay fails or `key` rejects a node.
pub fn gather_block<S, K>(
    source: &mut S,
    block: &Range<usize>,
    key: K,
) -> Result<BlockRows, ScanError>
where
    S: EdgeSource + ?Sized,
    K: Fn(usize) -> Result<usize, ScanError>,
{
    let mut rows = BlockRows::new();
    source.scan(&mut |edge| {
        if block.contains(&key(edge.source)?) {
            rows.entry(edge.source)
                .or_default()
                .insert(edge.target, edge.weight);
        }
        if block.contains(&key(edge.target)?) {
            rows.entry(edge.target)
                .or_default()
                .insert(edge.source, edge.weight);
        }
        Ok(())
    })?;
    Ok(rows)
}

/// Identity keying for scans partitioned directly by node id.
///
/// # Errors
/// Never fails; the signature matches [`gather_block`]'s key contract.
pub fn node_key(node: usize) -> Result<usize, ScanError> {
    Ok(node)
}
