//! Aggregation of a fine similarity graph into a coarse graph over
//! clusters.
//!
//! A coarse weight is the sum of every fine weight whose endpoints fall
//! in the two clusters. The fine stream is replayed once per cluster-id
//! block via the multi-pass scanner, so peak memory follows the block
//! size rather than the stream. Self-pairs take part in aggregation but
//! never reach either output. When normalization is requested the raw
//! sums are still what the full output carries; the normalized values
//! drive only the ranking and the truncated output's weights.

use std::collections::BTreeMap;
use std::io;
use std::num::NonZeroUsize;

use thiserror::Error;
use tracing::debug;

use crate::io::EdgeSink;
use crate::membership::Membership;
use crate::scan::{EdgeSource, PassPlan, ScanError, gather_block, node_key};
use crate::topn::{BoundedRow, RankOrder};
use crate::types::SimilarityEdge;

/// Knobs for one coarsening run.
#[derive(Clone, Copy, Debug)]
pub struct CoarsenConfig {
    /// Number of memory-bounding passes over the fine stream.
    pub passes: NonZeroUsize,
    /// Whether ranking uses cosine-like normalized weights.
    pub normalize: bool,
    /// Link budget for the smallest cluster.
    pub min_links: NonZeroUsize,
    /// Link budget for the largest cluster.
    pub max_links: NonZeroUsize,
}

impl Default for CoarsenConfig {
    fn default() -> Self {
        Self {
            passes: NonZeroUsize::MIN,
            normalize: false,
            min_links: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            max_links: NonZeroUsize::new(15).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Errors raised while coarsening.
#[derive(Debug, Error)]
pub enum CoarsenError {
    /// Replaying the fine stream failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The link bounds were inverted.
    #[error("link bounds are inverted: min {min} > max {max}")]
    InvalidLinkBounds {
        /// Configured minimum link budget.
        min: usize,
        /// Configured maximum link budget.
        max: usize,
    },
    /// Writing a coarse output failed.
    #[error("failed to write coarse output: {source}")]
    Write {
        /// Underlying sink error.
        #[source]
        source: io::Error,
    },
}

/// Counts reported by [`coarsen_graph`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoarsenOutcome {
    /// Unordered cluster pairs written to the full output.
    pub coarse_edges: usize,
    /// Rows written to the truncated output.
    pub truncated_edges: usize,
}

/// Sums each cluster's incident fine weights, the denominators of the
/// cosine-like normalization. Scans are partitioned by node id.
///
/// # Errors
/// Returns [`CoarsenError`] when the stream fails to replay or a fine
/// node has no cluster assignment.
pub fn cluster_denominators<S>(
    source: &mut S,
    membership: &Membership,
    passes: NonZeroUsize,
) -> Result<Vec<f64>, CoarsenError>
where
    S: EdgeSource + ?Sized,
{
    let mut denominators = vec![0.0_f64; membership.cluster_count()];
    let plan = PassPlan::new(membership.node_limit(), passes);
    for (pass, block) in plan.blocks().enumerate() {
        debug!(pass, ?block, "denominator scan");
        let rows = gather_block(source, &block, node_key)?;
        for (node, neighbors) in rows {
            let cluster = membership
                .cluster_of(node)
                .ok_or(ScanError::UnassignedNode { node })?;
            for weight in neighbors.values() {
                denominators[cluster] += f64::from(*weight);
            }
        }
    }
    Ok(denominators)
}

/// Aggregates the fine stream into a coarse graph, writing every
/// unordered cluster pair to `full_sink` and each cluster's best links to
/// `truncated_sink`.
///
/// # Errors
/// Returns [`CoarsenError`] when the stream fails to replay, a fine node
/// has no cluster assignment, the link bounds are inverted, or a sink
/// write fails.
pub fn coarsen_graph<S, FS, TS>(
    source: &mut S,
    membership: &Membership,
    config: &CoarsenConfig,
    denominators: Option<&[f64]>,
    full_sink: &mut FS,
    truncated_sink: &mut TS,
) -> Result<CoarsenOutcome, CoarsenError>
where
    S: EdgeSource + ?Sized,
    FS: EdgeSink,
    TS: EdgeSink,
{
    if config.min_links > config.max_links {
        return Err(CoarsenError::InvalidLinkBounds {
            min: config.min_links.get(),
            max: config.max_links.get(),
        });
    }

    let (min_size, max_size) = membership.size_bounds();
    let mut outcome = CoarsenOutcome::default();
    let plan = PassPlan::new(membership.cluster_count(), config.passes);
    for (pass, block) in plan.blocks().enumerate() {
        debug!(pass, ?block, "aggregation scan");
        let rows = gather_block(source, &block, |node| {
            membership
                .cluster_of(node)
                .ok_or(ScanError::UnassignedNode { node })
        })?;

        // Sum fine weights into the block's coarse rows. Rows landed here
        // because their node's cluster is in the block, so blocks produce
        // disjoint coarse rows.
        let mut coarse: BTreeMap<usize, BTreeMap<usize, f64>> = BTreeMap::new();
        for (node, neighbors) in &rows {
            let row_cluster = membership
                .cluster_of(*node)
                .ok_or(ScanError::UnassignedNode { node: *node })?;
            let coarse_row = coarse.entry(row_cluster).or_default();
            for (neighbor, weight) in neighbors {
                let neighbor_cluster = membership
                    .cluster_of(*neighbor)
                    .ok_or(ScanError::UnassignedNode { node: *neighbor })?;
                *coarse_row.entry(neighbor_cluster).or_insert(0.0) += f64::from(*weight);
            }
        }

        for (row, entries) in &mut coarse {
            for (column, value) in entries.iter_mut() {
                if row < column {
                    full_sink
                        .record(SimilarityEdge::new(*row, *column, *value as f32))
                        .map_err(|source| CoarsenError::Write { source })?;
                    outcome.coarse_edges += 1;
                }
                if let Some(denominators) = denominators {
                    *value /= (denominators[*row] * denominators[*column]).sqrt();
                }
            }
        }

        for (row, entries) in &coarse {
            let budget = link_budget(
                membership.size(*row),
                min_size,
                max_size,
                config.min_links.get(),
                config.max_links.get(),
            );
            let Some(capacity) = NonZeroUsize::new(budget) else {
                continue;
            };
            let mut best = BoundedRow::new(RankOrder::LargestFirst, capacity);
            for (column, value) in entries {
                if row != column {
                    best.offer(*column, *value as f32);
                }
            }
            for (column, value) in best.into_ranked() {
                truncated_sink
                    .record(SimilarityEdge::new(*row, column, value))
                    .map_err(|source| CoarsenError::Write { source })?;
                outcome.truncated_edges += 1;
            }
        }
    }
    Ok(outcome)
}

// Log-interpolates a cluster's link budget between the configured bounds
// so larger clusters keep more outgoing links. Equal-sized clusterings
// collapse to the minimum budget.
fn link_budget(
    size: usize,
    min_size: usize,
    max_size: usize,
    min_links: usize,
    max_links: usize,
) -> usize {
    if min_size == max_size {
        return min_links;
    }
    let fraction = ((size as f32).ln() - (min_size as f32).ln())
        / ((max_size as f32).ln() - (min_size as f32).ln());
    min_links + ((max_links - min_links) as f32 * fraction) as usize
}
