//! Coarsening of a clustered level into the next level's graph.

use std::path::PathBuf;

use tracing::info;

use crate::coarsen::{CoarsenConfig, cluster_denominators, coarsen_graph};
use crate::io::{self, TabularEdgeWriter};
use crate::membership::Membership;
use crate::pipeline::PipelineError;
use crate::scan::FileEdgeSource;

/// File layout for one coarsening run.
#[derive(Clone, Debug)]
pub struct CoarsenPaths {
    /// Assignment stream from the clustering operation.
    pub assignments: PathBuf,
    /// Fine id-normalized full stream.
    pub similarity: PathBuf,
    /// Coarse full stream output.
    pub coarse_full: PathBuf,
    /// Coarse truncated stream output.
    pub coarse_truncated: PathBuf,
}

/// Counts reported by [`coarsen`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoarsenSummary {
    /// Clusters in the membership.
    pub clusters: usize,
    /// Unordered cluster pairs written to the coarse full output.
    pub coarse_edges: usize,
    /// Rows written to the coarse truncated output.
    pub truncated_edges: usize,
}

/// Runs the coarsening operation.
///
/// # Errors
/// Returns [`PipelineError`] when a stream fails, the assignment stream
/// is invalid, or a fine node has no cluster.
pub fn coarsen(
    paths: &CoarsenPaths,
    config: &CoarsenConfig,
) -> Result<CoarsenSummary, PipelineError> {
    info!(path = %paths.assignments.display(), "reading cluster assignments");
    let rows = io::read_assignments(&paths.assignments)?;
    let membership = Membership::from_rows(&rows)?;
    let (min_size, max_size) = membership.size_bounds();
    info!(
        clusters = membership.cluster_count(),
        min_size, max_size, "membership loaded"
    );

    let mut source = FileEdgeSource::new(&paths.similarity);
    let denominators = if config.normalize {
        info!("computing cluster denominators");
        Some(cluster_denominators(
            &mut source,
            &membership,
            config.passes,
        )?)
    } else {
        None
    };

    info!(path = %paths.coarse_full.display(), "coarsening graph");
    let mut full = TabularEdgeWriter::new(io::create_writer(&paths.coarse_full)?);
    let mut truncated = TabularEdgeWriter::new(io::create_writer(&paths.coarse_truncated)?);
    let outcome = coarsen_graph(
        &mut source,
        &membership,
        config,
        denominators.as_deref(),
        &mut full,
        &mut truncated,
    )?;
    full.finish()
        .map_err(PipelineError::write(&paths.coarse_full))?;
    truncated
        .finish()
        .map_err(PipelineError::write(&paths.coarse_truncated))?;

    Ok(CoarsenSummary {
        clusters: membership.cluster_count(),
        coarse_edges: outcome.coarse_edges,
        truncated_edges: outcome.truncated_edges,
    })
}
