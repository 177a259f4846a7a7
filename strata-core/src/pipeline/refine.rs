//! Refinement of coarse coordinates onto the finer node set.

use std::path::PathBuf;

use tracing::info;

use crate::io::{self, TabularCoordWriter, TabularEdgeWriter};
use crate::membership::Membership;
use crate::pipeline::PipelineError;
use crate::refine::{ScaleFactor, expand_coordinates, filter_edges};
use crate::scan::FileEdgeSource;

/// File layout for one refinement run.
#[derive(Clone, Debug)]
pub struct RefinePaths {
    /// Assignment stream mapping fine nodes to coarse clusters.
    pub assignments: PathBuf,
    /// Coarse coordinate stream, keyed by 0-based cluster id.
    pub coarse_coordinates: PathBuf,
    /// Refined fine coordinate output.
    pub refined_coordinates: PathBuf,
    /// Optional fine edge stream to filter, and its output.
    pub edge_filter: Option<(PathBuf, PathBuf)>,
}

/// Counts reported by [`refine`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RefineSummary {
    /// Fine coordinate rows written.
    pub expanded: usize,
    /// Edges kept by the optional filter pass.
    pub kept_edges: usize,
}

/// Runs the refinement operation. A positive `scale` rescales the coarse
/// layout to fit a box of that half width before expansion.
///
/// # Errors
/// Returns [`PipelineError`] when a stream fails, the assignment stream
/// is invalid, a coarse coordinate is out of range or repeated, or the
/// requested scaling is degenerate.
pub fn refine(paths: &RefinePaths, scale: Option<f32>) -> Result<RefineSummary, PipelineError> {
    info!(path = %paths.assignments.display(), "reading cluster assignments");
    let rows = io::read_assignments(&paths.assignments)?;
    let membership = Membership::from_rows(&rows)?;

    info!(path = %paths.coarse_coordinates.display(), "reading coarse coordinates");
    let coarse = io::read_indexed_coordinates(&paths.coarse_coordinates)?;
    let scale = scale
        .map(|requested| ScaleFactor::from_extent(&coarse, requested))
        .transpose()?;

    info!(path = %paths.refined_coordinates.display(), "expanding coordinates");
    let mut sink = TabularCoordWriter::new(io::create_writer(&paths.refined_coordinates)?);
    let expanded = expand_coordinates(&coarse, &membership, scale.as_ref(), &mut sink)?;
    sink.finish()
        .map_err(PipelineError::write(&paths.refined_coordinates))?;

    let mut kept_edges = 0;
    if let Some((input, output)) = &paths.edge_filter {
        info!(path = %input.display(), "filtering edges to expanded nodes");
        let mut source = FileEdgeSource::new(input);
        let mut sink = TabularEdgeWriter::new(io::create_writer(output)?);
        kept_edges = filter_edges(&mut source, &expanded, &mut sink)?;
        sink.finish().map_err(PipelineError::write(output))?;
    }

    Ok(RefineSummary {
        expanded: expanded.len(),
        kept_edges,
    })
}
