//! Reverse translation of id-keyed streams back to external identifiers.
//!
//! Undoes the truncation step's id normalization so the finished layout
//! can be published against the caller's original identifiers.

use std::io::Write as _;
use std::path::PathBuf;

use tracing::info;

use crate::catalog::IdentifierCatalog;
use crate::io;
use crate::pipeline::PipelineError;

/// File layout for one reverse-translation run.
#[derive(Clone, Debug)]
pub struct RecoordPaths {
    /// Catalog stream written by truncation (`name \t id`).
    pub catalog: PathBuf,
    /// Id-keyed coordinate input.
    pub coordinates_in: PathBuf,
    /// String-keyed coordinate output.
    pub coordinates_out: PathBuf,
    /// Optional id-keyed edge input, and its string-keyed output.
    pub edges: Option<(PathBuf, PathBuf)>,
}

/// Counts reported by [`recoord`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RecoordSummary {
    /// Coordinate rows translated.
    pub coordinates: usize,
    /// Edge rows translated.
    pub edges: usize,
}

/// Runs the reverse translation.
///
/// # Errors
/// Returns [`PipelineError`] when a stream fails, the catalog is not
/// dense, or an input references an id the catalog never assigned.
pub fn recoord(paths: &RecoordPaths) -> Result<RecoordSummary, PipelineError> {
    info!(path = %paths.catalog.display(), "reading catalog");
    let pairs = io::read_catalog_pairs(&paths.catalog)?;
    let catalog = IdentifierCatalog::from_pairs(pairs)?;
    info!(nodes = catalog.len(), "catalog loaded");

    let mut summary = RecoordSummary::default();

    let out = &paths.coordinates_out;
    info!(path = %out.display(), "translating coordinates");
    let rows = io::read_indexed_coordinates(&paths.coordinates_in)?;
    let mut writer = io::create_writer(out)?;
    for (node, point) in rows {
        let name = catalog.require_name(node)?;
        writeln!(writer, "{name}\t{}\t{}", point.x, point.y)
            .map_err(PipelineError::write(out))?;
        summary.coordinates += 1;
    }
    writer.flush().map_err(PipelineError::write(out))?;

    if let Some((input, output)) = &paths.edges {
        info!(path = %output.display(), "translating edges");
        let mut writer = io::create_writer(output)?;
        io::for_each_edge::<PipelineError, _>(input, |edge| {
            let source = catalog.require_name(edge.source)?;
            let target = catalog.require_name(edge.target)?;
            writeln!(writer, "{source}\t{target}\t{}", edge.weight)
                .map_err(PipelineError::write(output))?;
            summary.edges += 1;
            Ok(())
        })?;
        writer.flush().map_err(PipelineError::write(output))?;
    }

    Ok(summary)
}
