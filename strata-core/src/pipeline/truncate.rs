//! Ingestion and truncation of a raw similarity stream.
//!
//! The first operation of a level: build the identifier catalog from the
//! raw stream, rewrite the stream in id-normalized form, and bound the
//! graph's density by keeping only the top links per node, optionally on
//! cosine-like normalized weights.

use std::io::Write as _;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::{CatalogError, IdentifierCatalog};
use crate::io::{
    self, CoordSink as _, EdgeSink as _, TabularCoordWriter, TabularEdgeWriter,
    read_named_coordinates,
};
use crate::pipeline::PipelineError;
use crate::scan::{FileEdgeSource, PassPlan, ScanError, gather_block, node_key};
use crate::topn::{RankOrder, TopRows};
use crate::types::SimilarityEdge;

/// Knobs for one truncation run.
#[derive(Clone, Copy, Debug)]
pub struct TruncateConfig {
    /// Links kept per node in the truncated output.
    pub top_links: NonZeroUsize,
    /// Number of memory-bounding passes over the full stream.
    pub passes: NonZeroUsize,
    /// Whether the truncated output ranks and emits normalized weights.
    pub normalize: bool,
}

impl Default for TruncateConfig {
    fn default() -> Self {
        Self {
            top_links: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            passes: NonZeroUsize::MIN,
            normalize: false,
        }
    }
}

/// File layout for one truncation run.
#[derive(Clone, Debug)]
pub struct TruncatePaths {
    /// Raw similarity stream (string identifiers).
    pub raw_similarity: PathBuf,
    /// Catalog output (`name \t id`).
    pub catalog: PathBuf,
    /// Id-normalized full stream output.
    pub full: PathBuf,
    /// Truncated top-N stream output.
    pub truncated: PathBuf,
    /// Optional string-keyed coordinate input and id-keyed output.
    pub coordinates: Option<(PathBuf, PathBuf)>,
}

/// Counts reported by [`truncate`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TruncateSummary {
    /// Identifiers cataloged.
    pub nodes: usize,
    /// Lines read from the raw stream.
    pub lines: usize,
    /// Rows written to the truncated output.
    pub truncated_edges: usize,
}

/// Runs the truncation operation.
///
/// # Errors
/// Returns [`PipelineError`] when a stream fails, the raw stream holds no
/// positive-weight edges, or a coordinate references an uncataloged
/// identifier.
pub fn truncate(
    paths: &TruncatePaths,
    config: &TruncateConfig,
) -> Result<TruncateSummary, PipelineError> {
    info!(path = %paths.raw_similarity.display(), "scanning raw similarity stream");
    let mut catalog = IdentifierCatalog::new();
    let mut lines = 0_usize;
    io::for_each_raw_similarity::<PipelineError, _>(&paths.raw_similarity, |left, right, weight| {
        lines += 1;
        if weight > 0.0 {
            catalog.intern(left);
            catalog.intern(right);
        }
        Ok(())
    })?;
    if catalog.is_empty() {
        return Err(CatalogError::EmptyStream {
            path: paths.raw_similarity.clone(),
        }
        .into());
    }
    let nodes = catalog.len();
    info!(nodes, lines, "catalog built");

    write_catalog(&catalog, &paths.catalog)?;
    rewrite_full(&catalog, &paths.raw_similarity, &paths.full)?;

    if let Some((input, output)) = &paths.coordinates {
        translate_coordinates(&catalog, input, output)?;
    }

    let mut source = FileEdgeSource::new(&paths.full);
    let denominators = if config.normalize {
        Some(node_denominators(&mut source, nodes, config.passes)?)
    } else {
        None
    };

    let truncated_edges = write_truncated(
        &mut source,
        nodes,
        config,
        denominators.as_deref(),
        &paths.truncated,
    )?;

    Ok(TruncateSummary {
        nodes,
        lines,
        truncated_edges,
    })
}

fn write_catalog(catalog: &IdentifierCatalog, path: &Path) -> Result<(), PipelineError> {
    info!(path = %path.display(), "writing catalog");
    let mut writer = io::create_writer(path)?;
    for (id, name) in catalog.iter() {
        writeln!(writer, "{name}\t{id}").map_err(PipelineError::write(path))?;
    }
    writer.flush().map_err(PipelineError::write(path))
}

fn rewrite_full(
    catalog: &IdentifierCatalog,
    raw: &Path,
    full: &Path,
) -> Result<(), PipelineError> {
    info!(path = %full.display(), "rewriting id-normalized stream");
    let mut writer = TabularEdgeWriter::new(io::create_writer(full)?);
    io::for_each_raw_similarity::<PipelineError, _>(raw, |left, right, weight| {
        if weight > 0.0 {
            let edge = SimilarityEdge::new(catalog.require(left)?, catalog.require(right)?, weight);
            writer.record(edge).map_err(PipelineError::write(full))?;
        }
        Ok(())
    })?;
    writer.finish().map_err(PipelineError::write(full))?;
    Ok(())
}

fn translate_coordinates(
    catalog: &IdentifierCatalog,
    input: &Path,
    output: &Path,
) -> Result<(), PipelineError> {
    info!(path = %input.display(), "translating coordinates to node ids");
    let rows = read_named_coordinates(input)?;
    let mut writer = TabularCoordWriter::new(io::create_writer(output)?);
    for (name, point) in rows {
        let node = catalog.require(&name)?;
        writer
            .record(node, point)
            .map_err(PipelineError::write(output))?;
    }
    writer.finish().map_err(PipelineError::write(output))?;
    Ok(())
}

// Per-node sums of incident weights, gathered over node-id blocks.
fn node_denominators(
    source: &mut FileEdgeSource,
    node_count: usize,
    passes: NonZeroUsize,
) -> Result<Vec<f64>, ScanError> {
    info!("computing normalization denominators");
    let mut denominators = vec![0.0_f64; node_count];
    let plan = PassPlan::new(node_count, passes);
    for (pass, block) in plan.blocks().enumerate() {
        debug!(pass, ?block, "denominator scan");
        let rows = gather_block(source, &block, node_key)?;
        for (node, neighbors) in rows {
            let Some(slot) = denominators.get_mut(node) else {
                return Err(ScanError::NodeOutOfRange {
                    node,
                    limit: node_count,
                });
            };
            for weight in neighbors.values() {
                *slot += f64::from(*weight);
            }
        }
    }
    Ok(denominators)
}

fn write_truncated(
    source: &mut FileEdgeSource,
    node_count: usize,
    config: &TruncateConfig,
    denominators: Option<&[f64]>,
    path: &Path,
) -> Result<usize, PipelineError> {
    info!(path = %path.display(), "writing truncated stream");
    let mut writer = TabularEdgeWriter::new(io::create_writer(path)?);
    let mut written = 0_usize;
    let plan = PassPlan::new(node_count, config.passes);
    for (pass, block) in plan.blocks().enumerate() {
        debug!(pass, ?block, "truncation scan");
        let rows = gather_block(source, &block, node_key)?;
        let mut best = TopRows::new(block.clone(), RankOrder::LargestFirst, config.top_links);
        for (node, neighbors) in rows {
            for (neighbor, weight) in neighbors {
                let value = match denominators {
                    Some(denominators) => {
                        let far = denominators.get(neighbor).copied().ok_or(
                            ScanError::NodeOutOfRange {
                                node: neighbor,
                                limit: node_count,
                            },
                        )?;
                        let near = denominators.get(node).copied().ok_or(
                            ScanError::NodeOutOfRange {
                                node,
                                limit: node_count,
                            },
                        )?;
                        (f64::from(weight) / (near * far).sqrt()) as f32
                    }
                    None => weight,
                };
                best.offer(node, neighbor, value);
            }
        }
        for (node, row) in best.into_rows() {
            for (neighbor, weight) in row.into_ranked() {
                writer
                    .record(SimilarityEdge::new(node, neighbor, weight))
                    .map_err(PipelineError::write(path))?;
                written += 1;
            }
        }
    }
    writer.finish().map_err(PipelineError::write(path))?;
    Ok(written)
}
