//! Average-link clustering over a laid-out level.
//!
//! Assembles the engine's input from three streams: the level's
//! coordinates, the previous truncation's kept edges, and the full
//! similarity stream, whose shortest links per node are merged in so the
//! clustering sees dense local structure even where truncation was
//! aggressive. The merged pairs are sorted ascending by distance and fed
//! through the engine in one sequential sweep.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::catalog::IdentifierCatalog;
use crate::io;
use crate::linkage::{AverageLink, LinkageEdge};
use crate::pipeline::PipelineError;
use crate::threshold::select_threshold;
use crate::topn::{RankOrder, TopRows};
use crate::types::Point;

/// Knobs for one clustering run.
#[derive(Clone, Copy, Debug)]
pub struct ClusterConfig {
    /// Distance threshold; 0 selects one automatically.
    pub threshold: f32,
    /// Shortest similarity links merged per node row.
    pub short_links: NonZeroUsize,
    /// Neighborhood radius for automatic threshold selection.
    pub neighborhood: NonZeroUsize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            short_links: NonZeroUsize::MIN,
            neighborhood: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// File layout for one clustering run.
#[derive(Clone, Debug)]
pub struct ClusterPaths {
    /// String-keyed coordinate stream from the layout engine.
    pub coordinates: PathBuf,
    /// Previous truncation's kept edges (string identifiers).
    pub edges: PathBuf,
    /// Full similarity stream (string identifiers).
    pub similarity: PathBuf,
    /// Assignment stream output.
    pub assignments: PathBuf,
    /// Optional sorted-distance diagnostic output.
    pub sorted_edges: Option<PathBuf>,
    /// Optional ascending minimum-distance diagnostic output.
    pub min_distances: Option<PathBuf>,
}

/// Counts reported by [`cluster`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterSummary {
    /// Nodes with coordinates.
    pub nodes: usize,
    /// Merged edges fed to the engine.
    pub edges: usize,
    /// Terminal clusters produced.
    pub clusters: usize,
    /// Threshold in effect, after automatic selection if requested.
    pub threshold: f32,
}

/// Runs the clustering operation.
///
/// # Errors
/// Returns [`PipelineError`] when a stream fails, a coordinate repeats,
/// an edge references an identifier with no coordinate, or automatic
/// threshold selection cannot converge.
pub fn cluster(
    paths: &ClusterPaths,
    config: &ClusterConfig,
) -> Result<ClusterSummary, PipelineError> {
    info!(path = %paths.coordinates.display(), "reading coordinates");
    let (catalog, positions) = read_positions(paths)?;
    let node_count = positions.len();
    info!(nodes = node_count, "coordinates read");

    // Upper-triangular pair map: later entries replace earlier ones, and
    // iteration order fixes the tie-break for equal distances.
    let mut pairs: BTreeMap<(usize, usize), f32> = BTreeMap::new();

    info!(path = %paths.edges.display(), "merging kept edges");
    io::for_each_raw_similarity::<PipelineError, _>(&paths.edges, |left, right, weight| {
        if weight > 0.0 {
            let left = catalog.require(left)?;
            let right = catalog.require(right)?;
            pairs.insert(
                ordered(left, right),
                positions[left].distance(positions[right]),
            );
        }
        Ok(())
    })?;

    info!(path = %paths.similarity.display(), "selecting shortest similarity links");
    let mut shortest = TopRows::new(0..node_count, RankOrder::SmallestFirst, config.short_links);
    // 0.0 doubles as "never seen"; nodes without similarity links keep it
    // and contribute zeros to the threshold distribution, ahead of every
    // real distance.
    let mut min_distance = vec![0.0_f32; node_count];
    io::for_each_raw_similarity::<PipelineError, _>(&paths.similarity, |left, right, weight| {
        if weight > 0.0 {
            let left = catalog.require(left)?;
            let right = catalog.require(right)?;
            let distance = positions[left].distance(positions[right]);
            for (node, other) in [(left, right), (right, left)] {
                if min_distance[node] == 0.0 || min_distance[node] > distance {
                    min_distance[node] = distance;
                }
                shortest.offer(node, other, distance);
            }
        }
        Ok(())
    })?;
    for (node, row) in shortest.into_rows() {
        for (neighbor, distance) in row.iter() {
            pairs.insert(ordered(node, neighbor), distance);
        }
    }

    info!(pairs = pairs.len(), "sorting merged edges by distance");
    let mut edges: Vec<LinkageEdge> = pairs
        .iter()
        .map(|(&(left, right), &distance)| {
            LinkageEdge::new(left, right, distance, positions[left], positions[right])
        })
        .collect();
    sort_by_distance(&mut edges);

    min_distance.sort_by(f32::total_cmp);

    if let Some(path) = &paths.sorted_edges {
        write_sorted_edges(path, &edges)?;
    }
    if let Some(path) = &paths.min_distances {
        write_min_distances(path, &min_distance)?;
    }

    let threshold = if config.threshold == 0.0 {
        let selected = select_threshold(&min_distance, config.neighborhood)?;
        info!(threshold = selected, "selected threshold automatically");
        selected
    } else {
        config.threshold
    };

    info!(threshold, "running average-link clustering");
    let mut engine = AverageLink::new(node_count, threshold);
    for edge in &edges {
        engine.observe(edge)?;
    }
    let assignments = engine.finish();
    let clusters = assignments.cluster_count();
    info!(clusters, "clustering finished");

    let path = &paths.assignments;
    let mut writer = io::create_writer(path)?;
    for row in assignments.rows() {
        let name = catalog.require_name(row.node)?;
        writeln!(writer, "{name}\t{}\t{}", row.cluster, row.importance)
            .map_err(PipelineError::write(path))?;
    }
    writer.flush().map_err(PipelineError::write(path))?;

    Ok(ClusterSummary {
        nodes: node_count,
        edges: edges.len(),
        clusters,
        threshold,
    })
}

fn read_positions(
    paths: &ClusterPaths,
) -> Result<(IdentifierCatalog, Vec<Point>), PipelineError> {
    let rows = io::read_named_coordinates(&paths.coordinates)?;
    let mut catalog = IdentifierCatalog::new();
    let mut positions = Vec::with_capacity(rows.len());
    for (name, point) in rows {
        if catalog.get(&name).is_some() {
            return Err(PipelineError::DuplicateCoordinate { identifier: name });
        }
        catalog.intern(&name);
        positions.push(point);
    }
    Ok((catalog, positions))
}

const fn ordered(left: usize, right: usize) -> (usize, usize) {
    if left < right { (left, right) } else { (right, left) }
}

// Stable sort keeps ascending-pair order for equal distances, the
// documented tie-break the engine's output depends on.
fn sort_by_distance(edges: &mut [LinkageEdge]) {
    #[cfg(feature = "parallel")]
    {
        use rayon::slice::ParallelSliceMut as _;
        edges.par_sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }
    #[cfg(not(feature = "parallel"))]
    edges.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

fn write_sorted_edges(path: &Path, edges: &[LinkageEdge]) -> Result<(), PipelineError> {
    info!(path = %path.display(), "writing sorted-distance diagnostics");
    let mut writer = io::create_writer(path)?;
    for edge in edges {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            edge.left,
            edge.right,
            edge.distance,
            edge.left_pos.x,
            edge.left_pos.y,
            edge.right_pos.x,
            edge.right_pos.y,
        )
        .map_err(PipelineError::write(path))?;
    }
    writer.flush().map_err(PipelineError::write(path))
}

fn write_min_distances(path: &Path, distances: &[f32]) -> Result<(), PipelineError> {
    info!(path = %path.display(), "writing minimum-distance diagnostics");
    let mut writer = io::create_writer(path)?;
    for distance in distances {
        writeln!(writer, "{distance}").map_err(PipelineError::write(path))?;
    }
    writer.flush().map_err(PipelineError::write(path))
}
