//! Projection of coarse coordinates back onto the finer node set.
//!
//! Every member of a cluster receives its cluster's coarse coordinate,
//! optionally rescaled by a single factor shared by both axes so the
//! aspect ratio survives. A follow-up pass filters an edge stream down
//! to the fine ids that actually received a coordinate, which is what
//! the next layout round consumes.

use std::collections::HashSet;
use std::io;

use thiserror::Error;

use crate::io::{CoordSink, EdgeSink};
use crate::membership::Membership;
use crate::scan::{EdgeSource, ScanError};
use crate::types::Point;

/// Errors raised while refining.
#[derive(Debug, Error)]
pub enum RefineError {
    /// A coarse coordinate referenced a cluster outside the assignment.
    #[error("coarse coordinate references cluster {cluster}, but only {cluster_count} exist")]
    ClusterOutOfRange {
        /// The out-of-range cluster id.
        cluster: usize,
        /// Number of clusters in the membership.
        cluster_count: usize,
    },
    /// The same cluster appeared twice in the coarse coordinate stream.
    #[error("duplicate coordinate entry for cluster {cluster}")]
    DuplicateCoordinate {
        /// The repeated cluster id.
        cluster: usize,
    },
    /// Scaling was requested but no coordinates were available.
    #[error("cannot derive a scale from an empty coordinate stream")]
    EmptyCoordinates,
    /// Scaling was requested but every coordinate sits at the origin.
    #[error("cannot rescale coordinates with zero extent")]
    ZeroExtent,
    /// Replaying the edge stream failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// Writing refined output failed.
    #[error("failed to write refined output: {source}")]
    Write {
        /// Underlying sink error.
        #[source]
        source: io::Error,
    },
}

/// A uniform rescaling derived from the coarse layout's extent: points
/// are multiplied by `requested / extent`, with the extent shared by the
/// x and y axes to avoid distortion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactor {
    requested: f32,
    extent: f32,
}

impl ScaleFactor {
    /// Derives the scale for fitting `coordinates` into a box of half
    /// width `requested`. The extent is the largest coordinate magnitude
    /// on either axis.
    ///
    /// # Errors
    /// Returns [`RefineError`] when `coordinates` is empty or every point
    /// sits at the origin.
    pub fn from_extent(
        coordinates: &[(usize, Point)],
        requested: f32,
    ) -> Result<Self, RefineError> {
        if coordinates.is_empty() {
            return Err(RefineError::EmptyCoordinates);
        }
        let mut extent = 0.0_f32;
        for (_, point) in coordinates {
            extent = extent.max(point.x.abs()).max(point.y.abs());
        }
        if extent == 0.0 {
            return Err(RefineError::ZeroExtent);
        }
        Ok(Self { requested, extent })
    }

    /// Applies the scale to one point.
    #[must_use]
    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            point.x * self.requested / self.extent,
            point.y * self.requested / self.extent,
        )
    }
}

/// The fine ids that received a coordinate during expansion.
#[derive(Clone, Debug, Default)]
pub struct ExpandedIds {
    ids: HashSet<usize>,
}

impl ExpandedIds {
    /// Returns whether `node` received a coordinate.
    #[must_use]
    pub fn contains(&self, node: usize) -> bool {
        self.ids.contains(&node)
    }

    /// Number of fine ids expanded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns whether no ids were expanded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Projects each coarse coordinate onto every member of its cluster,
/// recording the rows in `sink` and returning the set of fine ids seen.
///
/// # Errors
/// Returns [`RefineError`] when a cluster id is out of range, a cluster
/// repeats in the stream, or the sink fails.
pub fn expand_coordinates<CS>(
    coarse: &[(usize, Point)],
    membership: &Membership,
    scale: Option<&ScaleFactor>,
    sink: &mut CS,
) -> Result<ExpandedIds, RefineError>
where
    CS: CoordSink,
{
    let cluster_count = membership.cluster_count();
    let mut seen = vec![false; cluster_count];
    let mut expanded = ExpandedIds::default();
    for (cluster, point) in coarse {
        let Some(flag) = seen.get_mut(*cluster) else {
            return Err(RefineError::ClusterOutOfRange {
                cluster: *cluster,
                cluster_count,
            });
        };
        if *flag {
            return Err(RefineError::DuplicateCoordinate { cluster: *cluster });
        }
        *flag = true;

        let position = scale.map_or(*point, |scale| scale.apply(*point));
        for member in membership.members(*cluster) {
            expanded.ids.insert(*member);
            sink.record(*member, position)
                .map_err(|source| RefineError::Write { source })?;
        }
    }
    Ok(expanded)
}

/// Keeps only the edges whose endpoints both received a coordinate,
/// dropping the rest silently, and returns how many were kept.
///
/// # Errors
/// Returns [`RefineError`] when the stream fails to replay or the sink
/// fails.
pub fn filter_edges<S, ES>(
    source: &mut S,
    expanded: &ExpandedIds,
    sink: &mut ES,
) -> Result<usize, RefineError>
where
    S: EdgeSource + ?Sized,
    ES: EdgeSink,
{
    let mut kept = 0;
    source
        .scan(&mut |edge| {
            if expanded.contains(edge.source) && expanded.contains(edge.target) {
                sink.record(edge)
                    .map_err(|source| ScanError::Sink { source })?;
                kept += 1;
            }
            Ok(())
        })
        .map_err(|error| match error {
            ScanError::Sink { source } => RefineError::Write { source },
            other => RefineError::Scan(other),
        })?;
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::linkage::AssignmentRow;
    use crate::scan::SliceEdgeSource;
    use crate::types::SimilarityEdge;

    fn membership() -> Membership {
        let rows: Vec<AssignmentRow> = [(0, 1), (3, 1), (7, 1), (1, 2)]
            .into_iter()
            .map(|(node, cluster)| AssignmentRow {
                node,
                cluster,
                importance: 0,
            })
            .collect();
        Membership::from_rows(&rows).expect("valid membership")
    }

    #[test]
    fn every_member_receives_the_coarse_point() {
        let coarse = [(0, Point::new(2.5, -1.0)), (1, Point::new(0.5, 0.5))];
        let mut sink = Vec::new();
        let expanded =
            expand_coordinates(&coarse, &membership(), None, &mut sink).expect("expand");
        assert_eq!(expanded.len(), 4);
        assert_eq!(
            sink,
            vec![
                (0, Point::new(2.5, -1.0)),
                (3, Point::new(2.5, -1.0)),
                (7, Point::new(2.5, -1.0)),
                (1, Point::new(0.5, 0.5)),
            ]
        );
    }

    #[test]
    fn scaling_preserves_aspect_ratio() {
        let coarse = [(0, Point::new(2.0, -4.0)), (1, Point::new(1.0, 1.0))];
        let scale = ScaleFactor::from_extent(&coarse, 10.0).expect("scale");
        // The extent is max(|x|, |y|) = 4, shared by both axes.
        assert_eq!(scale.apply(Point::new(2.0, -4.0)), Point::new(5.0, -10.0));
        assert_eq!(scale.apply(Point::new(1.0, 1.0)), Point::new(2.5, 2.5));
    }

    #[test]
    fn out_of_range_clusters_are_rejected() {
        let coarse = [(5, Point::new(0.0, 0.0))];
        let mut sink = Vec::new();
        let err = expand_coordinates(&coarse, &membership(), None, &mut sink)
            .expect_err("cluster 5 must fail");
        assert!(matches!(
            err,
            RefineError::ClusterOutOfRange {
                cluster: 5,
                cluster_count: 2
            }
        ));
    }

    #[test]
    fn duplicate_coarse_rows_are_rejected() {
        let coarse = [(0, Point::new(0.0, 0.0)), (0, Point::new(1.0, 1.0))];
        let mut sink = Vec::new();
        let err = expand_coordinates(&coarse, &membership(), None, &mut sink)
            .expect_err("duplicate cluster must fail");
        assert!(matches!(err, RefineError::DuplicateCoordinate { cluster: 0 }));
    }

    #[test]
    fn degenerate_extents_are_rejected() {
        assert!(matches!(
            ScaleFactor::from_extent(&[], 2.0),
            Err(RefineError::EmptyCoordinates)
        ));
        assert!(matches!(
            ScaleFactor::from_extent(&[(0, Point::new(0.0, 0.0))], 2.0),
            Err(RefineError::ZeroExtent)
        ));
    }

    #[test]
    fn filtering_keeps_only_expanded_endpoints() {
        let coarse = [(0, Point::new(0.0, 0.0))];
        let mut coords = Vec::new();
        let expanded =
            expand_coordinates(&coarse, &membership(), None, &mut coords).expect("expand");

        // Cluster 0 holds nodes 0, 3, 7; node 1 got no coordinate.
        let edges = [
            SimilarityEdge::new(0, 3, 1.0),
            SimilarityEdge::new(0, 1, 2.0),
            SimilarityEdge::new(7, 0, 3.0),
            SimilarityEdge::new(9, 3, 4.0),
        ];
        let mut source = SliceEdgeSource::new(&edges);
        let mut kept_edges = Vec::new();
        let kept = filter_edges(&mut source, &expanded, &mut kept_edges).expect("filter");
        assert_eq!(kept, 2);
        assert_eq!(
            kept_edges,
            vec![
                SimilarityEdge::new(0, 3, 1.0),
                SimilarityEdge::new(7, 0, 3.0)
            ]
        );
    }
}
