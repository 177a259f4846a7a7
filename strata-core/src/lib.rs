//! Strata core library.
//!
//! Multilevel reduction engine for drawing very large weighted similarity
//! graphs. The engine repeatedly clusters a graph using both edge weights
//! and existing 2-D coordinates, collapses the clusters into a coarser
//! graph, and later projects coarse coordinates back onto the finer level.
//!
//! The crate is organized around the pipeline's components:
//!
//! - [`catalog`] — bidirectional mapping between external string
//!   identifiers and dense node indices.
//! - [`topn`] — fixed-capacity per-row selection of the best neighbors.
//! - [`scan`] — restartable edge streams and the memory-bounded
//!   multi-pass block scanner built on them.
//! - [`linkage`] — the incremental average-link clustering engine.
//! - [`threshold`] — automatic distance-threshold selection.
//! - [`coarsen`] — aggregation of a fine graph into a coarse graph over
//!   clusters.
//! - [`refine`] — projection of coarse coordinates back onto fine nodes.
//! - [`pipeline`] — file-level drivers that chain the components into the
//!   `truncate`, `cluster`, `coarsen`, `refine`, and `recoord` operations.

pub mod catalog;
pub mod coarsen;
pub mod io;
pub mod linkage;
pub mod membership;
pub mod pipeline;
pub mod refine;
pub mod scan;
pub mod threshold;
pub mod topn;
mod types;

pub use crate::{
    catalog::{CatalogError, IdentifierCatalog},
    coarsen::{CoarsenConfig, CoarsenError},
    linkage::{AssignmentRow, AverageLink, ClusterAssignments, LinkageEdge, LinkageError},
    membership::{Membership, MembershipError},
    refine::{RefineError, ScaleFactor},
    scan::{EdgeSource, FileEdgeSource, PassPlan, ScanError, SliceEdgeSource},
    threshold::{ThresholdError, select_threshold},
    topn::{BoundedRow, RankOrder, TopRows},
    types::{Point, SimilarityEdge},
};
