//! File-level drivers for the pipeline's operations.
//!
//! One driver per operation of a reduction level: [`truncate`] ingests
//! and bounds the raw graph, [`cluster`] runs average-link clustering on
//! laid-out coordinates, [`coarsen`] collapses the clustering into a
//! coarser graph, [`refine`] projects coarse coordinates back down, and
//! [`recoord`] restores external identifiers. Drivers only ever return a
//! typed [`PipelineError`]; terminating the process is the calling
//! binary's job.

mod cluster;
mod coarsen;
mod recoord;
mod refine;
mod truncate;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::coarsen::CoarsenError;
use crate::io::FormatError;
use crate::linkage::LinkageError;
use crate::membership::MembershipError;
use crate::refine::RefineError;
use crate::scan::ScanError;
use crate::threshold::ThresholdError;

pub use self::cluster::{ClusterConfig, ClusterPaths, ClusterSummary, cluster};
pub use self::coarsen::{CoarsenPaths, CoarsenSummary, coarsen};
pub use self::recoord::{RecoordPaths, RecoordSummary, recoord};
pub use self::refine::{RefinePaths, RefineSummary, refine};
pub use self::truncate::{TruncateConfig, TruncatePaths, TruncateSummary, truncate};

/// Errors surfaced by the pipeline drivers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Catalog construction or lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// A text stream failed to open, read, write, or parse.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// A multi-pass scan failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The clustering engine rejected an edge.
    #[error(transparent)]
    Linkage(#[from] LinkageError),
    /// Automatic threshold selection failed.
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    /// An assignment stream failed validation.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// Coarsening failed.
    #[error(transparent)]
    Coarsen(#[from] CoarsenError),
    /// Refinement failed.
    #[error(transparent)]
    Refine(#[from] RefineError),
    /// A coordinate stream repeated an identifier.
    #[error("duplicate coordinate entry for `{identifier}`")]
    DuplicateCoordinate {
        /// The repeated identifier.
        identifier: String,
    },
    /// Writing an output stream failed.
    #[error("failed to write `{path}`: {source}")]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub(crate) fn write(path: &std::path::Path) -> impl Fn(io::Error) -> Self + '_ {
        move |source| Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}
