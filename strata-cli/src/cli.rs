//! Command-line orchestration for the strata reduction pipeline.
//!
//! One subcommand per pipeline operation. Each takes a root name and
//! derives its stream paths by suffix, the convention the external
//! layout engine follows between levels: `ROOT.sim` for the raw
//! similarity stream, `.ind` for the catalog, `.full` and `.int` for the
//! id-normalized and truncated streams, `.icoord`/`.coord` for id- and
//! string-keyed coordinates, `.clust` for assignments, and `.real` for
//! refined coordinates.

use std::ffi::OsString;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use strata_core::CoarsenConfig;
use strata_core::pipeline::{
    self, ClusterConfig, ClusterPaths, ClusterSummary, CoarsenPaths, CoarsenSummary,
    PipelineError, RecoordPaths, RecoordSummary, RefinePaths, RefineSummary, TruncateConfig,
    TruncatePaths, TruncateSummary,
};

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(name = "strata", about = "Multilevel reduction of large similarity graphs.")]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands, one per pipeline operation.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Catalog a raw similarity stream and truncate it to the top links.
    Truncate(TruncateArgs),
    /// Cluster a laid-out level with average-link clustering.
    Cluster(ClusterArgs),
    /// Collapse a clustered level into a coarser graph.
    Coarsen(CoarsenArgs),
    /// Project coarse coordinates back onto the finer level.
    Refine(RefineArgs),
    /// Translate id-keyed outputs back to external identifiers.
    Recoord(RecoordArgs),
}

/// Options accepted by the `truncate` command.
#[derive(Debug, Args, Clone)]
pub struct TruncateArgs {
    /// Root name; reads ROOT.sim and writes ROOT.ind, ROOT.full, ROOT.int.
    pub root: PathBuf,

    /// Links kept per node.
    #[arg(long = "top-links", default_value_t = NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN))]
    pub top_links: NonZeroUsize,

    /// Times to scan the full stream; bounds memory at nodes/passes rows.
    #[arg(long, default_value_t = NonZeroUsize::MIN)]
    pub passes: NonZeroUsize,

    /// Rank and emit cosine-like normalized weights.
    #[arg(long)]
    pub normalize: bool,

    /// Also translate ROOT.coord into the id-keyed ROOT.real.
    #[arg(long)]
    pub coords: bool,
}

/// Options accepted by the `cluster` command.
#[derive(Debug, Args, Clone)]
pub struct ClusterArgs {
    /// Root name; reads ROOT.icoord, ROOT.iedges, ROOT.full and writes
    /// ROOT.clust.
    pub root: PathBuf,

    /// Distance threshold; 0 selects one automatically.
    #[arg(long, default_value_t = 0.0)]
    pub threshold: f32,

    /// Shortest similarity links merged per node.
    #[arg(long = "short-links", default_value_t = NonZeroUsize::MIN)]
    pub short_links: NonZeroUsize,

    /// Neighborhood radius for automatic threshold selection.
    #[arg(long, default_value_t = NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN))]
    pub neighborhood: NonZeroUsize,

    /// Also write the ROOT.clustin and ROOT.mindist diagnostic streams.
    #[arg(long)]
    pub diagnostics: bool,
}

/// Options accepted by the `coarsen` command.
#[derive(Debug, Args, Clone)]
pub struct CoarsenArgs {
    /// Fine root name; reads FINE.clust and FINE.full.
    pub fine_root: PathBuf,

    /// Coarse root name; writes COARSE.full and COARSE.int.
    pub coarse_root: PathBuf,

    /// Times to scan the fine stream.
    #[arg(long, default_value_t = NonZeroUsize::MIN)]
    pub passes: NonZeroUsize,

    /// Rank the coarse links on normalized weights.
    #[arg(long)]
    pub normalize: bool,

    /// Link budget for the smallest cluster.
    #[arg(long = "min-links", default_value_t = NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN))]
    pub min_links: NonZeroUsize,

    /// Link budget for the largest cluster.
    #[arg(long = "max-links", default_value_t = NonZeroUsize::new(15).unwrap_or(NonZeroUsize::MIN))]
    pub max_links: NonZeroUsize,
}

/// Options accepted by the `refine` command.
#[derive(Debug, Args, Clone)]
pub struct RefineArgs {
    /// Fine root name; reads FINE.clust and writes FINE.real.
    pub fine_root: PathBuf,

    /// Coarse root name; reads COARSE.icoord.
    pub coarse_root: PathBuf,

    /// Rescale the coarse layout into a box of this half width.
    #[arg(long)]
    pub scale: Option<f32>,

    /// Also filter FINE.int down to expanded nodes as FINE.refine_int.
    #[arg(long = "filter-edges")]
    pub filter_edges: bool,
}

/// Options accepted by the `recoord` command.
#[derive(Debug, Args, Clone)]
pub struct RecoordArgs {
    /// Root name; reads ROOT.ind and ROOT.icoord and writes ROOT.coord.
    pub root: PathBuf,

    /// Also translate ROOT.iedges into ROOT.edges.
    #[arg(long)]
    pub edges: bool,
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The pipeline operation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// A negative threshold was supplied.
    #[error("threshold must be zero (automatic) or positive, got {got}")]
    InvalidThreshold {
        /// The rejected value.
        got: f32,
    },
    /// A non-positive scale factor was supplied.
    #[error("scale factor must be positive, got {got}")]
    InvalidScale {
        /// The rejected value.
        got: f32,
    },
}

/// Summarises the outcome of executing a CLI command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionSummary {
    /// Outcome of `truncate`.
    Truncate(TruncateSummary),
    /// Outcome of `cluster`.
    Cluster(ClusterSummary),
    /// Outcome of `coarsen`.
    Coarsen(CoarsenSummary),
    /// Outcome of `refine`.
    Refine(RefineSummary),
    /// Outcome of `recoord`.
    Recoord(RecoordSummary),
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when an argument fails validation or the
/// operation fails.
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    match cli.command {
        Command::Truncate(args) => run_truncate(&args),
        Command::Cluster(args) => run_cluster(&args),
        Command::Coarsen(args) => run_coarsen(&args),
        Command::Refine(args) => run_refine(&args),
        Command::Recoord(args) => run_recoord(&args),
    }
}

fn run_truncate(args: &TruncateArgs) -> Result<ExecutionSummary, CliError> {
    let paths = TruncatePaths {
        raw_similarity: with_suffix(&args.root, "sim"),
        catalog: with_suffix(&args.root, "ind"),
        full: with_suffix(&args.root, "full"),
        truncated: with_suffix(&args.root, "int"),
        coordinates: args
            .coords
            .then(|| (with_suffix(&args.root, "coord"), with_suffix(&args.root, "real"))),
    };
    let config = TruncateConfig {
        top_links: args.top_links,
        passes: args.passes,
        normalize: args.normalize,
    };
    Ok(ExecutionSummary::Truncate(pipeline::truncate(
        &paths, &config,
    )?))
}

fn run_cluster(args: &ClusterArgs) -> Result<ExecutionSummary, CliError> {
    if args.threshold < 0.0 {
        return Err(CliError::InvalidThreshold {
            got: args.threshold,
        });
    }
    let paths = ClusterPaths {
        coordinates: with_suffix(&args.root, "icoord"),
        edges: with_suffix(&args.root, "iedges"),
        similarity: with_suffix(&args.root, "full"),
        assignments: with_suffix(&args.root, "clust"),
        sorted_edges: args
            .diagnostics
            .then(|| with_suffix(&args.root, "clustin")),
        min_distances: args
            .diagnostics
            .then(|| with_suffix(&args.root, "mindist")),
    };
    let config = ClusterConfig {
        threshold: args.threshold,
        short_links: args.short_links,
        neighborhood: args.neighborhood,
    };
    Ok(ExecutionSummary::Cluster(pipeline::cluster(
        &paths, &config,
    )?))
}

fn run_coarsen(args: &CoarsenArgs) -> Result<ExecutionSummary, CliError> {
    let paths = CoarsenPaths {
        assignments: with_suffix(&args.fine_root, "clust"),
        similarity: with_suffix(&args.fine_root, "full"),
        coarse_full: with_suffix(&args.coarse_root, "full"),
        coarse_truncated: with_suffix(&args.coarse_root, "int"),
    };
    let config = CoarsenConfig {
        passes: args.passes,
        normalize: args.normalize,
        min_links: args.min_links,
        max_links: args.max_links,
    };
    Ok(ExecutionSummary::Coarsen(pipeline::coarsen(
        &paths, &config,
    )?))
}

fn run_refine(args: &RefineArgs) -> Result<ExecutionSummary, CliError> {
    if let Some(scale) = args.scale {
        if scale <= 0.0 {
            return Err(CliError::InvalidScale { got: scale });
        }
    }
    let paths = RefinePaths {
        assignments: with_suffix(&args.fine_root, "clust"),
        coarse_coordinates: with_suffix(&args.coarse_root, "icoord"),
        refined_coordinates: with_suffix(&args.fine_root, "real"),
        edge_filter: args.filter_edges.then(|| {
            (
                with_suffix(&args.fine_root, "int"),
                with_suffix(&args.fine_root, "refine_int"),
            )
        }),
    };
    Ok(ExecutionSummary::Refine(pipeline::refine(
        &paths, args.scale,
    )?))
}

fn run_recoord(args: &RecoordArgs) -> Result<ExecutionSummary, CliError> {
    let paths = RecoordPaths {
        catalog: with_suffix(&args.root, "ind"),
        coordinates_in: with_suffix(&args.root, "icoord"),
        coordinates_out: with_suffix(&args.root, "coord"),
        edges: args.edges.then(|| {
            (
                with_suffix(&args.root, "iedges"),
                with_suffix(&args.root, "edges"),
            )
        }),
    };
    Ok(ExecutionSummary::Recoord(pipeline::recoord(&paths)?))
}

fn with_suffix(root: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(root.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    match summary {
        ExecutionSummary::Truncate(truncate) => {
            writeln!(writer, "nodes: {}", truncate.nodes)?;
            writeln!(writer, "lines read: {}", truncate.lines)?;
            writeln!(writer, "truncated edges: {}", truncate.truncated_edges)?;
        }
        ExecutionSummary::Cluster(cluster) => {
            writeln!(writer, "nodes: {}", cluster.nodes)?;
            writeln!(writer, "edges: {}", cluster.edges)?;
            writeln!(writer, "clusters: {}", cluster.clusters)?;
            writeln!(writer, "threshold: {}", cluster.threshold)?;
        }
        ExecutionSummary::Coarsen(coarsen) => {
            writeln!(writer, "clusters: {}", coarsen.clusters)?;
            writeln!(writer, "coarse edges: {}", coarsen.coarse_edges)?;
            writeln!(writer, "truncated edges: {}", coarsen.truncated_edges)?;
        }
        ExecutionSummary::Refine(refine) => {
            writeln!(writer, "expanded coordinates: {}", refine.expanded)?;
            writeln!(writer, "kept edges: {}", refine.kept_edges)?;
        }
        ExecutionSummary::Recoord(recoord) => {
            writeln!(writer, "coordinates: {}", recoord.coordinates)?;
            writeln!(writer, "edges: {}", recoord.edges)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::{self, File};
    use std::io::Write as _;

    use rstest::rstest;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = dir.path().join(name);
        let mut file = File::create(&path)?;
        file.write_all(contents.as_bytes())?;
        Ok(path)
    }

    fn temp_dir() -> TempDir {
        match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("failed to create temp dir: {err}"),
        }
    }

    #[rstest]
    #[case("graph", "sim", "graph.sim")]
    #[case("data/level.0", "full", "data/level.0.full")]
    fn with_suffix_appends_after_the_root(
        #[case] root: &str,
        #[case] suffix: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(with_suffix(Path::new(root), suffix), PathBuf::from(expected));
    }

    #[test]
    fn truncate_writes_catalog_full_and_truncated_streams() -> TestResult {
        let dir = temp_dir();
        write_file(&dir, "g.sim", "a\tb\t2.0\nb\tc\t1.0\na\tc\t-1.0\n")?;
        let root = dir.path().join("g");
        let cli = Cli {
            command: Command::Truncate(TruncateArgs {
                root: root.clone(),
                top_links: NonZeroUsize::new(10).ok_or("nonzero")?,
                passes: NonZeroUsize::MIN,
                normalize: false,
                coords: false,
            }),
        };
        let summary = run_cli(cli)?;
        assert_eq!(
            summary,
            ExecutionSummary::Truncate(TruncateSummary {
                nodes: 3,
                lines: 3,
                truncated_edges: 4,
            })
        );

        let catalog = fs::read_to_string(with_suffix(&root, "ind"))?;
        assert_eq!(catalog, "a\t0\nb\t1\nc\t2\n");
        // The negative-weight line is dropped from the full stream.
        let full = fs::read_to_string(with_suffix(&root, "full"))?;
        assert_eq!(full, "0\t1\t2\n1\t2\t1\n");
        Ok(())
    }

    #[test]
    fn cluster_produces_an_assignment_stream() -> TestResult {
        let dir = temp_dir();
        let root = dir.path().join("g");
        // Two tight pairs far apart; explicit threshold keeps them apart.
        write_file(
            &dir,
            "g.icoord",
            "0\t0.0\t0.0\n1\t1.0\t0.0\n2\t40.0\t0.0\n3\t41.0\t0.0\n",
        )?;
        write_file(&dir, "g.iedges", "0\t1\t1.0\n2\t3\t1.0\n")?;
        write_file(&dir, "g.full", "0\t1\t1.0\n2\t3\t1.0\n0\t2\t0.5\n")?;
        let cli = Cli {
            command: Command::Cluster(ClusterArgs {
                root: root.clone(),
                threshold: 2.0,
                short_links: NonZeroUsize::MIN,
                neighborhood: NonZeroUsize::new(10).ok_or("nonzero")?,
                diagnostics: false,
            }),
        };
        let summary = run_cli(cli)?;
        let ExecutionSummary::Cluster(cluster) = summary else {
            panic!("unexpected summary: {summary:?}");
        };
        assert_eq!(cluster.nodes, 4);
        assert_eq!(cluster.clusters, 2);
        assert_eq!(cluster.threshold, 2.0);

        let assignments = fs::read_to_string(with_suffix(&root, "clust"))?;
        assert_eq!(assignments, "0\t1\t1\n1\t1\t1\n2\t2\t1\n3\t2\t1\n");
        Ok(())
    }

    #[test]
    fn cluster_rejects_negative_thresholds() {
        let cli = Cli {
            command: Command::Cluster(ClusterArgs {
                root: PathBuf::from("missing"),
                threshold: -1.0,
                short_links: NonZeroUsize::MIN,
                neighborhood: NonZeroUsize::MIN,
                diagnostics: false,
            }),
        };
        let err = match run_cli(cli) {
            Ok(summary) => panic!("negative threshold must fail, got {summary:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, CliError::InvalidThreshold { .. }));
    }

    #[test]
    fn refine_rejects_non_positive_scales() {
        let cli = Cli {
            command: Command::Refine(RefineArgs {
                fine_root: PathBuf::from("missing"),
                coarse_root: PathBuf::from("missing"),
                scale: Some(0.0),
                filter_edges: false,
            }),
        };
        let err = match run_cli(cli) {
            Ok(summary) => panic!("zero scale must fail, got {summary:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, CliError::InvalidScale { .. }));
    }

    #[test]
    fn recoord_restores_external_identifiers() -> TestResult {
        let dir = temp_dir();
        let root = dir.path().join("g");
        write_file(&dir, "g.ind", "alpha\t0\nbeta\t1\n")?;
        write_file(&dir, "g.icoord", "0\t1.5\t2.5\n1\t-1.0\t0.0\n")?;
        write_file(&dir, "g.iedges", "0\t1\t0.75\n")?;
        let cli = Cli {
            command: Command::Recoord(RecoordArgs {
                root: root.clone(),
                edges: true,
            }),
        };
        let summary = run_cli(cli)?;
        assert_eq!(
            summary,
            ExecutionSummary::Recoord(RecoordSummary {
                coordinates: 2,
                edges: 1,
            })
        );
        let coords = fs::read_to_string(with_suffix(&root, "coord"))?;
        assert_eq!(coords, "alpha\t1.5\t2.5\nbeta\t-1\t0\n");
        let edges = fs::read_to_string(with_suffix(&root, "edges"))?;
        assert_eq!(edges, "alpha\tbeta\t0.75\n");
        Ok(())
    }

    #[test]
    fn missing_inputs_surface_pipeline_errors() {
        let cli = Cli {
            command: Command::Truncate(TruncateArgs {
                root: PathBuf::from("definitely/missing/root"),
                top_links: NonZeroUsize::MIN,
                passes: NonZeroUsize::MIN,
                normalize: false,
                coords: false,
            }),
        };
        let err = match run_cli(cli) {
            Ok(summary) => panic!("missing input must fail, got {summary:?}"),
            Err(err) => err,
        };
        assert!(matches!(err, CliError::Pipeline(_)));
    }

    #[test]
    fn clap_rejects_zero_counts() {
        let args = ["strata", "truncate", "g", "--top-links", "0"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn render_summary_reports_counts() -> TestResult {
        let summary = ExecutionSummary::Coarsen(CoarsenSummary {
            clusters: 4,
            coarse_edges: 3,
            truncated_edges: 6,
        });
        let mut buffer = Vec::new();
        render_summary(&summary, &mut buffer)?;
        let text = String::from_utf8(buffer)?;
        assert!(text.contains("clusters: 4"));
        assert!(text.contains("coarse edges: 3"));
        assert!(text.contains("truncated edges: 6"));
        Ok(())
    }
}
