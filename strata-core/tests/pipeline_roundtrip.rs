//! End-to-end runs of the file-level pipeline: truncate a raw stream,
//! cluster a fabricated layout, coarsen the clustering, refine the coarse
//! layout back down, and restore external identifiers.

mod common;

use std::fs;
use std::num::NonZeroUsize;

use strata_core::pipeline::{
    ClusterConfig, ClusterPaths, CoarsenPaths, RecoordPaths, RefinePaths, TruncateConfig,
    TruncatePaths, cluster, coarsen, recoord, refine, truncate,
};
use strata_core::CoarsenConfig;

use common::{temp_dir, write_file};

#[test]
fn a_full_level_round_trips() {
    let dir = temp_dir();
    let root = |suffix: &str| dir.path().join(format!("g.{suffix}"));
    let coarse_root = |suffix: &str| dir.path().join(format!("c.{suffix}"));

    // Two tight pairs bridged by a weak link; one negative-weight line
    // that ingestion must drop.
    write_file(
        &dir,
        "g.sim",
        "n0\tn1\t10.0\nn2\tn3\t10.0\nn1\tn2\t1.0\nn0\tn2\t-5.0\n",
    )
    .expect("write raw stream");

    let truncate_summary = truncate(
        &TruncatePaths {
            raw_similarity: root("sim"),
            catalog: root("ind"),
            full: root("full"),
            truncated: root("int"),
            coordinates: None,
        },
        &TruncateConfig::default(),
    )
    .expect("truncate");
    assert_eq!(truncate_summary.nodes, 4);
    assert_eq!(truncate_summary.lines, 4);
    assert_eq!(truncate_summary.truncated_edges, 6);

    let catalog = fs::read_to_string(root("ind")).expect("read catalog");
    assert_eq!(catalog, "n0\t0\nn1\t1\nn2\t2\nn3\t3\n");
    let full = fs::read_to_string(root("full")).expect("read full");
    assert_eq!(full, "0\t1\t10\n2\t3\t10\n1\t2\t1\n");

    // Fabricate the external layout: pairs sit far apart.
    write_file(
        &dir,
        "g.icoord",
        "0\t0.0\t0.0\n1\t1.0\t0.0\n2\t41.0\t0.0\n3\t42.0\t0.0\n",
    )
    .expect("write layout");

    let cluster_summary = cluster(
        &ClusterPaths {
            coordinates: root("icoord"),
            edges: root("int"),
            similarity: root("full"),
            assignments: root("clust"),
            sorted_edges: None,
            min_distances: None,
        },
        &ClusterConfig {
            threshold: 2.0,
            ..ClusterConfig::default()
        },
    )
    .expect("cluster");
    assert_eq!(cluster_summary.nodes, 4);
    assert_eq!(cluster_summary.clusters, 2);

    let assignments = fs::read_to_string(root("clust")).expect("read assignments");
    assert_eq!(assignments, "0\t1\t1\n1\t1\t1\n2\t2\t1\n3\t2\t1\n");

    // Coarsen over two passes to exercise the memory-bounded path.
    let coarsen_summary = coarsen(
        &CoarsenPaths {
            assignments: root("clust"),
            similarity: root("full"),
            coarse_full: coarse_root("full"),
            coarse_truncated: coarse_root("int"),
        },
        &CoarsenConfig {
            passes: NonZeroUsize::new(2).expect("nonzero"),
            ..CoarsenConfig::default()
        },
    )
    .expect("coarsen");
    assert_eq!(coarsen_summary.clusters, 2);
    assert_eq!(coarsen_summary.coarse_edges, 1);

    // The only cross-cluster fine weight is the 1.0 bridge; internal
    // pair weights never leak out and no self loop is written.
    let coarse_full = fs::read_to_string(coarse_root("full")).expect("read coarse full");
    assert_eq!(coarse_full, "0\t1\t1\n");
    let coarse_truncated = fs::read_to_string(coarse_root("int")).expect("read coarse int");
    assert_eq!(coarse_truncated, "0\t1\t1\n1\t0\t1\n");

    // Fabricate the coarse layout and project it back down, doubled.
    write_file(&dir, "c.icoord", "0\t0.0\t0.0\n1\t10.0\t5.0\n").expect("write coarse layout");

    let refine_summary = refine(
        &RefinePaths {
            assignments: root("clust"),
            coarse_coordinates: coarse_root("icoord"),
            refined_coordinates: root("real"),
            edge_filter: Some((root("int"), root("refine_int"))),
        },
        Some(20.0),
    )
    .expect("refine");
    assert_eq!(refine_summary.expanded, 4);
    assert_eq!(refine_summary.kept_edges, 6);

    let refined = fs::read_to_string(root("real")).expect("read refined");
    assert_eq!(refined, "0\t0\t0\n1\t0\t0\n2\t20\t10\n3\t20\t10\n");

    // Restore the caller's identifiers on the refined coordinates.
    let recoord_summary = recoord(&RecoordPaths {
        catalog: root("ind"),
        coordinates_in: root("real"),
        coordinates_out: root("coord"),
        edges: None,
    })
    .expect("recoord");
    assert_eq!(recoord_summary.coordinates, 4);

    let restored = fs::read_to_string(root("coord")).expect("read restored");
    assert_eq!(restored, "n0\t0\t0\nn1\t0\t0\nn2\t20\t10\nn3\t20\t10\n");
}

#[test]
fn refinement_expands_a_cluster_onto_every_member() {
    let dir = temp_dir();
    write_file(&dir, "f.clust", "0\t1\t1\n1\t1\t0\n2\t1\t0\n").expect("write assignments");
    write_file(&dir, "c.icoord", "0\t2.0\t-3.0\n").expect("write coarse layout");

    let summary = refine(
        &RefinePaths {
            assignments: dir.path().join("f.clust"),
            coarse_coordinates: dir.path().join("c.icoord"),
            refined_coordinates: dir.path().join("f.real"),
            edge_filter: None,
        },
        None,
    )
    .expect("refine");
    assert_eq!(summary.expanded, 3);

    let refined = fs::read_to_string(dir.path().join("f.real")).expect("read refined");
    assert_eq!(refined, "0\t2\t-3\n1\t2\t-3\n2\t2\t-3\n");
}

#[test]
fn truncation_rejects_streams_with_no_positive_weights() {
    let dir = temp_dir();
    write_file(&dir, "g.sim", "a\tb\t-1.0\nb\tc\t0.0\n").expect("write raw stream");
    let err = truncate(
        &TruncatePaths {
            raw_similarity: dir.path().join("g.sim"),
            catalog: dir.path().join("g.ind"),
            full: dir.path().join("g.full"),
            truncated: dir.path().join("g.int"),
            coordinates: None,
        },
        &TruncateConfig::default(),
    )
    .expect_err("no positive weights must fail");
    assert!(err.to_string().contains("no positive-weight edges"));
}

#[test]
fn clustering_rejects_edges_with_unknown_identifiers() {
    let dir = temp_dir();
    write_file(&dir, "g.icoord", "a\t0.0\t0.0\nb\t1.0\t0.0\n").expect("write layout");
    write_file(&dir, "g.iedges", "a\tz\t1.0\n").expect("write edges");
    write_file(&dir, "g.full", "a\tb\t1.0\n").expect("write similarity");
    let err = cluster(
        &ClusterPaths {
            coordinates: dir.path().join("g.icoord"),
            edges: dir.path().join("g.iedges"),
            similarity: dir.path().join("g.full"),
            assignments: dir.path().join("g.clust"),
            sorted_edges: None,
            min_distances: None,
        },
        &ClusterConfig {
            threshold: 1.0,
            ..ClusterConfig::default()
        },
    )
    .expect_err("unknown identifier must fail");
    assert!(err.to_string().contains("`z`"));
}

#[test]
fn clustering_rejects_duplicate_coordinates() {
    let dir = temp_dir();
    write_file(&dir, "g.icoord", "a\t0.0\t0.0\na\t1.0\t0.0\n").expect("write layout");
    write_file(&dir, "g.iedges", "").expect("write edges");
    write_file(&dir, "g.full", "").expect("write similarity");
    let err = cluster(
        &ClusterPaths {
            coordinates: dir.path().join("g.icoord"),
            edges: dir.path().join("g.iedges"),
            similarity: dir.path().join("g.full"),
            assignments: dir.path().join("g.clust"),
            sorted_edges: None,
            min_distances: None,
        },
        &ClusterConfig {
            threshold: 1.0,
            ..ClusterConfig::default()
        },
    )
    .expect_err("duplicate coordinate must fail");
    assert!(err.to_string().contains("duplicate coordinate"));
}

#[test]
fn coarsening_rejects_non_sequential_clusters() {
    let dir = temp_dir();
    write_file(&dir, "g.clust", "0\t1\t0\n1\t3\t0\n").expect("write assignments");
    write_file(&dir, "g.full", "0\t1\t1.0\n").expect("write similarity");
    let err = coarsen(
        &CoarsenPaths {
            assignments: dir.path().join("g.clust"),
            similarity: dir.path().join("g.full"),
            coarse_full: dir.path().join("c.full"),
            coarse_truncated: dir.path().join("c.int"),
        },
        &CoarsenConfig::default(),
    )
    .expect_err("gap in cluster ids must fail");
    assert!(err.to_string().contains("not sequential"));
}
