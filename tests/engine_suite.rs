use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use graphview_layout::cache::{LayoutCache, SqliteStore};
use graphview_layout::config::{CacheConfig, Config, LayoutConfig};
use graphview_layout::coordinator::{Diagnostic, LayoutCoordinator, SnapshotOutcome};
use graphview_layout::fingerprint::fingerprint;
use graphview_layout::hierarchy::{Entry, Hierarchy, load_hierarchy};
use graphview_layout::ir::{Link, LinkKind, NodeKind, Position, PositionMap, Snapshot};
use graphview_layout::layout::{LayoutContext, LayoutRequest, compute_layout, layout_snapshot};
use graphview_layout::projector::{ViewMode, aggregate_id, full_expansion, project};
use graphview_layout::worker::{LayoutJob, LayoutWorkerPool};

const WAIT: Duration = Duration::from_secs(10);

fn two_leaf_root() -> Hierarchy {
    Hierarchy::new(Entry::directory(
        "root",
        vec![Entry::file("a"), Entry::file("b")],
    ))
}

fn fixture() -> Hierarchy {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("workspace.json");
    load_hierarchy(&path).expect("fixture load failed")
}

fn expanded(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn coordinator_with(cache: Arc<LayoutCache>) -> LayoutCoordinator {
    let config = LayoutConfig::default();
    let workers = LayoutWorkerPool::spawn(2, config.clone()).expect("worker spawn failed");
    LayoutCoordinator::with_parts(config, cache, workers)
}

fn assert_no_overlap(positions: &PositionMap) {
    let mut seen: Vec<(&String, &Position)> = Vec::new();
    for (id, position) in positions {
        for (other, placed) in &seen {
            assert_ne!(position, *placed, "{id} overlaps {other}");
        }
        seen.push((id, position));
    }
}

#[test]
fn expanded_root_is_laid_out_as_a_tree() {
    let snapshot = project(&two_leaf_root(), &expanded(&["root"]), ViewMode::Hierarchy);
    let mut ids: Vec<&str> = snapshot.nodes.iter().map(|node| node.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b", "root"]);
    let mut links: Vec<(&str, &str, LinkKind)> = snapshot
        .links
        .iter()
        .map(|link| (link.source.as_str(), link.target.as_str(), link.kind))
        .collect();
    links.sort_unstable();
    assert_eq!(
        links,
        vec![
            ("root", "a", LinkKind::Structural),
            ("root", "b", LinkKind::Structural)
        ]
    );

    let positions = layout_snapshot(&snapshot, &PositionMap::new(), &LayoutConfig::default());
    assert!(positions["root"].x < positions["a"].x);
    assert_eq!(positions["a"].x, positions["b"].x);
    assert_ne!(positions["a"].y, positions["b"].y);
}

#[test]
fn collapsing_the_root_yields_an_aggregate() {
    let hierarchy = two_leaf_root();
    let open = project(&hierarchy, &expanded(&["root"]), ViewMode::Hierarchy);
    let collapsed = project(&hierarchy, &HashSet::new(), ViewMode::Hierarchy);

    assert_eq!(collapsed.nodes.len(), 2);
    let aggregate = collapsed
        .node(&aggregate_id("root"))
        .expect("aggregate node missing");
    assert_eq!(aggregate.kind.hidden_count(), 2);
    assert_eq!(aggregate.kind.aggregate_target(), Some("root"));
    assert_eq!(
        collapsed.links,
        vec![Link::structural("root", aggregate_id("root"))]
    );
    assert_ne!(fingerprint(&open), fingerprint(&collapsed));
}

#[test]
fn re_expanding_reuses_the_cached_layout() {
    let hierarchy = two_leaf_root();
    let mut coordinator = coordinator_with(Arc::new(LayoutCache::in_memory(8)));

    let open = project(&hierarchy, &expanded(&["root"]), ViewMode::Hierarchy);
    let open_key = fingerprint(&open);
    coordinator.set_snapshot(open);
    assert!(coordinator.settle(WAIT));
    let first = coordinator.positions().clone();

    coordinator.set_snapshot(project(&hierarchy, &HashSet::new(), ViewMode::Hierarchy));
    assert!(coordinator.settle(WAIT));
    let dispatched = coordinator.stats().dispatched;

    let reopened = project(&hierarchy, &expanded(&["root"]), ViewMode::Hierarchy);
    assert_eq!(fingerprint(&reopened), open_key);
    assert_eq!(coordinator.set_snapshot(reopened), SnapshotOutcome::CacheHit);
    assert_eq!(coordinator.stats().dispatched, dispatched);
    assert_eq!(coordinator.positions(), &first);
    assert_eq!(coordinator.cache().get(open_key), Some(first));
}

#[test]
fn isolated_node_is_packed_beside_the_tree() {
    let mut snapshot = project(&two_leaf_root(), &expanded(&["root"]), ViewMode::Hierarchy);
    snapshot.push_node("stray", NodeKind::Leaf, 0);
    let positions = layout_snapshot(&snapshot, &PositionMap::new(), &LayoutConfig::default());
    assert!(positions["stray"].is_finite());
    assert_no_overlap(&positions);
}

#[test]
fn fingerprint_ignores_ordering() {
    let hierarchy = fixture();
    let snapshot = project(&hierarchy, &full_expansion(&hierarchy), ViewMode::Dependencies);
    let mut shuffled = snapshot.clone();
    shuffled.nodes.reverse();
    shuffled.links.rotate_left(1);
    assert_eq!(fingerprint(&snapshot), fingerprint(&shuffled));
    assert_eq!(fingerprint(&snapshot).to_key().len(), 8);
}

#[test]
fn fixture_layout_is_complete_in_every_mode() {
    let hierarchy = fixture();
    let expansion = full_expansion(&hierarchy);
    for mode in [
        ViewMode::Hierarchy,
        ViewMode::Dependencies,
        ViewMode::Calls,
        ViewMode::References,
    ] {
        let snapshot = project(&hierarchy, &expansion, mode);
        let positions = layout_snapshot(&snapshot, &PositionMap::new(), &LayoutConfig::default());
        assert_eq!(positions.len(), snapshot.nodes.len(), "{mode:?}");
        assert!(positions.values().all(|p| p.is_finite()), "{mode:?}");
        assert_no_overlap(&positions);
    }
}

#[test]
fn unfetched_directory_reports_its_known_size() {
    let hierarchy = fixture();
    let snapshot = project(&hierarchy, &full_expansion(&hierarchy), ViewMode::Hierarchy);
    let vendor = snapshot
        .node(&aggregate_id("app/vendor"))
        .expect("vendor aggregate missing");
    assert_eq!(vendor.kind.hidden_count(), 220);
}

#[test]
fn reference_links_follow_collapsed_containers() {
    let hierarchy = fixture();
    let snapshot = project(&hierarchy, &expanded(&["app", "app/core"]), ViewMode::Dependencies);
    assert!(snapshot.links.contains(&Link::new(
        "app/core/engine.rs",
        "app/util",
        LinkKind::Import
    )));
    assert!(snapshot.links.contains(&Link::new(
        "app/main.rs",
        "app/core/engine.rs",
        LinkKind::Import
    )));
}

#[test]
fn late_response_for_superseded_snapshot_is_ignored() {
    // The first request is slowed down so it finishes after the second.
    let job: LayoutJob = Arc::new(|ctx: &mut LayoutContext, request: &LayoutRequest| {
        if request.request_id == 1 {
            std::thread::sleep(Duration::from_millis(200));
        }
        compute_layout(ctx, &request.snapshot, &request.seeds, &LayoutConfig::default())
    });
    let workers = LayoutWorkerPool::spawn_with(2, job).expect("worker spawn failed");
    let mut coordinator = LayoutCoordinator::with_parts(
        LayoutConfig::default(),
        Arc::new(LayoutCache::in_memory(8)),
        workers,
    );

    let hierarchy = fixture();
    let small = project(&hierarchy, &expanded(&["app"]), ViewMode::Hierarchy);
    let large = project(&hierarchy, &full_expansion(&hierarchy), ViewMode::Hierarchy);
    coordinator.set_snapshot(small);
    coordinator.set_snapshot(large.clone());
    assert!(coordinator.settle(WAIT));

    // Give the slow response time to arrive, then drain it.
    std::thread::sleep(Duration::from_millis(300));
    coordinator.pump();
    let ids: HashSet<&str> = large.nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(coordinator.positions().len(), ids.len());
    assert!(coordinator.positions().keys().all(|id| ids.contains(id.as_str())));
    assert_eq!(coordinator.fingerprint(), Some(fingerprint(&large)));
    assert_eq!(coordinator.stats().applied, 1);
    assert_eq!(coordinator.stats().stale, 1);
}

#[test]
fn no_op_projection_keeps_positions() {
    let hierarchy = fixture();
    let expansion = expanded(&["app", "app/core"]);
    let mut coordinator = coordinator_with(Arc::new(LayoutCache::in_memory(8)));
    coordinator.set_snapshot(project(&hierarchy, &expansion, ViewMode::Hierarchy));
    assert!(coordinator.settle(WAIT));
    let before = coordinator.positions().clone();
    let requests = coordinator.latest_request_id();

    let outcome = coordinator.set_snapshot(project(&hierarchy, &expansion, ViewMode::Hierarchy));
    assert_eq!(outcome, SnapshotOutcome::Unchanged);
    assert_eq!(coordinator.latest_request_id(), requests);
    assert_eq!(coordinator.positions(), &before);
}

#[test]
fn durable_cache_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let config = Config {
        cache: CacheConfig {
            memory_capacity: 4,
            durable_path: Some(dir.path().join("layouts.db")),
        },
        ..Config::default()
    };
    let hierarchy = fixture();
    let snapshot = project(&hierarchy, &full_expansion(&hierarchy), ViewMode::Calls);
    let key = fingerprint(&snapshot);

    let first = {
        let mut coordinator = LayoutCoordinator::new(&config);
        coordinator.set_snapshot(snapshot.clone());
        assert!(coordinator.settle(WAIT));
        coordinator.positions().clone()
    };

    let mut coordinator = LayoutCoordinator::new(&config);
    assert!(matches!(
        coordinator.set_snapshot(snapshot),
        SnapshotOutcome::AwaitingCache { .. }
    ));
    assert!(coordinator.settle(WAIT));
    assert_eq!(coordinator.positions(), &first);
    assert_eq!(coordinator.stats().dispatched, 0);
    assert_eq!(coordinator.cache().stats().durable_hits, 1);
    assert_eq!(coordinator.cache().get(key), Some(first));
}

#[test]
fn coordinators_share_one_cache() {
    let store = SqliteStore::open_in_memory().expect("sqlite open failed");
    let cache = Arc::new(LayoutCache::with_store(4, store).expect("cache open failed"));
    let snapshot = project(&two_leaf_root(), &expanded(&["root"]), ViewMode::Hierarchy);

    let mut left = coordinator_with(Arc::clone(&cache));
    left.set_snapshot(snapshot.clone());
    assert!(left.settle(WAIT));

    let mut right = coordinator_with(cache);
    assert_eq!(right.set_snapshot(snapshot), SnapshotOutcome::CacheHit);
    assert_eq!(right.positions(), left.positions());
}

#[test]
fn first_dispatch_without_workers_still_places_everything() {
    let config = Config {
        worker: graphview_layout::config::WorkerConfig { count: 0 },
        ..Config::default()
    };
    let mut coordinator = LayoutCoordinator::new(&config);
    let diagnostics = coordinator.diagnostics();
    let mut snapshot = Snapshot::new();
    snapshot.push_node("solo", NodeKind::Leaf, 0);
    assert_eq!(coordinator.set_snapshot(snapshot), SnapshotOutcome::Degraded);
    assert!(coordinator.get_position("solo").is_some_and(|p| p.is_finite()));
    assert!(diagnostics.try_iter().count() >= 1);
}

#[test]
fn unopenable_cache_degrades_to_memory() {
    let blocker = tempfile::NamedTempFile::new().expect("tempfile failed");
    let config = Config {
        cache: CacheConfig {
            memory_capacity: 4,
            durable_path: Some(blocker.path().join("layouts.db")),
        },
        ..Config::default()
    };
    let mut coordinator = LayoutCoordinator::new(&config);
    let diagnostics = coordinator.diagnostics();
    assert!(
        diagnostics
            .try_iter()
            .any(|d| matches!(d, Diagnostic::CacheUnavailable { .. }))
    );

    let snapshot = project(&two_leaf_root(), &expanded(&["root"]), ViewMode::Hierarchy);
    let key = fingerprint(&snapshot);
    assert!(matches!(
        coordinator.set_snapshot(snapshot),
        SnapshotOutcome::Dispatched { .. }
    ));
    assert!(coordinator.settle(WAIT));
    assert_eq!(coordinator.positions().len(), 3);
    assert_eq!(coordinator.cache().get(key).as_ref(), Some(coordinator.positions()));
}

#[test]
fn corrupt_cache_row_falls_through_to_worker() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("layouts.db");
    let hierarchy = fixture();
    let snapshot = project(&hierarchy, &full_expansion(&hierarchy), ViewMode::Hierarchy);
    let key = fingerprint(&snapshot);

    drop(SqliteStore::open(&path).expect("sqlite open failed"));
    let conn = rusqlite::Connection::open(&path).expect("sqlite reopen failed");
    conn.execute(
        "INSERT INTO layout_cache(fingerprint, positions, written_at_ms) VALUES (?1, ?2, 0)",
        rusqlite::params![key.to_key(), "{\"root\": [1, 2"],
    )
    .expect("corrupt row insert failed");
    drop(conn);

    let config = Config {
        cache: CacheConfig {
            memory_capacity: 4,
            durable_path: Some(path),
        },
        ..Config::default()
    };
    let mut coordinator = LayoutCoordinator::new(&config);
    assert!(matches!(
        coordinator.set_snapshot(snapshot.clone()),
        SnapshotOutcome::AwaitingCache { .. }
    ));
    assert!(coordinator.settle(WAIT));
    assert_eq!(coordinator.stats().dispatched, 1);
    assert_eq!(coordinator.stats().cache_hits, 0);
    assert_eq!(coordinator.positions().len(), snapshot.nodes.len());
    assert!(coordinator.positions().values().all(|p| p.is_finite()));
}
