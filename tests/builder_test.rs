//! Tests for TreeBuilder against in-memory and scripted object sources

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use sensortree::application::{BuildError, BuildOptions, TreeBuilder};
use sensortree::domain::{diff, NodeKey, ObjectId, ObjectKind, ObjectRecord, ROOT_ID};
use sensortree::infrastructure::{ObjectSource, StaticSource, TransportError, TransportResult};
use sensortree::util::testing::{init_test_setup, record, sample_records};

fn builder(source: Arc<StaticSource>, concurrency_limit: usize) -> TreeBuilder {
    TreeBuilder::new(source).with_options(BuildOptions {
        concurrency_limit,
        include_channels: false,
    })
}

fn ids(tree: &sensortree::Tree) -> Vec<String> {
    tree.walk().map(|n| n.key().to_string()).collect()
}

/// Probe 1 > group 10 > devices 100, 101, 102, one sensor each.
fn three_device_records() -> Vec<ObjectRecord> {
    vec![
        record(1, ObjectKind::Probe, 0, "Probe"),
        record(10, ObjectKind::Group, 1, "Servers"),
        record(100, ObjectKind::Device, 10, "web01"),
        record(101, ObjectKind::Device, 10, "web02"),
        record(102, ObjectKind::Device, 10, "web03"),
        record(1000, ObjectKind::Sensor, 100, "Ping"),
        record(1010, ObjectKind::Sensor, 101, "Ping"),
        record(1020, ObjectKind::Sensor, 102, "Ping"),
    ]
}

// ============================================================
// Successful builds
// ============================================================

#[tokio::test]
async fn given_probe_with_two_groups_when_building_then_resolves_whole_subtree() {
    init_test_setup();
    let source = Arc::new(StaticSource::new(sample_records()));

    let tree = builder(source, 4).build(ObjectId(1001)).await.unwrap();

    // The probe plus its six descendants
    assert_eq!(tree.len(), 7);
    let root = tree.root();
    assert_eq!(root.id(), ObjectId(1001));
    let groups: Vec<_> = tree.children(root).map(|n| n.name()).collect();
    assert_eq!(groups, vec!["Servers", "Network"]);
    for id in [2001, 2002, 3001, 3002, 4001, 4002] {
        let node = tree.find_by_id(ObjectId(id)).expect("descendant indexed");
        assert_eq!(node.id(), ObjectId(id));
    }
    // Channels are not resolved unless asked for
    assert!(!tree.contains(&NodeKey::Channel {
        sensor: ObjectId(4001),
        channel: ObjectId(0),
    }));
}

#[tokio::test]
async fn given_probe_when_building_then_issues_one_fetch_per_parent_and_kind() {
    let source = Arc::new(StaticSource::new(sample_records()));

    let tree = builder(source.clone(), 4).build(ObjectId(1001)).await.unwrap();

    // probe: groups + devices, each group: groups + devices, each device: sensors
    assert_eq!(source.fetch_count(), 8);
    assert_eq!(tree.fetch_count(), 8);
    for (kind, parent) in [
        (ObjectKind::Group, 1001),
        (ObjectKind::Device, 1001),
        (ObjectKind::Group, 2001),
        (ObjectKind::Device, 2002),
        (ObjectKind::Sensor, 3001),
        (ObjectKind::Sensor, 3002),
    ] {
        assert_eq!(source.fetches_for(kind, ObjectId(parent)), 1);
    }
    assert_eq!(source.fetches_for(ObjectKind::Channel, ObjectId(4001)), 0);
}

#[tokio::test]
async fn given_include_channels_when_building_then_channels_hang_below_sensors() {
    let source = Arc::new(StaticSource::new(sample_records()));
    let builder = TreeBuilder::new(source.clone()).with_options(BuildOptions {
        include_channels: true,
        ..BuildOptions::default()
    });

    let tree = builder.build(ObjectId(1001)).await.unwrap();

    assert_eq!(tree.len(), 8);
    let channel = tree
        .find(&NodeKey::Channel {
            sensor: ObjectId(4001),
            channel: ObjectId(0),
        })
        .expect("channel indexed by sensor");
    assert_eq!(tree.parent(channel).map(|n| n.id()), Some(ObjectId(4001)));
    assert_eq!(source.fetch_count(), 10);
}

#[tokio::test]
async fn given_root_group_when_building_then_only_probes_are_fetched_below_it() {
    let mut records = sample_records();
    // A group wrongly reporting the root as parent must not be picked up
    records.push(record(2999, ObjectKind::Group, 0, "Stray"));
    let source = Arc::new(StaticSource::new(records));

    let tree = builder(source.clone(), 4).build(ROOT_ID).await.unwrap();

    assert!(tree.root().record().is_root());
    assert_eq!(tree.len(), 8);
    assert!(tree.find_by_id(ObjectId(2999)).is_none());
    assert_eq!(source.fetches_for(ObjectKind::Group, ROOT_ID), 0);
    assert_eq!(source.fetches_for(ObjectKind::Probe, ROOT_ID), 1);
}

#[tokio::test]
async fn given_sensor_as_root_when_building_then_tree_is_single_node() {
    let source = Arc::new(StaticSource::new(sample_records()));

    let tree = builder(source.clone(), 4).build(ObjectId(4001)).await.unwrap();

    assert_eq!(tree.len(), 1);
    assert!(tree.root().is_leaf());
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn given_static_data_when_building_twice_then_trees_do_not_differ() {
    let source = Arc::new(StaticSource::new(sample_records()));
    let builder = builder(source, 4);

    let first = builder.build(ObjectId(1001)).await.unwrap();
    let second = builder.build(ObjectId(1001)).await.unwrap();

    assert!(diff(&first, &second).is_empty());
    assert_eq!(ids(&first), ids(&second));
}

#[rstest]
#[case(2)]
#[case(4)]
#[case(16)]
#[tokio::test]
async fn given_reordering_latency_when_building_with_any_limit_then_trees_match(
    #[case] limit: usize,
) {
    // Servers answers slowly so Network finishes first under parallel fetching
    let source = || {
        Arc::new(
            StaticSource::new(sample_records())
                .with_latency(ObjectId(2001), Duration::from_millis(30))
                .with_latency(ObjectId(3001), Duration::from_millis(10)),
        )
    };

    let serial = builder(source(), 1).build(ObjectId(1001)).await.unwrap();
    let parallel = builder(source(), limit).build(ObjectId(1001)).await.unwrap();

    assert_eq!(ids(&serial), ids(&parallel));
    assert!(diff(&serial, &parallel).is_empty());
}

// ============================================================
// Concurrency limit
// ============================================================

/// Delegates to a static source and records the peak number of fetches in flight.
struct TrackingSource {
    inner: StaticSource,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl TrackingSource {
    fn new(records: Vec<ObjectRecord>) -> Self {
        Self {
            inner: StaticSource::new(records),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectSource for TrackingSource {
    async fn fetch(&self, kind: ObjectKind, parent: ObjectId) -> TransportResult<Vec<ObjectRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = self.inner.fetch(kind, parent).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn resolve(&self, id: ObjectId) -> TransportResult<Option<ObjectRecord>> {
        self.inner.resolve(id).await
    }
}

fn wide_records() -> Vec<ObjectRecord> {
    let mut records = vec![record(1, ObjectKind::Probe, 0, "Probe")];
    for group in 10..18 {
        records.push(record(group, ObjectKind::Group, 1, "Group"));
        records.push(record(group * 10, ObjectKind::Device, group, "Device"));
    }
    records
}

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_limit_when_building_wide_tree_then_in_flight_fetches_stay_within_it(
    #[case] limit: usize,
) {
    let source = Arc::new(TrackingSource::new(wide_records()));
    let builder = TreeBuilder::new(source.clone()).with_options(BuildOptions {
        concurrency_limit: limit,
        include_channels: false,
    });

    let tree = builder.build(ObjectId(1)).await.unwrap();

    assert_eq!(tree.len(), 17);
    let peak = source.peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= limit, "peak {} exceeds limit {}", peak, limit);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn given_unknown_root_when_building_then_fails_with_resolution_error() {
    let source = Arc::new(StaticSource::new(sample_records()));

    let result = builder(source, 4).build(ObjectId(9999)).await;

    assert!(matches!(result, Err(BuildError::Resolution(ObjectId(9999)))));
}

#[tokio::test]
async fn given_failing_root_lookup_when_building_then_returns_transport_error() {
    let source = Arc::new(StaticSource::new(sample_records()));
    source.fail_resolve(TransportError::Unauthorized {
        message: "bad passhash".into(),
    });

    let result = builder(source, 4).build(ObjectId(1001)).await;

    assert!(matches!(
        result,
        Err(BuildError::Transport(TransportError::Unauthorized { .. }))
    ));
}

#[tokio::test]
async fn given_third_device_failing_when_building_then_partial_holds_resolved_siblings() {
    init_test_setup();
    let source = Arc::new(StaticSource::new(three_device_records()));
    source.fail_on(
        ObjectKind::Sensor,
        ObjectId(102),
        TransportError::remote(500, "internal error"),
    );

    let result = builder(source, 1).build(ObjectId(1)).await;

    let err = result.expect_err("build must not succeed");
    let partial = err.partial().expect("partial build error");
    assert_eq!(partial.parent, ObjectId(102));
    assert_eq!(partial.kind, ObjectKind::Sensor);
    assert_eq!(partial.source, TransportError::remote(500, "internal error"));
    let resolved: Vec<_> = partial.resolved.iter().map(|o| o.key()).collect();
    assert_eq!(
        resolved,
        vec![NodeKey::Object(ObjectId(100)), NodeKey::Object(ObjectId(101))]
    );
    // Resolved siblings are complete subtrees
    assert!(partial.resolved.iter().all(|o| o.node_count() == 2));
}

#[tokio::test]
async fn given_failure_when_building_then_no_further_fetches_are_started() {
    let source = Arc::new(StaticSource::new(sample_records()));
    source.fail_on(
        ObjectKind::Group,
        ObjectId(1001),
        TransportError::network("connection reset"),
    );

    let result = builder(source.clone(), 1).build(ObjectId(1001)).await;

    let err = result.unwrap_err();
    assert!(matches!(err, BuildError::PartialBuild(_)));
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn given_cancelled_token_when_building_then_returns_cancelled_without_fetching() {
    let source = Arc::new(StaticSource::new(sample_records()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = builder(source.clone(), 4)
        .build_cancellable(ObjectId(1001), cancel)
        .await;

    assert!(matches!(result, Err(BuildError::Cancelled)));
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn given_cancellation_during_slow_fetch_when_building_then_returns_cancelled() {
    let source = Arc::new(
        StaticSource::new(sample_records()).with_latency(ObjectId(1001), Duration::from_secs(5)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        builder(source, 4).build_cancellable(ObjectId(1001), cancel),
    )
    .await
    .expect("cancellation must interrupt the pending fetch");

    assert!(matches!(result, Err(BuildError::Cancelled)));
}

#[tokio::test]
async fn given_cancellation_after_some_branches_resolved_when_building_then_discards_them() {
    // Servers resolves at once, Network hangs on its first fetch
    let source = Arc::new(
        StaticSource::new(sample_records()).with_latency(ObjectId(2002), Duration::from_secs(5)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        builder(source.clone(), 4).build_cancellable(ObjectId(1001), cancel),
    )
    .await
    .expect("cancellation must interrupt the pending fetch");

    let err = result.unwrap_err();
    assert!(matches!(err, BuildError::Cancelled));
    assert!(err.partial().is_none());
    // The Servers branch had completed before the token fired
    assert_eq!(source.fetches_for(ObjectKind::Sensor, ObjectId(3001)), 1);
}

/// Probe 1 > groups 10, 20. Group 10 holds device 100 (fast) and device 101
/// (slow sensor fetch), group 20 holds device 200 whose sensor fetch fails.
fn racing_branches() -> StaticSource {
    let source = StaticSource::new(vec![
        record(1, ObjectKind::Probe, 0, "Probe"),
        record(10, ObjectKind::Group, 1, "A"),
        record(20, ObjectKind::Group, 1, "B"),
        record(100, ObjectKind::Device, 10, "fast"),
        record(101, ObjectKind::Device, 10, "slow"),
        record(200, ObjectKind::Device, 20, "failing"),
        record(1000, ObjectKind::Sensor, 100, "Ping"),
        record(1010, ObjectKind::Sensor, 101, "Ping"),
        record(2000, ObjectKind::Sensor, 200, "Ping"),
    ])
    .with_latency(ObjectId(101), Duration::from_millis(500))
    .with_latency(ObjectId(200), Duration::from_millis(20));
    source.fail_on(
        ObjectKind::Sensor,
        ObjectId(200),
        TransportError::network("connection reset"),
    );
    source
}

#[tokio::test]
async fn given_parallel_branches_when_one_fails_then_partial_keeps_subtrees_resolved_elsewhere() {
    init_test_setup();
    let source = Arc::new(racing_branches());

    let result = builder(source, 8).build(ObjectId(1)).await;

    let err = result.expect_err("build must not succeed");
    let partial = err.partial().expect("partial build error");
    assert_eq!(partial.parent, ObjectId(200));
    let resolved: Vec<_> = partial.resolved.iter().map(|o| o.key()).collect();
    assert_eq!(resolved, vec![NodeKey::Object(ObjectId(100))]);
    assert_eq!(partial.resolved[0].node_count(), 2);
}

// ============================================================
// Malformed and changing remote data
// ============================================================

/// Answers every group query below probe 1 with a scripted list.
struct ScriptedSource {
    groups: Vec<ObjectRecord>,
}

#[async_trait]
impl ObjectSource for ScriptedSource {
    async fn fetch(&self, kind: ObjectKind, parent: ObjectId) -> TransportResult<Vec<ObjectRecord>> {
        match (kind, parent) {
            (ObjectKind::Group, ObjectId(1)) => Ok(self.groups.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn resolve(&self, id: ObjectId) -> TransportResult<Option<ObjectRecord>> {
        Ok((id == ObjectId(1)).then(|| record(1, ObjectKind::Probe, 0, "Probe")))
    }
}

#[tokio::test]
async fn given_malformed_records_when_building_then_they_are_dropped() {
    let source = Arc::new(ScriptedSource {
        groups: vec![
            record(10, ObjectKind::Group, 1, "ok"),
            record(11, ObjectKind::Group, 99, "wrong parent"),
            record(12, ObjectKind::Device, 1, "wrong kind"),
            record(10, ObjectKind::Group, 1, "duplicate"),
            record(1, ObjectKind::Group, 1, "self reference"),
        ],
    });

    let tree = TreeBuilder::new(source).build(ObjectId(1)).await.unwrap();

    assert_eq!(tree.len(), 2);
    let children: Vec<_> = tree.children(tree.root()).map(|n| n.name()).collect();
    assert_eq!(children, vec!["ok"]);
}

#[tokio::test]
async fn given_object_deleted_remotely_when_building_then_its_children_are_empty() {
    let source = Arc::new(StaticSource::new(sample_records()));
    let builder = builder(source.clone(), 4);
    let before = builder.build(ObjectId(1001)).await.unwrap();

    // Sensors of web01 vanish; the device itself is still listed
    source.remove_record(ObjectId(4001));
    let after = builder.build(ObjectId(1001)).await.unwrap();

    let device = after.find_by_id(ObjectId(3001)).unwrap();
    assert!(device.is_leaf());
    assert_eq!(before.len() - 1, after.len());
}
