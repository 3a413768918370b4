//! Shared test setup: logging and record fixtures

use std::env;
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::{ObjectId, ObjectKind, ObjectRecord};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else if let Err(e) = subscriber.try_init() {
        eprintln!("Error: Failed to set up logging: {}", e);
    }
    debug!(rust_log = ?env::var("RUST_LOG").ok(), "test logging initialized");
}

/// A record with status `up` and no attributes.
pub fn record(id: i64, kind: ObjectKind, parent: i64, name: &str) -> ObjectRecord {
    ObjectRecord::new(id, kind, Some(ObjectId(parent)), name)
}

/// Probe 1001 below the root, with two groups, one device in each group and
/// one sensor on each device, plus a channel on the first sensor.
///
/// ```text
/// 1001 probe Local Probe
/// ├── 2001 group Servers
/// │   └── 3001 device web01
/// │       └── 4001 sensor Ping
/// │           └── 0 channel Total   (4001/0)
/// └── 2002 group Network
///     └── 3002 device core-sw
///         └── 4002 sensor Uptime
/// ```
pub fn sample_records() -> Vec<ObjectRecord> {
    vec![
        record(1001, ObjectKind::Probe, 0, "Local Probe"),
        record(2001, ObjectKind::Group, 1001, "Servers"),
        record(2002, ObjectKind::Group, 1001, "Network"),
        record(3001, ObjectKind::Device, 2001, "web01").with_attribute("host", "10.0.0.11"),
        record(3002, ObjectKind::Device, 2002, "core-sw").with_attribute("host", "10.0.0.1"),
        record(4001, ObjectKind::Sensor, 3001, "Ping").with_attribute("type", "ping"),
        record(4002, ObjectKind::Sensor, 3002, "Uptime").with_attribute("type", "snmpuptime"),
        record(0, ObjectKind::Channel, 4001, "Total").with_attribute("unit", "msec"),
    ]
}
