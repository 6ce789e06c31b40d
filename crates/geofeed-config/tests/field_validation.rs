//! Field validation tests for geofeed-config.
// crates/geofeed-config/tests/field_validation.rs
// =============================================================================
// Module: Config Field Validation Tests
// Description: Validate range and cross-field checks.
// Purpose: Ensure invalid relay, store, and simulator values fail at load time.
// =============================================================================

mod common;

use common::TestResult;
use common::assert_invalid;
use common::example_with;
use common::load_str;
use geofeed_config::LogSinkKind;
use geofeed_config::SnapshotConfig;
use geofeed_config::StoreConfig;

#[test]
fn missing_relay_key_is_a_parse_error() -> TestResult {
    let content = example_with("max_wait_ms = 500\n", "")?;
    assert_invalid(load_str(&content), "config parse error")
}

#[test]
fn unknown_key_is_rejected() -> TestResult {
    let content = example_with("max_batch = 100", "max_batch = 100\nmax_bytes = 1")?;
    assert_invalid(load_str(&content), "config parse error")
}

#[test]
fn bind_must_be_a_socket_address() -> TestResult {
    let content = example_with("127.0.0.1:8080", "localhost")?;
    assert_invalid(load_str(&content), "server.bind")
}

#[test]
fn pong_wait_must_exceed_ping_interval() -> TestResult {
    let content = example_with("pong_wait_ms = 10000", "pong_wait_ms = 9000")?;
    assert_invalid(load_str(&content), "pong_wait_ms must be greater")
}

#[test]
fn write_timeout_must_be_positive() -> TestResult {
    let content = example_with("write_timeout_ms = 3000", "write_timeout_ms = 0")?;
    assert_invalid(load_str(&content), "write_timeout_ms")
}

#[test]
fn snapshot_page_size_is_bounded() -> TestResult {
    let content = example_with("page_size = 100", "page_size = 1001")?;
    assert_invalid(load_str(&content), "page_size must be between 1 and 1000")
}

#[test]
fn bounded_snapshot_parses_and_requires_records() -> TestResult {
    let content = example_with(
        r#"{ mode = "complete", page_size = 100 }"#,
        r#"{ mode = "bounded", max_records = 250, page_size = 50 }"#,
    )?;
    let config = load_str(&content).map_err(|err| err.to_string())?;
    if config.session.snapshot
        != (SnapshotConfig::Bounded {
            max_records: 250,
            page_size: 50,
        })
    {
        return Err("bounded snapshot not parsed".to_string());
    }
    let content = example_with(
        r#"{ mode = "complete", page_size = 100 }"#,
        r#"{ mode = "bounded", max_records = 0, page_size = 50 }"#,
    )?;
    assert_invalid(load_str(&content), "max_records")
}

#[test]
fn coalescer_values_must_be_positive() -> TestResult {
    assert_invalid(load_str(&example_with("max_batch = 100", "max_batch = 0")?), "max_batch")?;
    assert_invalid(
        load_str(&example_with("max_wait_ms = 500", "max_wait_ms = 0")?),
        "max_wait_ms",
    )?;
    assert_invalid(
        load_str(&example_with("channel_capacity = 16", "channel_capacity = 0")?),
        "channel_capacity",
    )
}

#[test]
fn sqlite_requires_path() -> TestResult {
    let content = example_with("path = \"data/geofeed.db\"\n", "")?;
    assert_invalid(load_str(&content), "store.path is required")
}

#[test]
fn memory_store_needs_no_path() -> TestResult {
    let content = example_with(
        "type = \"sqlite\"\npath = \"data/geofeed.db\"\nbusy_timeout_ms = 5000\njournal_mode = \
         \"wal\"\nsync_mode = \"normal\"\n",
        "type = \"memory\"\n",
    )?;
    let config = load_str(&content).map_err(|err| err.to_string())?;
    match config.store {
        StoreConfig::Memory {
            ..
        } => Ok(()),
        StoreConfig::Sqlite {
            ..
        } => Err("expected memory store".to_string()),
    }
}

#[test]
fn simulator_center_must_be_valid() -> TestResult {
    let content = example_with("center_latitude = 53.5357", "center_latitude = 95.0")?;
    assert_invalid(load_str(&content), "simulator")
}

#[test]
fn simulator_region_must_stay_in_bounds() -> TestResult {
    let content = example_with("center_latitude = 53.5357", "center_latitude = 89.9")?;
    assert_invalid(load_str(&content), "home region")
}

#[test]
fn simulator_requires_attempts_and_frequency() -> TestResult {
    assert_invalid(
        load_str(&example_with("max_attempts = 5", "max_attempts = 0")?),
        "max_attempts",
    )?;
    assert_invalid(
        load_str(&example_with("frequency_hz = 30.0", "frequency_hz = 0.0")?),
        "frequency_hz",
    )?;
    assert_invalid(load_str(&example_with("devices = 100", "devices = 0")?), "devices")
}

#[test]
fn file_sink_requires_path() -> TestResult {
    assert_invalid(
        load_str(&example_with("sink = \"stderr\"", "sink = \"file\"")?),
        "logging.path is required",
    )?;
    let config = load_str(&example_with("sink = \"stderr\"", "sink = \"file\"\npath = \"g.log\"")?)
        .map_err(|err| err.to_string())?;
    if config.logging.sink != LogSinkKind::File {
        return Err("file sink not parsed".to_string());
    }
    Ok(())
}
