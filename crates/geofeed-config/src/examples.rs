// crates/geofeed-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payloads.
// Purpose: Deterministic examples for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Geofeed configuration. The output is deterministic
//! and must always load and validate.

/// Returns a canonical example `geofeed.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"

[session]
ping_interval_ms = 9000
pong_wait_ms = 10000
write_timeout_ms = 3000
snapshot = { mode = "complete", page_size = 100 }

[coalescer]
max_batch = 100
max_wait_ms = 500
channel_capacity = 16

[store]
type = "sqlite"
path = "data/geofeed.db"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "normal"
notify_capacity = 4096

[simulator]
enabled = true
devices = 100
center_latitude = 53.5357
center_longitude = -113.5068
radius = 0.25
frequency_hz = 30.0
movement_per_sec = 0.025
bounce_cooldown_steps = 5
insert_mode = "batch"

[simulator.retry]
max_attempts = 5
delay_ms = 2
backoff = "fixed"
on_exhausted = "skip_step"

[logging]
sink = "stderr"
"#,
    )
}
