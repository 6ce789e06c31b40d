// crates/geofeed-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for geofeed-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use geofeed_config::ConfigError;
use geofeed_config::GeofeedConfig;
use geofeed_config::config_toml_example;

/// Result alias used by validation tests.
pub type TestResult = Result<(), String>;

/// Returns the canonical example with `from` replaced by `to`.
pub fn example_with(from: &str, to: &str) -> Result<String, String> {
    let example = config_toml_example();
    if !example.contains(from) {
        return Err(format!("example does not contain {from}"));
    }
    Ok(example.replacen(from, to, 1))
}

/// Parses and validates a TOML string.
pub fn load_str(content: &str) -> Result<GeofeedConfig, ConfigError> {
    GeofeedConfig::from_toml_str(content)
}

/// Asserts that a result is an error whose message contains `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
