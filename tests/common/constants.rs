//! Shared constants for end-to-end tests
//!
//! When fake manager data or timeouts change, update only this file.

// ============================================================================
// Fake Manager Data
// ============================================================================

/// API key the fake manager accepts
pub const FAKE_API_KEY: &str = "fake-api-key";

/// Missing items every fake manager reports
pub const FAKE_MISSING_COUNT: usize = 3;

/// Cutoff-unmet items every fake manager reports
pub const FAKE_CUTOFF_COUNT: usize = 2;

/// Application name reported by the fake system status endpoint
pub const FAKE_APP_NAME: &str = "FakeArr";

/// Version reported by the fake system status endpoint
pub const FAKE_APP_VERSION: &str = "4.0.0";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a background cycle to finish (milliseconds)
pub const CYCLE_TIMEOUT_MS: u64 = 5000;
