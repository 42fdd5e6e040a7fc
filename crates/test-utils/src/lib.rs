pub mod builders;
pub mod fake_backend;
pub mod harness;

use std::sync::Once;

use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=mailsweep=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Fixed "now" every test clock starts at: a Monday, 03:00 UTC, outside the
/// default 09:00-17:00 peak window.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0)
        .single()
        .expect("valid test timestamp")
}
