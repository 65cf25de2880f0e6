pub mod builders;
pub mod fake_executor;
pub mod fake_warehouse;
pub mod scripted;

use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use etldag::exec::StatementExecutor;
use etldag::task::{RunContext, TimeWindow};
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{sparkify_pipeline, ConfigFileBuilder, SPARKIFY_CHECK_TABLES};
pub use fake_executor::FakeExecutor;
pub use fake_warehouse::FakeWarehouse;
pub use scripted::ScriptedAction;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
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
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Context for the 2018-11-03 hourly window used across tests.
pub fn test_context(warehouse: Arc<dyn StatementExecutor>) -> RunContext {
    let start = Utc.with_ymd_and_hms(2018, 11, 3, 7, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2018, 11, 3, 8, 0, 0).unwrap();
    RunContext::new("manual__2018-11-03T07:00:00", TimeWindow::new(start, end), warehouse)
}
