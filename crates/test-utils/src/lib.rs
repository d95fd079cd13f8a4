pub mod builders;
pub mod functions;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use taskdag::logging::LOG_ENV;
use tracing_subscriber::{fmt, EnvFilter};

/// Upper bound for a whole test run. The slowest legitimate cases are a
/// `sleep 5` shell task cut off by its task timeout and a run that abandons
/// a 2s body after its drain timeout; both finish well inside this, so
/// hitting it means the coordinating loop stopped making progress.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Reads the same filter variable as the binary, so
/// `TASKDAG_LOG=taskdag::engine=debug cargo test` shows the runner's loop.
/// Output only appears for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it outlives [`TEST_TIMEOUT`].
///
/// Wrap every `run_dag`/`wait` call in this: a scheduler that stalls
/// without reporting an inconsistency would otherwise hang the suite.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("DAG run stalled: no outcome within {TEST_TIMEOUT:?}"),
    }
}
