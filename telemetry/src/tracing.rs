use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used by tests when `RUST_LOG` is not set.
const DEFAULT_TEST_FILTER: &str = "sink=debug";

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global tracing subscriber for an application.
///
/// Honors `RUST_LOG` and falls back to `info` for the application's own target.
pub fn init_tracing(app_name: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{app_name}=info,sink=info").into()),
        )
        .with(fmt::layer())
        .init();
}

/// Installs a test-writer subscriber once per process.
///
/// Output is captured by the test harness and only shown for failing tests.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| DEFAULT_TEST_FILTER.into()),
            )
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
