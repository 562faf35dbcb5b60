//! Logging initialization for unit tests.

use once_cell::sync::OnceCell;

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install a test subscriber once per process, filtered by
/// [`LOG_ENV`](crate::log::LOG_ENV).
pub fn init() {
  INITIALIZED.get_or_init(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_env(crate::log::LOG_ENV)
      .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init();
  });
}
