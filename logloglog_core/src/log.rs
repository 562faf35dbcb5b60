//! Logging initialization for embedders.

use jiff::Zoned;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter, e.g.
/// `LOGLOGLOG_LOG=logloglog_core=debug`.
pub const LOG_ENV: &str = "LOGLOGLOG_LOG";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Initialize logging to stderr, filtered by [`LOG_ENV`].
///
/// Embedders call this once at startup; a second call is a no-op.
pub fn init() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .try_init();
}

/// Initialize logging into a timestamped file under `dir`, filtered by
/// [`LOG_ENV`].
pub fn init_to_file(dir: &Path) {
  let now = Zoned::now();
  let filename = format!("logloglog-{}.log", now.strftime("%Y%m%d-%H%M%S"));
  let appender = tracing_appender::rolling::never(dir, filename);
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(appender)
    .with_ansi(false)
    .try_init();
}
