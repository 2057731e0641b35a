use std::sync::Once;

use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// A simple logger.
///
/// Set the `RUST_LOG` environment variable to be set to `info` or `debug`. Logs go to stderr so
/// they never interleave with a program's output.
pub fn setup_logger() {
    INIT.call_once(|| {
        // Another subscriber may already be installed by the host.
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .without_time()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env())
            .finish()
            .try_init();
    });
}
