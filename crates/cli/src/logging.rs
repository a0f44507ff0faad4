use crate::settings::LoggingSettings;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Structured diagnostics go to stderr so stdout stays the console report.
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Use Layer::boxed() to unify the types of the branches
    let fmt_layer = match (settings.json, settings.show_time) {
        (true, _) => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(settings.show_target)
            .boxed(),
        (false, true) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(settings.show_target)
            .with_thread_ids(false)
            .boxed(),
        (false, false) => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(settings.show_target)
            .with_thread_ids(false)
            .without_time()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
