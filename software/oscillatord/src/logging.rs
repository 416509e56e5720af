use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt, layer::SubscriberExt, reload,
    util::SubscriberInitExt,
};

/// Logger thread handles, which must be kept alive for as long as the logging targets will be used.
/// Flushed automatically when dropped.
pub struct LoggingGuards {
    _stdout: WorkerGuard,
    _stderr: WorkerGuard,

    /// A handle to change the level filter once the configuration is known.
    filter_reload: reload::Handle<EnvFilter, Registry>,

    /// Whether the filter came from `RUST_LOG`, which takes precedence over the configuration
    from_env: bool,
}

impl LoggingGuards {
    /// Switch between `debug` and `info` verbosity.
    /// Does nothing when the filter was set through `RUST_LOG`.
    pub fn set_debug(&self, debug: bool) -> Result<(), String> {
        if self.from_env {
            return Ok(());
        }
        let level = if debug { "debug" } else { "info" };
        let env_filter = EnvFilter::try_new(level)
            .map_err(|e| format!("Failed to build logging filter: {e}"))?;
        self.filter_reload
            .modify(|filter| *filter = env_filter)
            .map_err(|e| format!("Failed to reload logging filter: {e}"))
    }
}

/// Set up terminal logging: errors to stderr, everything else to stdout.
/// Only one global logger can be set up per process.
pub fn init_logging() -> Result<LoggingGuards, String> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    // Filter for log level
    let (env_filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (
            EnvFilter::try_new("info")
                .map_err(|e| format!("Failed to set up logging env filter: {e}"))?,
            false,
        ),
    };
    let (env_filter, filter_reload) = reload::Layer::new(env_filter);

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false)
        .with_filter(filter::filter_fn(|meta| *meta.level() != Level::ERROR));

    let stderr_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stderr_writer)
        .with_target(false)
        .with_filter(LevelFilter::ERROR);

    // Set up global root logger
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))?;

    Ok(LoggingGuards {
        _stdout: stdout_guard,
        _stderr: stderr_guard,
        filter_reload,
        from_env,
    })
}
