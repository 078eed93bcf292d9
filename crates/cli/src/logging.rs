use grantwise_core::config::AppConfig;

/// Installs the global subscriber. Events go to stderr so command payloads on stdout stay
/// machine readable. A second call is a no-op.
pub fn init_logging(config: &AppConfig) {
    use grantwise_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(
            event_name = "system.cli.logging_initialized",
            level = %log_level,
            format = ?config.logging.format,
            "logging initialized"
        );
    }
}
