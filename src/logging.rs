use std::io;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_STDOUT_FILTER: &str = "info,clustering=info,topics=info,search_index=warn,cluster_debug=off,sqlx=off";
const DEFAULT_FILE_FILTER: &str = "info,cluster_debug=debug,search_index=debug,sqlx=info";

/// Installs the global subscriber: a stdout layer and a daily rolling file layer under `log_dir`.
///
/// `RUST_LOG`, when set, replaces the stdout filter. The file layer always keeps the
/// cluster debug records so a run can be inspected after the fact.
pub fn configure_logging(log_dir: &str) {
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER));

    // Stdout log configuration
    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(stdout_filter);

    // File log configuration
    let file_appender = rolling::daily(log_dir, "syntopic.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(DEFAULT_FILE_FILTER));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
