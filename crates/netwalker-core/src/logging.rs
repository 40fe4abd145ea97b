use crate::error::WalkError;
use chrono::Local;
use std::fs::create_dir_all;
use std::io;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    prelude::*,
    EnvFilter,
};

struct CustomTime;

impl FormatTime for CustomTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Transport and store crates must stay below warning level regardless of
/// the configured verbosity; their debug output drowns the walk log.
const QUIET_TARGETS: &[&str] = &["ssh2", "libssh2", "sqlx"];

fn build_filter(level: &str) -> EnvFilter {
    let base = match std::env::var("RUST_LOG") {
        Ok(env_val) => env_val,
        Err(_) => level.to_lowercase(),
    };
    let mut filter = EnvFilter::new(base);
    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{}=warn", target).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Initialize the tracing system for logging.
///
/// # Arguments
///
/// * `level` - The log level to use ("error", "warn", "info", "debug", "trace")
/// * `log_file_path` - Optional file to log to in addition to stderr
pub fn init_logging(level: &str, log_file_path: Option<&str>) -> Result<(), WalkError> {
    let env_filter = build_filter(level);

    // Progress lines and device markers go to stdout; diagnostics stay on
    // stderr so the two streams can be separated
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .with_timer(CustomTime)
        .with_target(true);

    if let Some(log_path) = log_file_path {
        let dir = Path::new(log_path).parent().unwrap_or(Path::new(""));
        if !dir.as_os_str().is_empty() {
            create_dir_all(dir).map_err(WalkError::IoError)?;
        }

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(WalkError::IoError)?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_timer(CustomTime)
            .with_thread_ids(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }

    tracing::info!("Logging initialized at {} level", level.to_uppercase());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::filter::Targets;

    // The EnvFilter itself is opaque; check the directive strings instead
    #[test]
    fn test_quiet_targets_parse_as_directives() {
        for target in QUIET_TARGETS {
            let parsed: Result<Targets, _> = format!("{}=warn", target).parse();
            assert!(parsed.is_ok());
            let targets = parsed.unwrap();
            assert_eq!(
                targets.iter().next().unwrap().1,
                LevelFilter::WARN
            );
        }
    }
}
