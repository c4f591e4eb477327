//! tracing setup. Logs go to `<data-dir>/logs/pdf-brain.log` so they never
//! interleave with the chat transcript; stderr is the fallback.

use crate::config::DEFAULT_LOG_FILTER;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter_from(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("[pdf-brain] invalid log filter {:?}: {}", directive, e);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// or buffered lines are lost.
pub fn init_logging(directive: &str, log_dir: &Path) -> Option<WorkerGuard> {
    let filter = filter_from(directive);

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("[pdf-brain] failed to create log directory {:?}: {}", log_dir, e);
        init_stderr_logging(filter);
        return None;
    }

    let path = log_dir.join("pdf-brain.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path);

    match file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            );
            match tracing::subscriber::set_global_default(subscriber) {
                Ok(()) => tracing::info!("logging to {:?}", path),
                Err(e) => eprintln!("[pdf-brain] failed to set tracing subscriber: {}", e),
            }
            Some(guard)
        }
        Err(e) => {
            eprintln!("[pdf-brain] failed to open log file {:?}: {}", path, e);
            init_stderr_logging(filter);
            None
        }
    }
}

fn init_stderr_logging(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_directive_falls_back_to_default() {
        let filter = filter_from("pdf_brain_lib=notalevel");
        assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_LOG_FILTER).to_string());
    }
}
