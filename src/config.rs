use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_LOG_FILTER: &str = "info,pdf_brain_lib=debug";

#[derive(Debug, Clone, Parser)]
#[command(name = "pdf-brain", version, about = "Ask questions about your indexed PDFs")]
pub struct Config {
    /// Base URL of the PDF indexing service
    #[arg(long, env = "PDF_BRAIN_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Where the session database and logs live
    #[arg(long, env = "PDF_BRAIN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// tracing filter directive for the log file
    #[arg(long, env = "PDF_BRAIN_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Transcript lines shown when a chat is redrawn
    #[arg(long, default_value_t = 40)]
    pub history_lines: usize,

    /// Terminal width used for wrapping message bubbles
    #[arg(long, env = "COLUMNS", default_value_t = 80)]
    pub width: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine a data directory; pass --data-dir")]
    NoDataDir,
}

impl Config {
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("pdf-brain")))
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn log_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flags() {
        let config = Config::try_parse_from([
            "pdf-brain",
            "--backend-url",
            "http://10.0.0.2:9000",
            "--data-dir",
            "/tmp/pdf-brain-test",
            "--history-lines",
            "12",
            "--width",
            "100",
        ])
        .unwrap();
        assert_eq!(config.backend_url, "http://10.0.0.2:9000");
        assert_eq!(config.history_lines, 12);
        assert_eq!(config.width, 100);
        assert_eq!(
            config.log_dir().unwrap(),
            PathBuf::from("/tmp/pdf-brain-test/logs")
        );
    }

    #[test]
    fn test_rejects_bad_number() {
        assert!(Config::try_parse_from(["pdf-brain", "--history-lines", "many"]).is_err());
    }
}
