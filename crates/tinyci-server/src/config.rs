//! Server configuration.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tinyci-server")]
#[command(about = "Build server that compiles and tests pushed commits", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "TINYCI_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Directory holding build metadata and logs
    #[arg(long, env = "TINYCI_BUILDS_ROOT", default_value = "./data/builds")]
    pub builds_root: PathBuf,

    /// Directory under which per-build workspaces are checked out
    #[arg(long, env = "TINYCI_WORKSPACE_ROOT", default_value = "./workspace")]
    pub workspace_root: PathBuf,

    /// Maximum number of bytes returned by one log slice
    #[arg(long, env = "TINYCI_LOG_SLICE_MAX", default_value_t = 65536)]
    pub log_slice_max: usize,

    /// Token used to publish commit statuses; statuses are only logged without it
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the GitHub REST API
    #[arg(long, env = "TINYCI_GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Log output format
    #[arg(long, env = "TINYCI_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["tinyci-server"]).unwrap();

        assert_eq!(config.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.builds_root, PathBuf::from("./data/builds"));
        assert_eq!(config.workspace_root, PathBuf::from("./workspace"));
        assert_eq!(config.log_slice_max, 65536);
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "tinyci-server",
            "--bind",
            "127.0.0.1:9000",
            "--log-slice-max",
            "1024",
            "--github-token",
            "secret",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.log_slice_max, 1024);
        assert_eq!(config.github_token.as_deref(), Some("secret"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_log_format_is_rejected() {
        assert!(Config::try_parse_from(["tinyci-server", "--log-format", "xml"]).is_err());
    }
}
