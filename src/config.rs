//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::api::models::DEFAULT_USER_AGENT;
use crate::api::ApiConfig;
use crate::domain::{DownloadRequest, ResourceLocator};

/// Socket name, stable across invocations.
pub const ENDPOINT_NAME: &str = "torta-dl.sock";

#[derive(Parser, Debug, Clone)]
#[command(name = "torta-dl", version, about = "Download companion for the Dobostorta browser")]
pub struct Config {
    /// URLs to download
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<ResourceLocator>,

    /// Socket used to reach the running instance
    #[arg(long, env = "TORTA_DL_ENDPOINT")]
    pub endpoint: Option<PathBuf>,

    /// User-Agent sent with every download
    #[arg(long, env = "TORTA_DL_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Refresh interval of the ETA display, in milliseconds
    #[arg(
        long,
        env = "TORTA_DL_TICK_MILLIS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(50..)
    )]
    pub tick_millis: u64,
}

impl Config {
    pub fn endpoint_path(&self) -> PathBuf {
        self.endpoint.clone().unwrap_or_else(default_endpoint_path)
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.urls.iter().cloned().map(DownloadRequest::new).collect()
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }
}

/// Per-user runtime directory, falling back to the shared temp directory
/// with the user name in the socket name.
pub fn default_endpoint_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(dir) => dir.join(ENDPOINT_NAME),
        None => {
            let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
            std::env::temp_dir().join(format!("{}-{}", user, ENDPOINT_NAME))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_urls_is_usage_error() {
        let err = Config::try_parse_from(["torta-dl"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(Config::try_parse_from(["torta-dl", "not a url"]).is_err());
    }

    #[test]
    fn test_parse_urls_and_options() {
        let config = Config::try_parse_from([
            "torta-dl",
            "--endpoint",
            "/tmp/x.sock",
            "--tick-millis",
            "250",
            "https://example.com/a",
            "https://example.com/b",
        ])
        .unwrap();

        assert_eq!(config.requests().len(), 2);
        assert_eq!(config.endpoint_path(), PathBuf::from("/tmp/x.sock"));
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        assert_eq!(config.api_config().user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_default_endpoint_name() {
        let path = default_endpoint_path();
        assert!(path.to_string_lossy().ends_with(ENDPOINT_NAME));
    }
}
