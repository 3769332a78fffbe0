/// Identifying client signature sent with every fetch.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) ",
    "Chrome/55.0.0.0 Safari/537.36 TortaDL/",
    env!("CARGO_PKG_VERSION")
);

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
