use futures::Stream;
use futures::TryStreamExt;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::models::ApiConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP client shared by every download.
///
/// Cloning is cheap: the underlying connection pool is reference counted.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        // No cookie store; redirects follow the client default policy.
        let http = Client::builder().user_agent(config.user_agent).build()?;
        Ok(Self { http })
    }

    /// Issue a GET for `url` and return the advertised size with the body stream.
    ///
    /// Non-success status codes are reported as errors.
    pub async fn download_file_stream(
        &self,
        url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self.http.get(url).send().await?.error_for_status()?;

        let total_size = response.content_length();
        debug!(url, ?total_size, status = %response.status(), "response headers received");

        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::DEFAULT_USER_AGENT;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_sends_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/file.bin")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let client = ApiClient::new(ApiConfig::default()).unwrap();
        let (total, stream) = client
            .download_file_stream(&format!("{}/file.bin", server.url()))
            .await
            .unwrap();

        assert_eq!(total, Some(11));
        let chunks: Vec<_> = stream.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"hello world");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = ApiClient::new(ApiConfig::default()).unwrap();
        let result = client
            .download_file_stream(&format!("{}/missing", server.url()))
            .await;

        assert!(matches!(result, Err(ApiError::RequestError(_))));
    }
}
