use std::io;

use tracing::{debug, info};

use crate::domain::{AppError, DownloadRequest};
use crate::transport::{Endpoint, Listener};

/// Outcome of claiming the endpoint at startup.
#[derive(Debug)]
pub enum Role {
    /// First instance: owns the endpoint for its whole lifetime.
    Server(Listener),
    /// Another instance owns the endpoint; forward and exit.
    Client(Endpoint),
}

/// Funnels every invocation in a session through one serving process.
#[derive(Debug, Clone)]
pub struct SingletonCoordinator {
    endpoint: Endpoint,
}

impl SingletonCoordinator {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bind-or-fail on the endpoint name.
    pub fn claim(&self) -> Result<Role, AppError> {
        match self.endpoint.bind() {
            Ok(listener) => {
                info!(path = %self.endpoint.path().display(), "endpoint claimed, running as server");
                Ok(Role::Server(listener))
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                info!(path = %self.endpoint.path().display(), "endpoint owned elsewhere, running as client");
                Ok(Role::Client(self.endpoint.clone()))
            }
            Err(e) => Err(AppError::Coordination(format!(
                "Failed to bind {}: {}",
                self.endpoint.path().display(),
                e
            ))),
        }
    }
}

/// Forward every request in order, stopping at the first failure.
pub async fn forward_all(endpoint: &Endpoint, requests: &[DownloadRequest]) -> Result<(), AppError> {
    for request in requests {
        endpoint.forward(request).await?;
    }

    debug!(count = requests.len(), "all requests forwarded");
    Ok(())
}

/// Blocking variant used before any event loop exists.
pub fn forward_all_blocking(
    endpoint: &Endpoint,
    requests: &[DownloadRequest],
) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Io(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(forward_all(endpoint, requests))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::domain::ResourceLocator;

    fn request(url: &str) -> DownloadRequest {
        DownloadRequest::new(ResourceLocator::parse(url).unwrap())
    }

    #[test]
    fn test_second_claim_is_client() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = SingletonCoordinator::new(Endpoint::new(dir.path().join("c.sock")));

        let first = coordinator.claim().unwrap();
        assert!(matches!(first, Role::Server(_)));

        let second = coordinator.claim().unwrap();
        assert!(matches!(second, Role::Client(ref e) if e == coordinator.endpoint()));

        // Releasing the server lets the next invocation take over
        drop(first);
        assert!(matches!(coordinator.claim().unwrap(), Role::Server(_)));
    }

    #[test]
    fn test_missing_directory_is_coordination_error() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator =
            SingletonCoordinator::new(Endpoint::new(dir.path().join("missing").join("c.sock")));

        assert!(matches!(
            coordinator.claim(),
            Err(AppError::Coordination(_))
        ));
    }

    #[tokio::test]
    async fn test_two_clients_each_deliver_one_request() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = SingletonCoordinator::new(Endpoint::new(dir.path().join("c.sock")));

        let Role::Server(listener) = coordinator.claim().unwrap() else {
            panic!("first claim must win");
        };
        let mut incoming = Arc::new(listener).incoming();

        let mut clients = Vec::new();
        for url in ["https://example.com/one", "https://example.com/two"] {
            let Role::Client(endpoint) = coordinator.claim().unwrap() else {
                panic!("endpoint is owned");
            };
            clients.push(tokio::spawn(async move {
                forward_all(&endpoint, &[request(url)]).await
            }));
        }
        for client in clients {
            client.await.unwrap().unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..2 {
            let request = tokio::time::timeout(Duration::from_secs(5), incoming.next())
                .await
                .unwrap()
                .unwrap();
            received.push(request.locator.as_str().to_string());
        }
        received.sort();
        assert_eq!(received, ["https://example.com/one", "https://example.com/two"]);

        let extra = tokio::time::timeout(Duration::from_millis(100), incoming.next()).await;
        assert!(extra.is_err());
    }
}
