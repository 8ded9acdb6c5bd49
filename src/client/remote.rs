//! Transports between the tree controller and the directory service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::fs::tree::DirectorySnapshot;
use crate::service::{DirectoryRequest, DirectoryResponse, DirectoryService};

/// Something that can answer directory requests.
#[async_trait]
pub trait DirectoryRemote: Send + Sync {
    /// Send one request and return the response envelope as received.
    async fn call(&self, request: DirectoryRequest) -> Result<DirectoryResponse>;

    /// Fetch the full directory listing.
    async fn snapshot(&self) -> Result<Vec<DirectorySnapshot>>;
}

/// Turn an envelope into its payload, or `AppError::Remote` on `success: false`.
pub fn into_payload(response: DirectoryResponse) -> Result<Option<Value>> {
    if response.success {
        return Ok(response.data);
    }
    Err(AppError::Remote(
        response
            .error_message()
            .unwrap_or_else(|| "request failed".to_string()),
    ))
}

/// Payload of a request that answers with a directory id.
pub fn into_directory_id(response: DirectoryResponse) -> Result<String> {
    match into_payload(response)? {
        Some(Value::String(id)) => Ok(id),
        other => Err(AppError::Transport(format!(
            "expected a directory id, got {}",
            other.unwrap_or(Value::Null)
        ))),
    }
}

/// HTTP transport against a running `mfd` server.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn directories_url(&self) -> String {
        format!("{}/directories", self.base_url)
    }
}

#[async_trait]
impl DirectoryRemote for HttpRemote {
    async fn call(&self, request: DirectoryRequest) -> Result<DirectoryResponse> {
        let response = self
            .client
            .post(self.directories_url())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn snapshot(&self) -> Result<Vec<DirectorySnapshot>> {
        let response = self
            .client
            .get(self.directories_url())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// In-process transport calling a [`DirectoryService`] directly.
#[derive(Clone)]
pub struct LocalRemote {
    service: Arc<DirectoryService>,
}

impl LocalRemote {
    pub fn new(service: Arc<DirectoryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl DirectoryRemote for LocalRemote {
    async fn call(&self, request: DirectoryRequest) -> Result<DirectoryResponse> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || service.handle(request))
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }

    async fn snapshot(&self) -> Result<Vec<DirectorySnapshot>> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || service.snapshot())
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::scan::variants::NoVariants;
    use crate::server;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_service() -> (TempDir, Arc<DirectoryService>) {
        let dir = TempDir::new().unwrap();
        let service = DirectoryService::new(
            dir.path(),
            "http://localhost/uploads",
            Arc::new(SqliteCatalog::open_in_memory().unwrap()),
            Arc::new(NoVariants),
        );
        (dir, Arc::new(service))
    }

    #[test]
    fn payload_of_failure_is_remote_error() {
        let response = DirectoryResponse {
            success: false,
            data: Some(json!({"kind": "refused", "message": "Refused: busy"})),
        };
        match into_payload(response) {
            Err(AppError::Remote(message)) => assert_eq!(message, "Refused: busy"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn failure_without_detail() {
        let response = DirectoryResponse {
            success: false,
            data: None,
        };
        assert!(matches!(into_payload(response), Err(AppError::Remote(_))));
    }

    #[test]
    fn directory_id_must_be_a_string() {
        let response = DirectoryResponse::ok(Some(json!(42)));
        assert!(matches!(
            into_directory_id(response),
            Err(AppError::Transport(_))
        ));
        let response = DirectoryResponse::ok(Some(json!("a/b")));
        assert_eq!(into_directory_id(response).unwrap(), "a/b");
    }

    #[tokio::test]
    async fn local_remote_round_trip() {
        let (dir, service) = setup_service();
        let remote = LocalRemote::new(service);
        let response = remote
            .call(DirectoryRequest::Mkdir {
                parent: Some("/".into()),
                name: Some("child".into()),
            })
            .await
            .unwrap();
        assert_eq!(into_directory_id(response).unwrap(), "child");
        assert!(dir.path().join("child").is_dir());
        assert_eq!(remote.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn http_remote_against_server() {
        let (_dir, service) = setup_service();
        let addr = server::start_server(service, "127.0.0.1", 0).await.unwrap();
        let remote = HttpRemote::new(format!("http://{}/", addr));

        let response = remote
            .call(DirectoryRequest::Mkdir {
                parent: None,
                name: Some("over-http".into()),
            })
            .await
            .unwrap();
        assert_eq!(into_directory_id(response).unwrap(), "over-http");

        let response = remote
            .call(DirectoryRequest::Delete { id: None })
            .await
            .unwrap();
        assert!(!response.success);

        let snapshot = remote.snapshot().await.unwrap();
        assert_eq!(snapshot, vec![DirectorySnapshot::new("over-http", "over-http")]);
    }
}
