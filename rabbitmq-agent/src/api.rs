//! RabbitMQ management API client
//!
//! One authenticated GET per call. Failures are logged here and surface to the
//! caller only as an absent document.

use reqwest::{Client, Identity, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::ApiConfig;
use crate::error::{AgentError, Result};

/// The management API resources the agent reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Overview,
    Vhosts,
    Connections,
    Queues,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Overview => "/api/overview",
            Endpoint::Vhosts => "/api/vhosts",
            Endpoint::Connections => "/api/connections",
            Endpoint::Queues => "/api/queues",
        }
    }
}

pub struct ManagementClient {
    http: Client,
    base_url: String,
    user: String,
    pass: String,
}

impl ManagementClient {
    /// Build the HTTP client. Fails only on TLS identity problems.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if config.ssl {
            builder = builder.identity(load_identity(config)?);
        }

        let http = builder
            .build()
            .map_err(|e| AgentError::Tls(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            user: config.user.clone(),
            pass: config.pass.clone(),
        })
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// GET `endpoint` as JSON, or `None` after logging whatever went wrong
    pub async fn fetch(&self, endpoint: Endpoint) -> Option<Value> {
        match self.try_fetch(endpoint).await {
            Ok(document) => Some(document),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    async fn try_fetch(&self, endpoint: Endpoint) -> Result<Value> {
        let url = self.url(endpoint);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await
            .map_err(|source| AgentError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| AgentError::Transport {
                url: url.clone(),
                source,
            })?;

        serde_json::from_slice(&bytes).map_err(|source| AgentError::Decode { url, source })
    }
}

fn load_identity(config: &ApiConfig) -> Result<Identity> {
    let (Some(cert_path), Some(key_path)) = (&config.ssl_cert_file, &config.ssl_key_file) else {
        return Err(crate::config::ConfigError::MissingTlsIdentity.into());
    };

    let read = |path: &std::path::Path| {
        std::fs::read(path)
            .map_err(|e| AgentError::Tls(format!("failed to read {}: {e}", path.display())))
    };
    let cert = read(cert_path)?;
    let key = read(key_path)?;

    Identity::from_pkcs8_pem(&cert, &key)
        .map_err(|e| AgentError::Tls(format!("invalid client certificate or key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rabbitmq_devkit::{fixtures, MockManagementApi};
    use serde_json::json;
    use std::path::PathBuf;

    fn api_config(port: u16) -> ApiConfig {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::Overview.path(), "/api/overview");
        assert_eq!(Endpoint::Vhosts.path(), "/api/vhosts");
        assert_eq!(Endpoint::Connections.path(), "/api/connections");
        assert_eq!(Endpoint::Queues.path(), "/api/queues");
    }

    #[tokio::test]
    async fn test_fetch_sends_basic_auth() {
        let api = MockManagementApi::start().await.unwrap();
        api.respond("/api/overview", fixtures::overview("3.12.4"));

        let client = ManagementClient::new(&api_config(api.port())).unwrap();
        let document = client.fetch(Endpoint::Overview).await.unwrap();

        assert_eq!(document["rabbitmq_version"], json!("3.12.4"));
        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/overview");
        // base64("guest:guest")
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Basic Z3Vlc3Q6Z3Vlc3Q=")
        );
    }

    #[tokio::test]
    async fn test_non_200_is_absent() {
        let api = MockManagementApi::start().await.unwrap();
        api.respond_with_status("/api/queues", 500, json!({"error": "boom"}));

        let client = ManagementClient::new(&api_config(api.port())).unwrap();
        assert!(client.fetch(Endpoint::Queues).await.is_none());

        let err = client.try_fetch(Endpoint::Queues).await.unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unknown_path_is_absent() {
        let api = MockManagementApi::start().await.unwrap();
        let client = ManagementClient::new(&api_config(api.port())).unwrap();
        assert!(client.fetch(Endpoint::Vhosts).await.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_absent() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ManagementClient::new(&api_config(port)).unwrap();
        let err = client.try_fetch(Endpoint::Overview).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport { .. }));
        assert!(client.fetch(Endpoint::Overview).await.is_none());
    }

    #[test]
    fn test_missing_identity_files() {
        let config = ApiConfig {
            ssl: true,
            ssl_cert_file: Some(PathBuf::from("/nonexistent/client.pem")),
            ssl_key_file: Some(PathBuf::from("/nonexistent/client.key")),
            ..ApiConfig::default()
        };
        let err = ManagementClient::new(&config).err().unwrap();
        assert!(matches!(err, AgentError::Tls(_)));
    }
}
