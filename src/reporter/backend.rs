//! HTTP client for the proctoring backend.
//!
//! The backend stores violation records and permission logs and owns session
//! state. It does no deduplication of its own; the client is the only source
//! of truth for what counted.

use crate::error::ReportingError;
use crate::reporter::types::{Outbound, PermissionLogRecord, ViolationRecord};
use crate::reporter::worker::ReportSink;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL including any API prefix, e.g. `http://127.0.0.1:8000/api`
    pub base_url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn violations_url(&self) -> String {
        format!("{}/violations", self.base_url)
    }

    pub fn permission_log_url(&self) -> String {
        format!("{}/permissions/log", self.base_url)
    }

    pub fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.base_url, session_id)
    }

    pub fn terminate_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}/terminate", self.base_url, session_id)
    }
}

/// Subset of the backend's session resource the client reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
}

impl SessionInfo {
    /// Whether the backend already closed this session.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("completed") | Some("terminated") | Some("submitted")
        )
    }
}

/// Async backend client.
pub struct BackendClient {
    config: BackendConfig,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, ReportingError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReportingError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.token {
            Some(ref token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ReportingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ReportingError::Server {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn post_violation(&self, record: &ViolationRecord) -> Result<(), ReportingError> {
        let response = self
            .authorize(self.client.post(self.config.violations_url()))
            .json(record)
            .send()
            .await
            .map_err(|e| ReportingError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn log_permission(&self, record: &PermissionLogRecord) -> Result<(), ReportingError> {
        let response = self
            .authorize(self.client.post(self.config.permission_log_url()))
            .json(record)
            .send()
            .await
            .map_err(|e| ReportingError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, ReportingError> {
        let response = self
            .authorize(self.client.get(self.config.session_url(session_id)))
            .send()
            .await
            .map_err(|e| ReportingError::Network(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| ReportingError::Serialization(e.to_string()))
    }

    pub async fn terminate_session(&self, session_id: &str) -> Result<(), ReportingError> {
        let response = self
            .authorize(self.client.post(self.config.terminate_url(session_id)))
            .send()
            .await
            .map_err(|e| ReportingError::Network(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    /// Terminate a session unless the backend already closed it.
    pub async fn auto_submit(&self, session_id: &str) -> Result<(), ReportingError> {
        let session = self.fetch_session(session_id).await?;
        if session.is_closed() {
            tracing::info!(session_id, "session already closed on backend, skipping terminate");
            return Ok(());
        }
        self.terminate_session(session_id).await
    }

    pub async fn deliver(&self, record: &Outbound) -> Result<(), ReportingError> {
        match record {
            Outbound::Violation(v) => self.post_violation(v).await,
            Outbound::Permission(p) => self.log_permission(p).await,
            Outbound::Terminate { session_id } => self.auto_submit(session_id).await,
        }
    }
}

/// Blocking backend client for the report worker thread.
pub struct BlockingBackendClient {
    inner: BackendClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingBackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, ReportingError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ReportingError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: BackendClient::new(config)?,
            runtime,
        })
    }

    pub fn fetch_session(&self, session_id: &str) -> Result<SessionInfo, ReportingError> {
        self.runtime.block_on(self.inner.fetch_session(session_id))
    }
}

impl ReportSink for BlockingBackendClient {
    fn deliver(&mut self, record: &Outbound) -> Result<(), ReportingError> {
        self.runtime.block_on(self.inner.deliver(record))
    }
}
