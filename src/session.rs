//! Session context shared by every transfer call.
//!
//! A [`SessionContext`] bundles the base server URL, the session id, the HTTP
//! client and a cancellation token. It is passed explicitly into the
//! orchestrator, the backend strategies and the API client; there is no
//! process-wide session state.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{TransferError, ValidationError};

/// Explicit per-session state for talking to the slide management service.
#[derive(Debug, Clone)]
pub struct SessionContext {
    server_url: Url,
    session_id: String,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl SessionContext {
    /// Create a context with a default HTTP client and no request timeout.
    pub fn new(server_url: &str, session_id: impl Into<String>) -> Result<Self, TransferError> {
        Self::with_timeout(server_url, session_id, None)
    }

    /// Create a context whose HTTP client applies `timeout` to every request.
    pub fn with_timeout(
        server_url: &str,
        session_id: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, TransferError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self::with_http_client(
            normalize_server_url(server_url)?,
            session_id,
            http,
        ))
    }

    /// Create a context around an already configured HTTP client.
    pub fn with_http_client(
        server_url: Url,
        session_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            server_url,
            session_id: session_id.into(),
            http,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token (e.g. with a child of an app-wide token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Base server URL, always ending with `/`.
    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Build a service URL from a path relative to the server root.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransferError> {
        self.server_url
            .join(path)
            .map_err(|e| TransferError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Run one suspension point, racing it against cancellation.
    ///
    /// Cancellation maps to [`TransferError::Cancelled`]; the inner future is
    /// dropped, which aborts any in-flight request.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, TransferError>
    where
        F: Future<Output = Result<T, TransferError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
            result = fut => result,
        }
    }

    /// Send a request under cancellation, mapping transport failures.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransferError> {
        self.run(async move { request.send().await.map_err(TransferError::from) })
            .await
    }
}

/// Normalize a server URL: add `http://` when no scheme is given and make sure
/// the path ends with `/` so relative endpoints join underneath it.
pub fn normalize_server_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            field: "server_url",
        });
    }

    let lower = trimmed.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|_| ValidationError::InvalidUrl {
        field: "server_url",
        value: raw.to_string(),
    })?;

    if url.host_str().is_none() {
        return Err(ValidationError::InvalidUrl {
            field: "server_url",
            value: raw.to_string(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
