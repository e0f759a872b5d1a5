//! Latest-release lookups against the GitHub REST API.
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::model::{ReleaseInfo, RepositoryRef};

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "release-watchbot/0.1";
/// Error bodies are clipped to this many chars before landing in logs.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid GitHub URL for {0}")]
    InvalidUrl(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// HTTP status of a non-2xx reply; `None` for failures before a reply.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Where latest-release metadata comes from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self, repo: &RepositoryRef) -> Result<ReleaseInfo, FetchError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Shared HTTP client settings for every outbound call of the job.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

impl GitHubClient {
    pub fn new(http: Client, mut base_url: Url, token: Option<String>) -> Self {
        // Url::join would otherwise replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let http = http_client(cfg.request_timeout())?;
        let base_url = Url::parse(&cfg.github.api_base)?;
        Ok(Self::new(http, base_url, cfg.github.token.clone()))
    }

    /// Request builder carrying the GitHub API headers (and auth when a token
    /// is configured). Without a token calls fall back to anonymous rate limits.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, FetchError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| FetchError::InvalidUrl(path.to_string()))?;
        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    pub fn latest_release_request(&self, repo: &RepositoryRef) -> Result<reqwest::Request, FetchError> {
        let path = format!("repos/{}/{}/releases/latest", repo.owner(), repo.name());
        self.request(Method::GET, &path)?
            .build()
            .map_err(|source| FetchError::Transport { url: path, source })
    }

    /// Send a prepared request and decode a JSON response.
    pub async fn send_json<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, FetchError> {
        let url = request.url().to_string();
        debug!(method = %request.method(), %url, "github request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = res.status();
        let body = res.text().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status,
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        serde_json::from_str(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn latest_release(&self, repo: &RepositoryRef) -> Result<ReleaseInfo, FetchError> {
        let request = self.latest_release_request(repo)?;
        self.send_json(request).await
    }
}
