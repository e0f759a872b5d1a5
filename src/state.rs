//! Persistence of last-seen release ids in a GitHub Gist.
//!
//! Both directions fail soft: a state document that cannot be read is
//! treated as empty, and a save that fails is logged and reported as `false`.
//! There is no versioning on the document, so overlapping runs may overwrite
//! each other's updates.
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::github::{FetchError, GitHubClient};
use crate::model::ReleaseStateMap;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("file {0} not found in gist")]
    MissingFile(String),
    #[error("state content is not a JSON object of release ids: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Previously recorded ids; empty when nothing could be read.
    async fn load(&self) -> ReleaseStateMap;

    /// Replace the stored ids. Returns whether the document was written.
    async fn save(&self, state: &ReleaseStateMap) -> bool;
}

#[derive(Debug, Deserialize)]
pub struct GistDocument {
    #[serde(default)]
    pub files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
pub struct GistFile {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GistStateStore {
    client: GitHubClient,
    gist_id: Option<String>,
    filename: String,
}

impl GistStateStore {
    pub fn new(client: GitHubClient, gist_id: Option<String>, filename: String) -> Self {
        Self {
            client,
            gist_id,
            filename,
        }
    }

    pub fn from_config(cfg: &Config, client: GitHubClient) -> Self {
        Self::new(client, cfg.gist.id.clone(), cfg.gist.filename.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.gist_id.is_some()
    }

    pub async fn try_load(&self, gist_id: &str) -> Result<ReleaseStateMap, StateError> {
        let request = self
            .client
            .request(Method::GET, &format!("gists/{}", gist_id))?
            .build()
            .map_err(|source| FetchError::Transport {
                url: format!("gists/{}", gist_id),
                source,
            })?;
        let doc: GistDocument = self.client.send_json(request).await?;
        parse_state(&doc, &self.filename)
    }

    pub fn update_request(
        &self,
        gist_id: &str,
        state: &ReleaseStateMap,
    ) -> Result<reqwest::Request, StateError> {
        let content = serde_json::to_string_pretty(state).map_err(StateError::Encode)?;
        let mut files = Map::new();
        files.insert(self.filename.clone(), json!({ "content": content }));
        let payload = json!({ "files": Value::Object(files) });
        let path = format!("gists/{}", gist_id);
        let request = self
            .client
            .request(Method::PATCH, &path)?
            .json(&payload)
            .build()
            .map_err(|source| FetchError::Transport { url: path, source })?;
        Ok(request)
    }

    pub async fn try_save(&self, gist_id: &str, state: &ReleaseStateMap) -> Result<(), StateError> {
        let request = self.update_request(gist_id, state)?;
        let _: serde_json::Value = self.client.send_json(request).await?;
        Ok(())
    }
}

/// Extract the id map from a gist payload.
pub fn parse_state(doc: &GistDocument, filename: &str) -> Result<ReleaseStateMap, StateError> {
    let content = doc
        .files
        .get(filename)
        .and_then(|f| f.content.as_deref())
        .ok_or_else(|| StateError::MissingFile(filename.to_string()))?;
    if content.trim().is_empty() {
        return Ok(ReleaseStateMap::new());
    }
    serde_json::from_str(content).map_err(StateError::Malformed)
}

#[async_trait]
impl StateStore for GistStateStore {
    #[instrument(skip_all)]
    async fn load(&self) -> ReleaseStateMap {
        let Some(gist_id) = self.gist_id.as_deref() else {
            warn!("no gist id configured; starting from empty release state");
            return ReleaseStateMap::new();
        };
        match self.try_load(gist_id).await {
            Ok(state) => {
                info!(entries = state.len(), "loaded release state");
                state
            }
            Err(err) => {
                warn!(%err, "could not load release state; starting from empty state");
                ReleaseStateMap::new()
            }
        }
    }

    #[instrument(skip_all)]
    async fn save(&self, state: &ReleaseStateMap) -> bool {
        let Some(gist_id) = self.gist_id.as_deref() else {
            warn!("no gist id configured; release state not saved");
            return false;
        };
        match self.try_save(gist_id, state).await {
            Ok(()) => {
                info!(entries = state.len(), "saved release state");
                true
            }
            Err(err) => {
                warn!(%err, "failed to save release state");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::http_client;
    use reqwest::Url;
    use std::time::Duration;

    const FILE: &str = "github_releases_data.json";

    fn store(gist_id: Option<&str>) -> GistStateStore {
        let client = GitHubClient::new(
            http_client(Duration::from_secs(5)).unwrap(),
            Url::parse("https://api.github.com/").unwrap(),
            Some("token".into()),
        );
        GistStateStore::new(client, gist_id.map(str::to_string), FILE.into())
    }

    fn doc(value: serde_json::Value) -> GistDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_state_reads_named_file() {
        let d = doc(json!({
            "files": { FILE: { "content": "{\"nestjs/nest\": \"123\"}" } }
        }));
        let state = parse_state(&d, FILE).unwrap();
        assert_eq!(state.get("nestjs/nest").map(String::as_str), Some("123"));
    }

    #[test]
    fn parse_state_errors() {
        let missing = doc(json!({ "files": { "other.json": { "content": "{}" } } }));
        assert!(matches!(parse_state(&missing, FILE), Err(StateError::MissingFile(_))));

        let garbage = doc(json!({ "files": { FILE: { "content": "not json" } } }));
        assert!(matches!(parse_state(&garbage, FILE), Err(StateError::Malformed(_))));

        let wrong_shape = doc(json!({ "files": { FILE: { "content": "[1, 2]" } } }));
        assert!(matches!(parse_state(&wrong_shape, FILE), Err(StateError::Malformed(_))));

        let blank = doc(json!({ "files": { FILE: { "content": "" } } }));
        assert!(parse_state(&blank, FILE).unwrap().is_empty());
    }

    #[test]
    fn update_request_replaces_file_content() {
        let mut state = ReleaseStateMap::new();
        state.insert("owner/repo".into(), "42".into());
        let request = store(Some("abc")).update_request("abc", &state).unwrap();
        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(request.url().path(), "/gists/abc");

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(body).unwrap();
        let content = payload["files"][FILE]["content"].as_str().unwrap();
        let saved: ReleaseStateMap = serde_json::from_str(content).unwrap();
        assert_eq!(saved, state);
    }

    #[tokio::test]
    async fn without_gist_id_state_is_not_persisted() {
        let store = store(None);
        assert!(!store.is_enabled());
        assert!(store.load().await.is_empty());
        assert!(!store.save(&ReleaseStateMap::new()).await);
    }

    #[tokio::test]
    async fn unreachable_gist_fails_soft() {
        let client = GitHubClient::new(
            http_client(Duration::from_secs(2)).unwrap(),
            Url::parse("http://127.0.0.1:1/").unwrap(),
            None,
        );
        let store = GistStateStore::new(client, Some("abc".into()), FILE.into());
        assert!(store.is_enabled());
        assert!(store.load().await.is_empty());

        let mut state = ReleaseStateMap::new();
        state.insert("owner/repo".into(), "42".into());
        assert!(!store.save(&state).await);
    }
}
