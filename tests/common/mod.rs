#![allow(dead_code)]

use async_trait::async_trait;
use release_watchbot::github::{FetchError, ReleaseSource};
use release_watchbot::model::{FormatMode, ReleaseInfo, ReleaseStateMap, RepositoryRef};
use release_watchbot::state::StateStore;
use release_watchbot::telegram::{ChatTransport, DeliveryError};
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn repo(s: &str) -> RepositoryRef {
    s.parse().unwrap()
}

pub fn release(id: &str, name: &str, body: &str) -> ReleaseInfo {
    ReleaseInfo {
        id: id.into(),
        name: Some(name.into()),
        tag_name: Some(name.into()),
        body: Some(body.into()),
        html_url: format!("https://x/{}", id),
        published_at: None,
    }
}

pub fn state(entries: &[(&str, &str)]) -> ReleaseStateMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Latest releases keyed by repository; repositories in `failing` answer 502.
#[derive(Clone, Default)]
pub struct FakeSource {
    releases: Arc<Mutex<HashMap<String, ReleaseInfo>>>,
    failing: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSource {
    pub async fn publish(&self, repo: &str, release: ReleaseInfo) {
        self.releases.lock().await.insert(repo.to_string(), release);
    }

    pub async fn fail(&self, repo: &str) {
        self.failing.lock().await.push(repo.to_string());
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ReleaseSource for FakeSource {
    async fn latest_release(&self, repo: &RepositoryRef) -> Result<ReleaseInfo, FetchError> {
        let key = repo.to_string();
        self.calls.lock().await.push(key.clone());
        let url = format!("https://api.github.com/repos/{}/releases/latest", key);
        if self.failing.lock().await.contains(&key) {
            return Err(FetchError::Status {
                url,
                status: StatusCode::BAD_GATEWAY,
                body: "upstream unavailable".into(),
            });
        }
        self.releases
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or(FetchError::Status {
                url,
                status: StatusCode::NOT_FOUND,
                body: "Not Found".into(),
            })
    }
}

/// In-memory state document that remembers every save.
#[derive(Clone, Default)]
pub struct MemoryStore {
    current: Arc<Mutex<ReleaseStateMap>>,
    saves: Arc<Mutex<Vec<ReleaseStateMap>>>,
}

impl MemoryStore {
    pub fn with_state(state: ReleaseStateMap) -> Self {
        Self {
            current: Arc::new(Mutex::new(state)),
            ..Default::default()
        }
    }

    pub async fn current(&self) -> ReleaseStateMap {
        self.current.lock().await.clone()
    }

    pub async fn saves(&self) -> Vec<ReleaseStateMap> {
        self.saves.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> ReleaseStateMap {
        self.current.lock().await.clone()
    }

    async fn save(&self, state: &ReleaseStateMap) -> bool {
        *self.current.lock().await = state.clone();
        self.saves.lock().await.push(state.clone());
        true
    }
}

/// Chat transport answering from a script (defaulting to success) and
/// recording every attempt.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    responses: Arc<Mutex<VecDeque<Result<(), DeliveryError>>>>,
    attempts: Arc<Mutex<Vec<(String, FormatMode)>>>,
}

impl RecordingTransport {
    pub fn with_responses(responses: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub async fn attempts(&self) -> Vec<(String, FormatMode)> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, text: &str, mode: FormatMode) -> Result<(), DeliveryError> {
        self.attempts.lock().await.push((text.to_string(), mode));
        self.responses.lock().await.pop_front().unwrap_or(Ok(()))
    }
}
