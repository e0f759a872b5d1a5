use reqwest::StatusCode;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::github::ReleaseSource;
use crate::model::{FormatMode, NotificationMessage, ReleaseStateMap, RepositoryRef};
use crate::state::StateStore;
use crate::telegram::NotificationSender;

/// Result of checking a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoOutcome {
    New { release_id: String, delivered: bool },
    Unchanged,
    FetchError { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoReport {
    pub repository: String,
    #[serde(flatten)]
    pub outcome: RepoOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub repositories_checked: usize,
    pub new_releases: usize,
    pub unchanged: usize,
    pub fetch_errors: usize,
    pub notifications_sent: usize,
    pub state_saved: bool,
    pub reports: Vec<RepoReport>,
}

impl CheckSummary {
    fn record(&mut self, repository: &RepositoryRef, outcome: RepoOutcome) {
        self.repositories_checked += 1;
        match &outcome {
            RepoOutcome::New { delivered, .. } => {
                self.new_releases += 1;
                if *delivered {
                    self.notifications_sent += 1;
                }
            }
            RepoOutcome::Unchanged => self.unchanged += 1,
            RepoOutcome::FetchError { .. } => self.fetch_errors += 1,
        }
        self.reports.push(RepoReport {
            repository: repository.to_string(),
            outcome,
        });
    }
}

/// One pass over the configured repositories: load state, compare each
/// latest release with the recorded id, notify on change, save once.
pub struct ReleaseChecker<'a> {
    repositories: &'a [RepositoryRef],
    source: &'a dyn ReleaseSource,
    store: &'a dyn StateStore,
    sender: &'a NotificationSender,
}

impl<'a> ReleaseChecker<'a> {
    pub fn new(
        repositories: &'a [RepositoryRef],
        source: &'a dyn ReleaseSource,
        store: &'a dyn StateStore,
        sender: &'a NotificationSender,
    ) -> Self {
        Self {
            repositories,
            source,
            store,
            sender,
        }
    }

    #[instrument(skip_all, fields(repositories = self.repositories.len()))]
    pub async fn run(&self) -> CheckSummary {
        let mut state = self.store.load().await;
        let mut summary = CheckSummary::default();

        for repo in self.repositories {
            let outcome = self.check_repository(repo, &mut state).await;
            summary.record(repo, outcome);
        }

        // Saved once, after every repository; a crash before this point
        // means the next run notifies again rather than losing a release.
        summary.state_saved = self.store.save(&state).await;
        info!(
            checked = summary.repositories_checked,
            new = summary.new_releases,
            sent = summary.notifications_sent,
            failed = summary.fetch_errors,
            saved = summary.state_saved,
            "release check finished"
        );
        summary
    }

    async fn check_repository(&self, repo: &RepositoryRef, state: &mut ReleaseStateMap) -> RepoOutcome {
        let release = match self.source.latest_release(repo).await {
            Ok(release) => release,
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                warn!(repository = %repo, %err, "repository has no published release");
                return RepoOutcome::FetchError {
                    error: err.to_string(),
                };
            }
            Err(err) => {
                warn!(repository = %repo, %err, "failed to fetch latest release");
                return RepoOutcome::FetchError {
                    error: err.to_string(),
                };
            }
        };

        let key = repo.to_string();
        if state.get(&key) == Some(&release.id) {
            info!(repository = %repo, release_id = %release.id, "no new release");
            return RepoOutcome::Unchanged;
        }

        let message = NotificationMessage::for_release(repo, &release);
        let delivered = self.sender.send(&message.render(), FormatMode::Html).await;
        if delivered {
            info!(repository = %repo, release = %message.title, "notification sent");
        } else {
            error!(repository = %repo, release = %message.title, "failed to send notification");
        }

        // Recorded even when delivery failed so one bad release cannot wedge the repository.
        state.insert(key, release.id.clone());
        RepoOutcome::New {
            release_id: release.id,
            delivered,
        }
    }
}
