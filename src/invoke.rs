//! Single-shot invocation: build the components from config, run one check,
//! and describe the outcome as a status code plus JSON body.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::checker::{CheckSummary, ReleaseChecker};
use crate::config::Config;
use crate::github::GitHubClient;
use crate::state::GistStateStore;
use crate::telegram::NotificationSender;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: Value,
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// The JSON body as written to stdout.
    pub fn render_body(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.body)
    }
}

/// Run one check. Individual repository or delivery failures still produce
/// a 200; only failing to set the job up at all is an error.
pub async fn run(cfg: &Config) -> anyhow::Result<InvocationResponse> {
    let github = GitHubClient::from_config(cfg)?;
    let store = GistStateStore::from_config(cfg, github.clone());
    let sender = NotificationSender::from_config(cfg)?;

    let checker = ReleaseChecker::new(&cfg.github.repositories, &github, &store, &sender);
    let summary = checker.run().await;
    Ok(completed(&summary, Utc::now()))
}

/// Like [`run`], with setup errors turned into a 500 response.
pub async fn handle(cfg: &Config) -> InvocationResponse {
    match run(cfg).await {
        Ok(response) => response,
        Err(err) => {
            error!(?err, "release check could not run");
            failure(&err)
        }
    }
}

pub fn completed(summary: &CheckSummary, checked_at: DateTime<Utc>) -> InvocationResponse {
    InvocationResponse {
        status_code: 200,
        body: json!({
            "message": "GitHub releases check completed successfully",
            "repositories_checked": summary.repositories_checked,
            "new_releases": summary.new_releases,
            "notifications_sent": summary.notifications_sent,
            "fetch_errors": summary.fetch_errors,
            "state_saved": summary.state_saved,
            "checked_at": checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "results": summary.reports,
        }),
    }
}

pub fn failure(err: &anyhow::Error) -> InvocationResponse {
    InvocationResponse {
        status_code: 500,
        body: json!({
            "message": "GitHub releases check failed",
            "error": format!("{:#}", err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{RepoOutcome, RepoReport};
    use chrono::TimeZone;

    #[test]
    fn completed_body_reports_counts() {
        let summary = CheckSummary {
            repositories_checked: 3,
            new_releases: 1,
            unchanged: 1,
            fetch_errors: 1,
            notifications_sent: 1,
            state_saved: true,
            reports: vec![RepoReport {
                repository: "o/a".into(),
                outcome: RepoOutcome::Unchanged,
            }],
        };
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let response = completed(&summary, at);
        assert!(response.is_success());
        assert_eq!(response.body["repositories_checked"], 3);
        assert_eq!(response.body["new_releases"], 1);
        assert_eq!(response.body["state_saved"], true);
        assert_eq!(response.body["checked_at"], "2024-05-01T12:00:00Z");
        assert_eq!(response.body["results"][0]["status"], "unchanged");
    }

    #[test]
    fn failure_is_500_with_detail() {
        let err = anyhow::anyhow!("bad config").context("setup");
        let response = failure(&err);
        assert_eq!(response.status_code, 500);
        assert!(!response.is_success());
        assert_eq!(response.body["error"], "setup: bad config");
    }

    #[test]
    fn rendered_output_is_the_body_only() {
        let response = failure(&anyhow::anyhow!("bad config"));
        let rendered: Value = serde_json::from_str(&response.render_body().unwrap()).unwrap();
        assert_eq!(rendered, response.body);
        assert!(rendered.get("status_code").is_none());
        assert_eq!(rendered["message"], "GitHub releases check failed");
    }
}
