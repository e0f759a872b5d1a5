//! Configuration loader and validator for the release watcher.
//!
//! Settings come from an optional YAML file; secrets and ids may be supplied
//! (or overridden) through the environment. Missing credentials are not
//! validation errors: they switch off the feature that needs them.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::model::RepositoryRef;

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_ACCESS_TOKEN";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_GIST_ID: &str = "GIST_ID";

const DEFAULT_API_BASE: &str = "https://api.github.com/";
const DEFAULT_STATE_FILENAME: &str = "github_releases_data.json";
const DEFAULT_REPOSITORIES: [&str; 3] = [
    "nestjs/nest",
    "slackapi/slack-github-action",
    "microsoft/typescript",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub github: GitHub,
    pub telegram: Telegram,
    pub gist: Gist,
}

/// Job-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub request_timeout_secs: u64,
    pub disable_link_preview: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            disable_link_preview: false,
        }
    }
}

/// Release source settings and the monitored repositories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitHub {
    pub api_base: String,
    pub token: Option<String>,
    pub repositories: Vec<RepositoryRef>,
}

impl Default for GitHub {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            repositories: DEFAULT_REPOSITORIES
                .iter()
                .filter_map(|r| r.parse().ok())
                .collect(),
        }
    }
}

/// Telegram delivery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: Option<String>,
    /// Numeric chat id or `@channel` username.
    pub chat_id: Option<String>,
}

/// State document settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Gist {
    pub id: Option<String>,
    pub filename: String,
}

impl Default for Gist {
    fn default() -> Self {
        Self {
            id: None,
            filename: DEFAULT_STATE_FILENAME.to_string(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.app.request_timeout_secs)
    }

    /// Overlay environment-provided secrets and ids. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(ENV_GITHUB_TOKEN) {
            self.github.token = Some(v);
        }
        if let Some(v) = get(ENV_TELEGRAM_BOT_TOKEN) {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get(ENV_TELEGRAM_CHAT_ID) {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = get(ENV_GIST_ID) {
            self.gist.id = Some(v);
        }
    }

    /// Blank optional values behave exactly like absent ones.
    fn normalize(&mut self) {
        for slot in [
            &mut self.github.token,
            &mut self.telegram.bot_token,
            &mut self.telegram.chat_id,
            &mut self.gist.id,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }
    }
}

/// Load configuration from a YAML file, overlay the process environment and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A missing file is not an error; defaults apply.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = match fs::read_to_string(path) {
        Ok(content) => serde_yaml::from_str::<Config>(&content)?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found; using defaults");
            Config::default()
        }
        Err(err) => return Err(err.into()),
    };
    cfg.apply_env(lookup);
    cfg.normalize();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }
    if cfg.github.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("github.api_base must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.github.api_base).is_err() {
        return Err(ConfigError::Invalid("github.api_base must be an absolute URL"));
    }
    if cfg.github.repositories.is_empty() {
        return Err(ConfigError::Invalid("github.repositories must list at least one repository"));
    }
    if cfg.gist.filename.trim().is_empty() {
        return Err(ConfigError::Invalid("gist.filename must be non-empty"));
    }
    Ok(())
}

/// Example configuration file.
pub fn example() -> &'static str {
    r#"app:
  request_timeout_secs: 30
  disable_link_preview: false

github:
  api_base: "https://api.github.com/"
  # token: "YOUR_GITHUB_ACCESS_TOKEN"   # or GITHUB_ACCESS_TOKEN
  repositories:
    - nestjs/nest
    - slackapi/slack-github-action
    - microsoft/typescript

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"   # or TELEGRAM_BOT_TOKEN
  chat_id: "-1001234567890"              # or TELEGRAM_CHAT_ID

gist:
  id: "YOUR_GIST_ID"                     # or GIST_ID
  filename: "github_releases_data.json"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.github.repositories.len(), 3);
        assert_eq!(cfg.gist.filename, "github_releases_data.json");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_with_env(Some(td.path().join("absent.yaml").as_path()), no_env).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.github.repositories[0].to_string(), "nestjs/nest");
        assert!(cfg.telegram.bot_token.is_none());
        assert!(cfg.gist.id.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_TELEGRAM_BOT_TOKEN, "env-token"),
            (ENV_GIST_ID, "env-gist"),
            (ENV_TELEGRAM_CHAT_ID, "  "),
        ]);
        let cfg = load_with_env(Some(p.as_path()), |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.telegram.bot_token.as_deref(), Some("env-token"));
        assert_eq!(cfg.gist.id.as_deref(), Some("env-gist"));
        // blank env value leaves the file value in place
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("-1001234567890"));
    }

    #[test]
    fn blank_values_are_absent() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, "telegram:\n  bot_token: \"\"\ngist:\n  id: \" \"\n").unwrap();
        let cfg = load_with_env(Some(p.as_path()), no_env).unwrap();
        assert!(cfg.telegram.bot_token.is_none());
        assert!(cfg.gist.id.is_none());
    }

    #[test]
    fn invalid_values_rejected() {
        let mut cfg = Config::default();
        cfg.app.request_timeout_secs = 0;
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("request_timeout_secs")),
            _ => panic!("wrong error"),
        }

        let mut cfg = Config::default();
        cfg.github.repositories.clear();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("repositories")),
            _ => panic!("wrong error"),
        }

        let mut cfg = Config::default();
        cfg.gist.filename = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.github.api_base = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_repository_is_parse_error() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, "github:\n  repositories:\n    - not-a-repo\n").unwrap();
        assert!(matches!(load_with_env(Some(p.as_path()), no_env), Err(ConfigError::Parse(_))));
    }
}
