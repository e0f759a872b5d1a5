use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::markup;

/// Last-seen release id per repository, keyed by `owner/name`.
pub type ReleaseStateMap = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid repository reference {0:?}: expected owner/name")]
pub struct InvalidRepositoryRef(pub String);

/// A monitored repository in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryRef {
    owner: String,
    name: String,
}

impl RepositoryRef {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepositoryRef {
    type Err = InvalidRepositoryRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRepositoryRef(s.to_string());
        let (owner, name) = s.split_once('/').ok_or_else(invalid)?;
        let well_formed = |part: &str| {
            !part.is_empty() && !part.contains('/') && !part.chars().any(char::is_whitespace)
        };
        if !well_formed(owner) || !well_formed(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl TryFrom<String> for RepositoryRef {
    type Error = InvalidRepositoryRef;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepositoryRef> for String {
    fn from(value: RepositoryRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Latest release metadata as returned by the release source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl ReleaseInfo {
    /// Display title; GitHub leaves `name` null for tag-only releases.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.tag_name.as_deref())
            .unwrap_or(&self.id)
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unsupported release id: {other}"))),
    }
}

/// Delivery formatting requested from the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    Html,
    Plain,
}

impl FormatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatMode::Html => "HTML",
            FormatMode::Plain => "plain",
        }
    }
}

/// Chat message announcing a new release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub repository: String,
    pub title: String,
    pub notes: String,
    pub url: String,
}

impl NotificationMessage {
    pub fn for_release(repository: &RepositoryRef, release: &ReleaseInfo) -> Self {
        Self {
            repository: repository.to_string(),
            title: release.display_name().to_string(),
            notes: markup::convert(release.body.as_deref()),
            url: release.html_url.clone(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "🚀 <b>New {} Release: {}</b>\n\n<b>Release Notes:</b>\n{}\n\n<a href=\"{}\">View Release</a>",
            self.repository, self.title, self.notes, self.url
        )
    }
}
