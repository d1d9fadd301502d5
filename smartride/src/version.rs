//! Running image version and GitHub release check.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

pub const IMAGE_TAG_VAR: &str = "IMAGE_TAG";
pub const DEFAULT_TAGS_URL: &str =
    "https://api.github.com/repos/VictorHachard/e42-rain-smartride/tags";
pub const RELEASES_URL: &str = "https://github.com/VictorHachard/e42-rain-smartride/releases/tag";
pub const FOOTER_PREFIX: &str = "E42 Rain Smartride";

/// Release page for `tag`
pub fn release_url(tag: &str) -> String {
    format!("{}/{}", RELEASES_URL, tag)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Either version could not be determined
    Unknown,
    UpToDate(String),
    Available { current: String, latest: String },
}

impl UpdateStatus {
    pub fn current(&self) -> Option<&str> {
        match self {
            UpdateStatus::Unknown => None,
            UpdateStatus::UpToDate(current) => Some(current),
            UpdateStatus::Available { current, .. } => Some(current),
        }
    }

    /// Footer text for every Discord embed
    pub fn footer(&self) -> String {
        match self.current() {
            Some(current) => format!("{} {}", FOOTER_PREFIX, current),
            None => FOOTER_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Image tag baked into the container, if any
pub fn current_version() -> Option<String> {
    match std::env::var(IMAGE_TAG_VAR) {
        Ok(tag) if !tag.is_empty() => {
            info!("Current image version: {}", tag);
            Some(tag)
        }
        _ => {
            warn!("Could not retrieve current image version");
            None
        }
    }
}

pub struct VersionChecker {
    http_client: reqwest::Client,
    tags_url: String,
}

impl VersionChecker {
    pub fn new(tags_url: impl Into<String>, user_agent: Option<&str>) -> reqwest::Result<Self> {
        // GitHub rejects API calls without a User-Agent.
        let user_agent = user_agent.unwrap_or(FOOTER_PREFIX).to_string();
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http_client,
            tags_url: tags_url.into(),
        })
    }

    /// Name of the first tag listed by the repository. Failures are logged.
    pub async fn latest_tag(&self) -> Option<String> {
        let tags = match self.fetch_tags().await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Failed to fetch latest GitHub tag: {}", e);
                return None;
            }
        };

        match tags.into_iter().next() {
            Some(tag) => {
                info!("Latest GitHub tag: {}", tag.name);
                Some(tag.name)
            }
            None => {
                warn!("No tags found in the repository");
                None
            }
        }
    }

    async fn fetch_tags(&self) -> reqwest::Result<Vec<Tag>> {
        self.http_client
            .get(&self.tags_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn check(&self, current: Option<String>) -> UpdateStatus {
        let latest = self.latest_tag().await;
        compare(current, latest)
    }
}

pub fn compare(current: Option<String>, latest: Option<String>) -> UpdateStatus {
    match (current, latest) {
        (Some(current), Some(latest)) if current != latest => {
            info!("New version available: {}", latest);
            UpdateStatus::Available { current, latest }
        }
        (Some(current), Some(_)) => {
            info!("Running the latest version");
            UpdateStatus::UpToDate(current)
        }
        _ => {
            warn!("Could not verify version information");
            UpdateStatus::Unknown
        }
    }
}
