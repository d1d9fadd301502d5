//! Discord webhook notifications.
//!
//! [`NotificationService`] turns a title, description and fields into
//! webhook embeds that respect Discord's limits, and [`NotificationManager`]
//! maps each [`NotificationKind`] to its template.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_TITLE_LENGTH: usize = 256;
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;
pub const MAX_FIELD_COUNT: usize = 25;
pub const MAX_FIELD_NAME_LENGTH: usize = 256;
pub const MAX_FIELD_VALUE_LENGTH: usize = 1024;
pub const MAX_FOOTER_TEXT_LENGTH: usize = 2048;

const TRUNCATION_PLACEHOLDER: &str = "...";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Webhook rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Shorten `text` to at most `max_length` characters, cutting at the last
/// space when there is one and appending `...`.
pub fn smart_truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let keep = max_length.saturating_sub(TRUNCATION_PLACEHOLDER.len());
    let truncated: String = text.chars().take(keep).collect();
    let truncated = match truncated.rfind(' ') {
        Some(last_space) => &truncated[..last_space],
        None => truncated.as_str(),
    };

    format!("{}{}", truncated.trim_end(), TRUNCATION_PLACEHOLDER)
}

/// `#0dcaf0` or `0dcaf0` to the integer Discord expects
pub fn parse_color(color: &str) -> Option<u32> {
    u32::from_str_radix(color.trim_start_matches('#'), 16).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &WebhookMessage) -> NotifyResult<()>;

    fn notifier_name(&self) -> &'static str;
}

/// Posts messages to a Discord webhook URL
pub struct DiscordWebhook {
    http_client: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, user_agent: Option<&str>) -> NotifyResult<Self> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NotifyError::InvalidConfig {
                message: "Webhook URL must start with http:// or https://".to_string(),
            });
        }

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }

        Ok(Self {
            http_client: builder.build()?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn deliver(&self, message: &WebhookMessage) -> NotifyResult<()> {
        let response = self.http_client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "discord"
    }
}

/// Formats embeds within Discord's limits and hands them to a [`Notifier`]
pub struct NotificationService {
    notifier: Box<dyn Notifier>,
    mention_users: Vec<String>,
    footer: String,
}

impl NotificationService {
    pub fn new(notifier: Box<dyn Notifier>, mention_users: Vec<String>, footer: &str) -> Self {
        let footer = if footer.chars().count() > MAX_FOOTER_TEXT_LENGTH {
            warn!("Footer text exceeds maximum length. Truncating.");
            footer.chars().take(MAX_FOOTER_TEXT_LENGTH).collect()
        } else {
            footer.to_string()
        };

        Self {
            notifier,
            mention_users,
            footer,
        }
    }

    pub fn footer(&self) -> &str {
        &self.footer
    }

    fn validate_fields(fields: &[(String, String)]) -> Vec<EmbedField> {
        fields
            .iter()
            .map(|(name, value)| {
                let name = if name.chars().count() > MAX_FIELD_NAME_LENGTH {
                    warn!("Field name '{}' exceeds maximum length. Truncating.", name);
                    smart_truncate(name, MAX_FIELD_NAME_LENGTH)
                } else {
                    name.clone()
                };
                let value = if value.chars().count() > MAX_FIELD_VALUE_LENGTH {
                    warn!("Field value for '{}' exceeds maximum length. Truncating.", name);
                    smart_truncate(value, MAX_FIELD_VALUE_LENGTH)
                } else if value.is_empty() {
                    "-".to_string()
                } else {
                    value.clone()
                };
                EmbedField {
                    name,
                    value,
                    inline: false,
                }
            })
            .collect()
    }

    /// Build the webhook payload. Fields beyond [`MAX_FIELD_COUNT`] spill
    /// into additional "Continued" embeds.
    pub fn build_message(
        &self,
        title: &str,
        description: &str,
        url: Option<&str>,
        fields: &[(String, String)],
        color: Option<&str>,
        mention_user: bool,
    ) -> WebhookMessage {
        let title = if title.chars().count() > MAX_TITLE_LENGTH {
            warn!("Title exceeds maximum length. Truncating.");
            smart_truncate(title, MAX_TITLE_LENGTH)
        } else {
            title.to_string()
        };
        let description = if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            warn!("Description exceeds maximum length. Truncating.");
            smart_truncate(description, MAX_DESCRIPTION_LENGTH)
        } else {
            description.to_string()
        };

        let fields = Self::validate_fields(fields);
        let chunks: Vec<Vec<EmbedField>> = if fields.is_empty() {
            vec![Vec::new()]
        } else {
            fields
                .chunks(MAX_FIELD_COUNT)
                .map(|chunk| chunk.to_vec())
                .collect()
        };

        let timestamp = Utc::now().to_rfc3339();
        let embeds = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let first = index == 0;
                Embed {
                    title: Some(if first {
                        title.clone()
                    } else {
                        "Continued".to_string()
                    }),
                    description: if first && !description.is_empty() {
                        Some(description.clone())
                    } else {
                        None
                    },
                    url: if first { url.map(str::to_string) } else { None },
                    color: if first { color.and_then(parse_color) } else { None },
                    fields: chunk,
                    footer: EmbedFooter {
                        text: self.footer.clone(),
                    },
                    timestamp: timestamp.clone(),
                }
            })
            .collect();

        let content = if mention_user && !self.mention_users.is_empty() {
            Some(
                self.mention_users
                    .iter()
                    .map(|user| format!("<@{}>", user))
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        } else {
            None
        };

        WebhookMessage { content, embeds }
    }

    pub async fn send(
        &self,
        title: &str,
        description: &str,
        url: Option<&str>,
        fields: &[(String, String)],
        color: Option<&str>,
        mention_user: bool,
    ) -> NotifyResult<()> {
        let message = self.build_message(title, description, url, fields, color, mention_user);
        debug!(
            "Sending '{}' with {} embed(s) via {}",
            title,
            message.embeds.len(),
            self.notifier.notifier_name()
        );
        self.notifier.deliver(&message).await?;
        info!("Notification sent: {}", title);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    SystemStart,
    UpdateAvailable,
    BestDeparture,
    RoundTripDeparture,
    NoRoundTripDeparture,
    NoClearDepartureFound,
    WeatherApiError,
    AgendaError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub title: &'static str,
    pub description: &'static str,
    pub color: &'static str,
    pub mention_user: bool,
}

impl NotificationKind {
    pub fn template(&self) -> Template {
        match self {
            NotificationKind::SystemStart => Template {
                title: "E42 Rain Smartride Started",
                description: "The E42 rain smartride has started successfully.",
                color: "#0dcaf0",
                mention_user: false,
            },
            NotificationKind::UpdateAvailable => Template {
                title: "New Version Available",
                description: "A new version of the E42 rain smartride is available. Please update.",
                color: "#ffc107",
                mention_user: false,
            },
            NotificationKind::BestDeparture => Template {
                title: "Optimal Departure Forecast",
                description: "Here is the detailed weather analysis to help you choose the best time to ride today.",
                color: "#0dcaf0",
                mention_user: false,
            },
            NotificationKind::RoundTripDeparture => Template {
                title: "Round-trip Forecast",
                description: "Here is the round-trip weather forecast for today.",
                color: "#198754",
                mention_user: true,
            },
            NotificationKind::NoRoundTripDeparture => Template {
                title: "No Safe Round Trip",
                description: "No departure and return combination stays under the risk threshold today.",
                color: "#dc3545",
                mention_user: true,
            },
            NotificationKind::NoClearDepartureFound => Template {
                title: "No Clear Departure Found",
                description: "No departure slot could be evaluated in the time window.",
                color: "#ffc107",
                mention_user: false,
            },
            NotificationKind::WeatherApiError => Template {
                title: "API Check Failed",
                description: "Error fetching API data.",
                color: "#dc3545",
                mention_user: false,
            },
            NotificationKind::AgendaError => Template {
                title: "Agenda Check Failed",
                description: "Error fetching or parsing the class agenda.",
                color: "#dc3545",
                mention_user: false,
            },
        }
    }
}

/// A templated notification with optional overrides
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl Notification {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            title: None,
            description: None,
            url: None,
            fields: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        self.fields.extend(fields);
        self
    }
}

pub struct NotificationManager {
    service: NotificationService,
}

impl NotificationManager {
    pub fn new(service: NotificationService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &NotificationService {
        &self.service
    }

    pub async fn send(&self, notification: Notification) -> NotifyResult<()> {
        let template = notification.kind.template();
        let title = notification.title.as_deref().unwrap_or(template.title);
        let description = notification
            .description
            .as_deref()
            .unwrap_or(template.description);

        self.service
            .send(
                title,
                description,
                notification.url.as_deref(),
                &notification.fields,
                Some(template.color),
                template.mention_user,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<WebhookMessage>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, message: &WebhookMessage) -> NotifyResult<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn notifier_name(&self) -> &'static str {
            "recording"
        }
    }

    fn service(mentions: &[&str]) -> (NotificationService, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let service = NotificationService::new(
            Box::new(notifier.clone()),
            mentions.iter().map(|m| m.to_string()).collect(),
            "E42 Rain Smartride v1.2.0",
        );
        (service, notifier)
    }

    fn fields(count: usize) -> Vec<(String, String)> {
        (0..count)
            .map(|i| (format!("field {}", i), format!("value {}", i)))
            .collect()
    }

    #[test]
    fn test_smart_truncate_short_text_untouched() {
        assert_eq!(smart_truncate("short text", 20), "short text");
    }

    #[test]
    fn test_smart_truncate_cuts_at_word_boundary() {
        let truncated = smart_truncate("the quick brown fox jumps", 15);
        assert_eq!(truncated, "the quick...");
        assert!(truncated.chars().count() <= 15);
    }

    #[test]
    fn test_smart_truncate_without_spaces() {
        let truncated = smart_truncate("abcdefghijklmnop", 10);
        assert_eq!(truncated, "abcdefg...");
    }

    #[test]
    fn test_smart_truncate_counts_characters() {
        let text = "é".repeat(20);
        let truncated = smart_truncate(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#0dcaf0"), Some(0x0dcaf0));
        assert_eq!(parse_color("dc3545"), Some(0xdc3545));
        assert_eq!(parse_color("not-a-color"), None);
    }

    #[test]
    fn test_single_embed_without_fields() {
        let (service, _) = service(&[]);
        let message = service.build_message("Title", "Body", Some("https://x"), &[], Some("#0dcaf0"), true);

        assert_eq!(message.embeds.len(), 1);
        assert_eq!(message.content, None);
        let embed = &message.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("Title"));
        assert_eq!(embed.url.as_deref(), Some("https://x"));
        assert_eq!(embed.color, Some(0x0dcaf0));
        assert_eq!(embed.footer.text, "E42 Rain Smartride v1.2.0");
    }

    #[test]
    fn test_fields_split_into_continued_embeds() {
        let (service, _) = service(&[]);
        let message = service.build_message("Title", "Body", None, &fields(60), Some("#0dcaf0"), false);

        assert_eq!(message.embeds.len(), 3);
        assert_eq!(message.embeds[0].fields.len(), 25);
        assert_eq!(message.embeds[1].fields.len(), 25);
        assert_eq!(message.embeds[2].fields.len(), 10);
        assert_eq!(message.embeds[1].title.as_deref(), Some("Continued"));
        assert_eq!(message.embeds[1].description, None);
        assert_eq!(message.embeds[1].color, None);
        assert_eq!(message.embeds[2].fields[0].name, "field 50");
        assert!(message.embeds.iter().all(|e| e.footer.text == service.footer()));
    }

    #[test]
    fn test_long_content_truncated() {
        let (service, _) = service(&[]);
        let long_value = "word ".repeat(400);
        let message = service.build_message(
            &"t".repeat(300),
            "Body",
            None,
            &[("name".to_string(), long_value)],
            None,
            false,
        );
        let embed = &message.embeds[0];
        assert!(embed.title.as_ref().unwrap().chars().count() <= MAX_TITLE_LENGTH);
        assert!(embed.fields[0].value.chars().count() <= MAX_FIELD_VALUE_LENGTH);
        assert!(embed.fields[0].value.ends_with("..."));
    }

    #[test]
    fn test_mentions_only_when_requested() {
        let (service, _) = service(&["123", "456"]);
        let with = service.build_message("T", "D", None, &[], None, true);
        assert_eq!(with.content.as_deref(), Some("<@123> <@456>"));

        let without = service.build_message("T", "D", None, &[], None, false);
        assert_eq!(without.content, None);
    }

    #[test]
    fn test_footer_truncated() {
        let notifier = RecordingNotifier::default();
        let service = NotificationService::new(Box::new(notifier), vec![], &"f".repeat(3000));
        assert_eq!(service.footer().chars().count(), MAX_FOOTER_TEXT_LENGTH);
    }

    #[test]
    fn test_message_serialization_skips_empty_parts() {
        let (service, _) = service(&[]);
        let message = service.build_message("T", "", None, &[], None, false);
        let json = serde_json::to_value(&message).unwrap();

        assert!(json.get("content").is_none());
        let embed = &json["embeds"][0];
        assert!(embed.get("description").is_none());
        assert!(embed.get("fields").is_none());
        assert_eq!(embed["footer"]["text"], "E42 Rain Smartride v1.2.0");
    }

    #[tokio::test]
    async fn test_manager_applies_template_and_overrides() {
        let (service, notifier) = service(&["42"]);
        let manager = NotificationManager::new(service);

        manager
            .send(
                Notification::new(NotificationKind::RoundTripDeparture)
                    .with_title("Custom title")
                    .with_field("Interval", "5 minutes"),
            )
            .await
            .unwrap();
        manager
            .send(Notification::new(NotificationKind::WeatherApiError))
            .await
            .unwrap();

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);

        let round_trip = &sent[0];
        assert_eq!(round_trip.content.as_deref(), Some("<@42>"));
        assert_eq!(round_trip.embeds[0].title.as_deref(), Some("Custom title"));
        assert_eq!(
            round_trip.embeds[0].description.as_deref(),
            Some("Here is the round-trip weather forecast for today.")
        );
        assert_eq!(round_trip.embeds[0].fields[0].value, "5 minutes");

        let api_error = &sent[1];
        assert_eq!(api_error.content, None);
        assert_eq!(api_error.embeds[0].title.as_deref(), Some("API Check Failed"));
        assert_eq!(api_error.embeds[0].color, Some(0xdc3545));
    }

    #[test]
    fn test_webhook_requires_http_url() {
        assert!(matches!(
            DiscordWebhook::new("discord.com/api/webhooks/1", None),
            Err(NotifyError::InvalidConfig { .. })
        ));
        assert!(DiscordWebhook::new("https://discord.com/api/webhooks/1/abc", Some("ua")).is_ok());
    }
}
