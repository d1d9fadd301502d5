//! Command line and the settings derived from it.

use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use weather::Language;

pub const MIN_INTERVAL_SECS: u64 = 5;

#[derive(Parser, Debug, Clone)]
#[command(name = "smartride")]
#[command(about = "E42 Rain Smartride: posts the best commute departure to Discord")]
pub struct Cli {
    /// Directory holding the persisted state
    #[arg(long)]
    pub storage_dir: PathBuf,
    /// Discord webhook URL
    #[arg(long)]
    pub webhook: String,
    /// Comma-separated Discord user ids to ping
    #[arg(long)]
    pub mention_users: Option<String>,
    /// Seconds between checks
    #[arg(long, default_value = "300")]
    pub interval: u64,
    /// User-Agent header for outbound requests
    #[arg(long)]
    pub webpage_user_agent: Option<String>,
    /// iCalendar feed with the class schedule
    #[arg(long)]
    pub agenda_url: Option<String>,
    /// IANA zone the forecast and agenda are expressed in
    #[arg(long, default_value = "Europe/Brussels")]
    pub timezone: String,
    /// Language of weather descriptions (en, fr)
    #[arg(long, default_value = "en")]
    pub language: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Interval must be at least 5 seconds, got {0}")]
    IntervalTooShort(u64),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("{0}")]
    UnsupportedLanguage(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub webhook: String,
    pub mention_users: Vec<String>,
    pub interval: Duration,
    pub user_agent: Option<String>,
    pub agenda_url: Option<String>,
    pub timezone: Tz,
    pub language: Language,
}

impl TryFrom<Cli> for Settings {
    type Error = SettingsError;

    fn try_from(cli: Cli) -> SettingsResult<Self> {
        if cli.interval < MIN_INTERVAL_SECS {
            return Err(SettingsError::IntervalTooShort(cli.interval));
        }

        let timezone = cli
            .timezone
            .parse::<Tz>()
            .map_err(|_| SettingsError::UnknownTimezone(cli.timezone.clone()))?;
        let language = cli
            .language
            .parse::<Language>()
            .map_err(SettingsError::UnsupportedLanguage)?;

        Ok(Self {
            storage_dir: cli.storage_dir,
            webhook: cli.webhook,
            mention_users: cli
                .mention_users
                .as_deref()
                .map(split_mentions)
                .unwrap_or_default(),
            interval: Duration::from_secs(cli.interval),
            user_agent: cli.webpage_user_agent.filter(|ua| !ua.is_empty()),
            agenda_url: cli.agenda_url.filter(|url| !url.is_empty()),
            timezone,
            language,
        })
    }
}

fn split_mentions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

/// `300` → `5 minutes`, `3725` → `1 hour, 2 minutes, 5 seconds`
pub fn human_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let units = [
        (total / 86_400, "day"),
        (total % 86_400 / 3_600, "hour"),
        (total % 3_600 / 60, "minute"),
        (total % 60, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| {
            if *amount == 1 {
                format!("1 {}", unit)
            } else {
                format!("{} {}s", amount, unit)
            }
        })
        .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["smartride", "--storage-dir", "/tmp/s", "--webhook", "https://x"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::try_from(parse(&[])).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.timezone, chrono_tz::Europe::Brussels);
        assert_eq!(settings.language, Language::En);
        assert!(settings.mention_users.is_empty());
        assert!(settings.agenda_url.is_none());
    }

    #[test]
    fn test_required_flags() {
        assert!(Cli::try_parse_from(["smartride", "--webhook", "https://x"]).is_err());
        assert!(Cli::try_parse_from(["smartride", "--storage-dir", "/tmp"]).is_err());
    }

    #[test]
    fn test_interval_minimum() {
        assert_eq!(
            Settings::try_from(parse(&["--interval", "4"])),
            Err(SettingsError::IntervalTooShort(4))
        );
        assert!(Settings::try_from(parse(&["--interval", "5"])).is_ok());
    }

    #[test]
    fn test_mention_users_and_language() {
        let settings = Settings::try_from(parse(&[
            "--mention-users",
            "123, 456,,",
            "--language",
            "fr",
            "--timezone",
            "Europe/Paris",
        ]))
        .unwrap();
        assert_eq!(settings.mention_users, vec!["123", "456"]);
        assert_eq!(settings.language, Language::Fr);
        assert_eq!(settings.timezone, chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            Settings::try_from(parse(&["--timezone", "Mars/Olympus"])),
            Err(SettingsError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(Duration::from_secs(300)), "5 minutes");
        assert_eq!(human_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(
            human_duration(Duration::from_secs(3725)),
            "1 hour, 2 minutes, 5 seconds"
        );
        assert_eq!(human_duration(Duration::from_secs(0)), "0 seconds");
    }
}
