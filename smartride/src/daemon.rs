//! The polling loop that sends one forecast per day.

use crate::advisor::{AdvisorConfig, RideWeatherAdvisor};
use crate::agenda::AgendaClient;
use crate::notification::{Notification, NotificationKind, NotificationManager};
use crate::settings::{human_duration, Settings};
use crate::storage::{self, FileService, StorageResult};
use crate::version::{release_url, UpdateStatus};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{error, info, warn};
use weather::ForecastProvider;

/// How long before the first class the forecast must go out
pub const MORNING_NOTICE_HOURS: i64 = 3;

/// Listens for SIGINT and SIGTERM from the moment it is installed, so a
/// signal that arrives mid-tick is still seen afterwards. As PID 1 in a
/// container the process gets no default SIGTERM handling.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    AlreadySent,
    AgendaUnavailable,
    NoClass,
    TooLate,
    Notified,
}

pub struct Daemon {
    settings: Settings,
    notifications: NotificationManager,
    provider: Box<dyn ForecastProvider>,
    agenda: Option<AgendaClient>,
    files: FileService,
    advisor_config: AdvisorConfig,
    agenda_error_reported: Option<NaiveDate>,
}

impl Daemon {
    pub fn new(
        settings: Settings,
        notifications: NotificationManager,
        provider: Box<dyn ForecastProvider>,
        agenda: Option<AgendaClient>,
        files: FileService,
    ) -> Self {
        let advisor_config = AdvisorConfig::default().with_language(settings.language);
        Self {
            settings,
            notifications,
            provider,
            agenda,
            files,
            advisor_config,
            agenda_error_reported: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.settings.timezone)
    }

    async fn notify(&self, notification: Notification) {
        let kind = notification.kind;
        if let Err(e) = self.notifications.send(notification).await {
            error!("Failed to send {:?} notification: {}", kind, e);
        }
    }

    /// Announce the daemon and any pending update
    pub async fn startup(&self, update: &UpdateStatus) {
        info!("Timezone: {}", self.settings.timezone);
        self.notify(
            Notification::new(NotificationKind::SystemStart)
                .with_field("Interval", human_duration(self.settings.interval)),
        )
        .await;

        if let UpdateStatus::Available { current, latest } = update {
            self.notify(
                Notification::new(NotificationKind::UpdateAvailable)
                    .with_url(release_url(latest))
                    .with_field("Current Version", current.clone())
                    .with_field("Latest Version", latest.clone()),
            )
            .await;
        }
    }

    /// Advisor parameters for today, or why there is nothing to do
    async fn plan_day(&mut self, now: &DateTime<Tz>) -> Result<AdvisorConfig, TickOutcome> {
        let Some(agenda) = &self.agenda else {
            return Ok(self.advisor_config.clone());
        };

        let today = now.date_naive();
        let (first, last) = match agenda.first_and_last_class(today).await {
            Ok(Some(bounds)) => bounds,
            Ok(None) => return Err(TickOutcome::NoClass),
            Err(e) => {
                error!("Error fetching or parsing agenda: {}", e);
                if self.agenda_error_reported != Some(today) {
                    self.agenda_error_reported = Some(today);
                    self.notify(
                        Notification::new(NotificationKind::AgendaError)
                            .with_field("Error", e.to_string()),
                    )
                    .await;
                }
                return Err(TickOutcome::AgendaUnavailable);
            }
        };

        if first - Duration::hours(MORNING_NOTICE_HOURS) < *now {
            return Err(TickOutcome::TooLate);
        }

        let config = self.advisor_config.clone();
        let latest_departure = (first - config.trip_duration).time();
        info!("First class at {}, last class at {}", first, last);
        info!(
            "Morning latest departure {}, evening first departure {}",
            latest_departure.format("%H:%M"),
            last.format("%H:%M")
        );

        Ok(config
            .with_morning_latest_departure(latest_departure)
            .with_evening_first_departure(last.time()))
    }

    /// Run the day's forecast unless it already went out
    pub async fn tick(&mut self, now: DateTime<Tz>) -> StorageResult<TickOutcome> {
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        if storage::notification_sent(&mut self.files, &today)? {
            return Ok(TickOutcome::AlreadySent);
        }

        let config = match self.plan_day(&now).await {
            Ok(config) => config,
            Err(outcome) => return Ok(outcome),
        };

        let advisor =
            RideWeatherAdvisor::new(config, self.provider.as_ref(), &self.notifications, now);
        advisor.run_and_notify_day().await;

        storage::record_notification(&mut self.files, &today, true)?;
        Ok(TickOutcome::Notified)
    }

    /// Tick every interval until SIGINT or SIGTERM
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut shutdown = ShutdownSignal::install()?;
        info!(
            "Starting checks with interval of {} seconds",
            self.settings.interval.as_secs()
        );

        loop {
            let now = self.now();
            match self.tick(now).await {
                Ok(outcome) => info!("Tick: {:?}", outcome),
                Err(e) => warn!("Tick failed: {}", e),
            }

            tokio::select! {
                signal = shutdown.recv() => {
                    info!("Received {}, shutting down", signal);
                    return Ok(());
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Notifier, NotificationService, NotifyResult, WebhookMessage};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Brussels;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use weather::{Forecast, WeatherError, WeatherResult, Waypoint};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<WebhookMessage>>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, message: &WebhookMessage) -> NotifyResult<()> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn notifier_name(&self) -> &'static str {
            "recorder"
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ForecastProvider for FailingProvider {
        async fn fetch_forecast(&self, _: &[Waypoint], _: NaiveDate) -> WeatherResult<Forecast> {
            Err(WeatherError::ServiceUnavailable {
                message: "down".to_string(),
            })
        }

        fn provider_name(&self) -> &'static str {
            "failing"
        }
    }

    fn daemon(tmp: &TempDir, recorder: &Recorder) -> Daemon {
        let settings = Settings {
            storage_dir: tmp.path().to_path_buf(),
            webhook: "https://discord.test/webhook".to_string(),
            mention_users: vec![],
            interval: std::time::Duration::from_secs(300),
            user_agent: None,
            agenda_url: None,
            timezone: Brussels,
            language: weather::Language::En,
        };
        let service = NotificationService::new(Box::new(recorder.clone()), vec![], "test");
        Daemon::new(
            settings,
            NotificationManager::new(service),
            Box::new(FailingProvider),
            None,
            FileService::new(tmp.path()),
        )
    }

    #[tokio::test]
    async fn test_startup_announces_update() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let daemon = daemon(&tmp, &recorder);

        daemon
            .startup(&UpdateStatus::Available {
                current: "v1".into(),
                latest: "v2".into(),
            })
            .await;

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].embeds[0].fields[0].name, "Interval");
        assert_eq!(sent[0].embeds[0].fields[0].value, "5 minutes");
        assert_eq!(sent[1].embeds[0].fields.len(), 2);
        assert_eq!(
            sent[1].embeds[0].url.as_deref(),
            Some("https://github.com/VictorHachard/e42-rain-smartride/releases/tag/v2")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_signal_sees_sigterm_sent_before_waiting() {
        let mut shutdown = ShutdownSignal::install().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), shutdown.recv())
            .await
            .unwrap();
        assert_eq!(received, "SIGTERM");
    }

    #[tokio::test]
    async fn test_tick_runs_once_per_day() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let mut daemon = daemon(&tmp, &recorder);
        let now = Brussels.with_ymd_and_hms(2025, 5, 6, 6, 0, 0).unwrap();

        assert_eq!(daemon.tick(now).await.unwrap(), TickOutcome::Notified);
        // One weather error per ride.
        assert_eq!(recorder.0.lock().unwrap().len(), 2);

        assert_eq!(daemon.tick(now).await.unwrap(), TickOutcome::AlreadySent);
        assert_eq!(recorder.0.lock().unwrap().len(), 2);

        let raw = std::fs::read_to_string(tmp.path().join(storage::DAILY_STATUS_FILE)).unwrap();
        assert!(raw.contains("2025-05-06"));
    }
}
