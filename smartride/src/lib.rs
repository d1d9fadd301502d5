pub mod advisor;
pub mod agenda;
pub mod daemon;
pub mod notification;
pub mod settings;
pub mod storage;
pub mod version;

pub use advisor::{AdvisorConfig, Candidate, GearLevel, RideMode, RideWeatherAdvisor, RoundTrip};
pub use agenda::{AgendaClient, AgendaError, AgendaResult, CalendarEvent};
pub use daemon::{Daemon, TickOutcome};
pub use notification::{
    DiscordWebhook, Notification, NotificationKind, NotificationManager, NotificationService,
    Notifier, NotifyError, NotifyResult,
};
pub use settings::{Cli, Settings, SettingsError, SettingsResult};
pub use storage::{FileService, StorageError, StorageResult};
pub use version::{UpdateStatus, VersionChecker};

pub mod prelude {
    pub use crate::advisor::*;
    pub use crate::agenda::*;
    pub use crate::daemon::*;
    pub use crate::notification::*;
    pub use crate::settings::*;
    pub use crate::storage::*;
    pub use crate::version::*;
}
