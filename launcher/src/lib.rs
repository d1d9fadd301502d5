//! Container entrypoint for E42 Rain Smartride
//!
//! Reads the container environment, provisions the storage volume and
//! replaces the current process with the `smartride` daemon.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable holding the Discord webhook URL (required)
pub const ENV_WEBHOOK: &str = "DISCORD_WEBHOOK_URL";
/// Environment variable holding the check interval in seconds
pub const ENV_INTERVAL: &str = "INTERVAL";
/// Environment variable holding comma-separated Discord user ids
pub const ENV_MENTION_USERS: &str = "MENTION_USERS";
/// Environment variable holding the User-Agent for outbound requests
pub const ENV_USER_AGENT: &str = "WEBPAGE_USER_AGENT";
/// Environment variable holding the iCalendar feed URL
pub const ENV_AGENDA_URL: &str = "AGENDA_URL";

pub const DEFAULT_INTERVAL: &str = "300";
pub const DEFAULT_STORAGE_DIR: &str = "/app/storage";
pub const DEFAULT_PROGRAM: &str = "smartride";

/// Errors raised before the daemon takes over the process
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("{0} environment variable is not set")]
    MissingVariable(&'static str),
    #[error("Failed to create storage directory '{path}': {source}")]
    StorageDir { path: String, source: io::Error },
    #[error("Failed to launch '{program}': {source}")]
    Exec { program: String, source: io::Error },
}

impl LaunchError {
    /// Process exit status the entrypoint reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::MissingVariable(_) => 1,
            LaunchError::StorageDir { .. } => 1,
            LaunchError::Exec { .. } => 127,
        }
    }
}

pub type LaunchResult<T> = Result<T, LaunchError>;

/// Values read from the container environment. They are passed on
/// untouched, so they need not be valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEnv {
    pub webhook: OsString,
    pub interval: OsString,
    pub mention_users: Option<OsString>,
    pub user_agent: Option<OsString>,
    pub agenda_url: Option<OsString>,
}

impl LaunchEnv {
    /// Read the environment through `lookup`. Empty values count as unset.
    pub fn read<F>(lookup: F) -> LaunchResult<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let webhook = get(ENV_WEBHOOK).ok_or(LaunchError::MissingVariable(ENV_WEBHOOK))?;

        Ok(Self {
            webhook,
            interval: get(ENV_INTERVAL).unwrap_or_else(|| DEFAULT_INTERVAL.into()),
            mention_users: get(ENV_MENTION_USERS),
            user_agent: get(ENV_USER_AGENT),
            agenda_url: get(ENV_AGENDA_URL),
        })
    }

    /// Build the daemon argument list. Optional flags are omitted entirely
    /// when their variable is unset.
    pub fn to_args(&self, storage_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--storage-dir".into(),
            storage_dir.as_os_str().to_owned(),
            "--webhook".into(),
            self.webhook.clone().into(),
            "--interval".into(),
            self.interval.clone().into(),
        ];

        let optional = [
            ("--mention-users", &self.mention_users),
            ("--webpage-user-agent", &self.user_agent),
            ("--agenda-url", &self.agenda_url),
        ];
        for (flag, value) in optional {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.clone().into());
            }
        }

        args
    }
}

/// Create the storage directory. Succeeds when it already exists.
pub fn ensure_storage_dir(path: &Path) -> LaunchResult<()> {
    std::fs::create_dir_all(path).map_err(|source| LaunchError::StorageDir {
        path: path.display().to_string(),
        source,
    })
}

/// Where the entrypoint puts things
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Volume handed to the daemon as `--storage-dir`
    pub storage_dir: PathBuf,
    /// Program that replaces the entrypoint
    pub program: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }
}

impl LaunchConfig {
    pub fn with_storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

/// Program and arguments ready to exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl LaunchPlan {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

pub struct Launcher {
    config: LaunchConfig,
}

impl Launcher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Validate the environment, create the storage directory and build the
    /// launch plan, in that order. Nothing touches the filesystem when the
    /// webhook is missing.
    pub fn prepare<F>(&self, lookup: F) -> LaunchResult<LaunchPlan>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let env = LaunchEnv::read(lookup)?;

        ensure_storage_dir(&self.config.storage_dir)?;
        debug!("Storage directory ready: {}", self.config.storage_dir.display());

        Ok(LaunchPlan {
            program: self.config.program.clone(),
            args: env.to_args(&self.config.storage_dir),
        })
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new(LaunchConfig::default())
    }
}

/// Replace the current process with the plan's program. Only returns when
/// the program could not be started.
#[cfg(unix)]
pub fn exec(plan: &LaunchPlan) -> LaunchError {
    use std::os::unix::process::CommandExt;

    info!("Launching {}", plan.program.display());
    let source = plan.command().exec();
    LaunchError::Exec {
        program: plan.program.display().to_string(),
        source,
    }
}

/// Without `exec(2)` the entrypoint waits for the program and mirrors its
/// exit status.
#[cfg(not(unix))]
pub fn exec(plan: &LaunchPlan) -> LaunchError {
    info!("Launching {}", plan.program.display());
    match plan.command().status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(source) => LaunchError::Exec {
            program: plan.program.display().to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_missing_webhook_is_rejected() {
        let result = LaunchEnv::read(env(&[("INTERVAL", "60")]));
        assert!(matches!(
            result,
            Err(LaunchError::MissingVariable("DISCORD_WEBHOOK_URL"))
        ));
    }

    #[test]
    fn test_empty_webhook_is_rejected() {
        let result = LaunchEnv::read(env(&[("DISCORD_WEBHOOK_URL", "")]));
        assert!(matches!(result, Err(LaunchError::MissingVariable(_))));
    }

    #[test]
    fn test_missing_webhook_exit_code() {
        let error = LaunchError::MissingVariable(ENV_WEBHOOK);
        assert_eq!(error.exit_code(), 1);
        assert!(error.to_string().contains("DISCORD_WEBHOOK_URL"));
    }

    #[test]
    fn test_default_arguments() {
        let launch_env =
            LaunchEnv::read(env(&[("DISCORD_WEBHOOK_URL", "https://hook")])).unwrap();
        let args = launch_env.to_args(Path::new("/app/storage"));
        assert_eq!(
            strings(&args),
            vec![
                "--storage-dir",
                "/app/storage",
                "--webhook",
                "https://hook",
                "--interval",
                "300"
            ]
        );
    }

    #[test]
    fn test_interval_override() {
        let launch_env = LaunchEnv::read(env(&[
            ("DISCORD_WEBHOOK_URL", "https://hook"),
            ("INTERVAL", "60"),
        ]))
        .unwrap();
        let args = strings(&launch_env.to_args(Path::new("/data")));
        let pos = args.iter().position(|a| a == "--interval").unwrap();
        assert_eq!(args[pos + 1], "60");
    }

    #[test]
    fn test_empty_interval_uses_default() {
        let launch_env = LaunchEnv::read(env(&[
            ("DISCORD_WEBHOOK_URL", "https://hook"),
            ("INTERVAL", ""),
        ]))
        .unwrap();
        assert_eq!(launch_env.interval, "300");
    }

    #[test]
    fn test_optional_flags() {
        let launch_env = LaunchEnv::read(env(&[
            ("DISCORD_WEBHOOK_URL", "https://hook"),
            ("MENTION_USERS", "@a,@b"),
            ("WEBPAGE_USER_AGENT", "Mozilla/5.0 test"),
        ]))
        .unwrap();
        let args = strings(&launch_env.to_args(Path::new("/data")));
        assert_eq!(
            &args[6..],
            &[
                "--mention-users",
                "@a,@b",
                "--webpage-user-agent",
                "Mozilla/5.0 test"
            ]
        );
        assert!(!args.contains(&"--agenda-url".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_webhook_is_passed_through() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(b"https://hook/\xff".to_vec());
        let lookup = {
            let raw = raw.clone();
            move |name: &str| (name == ENV_WEBHOOK).then(|| raw.clone())
        };

        let launch_env = LaunchEnv::read(lookup).unwrap();
        let args = launch_env.to_args(Path::new("/data"));
        assert_eq!(args[3], raw);
    }

    #[test]
    fn test_unset_mentions_omit_flag() {
        let launch_env = LaunchEnv::read(env(&[
            ("DISCORD_WEBHOOK_URL", "https://hook"),
            ("MENTION_USERS", ""),
        ]))
        .unwrap();
        let args = strings(&launch_env.to_args(Path::new("/data")));
        assert!(!args.contains(&"--mention-users".to_string()));
        assert!(!args.iter().any(|a| a.is_empty()));
    }

    #[test]
    fn test_prepare_creates_storage_dir() {
        let tmp = TempDir::new().unwrap();
        let storage = tmp.path().join("storage");
        let launcher = Launcher::new(
            LaunchConfig::default()
                .with_storage_dir(&storage)
                .with_program("/bin/true"),
        );

        let plan = launcher
            .prepare(env(&[("DISCORD_WEBHOOK_URL", "https://hook")]))
            .unwrap();

        assert!(storage.is_dir());
        assert_eq!(plan.program, PathBuf::from("/bin/true"));
        assert_eq!(plan.args[1].as_os_str(), storage.as_os_str());
    }

    #[test]
    fn test_prepare_keeps_existing_storage_dir() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("daily_notification_status.json");
        std::fs::write(&marker, "{}").unwrap();

        let launcher = Launcher::new(LaunchConfig::default().with_storage_dir(tmp.path()));
        launcher
            .prepare(env(&[("DISCORD_WEBHOOK_URL", "https://hook")]))
            .unwrap();
        launcher
            .prepare(env(&[("DISCORD_WEBHOOK_URL", "https://hook")]))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "{}");
    }

    #[test]
    fn test_prepare_without_webhook_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let storage = tmp.path().join("storage");
        let launcher = Launcher::new(LaunchConfig::default().with_storage_dir(&storage));

        let result = launcher.prepare(env(&[("INTERVAL", "60")]));

        assert!(matches!(result, Err(LaunchError::MissingVariable(_))));
        assert!(!storage.exists());
    }

    #[test]
    fn test_launch_config_default() {
        let config = LaunchConfig::default();
        assert_eq!(config.storage_dir, PathBuf::from("/app/storage"));
        assert_eq!(config.program, PathBuf::from("smartride"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_reports_missing_program() {
        let plan = LaunchPlan {
            program: PathBuf::from("/nonexistent/smartride"),
            args: vec![],
        };
        let error = exec(&plan);
        assert!(matches!(error, LaunchError::Exec { .. }));
        assert_eq!(error.exit_code(), 127);
    }
}
