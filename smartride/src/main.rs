use clap::Parser;
use smartride::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use weather::{OpenMeteoConfig, OpenMeteoProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting E42 Rain Smartride");

    let settings = match Settings::try_from(Cli::parse()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let user_agent = settings.user_agent.as_deref();
    let update = VersionChecker::new(DEFAULT_TAGS_URL, user_agent)?
        .check(current_version())
        .await;

    let webhook = DiscordWebhook::new(settings.webhook.clone(), user_agent)?;
    let service = NotificationService::new(
        Box::new(webhook),
        settings.mention_users.clone(),
        &update.footer(),
    );

    let mut weather_config = OpenMeteoConfig::default().with_timezone(settings.timezone);
    if let Some(user_agent) = user_agent {
        weather_config = weather_config.with_user_agent(user_agent);
    }
    let provider = OpenMeteoProvider::new(weather_config)?;

    let agenda = match &settings.agenda_url {
        Some(url) => Some(AgendaClient::new(url.clone(), settings.timezone, user_agent)?),
        None => {
            info!("No agenda configured, forecasting every day with default departure times");
            None
        }
    };

    let files = FileService::new(settings.storage_dir.clone());
    let daemon = Daemon::new(
        settings,
        NotificationManager::new(service),
        Box::new(provider),
        agenda,
        files,
    );

    daemon.startup(&update).await;
    daemon.run().await?;

    Ok(())
}
