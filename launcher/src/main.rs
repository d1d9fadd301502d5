use launcher::{exec, Launcher};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let launcher = Launcher::default();

    let error = match launcher.prepare(|name| std::env::var_os(name)) {
        Ok(plan) => exec(&plan),
        Err(e) => e,
    };

    error!("{}", error);
    std::process::exit(error.exit_code());
}
