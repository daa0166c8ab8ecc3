use stale_sweeper::config::AppConfig;
use stale_sweeper::{sweep, GitHubClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stale_sweeper=info".into());
    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config).await {
        tracing::error!(repo = %config.github_repository, "Sweep failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let client = GitHubClient::new(config)?;
    tracing::info!(
        repo = %client.repo(),
        dry_run = config.dry_run,
        "Starting stale issue sweep"
    );

    let sweep_config = config.sweep_config();
    let report = sweep::sweep(&client, &sweep_config, chrono::Utc::now()).await?;
    for entry in &report.entries {
        tracing::info!(
            issue = entry.issue,
            action = ?entry.action,
            statuses = ?entry.statuses,
            "Sweep action"
        );
    }

    Ok(())
}
