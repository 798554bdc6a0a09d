use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};

use reviewbotics::auth::CredentialBroker;
use reviewbotics::backend::{self, CompletionOptions};
use reviewbotics::config::Config;
use reviewbotics::context::ContextStore;
use reviewbotics::github::GitHubClient;
use reviewbotics::orchestrator::ReviewOrchestrator;
use reviewbotics::review::ReviewStore;
use reviewbotics::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting ReviewBotics");

    let config = Config::from_env().context("failed to load configuration")?;

    let broker = Arc::new(
        CredentialBroker::new(
            config.github_app_id,
            &config.github_private_key,
            config.github_api_base.clone(),
        )
        .context("failed to initialize credential broker")?,
    );

    let github = Arc::new(
        GitHubClient::new(broker, config.github_api_base.clone())
            .context("failed to initialize GitHub client")?,
    );

    let llm = backend::from_config(&config).context("failed to initialize analysis backend")?;
    if llm.is_available().await {
        info!(backend = llm.name(), "analysis backend is reachable");
    } else {
        warn!(
            backend = llm.name(),
            "analysis backend is not reachable; reviews will fail until it is"
        );
    }

    let store = Arc::new(ReviewStore::new());
    let context_store = Arc::new(ContextStore::new(
        config.context_rules_dir.clone(),
        config.context_cache_enabled,
        config.context_cache_ttl,
    ));

    let orchestrator = Arc::new(ReviewOrchestrator::new(
        github,
        llm,
        store.clone(),
        context_store,
        CompletionOptions::from_config(&config),
    ));

    let state = Arc::new(AppState {
        store,
        orchestrator,
        webhook_secret: config.github_webhook_secret.clone(),
    });

    let app = build_router(state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
