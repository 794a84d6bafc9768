use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use case_assistant::{
    config::AppConfig,
    db,
    routes,
    services::{case_store::SqlCaseStore, llm::OpenAiClient},
    state::AppState,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing();

    let pool = db::connect(&config.database_url, config.database_max_connections)
        .await
        .context("database connection failed")?;
    db::run_migrations(&pool).await.context("creating the Cases table failed")?;
    tracing::info!("database ready");

    let llm = Arc::new(OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
    ));
    let store = Arc::new(SqlCaseStore::new(pool));
    let state = Arc::new(AppState::new(llm, store));

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    tracing::info!(address = %config.bind_address, model = %config.openai_model, "case assistant listening");
    axum::serve(listener, app).await?;
    Ok(())
}
