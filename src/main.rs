use dotenvy::dotenv;
use log::{error, info};
use opsserver::channels::senders::ChannelSenders;
use opsserver::config::AppConfig;
use opsserver::jobs::JobQueue;
use opsserver::llm::OpenAIClient;
use opsserver::shared::state::AppState;
use opsserver::shared::utils::create_conn;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;

    let pool = match create_conn() {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(e);
        }
    };

    let llm_provider = Arc::new(OpenAIClient::new(
        config.llm.api_key.clone(),
        Some(config.llm.base_url.clone()),
    ));
    let senders = Arc::new(ChannelSenders::new());
    let jobs = JobQueue::start(pool.clone(), llm_provider.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        conn: pool,
        llm_provider,
        senders,
        jobs,
    });

    let app = opsserver::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
