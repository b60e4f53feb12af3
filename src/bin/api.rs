use research_orchestrator::{agent::ResearchAgent, api::start_server, config::Config, memory::Session};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!("Research Orchestrator - API Server");
    info!("Port: {}", config.api_port);
    info!("Output directory: {}", config.output_dir.display());
    info!("Market data: {:?}", config.market_data_provider);

    let agent = Arc::new(ResearchAgent::from_config(&config)?);
    let session = Session::new(config.max_recent_symbols);

    info!(tools = agent.registry().len(), "Agent initialized");

    start_server(agent, session, config.api_port).await?;

    Ok(())
}
