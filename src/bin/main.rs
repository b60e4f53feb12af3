//! Interactive research shell

use clap::Parser;
use research_orchestrator::{agent::ResearchAgent, config::Config, memory::Session, presenter};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Investment research assistant", long_about = None)]
struct Args {
    /// Run a single query and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(args.debug))),
        )
        .init();

    let config = Config::from_env()?;

    let agent = ResearchAgent::from_config(&config)?;
    let mut session = Session::new(config.max_recent_symbols);

    info!(
        session_id = %session.session_id,
        provider = ?config.market_data_provider,
        "Research shell starting"
    );

    if let Some(query) = args.query {
        run_query(&agent, &query, &mut session).await;
        return Ok(());
    }

    println!("Investment research assistant. Type 'help' for examples, 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "history" => print!("{}", presenter::render_history(&session)),
            "tools" => print!("{}", presenter::render_tools(agent.registry())),
            "clear" => {
                session.clear();
                println!("Session cleared.");
            }
            // help and status go through the agent so they land in history
            _ => run_query(&agent, input, &mut session).await,
        }
    }

    println!("Goodbye.");
    Ok(())
}

/// Log filter when `RUST_LOG` is unset; the shell stays quiet unless asked
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "warn"
    }
}

async fn run_query(agent: &ResearchAgent, query: &str, session: &mut Session) {
    match agent.process(query, session).await {
        Ok(outcome) => print!("{}", presenter::render_outcome(&outcome)),
        Err(e) => eprintln!("Error: {}", e),
    }
}
