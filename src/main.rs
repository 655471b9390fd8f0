use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatgate::agent::knowledge;
use chatgate::agent::{AzureOpenAiClient, Conversation, SessionRegistry};
use chatgate::config::GatewayConfig;
use chatgate::error::Result;
use chatgate::http::{AppState, HttpServer};
use chatgate::ratelimit::{Compactor, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "chatgate", version)]
#[command(about = "Rate-limited chat gateway for a customer service assistant")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "CHATGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the chat API (default)
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen_addr: Option<SocketAddr>,
    },
    /// Chat with the assistant in the terminal
    Chat,
    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = GatewayConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve { listen_addr: None }) {
        Command::Serve { listen_addr } => serve(config, listen_addr).await?,
        Command::Chat => chat(config).await?,
        Command::Config => print!("{}", config.to_yaml()?),
    }
    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

fn system_prompt(config: &GatewayConfig) -> String {
    let candidates = knowledge::candidate_paths(Path::new(&config.chat.knowledge_path));
    let document = knowledge::load_document(&candidates);
    knowledge::system_prompt(&config.chat.brand, &document)
}

async fn serve(config: GatewayConfig, listen_addr: Option<SocketAddr>) -> Result<()> {
    info!("Starting Chatgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let addr = match listen_addr {
        Some(addr) => addr,
        None => config.server.listen_addr()?,
    };
    let limits = config.rate_limiting.limits();
    info!(
        session = limits.max_requests_per_session,
        ip_per_minute = limits.max_requests_per_ip_per_minute,
        ip_per_hour = limits.max_requests_per_ip_per_hour,
        global_per_minute = limits.global_max_requests_per_minute,
        "Rate limits configured"
    );

    let model = Arc::new(AzureOpenAiClient::from_config(&config.llm)?);
    let sessions = Arc::new(SessionRegistry::new(model, system_prompt(&config)));

    let limiter = Arc::new(RateLimiter::new(limits));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let compactor =
        Compactor::new(Arc::clone(&limiter), config.rate_limiting.compactor()).spawn(shutdown_rx);

    let state = AppState::new(limiter, sessions, &config.chat);
    let result = HttpServer::new(addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = compactor.await {
        warn!(error = %e, "Compactor task ended abnormally");
    }

    result?;
    info!("Chatgate stopped");
    Ok(())
}

async fn chat(config: GatewayConfig) -> Result<()> {
    let model = AzureOpenAiClient::from_config(&config.llm).map_err(|e| {
        eprintln!("\nTo use this agent, set AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY");
        eprintln!("(optionally AZURE_OPENAI_DEPLOYMENT and AZURE_OPENAI_API_VERSION) in the");
        eprintln!("environment or a .env file.\n");
        e
    })?;
    let conversation = Conversation::new(system_prompt(&config));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    chatgate::repl::run(&config.chat.brand, conversation, &model, stdin, stdout).await?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
