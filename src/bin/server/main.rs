//! Session authority and directory server.
//!
//! ```bash
//! chatlink-server                 # local only, history in ~/.chatlink/history
//! chatlink-server 0.0.0.0 --port 4097
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chatlink::config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use chatlink::{HistoryStore, Server};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chatlink-server")]
#[command(about = "Directory and session authority for chatlink peers")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// History file [default: ~/.chatlink/history]
    #[arg(long)]
    history: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let history_path = match args.history {
        Some(path) => path,
        None => HistoryStore::default_path()?,
    };
    let config = ServerConfig {
        bind_host: args.host,
        port: args.port,
        history_path,
    };

    // Without a history file there is nowhere to save on exit; refuse to start.
    let history = HistoryStore::new(&config.history_path);
    history.ensure_exists()?;

    let server = Arc::new(Server::new(history));

    tracing::info!("binding to {}", config.bind_address());
    let listener = TcpListener::bind(config.bind_address()).await?;

    server.set_interrupt_handler();

    // A failed save is already logged; the process still exits normally.
    let _ = server.run(listener).await;
    Ok(())
}
