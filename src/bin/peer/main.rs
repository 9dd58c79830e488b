//! Interactive chatlink peer.
//!
//! ```bash
//! chatlink-peer                    # directory on localhost
//! chatlink-peer chat.example.org --name alice
//! ```

mod terminal;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chatlink::config::{PeerConfig, DEFAULT_HOST, DEFAULT_PEER_LISTEN, DEFAULT_PORT};
use chatlink::rpc::{self, Dispatcher};
use chatlink::{locate_server, run_console, Peer, TcpDialer};
use clap::Parser;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use terminal::TerminalPresentation;

#[derive(Parser, Debug)]
#[command(name = "chatlink-peer")]
#[command(about = "Chat with the other peers of a chatlink server")]
#[command(version)]
struct Args {
    /// Host running the directory
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address other peers use to call this one
    #[arg(long, default_value = DEFAULT_PEER_LISTEN)]
    listen: String,

    /// Connect with this name right away
    #[arg(short, long)]
    name: Option<String>,

    /// Bound on every remote call, in milliseconds
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("cannot start the runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(args));

    // A pending stdin read blocks its thread until the next line; do not wait for it.
    runtime.shutdown_background();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("Error with the server, please relaunch the app: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = PeerConfig {
        directory_host: args.host,
        port: args.port,
        listen: args.listen,
        call_timeout: Duration::from_millis(args.timeout_ms),
    };

    let link = locate_server(&config).await?;

    let listener = TcpListener::bind(&config.listen).await?;
    let endpoint = link.advertise(listener.local_addr()?);
    tracing::info!("accepting peer calls on {}", endpoint.addr);

    let presentation = Arc::new(TerminalPresentation);
    let peer = Peer::new(
        link.authority,
        link.directory,
        Arc::new(TcpDialer::new(config.call_timeout)),
        presentation.clone(),
        endpoint,
        config.call_timeout,
    );

    let stop_inbox = Arc::new(Notify::new());
    let inbox: Arc<dyn Dispatcher> = peer.inbox();
    let inbox_task = tokio::spawn({
        let stop = stop_inbox.clone();
        async move { rpc::listen(listener, inbox, &stop).await }
    });

    let interrupt = Arc::new(Notify::new());
    set_interrupt_handler(interrupt.clone());

    peer.welcome();
    if let Some(name) = args.name {
        let _ = peer.connect(&name).await;
    }

    let input = BufReader::new(tokio::io::stdin());
    run_console(&peer, presentation.as_ref(), input, &interrupt).await;

    stop_inbox.notify_one();
    let _ = inbox_task.await;
    Ok(())
}

fn set_interrupt_handler(interrupt: Arc<Notify>) {
    if let Err(err) = ctrlc::set_handler(move || interrupt.notify_one()) {
        tracing::warn!("interrupt handler not set, Ctrl-C will not disconnect gracefully: {err}");
    }
}
