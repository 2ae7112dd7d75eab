use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use verse_client::core::{ClientCore, ClientEvent, ClientUpdate};
use verse_client::endpoints::Endpoints;
use verse_client::frontend;
use verse_client::gate::SessionGate;
use verse_client::logging;
use verse_client::mpv::MpvSink;
use verse_client::search::HttpSearchBackend;
use verse_proto::config::Config;
use verse_proto::session::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "versefind", version, about = "Search indexed lyrics and preview tracks")]
struct Cli {
    /// Server origin, overriding `[server] origin` in config.toml
    #[arg(long, global = true)]
    origin: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default)
    Run,
    /// Store a session token obtained from the auth page
    Login { token: String },
    /// Forget the stored session
    Logout,
    /// Print where to obtain a session token
    AuthUrl,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(origin) = cli.origin {
        config.server.origin = origin;
    }
    let endpoints = Endpoints::from_config(&config.server)
        .with_context(|| format!("bad server origin '{}'", config.server.origin))?;
    let gate = SessionGate::new(
        SessionStore::new(config.paths.session_file.clone()),
        endpoints.auth.clone(),
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, endpoints, gate).await,
        Command::Login { token } => {
            gate.sign_in(&token)?;
            println!("session stored in {}", gate.store().path().display());
            Ok(())
        }
        Command::Logout => {
            if gate.revoke() {
                println!("signed out");
            } else {
                println!("no session stored");
            }
            Ok(())
        }
        Command::AuthUrl => {
            println!("{}", gate.auth_url());
            Ok(())
        }
    }
}

async fn run(config: Config, endpoints: Endpoints, gate: SessionGate) -> anyhow::Result<()> {
    let (broadcast_tx, _) = broadcast::channel::<ClientUpdate>(256);

    let log_path = logging::init(broadcast_tx.clone())?;
    eprintln!("versefind log: {}", log_path.display());
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Server origin: {}", config.server.origin);

    let backend = Arc::new(HttpSearchBackend::new(
        endpoints.search.clone(),
        &config.server,
        gate.store().clone(),
    )?);
    let sink = MpvSink::new(config.preview.volume);
    let auth_url = endpoints.auth.to_string();

    let core = ClientCore::new(
        &config,
        endpoints,
        gate,
        backend,
        sink,
        broadcast_tx.clone(),
    );
    let state_manager = core.state_manager();

    // Subscribe before the core starts so the first update is not missed.
    let updates = broadcast_tx.subscribe();
    let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(256);

    let (core_result, frontend_result) = tokio::join!(
        core.run(event_rx),
        frontend::run(event_tx, updates, state_manager, auth_url),
    );
    core_result?;
    frontend_result?;
    Ok(())
}
