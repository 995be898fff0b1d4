//! CamLink application entry point.
//!
//! ```text
//! main()
//!  └─ load config, init tracing
//!  ├─ host        → SimulatedCamera + command dispatcher + PreviewStreamer,
//!  │                then listen / serve / listen again
//!  ├─ controller  → pick peer, connect, console loop (stdin → messages)
//!  └─ init-config → write the default config file
//! ```
//!
//! Ctrl-C ends either role and runs `SessionManager::cleanup`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_app::cli::{Cli, Command};
use camlink_app::commands::{choose_peer, parse_command, ConsoleInput, HELP};
use camlink_core::ConnectionState;
use camlink_session::application::remote_commands::{
    CameraControl, ControllerView, RemoteCommandDispatcher,
};
use camlink_session::application::stream_preview::PreviewStreamer;
use camlink_session::application::transport::StaticPermission;
use camlink_session::infrastructure::camera::SimulatedCamera;
use camlink_session::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use camlink_session::infrastructure::transport::TcpTransport;
use camlink_session::{SessionError, SessionManager, TransportError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("no config path; pass --config")?,
    };
    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    match cli.command {
        Command::InitConfig { force } => init_config(&config_path, force),
        Command::Host { bind, once } => {
            let bind = match bind {
                Some(addr) => addr,
                None => config.bind_address()?,
            };
            let transport = Arc::new(TcpTransport::new(bind, config.peers.clone()));
            let manager = build_manager(&config, transport);
            info!(device = %config.general.device_name, %bind, "CamLink host starting");
            run_until_interrupted(&manager, run_host(&manager, once)).await
        }
        Command::Controller { peer } => {
            let bind = config.bind_address()?;
            let transport = Arc::new(TcpTransport::new(bind, config.peers.clone()));
            let manager = build_manager(&config, transport);
            info!(device = %config.general.device_name, "CamLink controller starting");
            run_until_interrupted(&manager, run_controller(&manager, peer)).await
        }
    }
}

fn build_manager(config: &AppConfig, transport: Arc<TcpTransport>) -> SessionManager {
    SessionManager::new(
        config.session_config(),
        transport,
        Arc::new(StaticPermission(true)),
    )
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config_to(&AppConfig::default(), path)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn run_until_interrupted(
    manager: &SessionManager,
    role: impl std::future::Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let outcome = tokio::select! {
        outcome = role => outcome,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("shutdown signal received");
            Ok(())
        }
    };
    manager.cleanup();
    outcome
}

// ── Host ──────────────────────────────────────────────────────────────────────

async fn run_host(manager: &SessionManager, once: bool) -> anyhow::Result<()> {
    let camera: Arc<dyn CameraControl> = Arc::new(SimulatedCamera::new());
    Arc::new(RemoteCommandDispatcher::new(Arc::new(ControllerView::new())).with_camera(Arc::clone(&camera)))
        .attach(manager);
    tokio::spawn(PreviewStreamer::new(manager.clone(), camera).run());

    loop {
        let pending = manager.start_as_host().await.context("could not start listening")?;
        info!("waiting for a controller. Press Ctrl-C to exit.");

        match pending.await {
            Ok(()) => {
                info!(peer = %manager.connected_device_name(), "controller connected");
                manager.wait_for_state(ConnectionState::Disconnected).await?;
                info!("controller left");
            }
            Err(SessionError::Transport(TransportError::AcceptTimeout(after))) => {
                info!("no controller within {after:?}; listening again");
                continue;
            }
            Err(SessionError::Cancelled) => return Ok(()),
            Err(e) => return Err(e).context("accepting a controller failed"),
        }
        if once {
            return Ok(());
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

async fn run_controller(manager: &SessionManager, wanted: Option<String>) -> anyhow::Result<()> {
    let view = Arc::new(ControllerView::new());
    Arc::new(RemoteCommandDispatcher::new(Arc::clone(&view))).attach(manager);

    let peers = manager.start_as_controller().await.context("could not list paired devices")?;
    let peer = choose_peer(&peers, wanted.as_deref())?;
    manager
        .connect_to_device(peer.clone())
        .await
        .with_context(|| format!("could not connect to {peer}"))?;
    println!("connected to {}. Type `help` for commands.", peer.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut states = manager.subscribe_state();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleInput::Send(msg))) => manager.send_message(msg),
                    Ok(Some(ConsoleInput::Status)) => print_status(manager, &view),
                    Ok(Some(ConsoleInput::Help)) => println!("{HELP}"),
                    Ok(Some(ConsoleInput::Quit)) => break,
                    Err(e) => println!("{e}"),
                }
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow_and_update() != ConnectionState::Connected {
                    warn!("session ended by the host or the link");
                    break;
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}

fn print_status(manager: &SessionManager, view: &ControllerView) {
    let snapshot = manager.snapshot();
    println!("session: {} as {} with {:?}", snapshot.state, snapshot.role, snapshot.peer_name);
    match view.camera_state() {
        Some(camera) => println!(
            "camera:  zoom {:.1}x, flash {:?}, mode {}",
            camera.zoom, camera.flash, camera.mode
        ),
        None => println!("camera:  no status received yet"),
    }
    println!("preview: {} frames received", view.frames_received());
    if let Some(hint) = view.suggestion() {
        println!("hint:    {hint}");
    }
}
