use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use netsim_client::network::NetworkClient;
use netsim_client::session::Session;
use netsim_client::simulation::{self, Simulator, Timings};
use netsim_protocol::{Payload, TransmissionData, TransportProtocol};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Headless NetSim client.
#[derive(Parser, Debug)]
#[command(name = "netsim", about = "Headless NetSim client")]
struct Cli {
    /// Relay server base URL.
    #[arg(long, global = true, env = "NETSIM_SERVER", default_value = "http://localhost:3001")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new room and join it.
    Create(SessionArgs),
    /// Join an existing room by its 6-character id.
    Join {
        room_id: String,
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Display name in the room.
    #[arg(long)]
    name: String,

    /// Send this text once a peer is in the room.
    #[arg(long, conflicts_with = "send_file")]
    send_text: Option<String>,

    /// Send this file once a peer is in the room.
    #[arg(long)]
    send_file: Option<PathBuf>,

    /// Transport mode for the simulated transfer.
    #[arg(long, value_enum, default_value_t = ProtocolArg::Tcp)]
    protocol: ProtocolArg,

    /// Give up a TCP transfer after this many attempts.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Leave the room as soon as the transmission completes.
    #[arg(long)]
    exit_after_send: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for TransportProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => TransportProtocol::Tcp,
            ProtocolArg::Udp => TransportProtocol::Udp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netsim=debug,netsim_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client = NetworkClient::new(&cli.server);

    let (room_id, args, outgoing) = match cli.command {
        Command::Create(args) => {
            let outgoing = outgoing_payload(&args).await?;
            let room_id = client
                .create_room()
                .await
                .with_context(|| format!("Failed to create a room on {}", client.server_url()))?;
            let room = client.room_info(&room_id).await?;
            tracing::info!("Created room {} at {}", room.room_id, room.created_at);
            (room_id, args, outgoing)
        }
        Command::Join { room_id, session } => {
            let outgoing = outgoing_payload(&session).await?;
            let room = client
                .join_room(&room_id, &session.name)
                .await
                .with_context(|| format!("Failed to join room {}", room_id))?;
            tracing::info!(
                "Reserved a seat in room {} ({} connected)",
                room.room_id,
                room.participants.len()
            );
            (room.room_id, session, outgoing)
        }
    };

    let (ws, incoming) = client.connect().await?;
    let timings = Timings {
        max_attempts: args.max_attempts,
        ..Timings::default()
    };
    let simulator = Simulator::new(&args.name, timings, StdRng::from_entropy(), ws.sender());
    let mut session = Session::new(&args.name, &room_id, ws.sender(), simulator);

    if let Some(payload) = outgoing {
        let now = chrono::Utc::now();
        let data = TransmissionData {
            id: Some(now.timestamp_millis()),
            protocol: args.protocol.into(),
            payload,
            created_at: Some(now),
            transmission_id: None,
            extra: Default::default(),
        };
        session = session.with_outgoing(data, args.exit_after_send);
    }

    session.run(incoming, shutdown_signal()).await?;
    tracing::info!("Session ended");

    Ok(())
}

/// Validate and load what `--send-text` / `--send-file` asked for before
/// touching the network
async fn outgoing_payload(args: &SessionArgs) -> Result<Option<Payload>> {
    if let Some(text) = &args.send_text {
        return Ok(Some(simulation::text_payload(text)?));
    }

    let Some(path) = &args.send_file else {
        return Ok(None);
    };

    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();
    simulation::check_media_size(size)?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let payload = simulation::media_payload(&file_name(path), simulation::media_type_for(path), &bytes)?;

    Ok(Some(payload))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
