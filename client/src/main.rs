use clap::Parser;
use client::interpolation::InterpolationConfig;
use client::network::{Client, ClientOptions};
use log::{debug, info};
use shared::{JoinOptions, SnapshotFormat};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server websocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:2567")]
    server: String,

    /// Room type to join
    #[arg(short = 'r', long, default_value = "game_room")]
    room: String,

    /// Join a specific room instead of matchmaking
    #[arg(long)]
    room_id: Option<String>,

    /// Always create a new room
    #[arg(long)]
    create: bool,

    /// Display name
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// warrior, mage, archer or rogue
    #[arg(short = 'c', long)]
    character: Option<String>,

    /// Name shown in room listings when creating a room
    #[arg(long)]
    room_name: Option<String>,

    /// Room capacity when creating a room
    #[arg(long)]
    max_clients: Option<f64>,

    /// Matchmaking mode
    #[arg(long)]
    mode: Option<String>,

    /// Snapshot encoding: json or binary
    #[arg(short = 'f', long, default_value = "json")]
    format: SnapshotFormat,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Walk a scripted path and send moves
    #[arg(short = 'b', long)]
    bot: bool,

    /// Position smoothing factor in (0, 1]
    #[arg(long, default_value = "0.15")]
    position_smoothing: f32,

    /// Heading smoothing factor in (0, 1]
    #[arg(long, default_value = "0.2")]
    heading_smoothing: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let options = ClientOptions {
        server: args.server,
        room_type: args.room,
        join: JoinOptions {
            character_type: args.character,
            username: args.username,
            room_name: args.room_name,
            max_clients: args.max_clients,
            mode: args.mode,
            ..Default::default()
        },
        format: args.format,
        room_id: args.room_id,
        create: args.create,
        fake_ping_ms: args.fake_ping,
        bot: args.bot,
        interpolation: InterpolationConfig::new(args.position_smoothing, args.heading_smoothing),
    };

    info!("Starting client...");
    if options.fake_ping_ms > 0 {
        info!("Simulating {}ms latency", options.fake_ping_ms);
    }

    let mut client = Client::connect(&options).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving room");
        }
    }
    if let Err(e) = client.close().await {
        debug!("Close after disconnect: {}", e);
    }

    Ok(())
}
