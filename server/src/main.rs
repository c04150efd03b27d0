use clap::Parser;
use log::{error, info};
use server::clock::SystemClock;
use server::directory::RoomDirectory;
use server::network::Server;
use server::room::RoomConfig;
use shared::{DEFAULT_MAX_CLIENTS, TICK_RATE};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative room server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 2567)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Capacity of rooms created without maxClients
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Name clients use to reach the game room
    #[arg(short, long, default_value = "game_room")]
    room_type: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Hint: set RUST_LOG=info (or debug) to see server logs");
    }
    env_logger::init();

    let args = Args::parse();
    if args.tick_rate == 0 {
        return Err("tick rate must be at least 1".into());
    }

    let config = RoomConfig {
        tick_rate: args.tick_rate,
        default_max_clients: shared::protocol::clamp_max_clients(args.max_clients as f64)
            .unwrap_or(DEFAULT_MAX_CLIENTS),
        auto_dispose: true,
    };

    let directory = Arc::new(RoomDirectory::new(Arc::new(SystemClock)));
    directory.define(&args.room_type, config, &["mode"]).await;

    let addr = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&addr, Arc::clone(&directory)).await?;
    info!(
        "Serving room type \"{}\" at {} Hz, default capacity {}",
        args.room_type, config.tick_rate, config.default_max_clients
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    directory.dispose_all().await;
    Ok(())
}
