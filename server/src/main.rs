use clap::Parser;
use log::{info, warn};
use server::config::{clamp_grid_size, clamp_match_secs, GameConfig, DEFAULT_TICK_RATE};
use server::network::{Server, ServerMessage};
use shared::FoodPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Room tick rate (updates per second)
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Default board size for new rooms
    #[arg(short, long, default_value = "20")]
    grid_size: u32,

    /// Default match length in seconds
    #[arg(short, long, default_value = "120")]
    duration: u32,

    /// Default food policy: EQUAL, HALF or a fixed count
    #[arg(short, long, default_value = "1")]
    food: FoodPolicy,

    /// Chance that a permitted powerup spawn goes ahead
    #[arg(long, default_value = "0.9")]
    powerup_chance: f64,

    /// Kill snakes that leave the board instead of wrapping them
    #[arg(long)]
    no_wrap: bool,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        let mut config = GameConfig {
            max_clients: self.max_clients,
            ..GameConfig::default()
        };
        config.room.tick_rate = self.tick_rate.max(1);
        config.room.grid_size = clamp_grid_size(self.grid_size);
        config.room.match_duration_ms = clamp_match_secs(self.duration) as u64 * 1000;
        config.room.food_policy = self.food;
        config.room.wrap = !self.no_wrap;
        config.room.powerups.spawn_chance = self.powerup_chance.clamp(0.0, 1.0);
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting server on {}", address);
    info!(
        "Rooms: {}x{} board, {} Hz, {}s matches, food {}",
        config.room.grid_size,
        config.room.grid_size,
        config.room.tick_rate,
        config.room.match_duration_ms / 1000,
        config.room.food_policy
    );

    let mut server = Server::new(&address, config).await?;

    let control = server.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if control.send(ServerMessage::Shutdown).is_err() {
                warn!("Server already stopped");
            }
        }
    });

    server.run().await?;

    Ok(())
}
