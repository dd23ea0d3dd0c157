//! # Absorption Chess Server
//!
//! A real-time multiplayer server for absorption chess: lobbies, FIFO
//! matchmaking, per-player clocks and an authoritative rule engine, all
//! driven through a single WebSocket connection per client.
//!
//! ## Rules
//!
//! Standard FIDE movement and check/checkmate/stalemate detection, plus
//! one addition: capturing a piece absorbs the captured piece's movement
//! abilities into the capturing piece for the rest of the game.
//!
//! ## Usage
//!
//! ```bash
//! # Start the server (default: 0.0.0.0:8765)
//! absorb-chess-server serve
//!
//! # Start on a custom port with a longer disconnect grace period
//! absorb-chess-server serve --port 9000 --grace-period-secs 60
//! ```
//!
//! ## Transport
//!
//! | Method | Path  | Description                           |
//! |--------|-------|----------------------------------------|
//! | GET    | `/ws` | WebSocket upgrade; the only endpoint.  |

pub mod ai;
pub mod config;
pub mod game;
pub mod hub;
pub mod lobby;
pub mod matchmaking;
pub mod protocol;
pub mod rules;
pub mod session;
pub mod storage;
pub mod types;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};

use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::storage::SnapshotStore;

/// Absorption Chess — a real-time multiplayer chess server.
///
/// Serves a single WebSocket endpoint for lobby creation, matchmaking,
/// move submission and game-over adjudication.
#[derive(Parser, Debug)]
#[command(name = "absorb-chess-server")]
#[command(about = "Real-time multiplayer server for absorption chess")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value_t = 8765)]
        port: u16,

        /// Host address to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Directory for lobby snapshot storage (active + archive).
        #[arg(long, default_value = "data")]
        data_dir: String,

        /// Seconds a disconnected player has to reconnect before being
        /// auto-resigned.
        #[arg(long, default_value_t = 40)]
        grace_period_secs: u64,

        /// Max draw offers a single player may send within the rolling
        /// rate-limit window.
        #[arg(long, default_value_t = 3)]
        draw_offer_limit: u32,

        /// Width, in seconds, of the draw-offer rate-limit window.
        #[arg(long, default_value_t = 60)]
        draw_offer_window_secs: u64,

        /// Interval, in milliseconds, between clock-scanner ticks that
        /// check for flag-falls and all-disconnected draws.
        #[arg(long, default_value_t = 100)]
        scan_interval_ms: u64,

        /// Whether a pending promotion may be canceled, rewinding the
        /// triggering move.
        #[arg(long, default_value_t = true)]
        promotion_cancel_allowed: bool,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            grace_period_secs,
            draw_offer_limit,
            draw_offer_window_secs,
            scan_interval_ms,
            promotion_cancel_allowed,
        } => {
            let config = ServerConfig {
                grace_period_secs,
                draw_offer_limit,
                draw_offer_window_secs,
                scan_interval_ms,
                promotion_cancel_allowed,
            };
            run_server(&host, port, &data_dir, config).await
        }
    }
}

/// Starts the HTTP server with its single WebSocket route, backed by one
/// `Hub` actor owning every lobby for the process's lifetime.
async fn run_server(host: &str, port: u16, data_dir: &str, config: ServerConfig) -> std::io::Result<()> {
    let snapshot = SnapshotStore::new(data_dir)?;
    let hub = Hub::new(config, snapshot).start();
    let hub_data = web::Data::new(hub);

    log::info!("starting absorption chess server on {}:{}", host, port);
    log::info!("lobby storage directory: {}", data_dir);
    log::info!("WebSocket endpoint: ws://{}:{}/ws", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(hub_data.clone())
            .route("/ws", web::get().to(session::ws_connect))
    })
    .bind((host, port))?
    .run()
    .await
}
