use clap::Parser;
use log::info;
use server::content::ContentRepository;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "7777")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Maximum number of connected players
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
    /// World definition file; the bundled demo world is used when omitted
    #[clap(short, long)]
    content: Option<PathBuf>,
    /// Seed for NPC wandering and loot rolls
    #[clap(short, long)]
    seed: Option<u64>,
}

/// Parses command-line arguments, loads the world and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let content = match &args.content {
        Some(path) => {
            info!("Loading world from {}", path.display());
            ContentRepository::load(path)?
        }
        None => ContentRepository::builtin()?,
    };

    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1)));
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        tick_duration,
        args.max_clients,
        content,
        args.seed,
    )
    .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Goodbye");
    Ok(())
}
