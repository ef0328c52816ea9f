use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod api;
mod batch;
mod config;
mod handler;

#[derive(Parser)]
#[command(name = "image-squeeze")]
#[command(about = "Shrink JPEG/PNG images and add WebP copies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the optimize API
    Serve {
        /// Listen address
        #[arg(long, env = "SQUEEZE_ADDR", default_value = config::DEFAULT_ADDR)]
        addr: SocketAddr,
        /// Root directory for per-job scratch storage
        #[arg(long, env = "SQUEEZE_SCRATCH_DIR")]
        scratch_dir: Option<PathBuf>,
        /// Concurrent transcodes per job (default: available cores)
        #[arg(long, env = "SQUEEZE_CONCURRENCY")]
        concurrency: Option<usize>,
        /// Per-file upload limit in MiB
        #[arg(long, env = "SQUEEZE_MAX_UPLOAD_MB", default_value_t = config::DEFAULT_MAX_UPLOAD_MB)]
        max_upload_mb: u64,
    },
    /// Optimize every image in a directory
    Batch(batch::BatchArgs),
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("squeeze_engine", log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Serve {
            addr,
            scratch_dir,
            concurrency,
            max_upload_mb,
        } => {
            let config = config::ServerConfig::new(
                addr,
                scratch_dir.unwrap_or_else(config::default_scratch_root),
                concurrency,
                max_upload_mb,
            );
            serve(config).await
        }
        Commands::Batch(args) => match batch::run(args).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        },
    };

    std::process::exit(code);
}

async fn serve(config: config::ServerConfig) -> i32 {
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    let server = api::start_api_server(config, cancel_clone);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    match server.await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            log::error!("API server failed: {:#}", e);
            1
        }
        Err(e) => {
            log::error!("API server task failed: {}", e);
            1
        }
    }
}
