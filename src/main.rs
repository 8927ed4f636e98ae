use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use media_fetch::config::{self, ServiceConfig};
use media_fetch::http::{self, AppState};
use media_fetch::models::{DownloadResponse, DEFAULT_FORMAT, DEFAULT_QUALITY};
use media_fetch::usage::{MemoryUsageStore, RedisUsageStore, UsageStore};
use media_fetch::{DownloadRequest, DownloadService, MediaKind};

#[derive(Parser)]
#[command(name = "media-fetch")]
#[command(about = "Download audio or video with yt-dlp and ffmpeg")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory finished files are written to
    #[arg(long, env = "DOWNLOAD_DIR", default_value = config::DEFAULT_DOWNLOAD_DIR)]
    download_dir: PathBuf,

    /// Directory searched for a bundled ffmpeg (defaults to the executable's directory)
    #[arg(long, env = "APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Use this ffmpeg instead of searching for one
    #[arg(long, env = "FFMPEG_PATH")]
    ffmpeg: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long, env = "FETCH_TOOL", default_value = config::DEFAULT_FETCH_TOOL)]
    fetch_tool: PathBuf,

    /// Parent directory for per-request working directories
    #[arg(long, env = "WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Redis URL for usage counters (kept in memory when unset)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Address the HTTP service listens on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Download a single URL and print the result (CLI mode)
    Download {
        /// Video URL
        #[arg(short, long)]
        url: String,
        /// audio or video
        #[arg(short = 't', long = "type", default_value = "audio")]
        kind: String,
        /// Output format, e.g. mp3, flac, mp4
        #[arg(short, long, default_value = DEFAULT_FORMAT)]
        format: String,
        /// kbps for audio, pixel height for video
        #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
        quality: u32,
    },
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(&self.download_dir);
        if let Some(app_dir) = &self.app_dir {
            config.app_dir = app_dir.clone();
        }
        config.ffmpeg = self.ffmpeg.clone();
        config.fetch_tool = self.fetch_tool.clone();
        config.work_root = self.work_root.clone();
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("media_fetch=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let service = DownloadService::new(cli.service_config())?;

    match cli.command {
        Some(Commands::Download {
            ref url,
            ref kind,
            ref format,
            quality,
        }) => {
            let kind: MediaKind = kind.parse()?;
            let request = DownloadRequest::new(url, kind, format, quality)?;
            let artifact = service.download(&request).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&DownloadResponse::from(&artifact))?
            );
        }
        // Default to serving
        Some(Commands::Serve) | None => serve(&cli, service).await?,
    }

    Ok(())
}

async fn serve(cli: &Cli, service: DownloadService) -> Result<()> {
    let bind = cli.bind;
    let usage: Arc<dyn UsageStore> = match &cli.redis_url {
        Some(url) => Arc::new(RedisUsageStore::connect(url).await?),
        None => Arc::new(MemoryUsageStore::new()),
    };

    info!("Serving files from {}", service.download_dir().display());
    let app = http::router(AppState {
        service: Arc::new(service),
        usage,
    });

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")
}
