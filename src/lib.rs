//! Local download service: fetches media with yt-dlp, finishes it with
//! ffmpeg and stores it under a collision-free name.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod models;
pub mod options;
pub mod output;
pub mod service;
pub mod tools;
pub mod usage;
pub mod video;

pub use config::ServiceConfig;
pub use error::{DownloadError, DownloadResult};
pub use models::{DownloadRequest, FinalArtifact, MediaKind};
pub use service::DownloadService;
