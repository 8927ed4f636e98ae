use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::download;
use crate::error::{DownloadError, DownloadResult};
use crate::models::{DownloadRequest, FinalArtifact, MediaKind};
use crate::options;
use crate::output::{self, move_file};
use crate::tools::ToolLocator;
use crate::video;

const WORK_DIR_PREFIX: &str = "media-fetch-";

/// Runs download requests end to end.
///
/// Each request gets its own temporary working directory, which is removed
/// whether the request succeeds or not. The ffmpeg path is resolved once
/// here and reused by every request.
pub struct DownloadService {
    config: ServiceConfig,
    ffmpeg: Option<PathBuf>,
}

impl DownloadService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.download_dir).with_context(|| {
            format!(
                "Failed to create download directory {}",
                config.download_dir.display()
            )
        })?;
        if let Some(root) = &config.work_root {
            std::fs::create_dir_all(root).with_context(|| {
                format!("Failed to create work root {}", root.display())
            })?;
        }

        let ffmpeg = match &config.ffmpeg {
            Some(path) => Some(path.clone()),
            None => ToolLocator::new(&config.app_dir).locate(),
        };

        match &ffmpeg {
            Some(path) => info!("FFmpeg: {}", path.display()),
            None => warn!("FFmpeg not found, downloads will fail until it is installed"),
        }
        info!("Downloads: {}", config.download_dir.display());

        Ok(Self { config, ffmpeg })
    }

    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }

    pub fn download_dir(&self) -> &Path {
        &self.config.download_dir
    }

    pub async fn download(&self, request: &DownloadRequest) -> DownloadResult<FinalArtifact> {
        let job_id = Uuid::new_v4();
        info!(
            "Job {}: {} {} ({} @ {})",
            job_id,
            request.kind(),
            request.url(),
            request.format(),
            request.quality()
        );

        let ffmpeg = self.ffmpeg().ok_or(DownloadError::ToolUnavailable)?;
        let work_dir = self.work_dir()?;

        let result = self.run(job_id, request, ffmpeg, work_dir.path()).await;

        if let Err(e) = work_dir.close() {
            warn!("Job {}: failed to remove working directory: {}", job_id, e);
        }

        match &result {
            Ok(artifact) => info!(
                "Job {}: saved {} ({} bytes)",
                job_id,
                artifact.path.display(),
                artifact.size
            ),
            Err(e) => error!("Job {}: failed: {}", job_id, e),
        }
        result
    }

    async fn run(
        &self,
        job_id: Uuid,
        request: &DownloadRequest,
        ffmpeg: &Path,
        work_dir: &Path,
    ) -> DownloadResult<FinalArtifact> {
        let kind = request.kind();
        let options = options::build(
            kind,
            request.format(),
            request.quality(),
            work_dir,
            Some(ffmpeg),
        );

        let fetched = download::fetch_media(
            &self.config.fetch_tool,
            request.url(),
            kind,
            &options,
            work_dir,
        )
        .await?;

        let resolved = {
            let title = fetched.title.clone();
            let format = request.format().to_string();
            let quality = request.quality();
            let destination = self.config.download_dir.clone();
            tokio::task::spawn_blocking(move || {
                output::resolve(&title, kind, &format, quality, &destination)
            })
            .await??
        };
        info!("Job {}: writing {}", job_id, resolved.file_name);

        let placed = match kind {
            MediaKind::Audio => move_file(&fetched.path, &resolved.path).await,
            MediaKind::Video => video::finalize(&fetched.path, &resolved.path, ffmpeg).await,
        };
        // An error or cancellation from here on drops `resolved`, which
        // removes the placeholder.
        placed?;

        let size = tokio::fs::metadata(&resolved.path)
            .await
            .map_err(DownloadError::io_at("stat", &resolved.path))?
            .len();
        let (filename, path) = resolved.commit();

        Ok(FinalArtifact {
            path,
            filename,
            quality: options.quality_label,
            kind,
            size,
        })
    }

    fn work_dir(&self) -> DownloadResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_DIR_PREFIX);
        let dir = match &self.config.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| DownloadError::filesystem("Failed to create working directory", e))
    }

    /// Path of a finished file, if `name` is a plain file name that exists in
    /// the download directory.
    pub async fn stored_file(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            return None;
        }

        let path = self.config.download_dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

/// A single normal path component: no separators, `.` or `..`.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
