use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{DownloadError, DownloadResult};
use crate::models::MediaKind;
use crate::options::ToolOptions;
use crate::tools::failure_message;

/// Extensions a merged or partially merged video can end up with.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "webm", "m4a"];

/// A file left in the working directory by the fetch tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFile {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// Run yt-dlp into `work_dir` and pick the file it produced.
pub async fn fetch_media(
    fetch_tool: &Path,
    url: &str,
    kind: MediaKind,
    options: &ToolOptions,
    work_dir: &Path,
) -> DownloadResult<FetchedMedia> {
    let command = options.command(fetch_tool, url);
    info!("Fetching {} into {}", url, work_dir.display());
    debug!("Running {}", command);

    let output = command.output().await.map_err(|e| {
        DownloadError::Fetch(format!(
            "Failed to execute {}: {}",
            fetch_tool.display(),
            e
        ))
    })?;

    if !output.status.success() {
        return Err(DownloadError::Fetch(failure_message(&output)));
    }

    let title = parse_title(&String::from_utf8_lossy(&output.stdout))
        .unwrap_or_else(|| kind.as_str().to_string());

    let dir = work_dir.to_path_buf();
    let files = tokio::task::spawn_blocking(move || list_files(&dir)).await??;
    let path = select_result(kind, &files)
        .ok_or_else(|| DownloadError::Fetch("no output produced".to_string()))?;

    info!("Fetched \"{}\" as {}", title, path.display());
    Ok(FetchedMedia { path, title })
}

/// Title printed by `--print after_move:title`; the last non-empty line wins.
pub fn parse_title(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

/// Regular files directly inside `dir`, in file-name order.
pub fn list_files(dir: &Path) -> DownloadResult<Vec<WorkFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            DownloadError::filesystem(format!("Failed to list {}", dir.display()), e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let size = entry
            .metadata()
            .map_err(|e| {
                DownloadError::filesystem(
                    format!("Failed to stat {}", entry.path().display()),
                    e.into(),
                )
            })?
            .len();

        files.push(WorkFile {
            path: entry.into_path(),
            size,
        });
    }

    Ok(files)
}

/// Pick the result among `files` (already in name order).
///
/// Audio takes the first file. Video takes the largest file with a known
/// container extension, on the assumption that the merged audio+video file
/// outweighs any leftover single-stream parts; equal sizes keep the earlier
/// name.
pub fn select_result(kind: MediaKind, files: &[WorkFile]) -> Option<PathBuf> {
    match kind {
        MediaKind::Audio => files.first().map(|f| f.path.clone()),
        MediaKind::Video => files
            .iter()
            .filter(|f| has_video_extension(&f.path))
            .fold(None::<&WorkFile>, |best, f| match best {
                Some(b) if b.size >= f.size => Some(b),
                _ => Some(f),
            })
            .map(|f| f.path.clone()),
    }
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
