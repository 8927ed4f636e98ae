use std::path::Path;

use tracing::{info, warn};

use crate::error::{DownloadError, DownloadResult};
use crate::options::VIDEO_CONTAINER;
use crate::output::move_file;
use crate::tools::{failure_message, ToolCommand};

/// Audio codec and bitrate used when a non-mp4 result has to be remuxed.
const REMUX_AUDIO_CODEC: &str = "aac";
const REMUX_AUDIO_BITRATE: &str = "192k";

/// Whether `result` is already in the target container.
pub fn is_target_container(result: &Path) -> bool {
    result
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(VIDEO_CONTAINER))
        .unwrap_or(false)
}

/// ffmpeg invocation that keeps the video stream, re-encodes audio to AAC
/// and moves the index to the front of the file.
///
/// `-y` is needed because the target already exists as a reserved
/// placeholder.
pub fn remux_command(ffmpeg: &Path, input: &Path, target: &Path) -> ToolCommand {
    ToolCommand::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args([
            "-c:v",
            "copy",
            "-c:a",
            REMUX_AUDIO_CODEC,
            "-b:a",
            REMUX_AUDIO_BITRATE,
            "-movflags",
            "+faststart",
        ])
        .arg(target)
}

/// Put a fetched video at `target`, remuxing it when it is not an mp4 yet.
pub async fn finalize(result: &Path, target: &Path, ffmpeg: &Path) -> DownloadResult<()> {
    if is_target_container(result) {
        info!("Moving {} to {}", result.display(), target.display());
        return move_file(result, target).await;
    }

    let command = remux_command(ffmpeg, result, target);
    info!("Remuxing {} to {}", result.display(), target.display());

    let output = command.output().await.map_err(|e| {
        DownloadError::Conversion(format!("Failed to execute {}: {}", ffmpeg.display(), e))
    })?;

    if !output.status.success() {
        return Err(DownloadError::Conversion(failure_message(&output)));
    }

    if let Err(e) = tokio::fs::remove_file(result).await {
        warn!(
            "Failed to remove intermediate {}: {}",
            result.display(),
            e
        );
    }

    Ok(())
}
