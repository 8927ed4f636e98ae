use std::path::PathBuf;

pub const DEFAULT_FETCH_TOOL: &str = "yt-dlp";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";

/// Settings shared by every request, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Where finished files accumulate.
    pub download_dir: PathBuf,
    /// Searched for a bundled `ffmpeg/ffmpeg-*/bin/ffmpeg`.
    pub app_dir: PathBuf,
    /// Explicit ffmpeg path; skips the search when set.
    pub ffmpeg: Option<PathBuf>,
    pub fetch_tool: PathBuf,
    /// Parent for per-request working directories; system temp if unset.
    pub work_root: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            app_dir: default_app_dir(),
            ffmpeg: None,
            fetch_tool: PathBuf::from(DEFAULT_FETCH_TOOL),
            work_root: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_DIR)
    }
}

/// Directory of the running executable, or `.` when that is unknown.
pub fn default_app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}
