use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tracing::debug;

#[cfg(windows)]
pub const FFMPEG_BIN: &str = "ffmpeg.exe";
#[cfg(not(windows))]
pub const FFMPEG_BIN: &str = "ffmpeg";

/// Directory under the application dir holding unpacked ffmpeg builds,
/// e.g. `ffmpeg/ffmpeg-7.0-essentials_build/bin/ffmpeg`.
const BUNDLE_DIR: &str = "ffmpeg";
const BUNDLE_PREFIX: &str = "ffmpeg-";

/// Finds the ffmpeg executable, preferring a bundled build over `PATH`.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    app_dir: PathBuf,
}

impl ToolLocator {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.bundled() {
            debug!("Using bundled ffmpeg at {}", path.display());
            return Some(path);
        }

        let path = which::which("ffmpeg").ok().filter(|p| is_executable(p))?;
        debug!("Using ffmpeg from PATH at {}", path.display());
        Some(path)
    }

    fn bundled(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.app_dir.join(BUNDLE_DIR)).ok()?;

        let mut builds: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(BUNDLE_PREFIX)
            })
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        builds.sort();

        builds
            .into_iter()
            .map(|dir| dir.join("bin").join(FFMPEG_BIN))
            .find(|exe| is_executable(exe))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// An external program invocation, built before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments as lossy strings, for assertions and logs.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    pub async fn output(&self) -> std::io::Result<Output> {
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Best human-readable reason a tool run failed.
pub fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    format!("process exited with {}", output.status)
}
