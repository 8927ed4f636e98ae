#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use media_fetch::{DownloadService, ServiceConfig};
use tempfile::TempDir;

/// Parses `--output`, records the arguments next to the script, then runs
/// `body` with `$dir` set to the working directory.
const FETCH_PRELUDE: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/fetch-args.txt"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
dir=$(dirname "$out")
"#;

/// Copies the `-i` input to the last argument, like a stream-copy remux.
pub const FFMPEG_COPY: &str = r#"#!/bin/sh
echo call >> "$(dirname "$0")/calls.log"
for last in "$@"; do :; done
in=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cp "$in" "$last"
"#;

pub const FFMPEG_FAIL: &str = r#"#!/bin/sh
echo call >> "$(dirname "$0")/calls.log"
echo "Invalid data found when processing input" >&2
exit 1
"#;

/// Starts a conversion that outlives any reasonable request.
pub const FFMPEG_SLOW: &str = r#"#!/bin/sh
echo call >> "$(dirname "$0")/calls.log"
exec sleep 30
"#;

pub fn write_script(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A service wired to stub tools inside one scratch directory.
pub struct Harness {
    pub root: TempDir,
    pub service: DownloadService,
}

impl Harness {
    pub fn new(fetch_body: &str) -> Self {
        Self::with_ffmpeg(fetch_body, FFMPEG_COPY)
    }

    pub fn with_ffmpeg(fetch_body: &str, ffmpeg: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let fetch_tool = root.path().join("tools/yt-dlp");
        write_script(&fetch_tool, &format!("{}{}", FETCH_PRELUDE, fetch_body));
        // Bundled layout, so the locator finds it before anything on PATH.
        write_script(
            &root.path().join("app/ffmpeg/ffmpeg-test/bin/ffmpeg"),
            ffmpeg,
        );

        let mut config = ServiceConfig::new(root.path().join("downloads"));
        config.app_dir = root.path().join("app");
        config.fetch_tool = fetch_tool;
        config.work_root = Some(root.path().join("work"));
        let service = DownloadService::new(config).unwrap();

        Self { root, service }
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.path().join("downloads")
    }

    pub fn download_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.downloads())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn work_dirs_left(&self) -> usize {
        std::fs::read_dir(self.root.path().join("work"))
            .unwrap()
            .count()
    }

    pub fn ffmpeg_calls(&self) -> usize {
        std::fs::read_to_string(self.root.path().join("app/ffmpeg/ffmpeg-test/bin/calls.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    pub fn fetch_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.path().join("tools/fetch-args.txt"))
            .map(|args| args.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
