//! Final file naming inside the download directory.
//!
//! A chosen name is reserved by creating an empty placeholder with
//! `create_new`, so two requests resolving the same title at the same time
//! always end up with different files. The finalize step replaces the
//! placeholder, and the reservation is committed once the file is in place.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{DownloadError, DownloadResult};
use crate::models::MediaKind;
use crate::options::VIDEO_CONTAINER;

/// Longest title prefix kept in a filename, in characters.
pub const MAX_TITLE_CHARS: usize = 50;

/// A reserved name in the download directory.
///
/// Dropping it without [`ResolvedOutput::commit`] removes the placeholder,
/// so a failed or cancelled request leaves nothing behind.
#[derive(Debug)]
pub struct ResolvedOutput {
    pub file_name: String,
    pub path: PathBuf,
    committed: bool,
}

impl ResolvedOutput {
    /// Keep whatever is now at `path`, returning its name and path.
    pub fn commit(mut self) -> (String, PathBuf) {
        self.committed = true;
        (
            std::mem::take(&mut self.file_name),
            std::mem::take(&mut self.path),
        )
    }
}

impl Drop for ResolvedOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released output name {}", self.file_name),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to release {}: {}", self.path.display(), e),
        }
    }
}

/// First `MAX_TITLE_CHARS` characters of `title`, with anything that would
/// leave the download directory replaced by `_`.
pub fn truncate_title(title: &str) -> String {
    title
        .chars()
        .take(MAX_TITLE_CHARS)
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Candidate file name; `attempt` 0 is the unsuffixed name.
pub fn candidate_name(
    title: &str,
    kind: MediaKind,
    format: &str,
    quality: u32,
    attempt: u32,
) -> String {
    let suffix = if attempt == 0 {
        String::new()
    } else {
        format!("_{}", attempt)
    };

    match kind {
        MediaKind::Video => format!("{}_{}p{}.{}", title, quality, suffix, VIDEO_CONTAINER),
        MediaKind::Audio => format!("{}{}.{}", title, suffix, format),
    }
}

/// Move `from` onto `to`, copying when a rename cannot cross filesystems.
pub async fn move_file(from: &Path, to: &Path) -> DownloadResult<()> {
    if let Err(e) = tokio::fs::rename(from, to).await {
        debug!(
            "Rename {} -> {} failed ({}), copying instead",
            from.display(),
            to.display(),
            e
        );
        tokio::fs::copy(from, to)
            .await
            .map_err(DownloadError::io_at("copy", from))?;
        tokio::fs::remove_file(from)
            .await
            .map_err(DownloadError::io_at("remove", from))?;
    }
    Ok(())
}

/// Reserve a name in `destination` that no existing entry uses.
///
/// Blocking; async callers run it on the blocking pool.
pub fn resolve(
    title: &str,
    kind: MediaKind,
    format: &str,
    quality: u32,
    destination: &Path,
) -> DownloadResult<ResolvedOutput> {
    let title = truncate_title(title);

    let mut attempt = 0u32;
    loop {
        let file_name = candidate_name(&title, kind, format, quality, attempt);
        let path = destination.join(&file_name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!("Reserved output name {}", file_name);
                return Ok(ResolvedOutput {
                    file_name,
                    path,
                    committed: false,
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                attempt = attempt.checked_add(1).ok_or_else(|| {
                    DownloadError::filesystem(
                        format!("No free file name for {}", title),
                        e,
                    )
                })?;
            }
            Err(e) => return Err(DownloadError::io_at("reserve", &path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn audio(title: &str, dir: &Path) -> String {
        resolve(title, MediaKind::Audio, "mp3", 192, dir)
            .unwrap()
            .commit()
            .0
    }

    #[test]
    fn appends_counter_before_extension_for_audio() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Song.mp3"), b"x").unwrap();

        assert_eq!(audio("Song", dir.path()), "Song_1.mp3");
        assert_eq!(audio("Song", dir.path()), "Song_2.mp3");
    }

    #[test]
    fn counter_follows_quality_marker_for_video() {
        let dir = tempfile::tempdir().unwrap();
        let first = resolve("Clip", MediaKind::Video, "mp4", 720, dir.path()).unwrap();
        let second = resolve("Clip", MediaKind::Video, "webm", 720, dir.path()).unwrap();

        assert_eq!(first.file_name, "Clip_720p.mp4");
        assert_eq!(second.file_name, "Clip_720p_1.mp4");
        assert_eq!(second.path, dir.path().join("Clip_720p_1.mp4"));
    }

    #[test]
    fn long_titles_keep_exactly_fifty_characters() {
        let dir = tempfile::tempdir().unwrap();
        let title: String = "é".repeat(80);
        let name = audio(&title, dir.path());
        let stem = name.strip_suffix(".mp3").unwrap();

        assert_eq!(stem.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(stem, "é".repeat(50));
    }

    #[test]
    fn separators_cannot_escape_the_download_dir() {
        assert_eq!(truncate_title("AC/DC - Live\\Rare"), "AC_DC - Live_Rare");
        assert_eq!(truncate_title("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn never_returns_an_existing_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Song.mp3", "Song_1.mp3", "Song_3.mp3"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("Song_2.mp3")).unwrap();

        assert_eq!(audio("Song", dir.path()), "Song_4.mp3");
    }

    #[tokio::test]
    async fn move_replaces_the_placeholder() {
        let work = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let fetched = work.path().join("MySong.m4a");
        std::fs::write(&fetched, b"audio").unwrap();

        let resolved = resolve("MySong", MediaKind::Audio, "mp3", 192, dest.path()).unwrap();
        move_file(&fetched, &resolved.path).await.unwrap();

        assert!(!fetched.exists());
        assert_eq!(std::fs::read(&resolved.path).unwrap(), b"audio");
    }

    #[test]
    fn dropping_an_uncommitted_reservation_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("Song", MediaKind::Audio, "mp3", 192, dir.path()).unwrap();
        let path = resolved.path.clone();
        assert!(path.exists());

        drop(resolved);
        assert!(!path.exists());
        assert_eq!(audio("Song", dir.path()), "Song.mp3");
    }

    #[test]
    fn committed_reservation_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("Song", MediaKind::Audio, "mp3", 192, dir.path()).unwrap();
        std::fs::write(&resolved.path, b"audio").unwrap();

        let (file_name, path) = resolved.commit();
        assert_eq!(file_name, "Song.mp3");
        assert_eq!(std::fs::read(&path).unwrap(), b"audio");
    }

    #[test]
    fn release_tolerates_a_vanished_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("Song", MediaKind::Audio, "mp3", 192, dir.path()).unwrap();
        std::fs::remove_file(&resolved.path).unwrap();
        drop(resolved);
    }

    // The existence check and the reservation are one create-exclusive open,
    // so concurrent resolvers of the same title never share a name.
    #[test]
    fn concurrent_resolvers_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    resolve("Same Title", MediaKind::Audio, "mp3", 192, &root).unwrap()
                })
            })
            .collect();

        // Keep every reservation alive until all names are collected.
        let reserved: Vec<ResolvedOutput> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let names: HashSet<&str> = reserved.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names.len(), 16);
        assert!(names.contains("Same Title.mp3"));
    }
}
