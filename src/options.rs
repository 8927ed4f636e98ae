//! Translation of a download request into fetch-tool arguments.
//!
//! Nothing here touches the network or the filesystem. Selector strings and
//! post-processing values are handed to yt-dlp as-is.

use std::path::{Path, PathBuf};

use crate::models::MediaKind;
use crate::tools::ToolCommand;

/// Audio codecs that are extracted without a bitrate target.
pub const LOSSLESS_AUDIO_FORMATS: [&str; 3] = ["flac", "alac", "wav"];

/// Container every video result ends up in.
pub const VIDEO_CONTAINER: &str = "mp4";

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const AUDIO_SELECTOR: &str = "bestaudio/best";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    /// Extract the audio track and convert it to `codec`.
    ExtractAudio {
        codec: String,
        bitrate_kbps: Option<u32>,
    },
    /// Convert the merged video to `container`.
    ConvertVideo { container: String },
}

impl PostProcess {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            PostProcess::ExtractAudio {
                codec,
                bitrate_kbps,
            } => {
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                if let Some(kbps) = bitrate_kbps {
                    args.push("--audio-quality".to_string());
                    args.push(format!("{}K", kbps));
                }
            }
            PostProcess::ConvertVideo { container } => {
                args.push("--recode-video".to_string());
                args.push(container.clone());
            }
        }
    }
}

/// Everything yt-dlp needs for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOptions {
    pub output_template: PathBuf,
    pub format_selector: String,
    pub merge_output_format: Option<String>,
    pub post_processors: Vec<PostProcess>,
    pub ffmpeg_location: Option<PathBuf>,
    pub quality_label: String,
}

impl ToolOptions {
    /// Fetch-tool arguments, excluding the URL.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            self.format_selector.clone(),
            "--output".to_string(),
            self.output_template.to_string_lossy().into_owned(),
        ];

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }

        if let Some(container) = &self.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }

        for post in &self.post_processors {
            post.push_args(&mut args);
        }

        args.extend(
            [
                "--no-playlist",
                "--no-warnings",
                "--print",
                "after_move:title",
            ]
            .map(String::from),
        );
        args
    }

    pub fn command(&self, fetch_tool: &Path, url: &str) -> ToolCommand {
        ToolCommand::new(fetch_tool)
            .args(self.to_args())
            .arg("--")
            .arg(url)
    }
}

pub fn is_lossless(format: &str) -> bool {
    LOSSLESS_AUDIO_FORMATS.contains(&format)
}

pub fn video_selector(height: u32) -> String {
    format!(
        "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]",
        h = height
    )
}

/// Build the options for `kind`/`format`/`quality`, writing into `work_dir`.
///
/// `ffmpeg` is the resolved conversion tool; yt-dlp is pointed at its
/// directory.
pub fn build(
    kind: MediaKind,
    format: &str,
    quality: u32,
    work_dir: &Path,
    ffmpeg: Option<&Path>,
) -> ToolOptions {
    let output_template = work_dir.join(OUTPUT_TEMPLATE);
    // A bare program name has an empty parent; yt-dlp then searches PATH itself.
    let ffmpeg_location = ffmpeg
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf);

    match kind {
        MediaKind::Audio => {
            let (bitrate_kbps, quality_label) = if is_lossless(format) {
                (None, format!("{} Lossless", format.to_uppercase()))
            } else {
                (
                    Some(quality),
                    format!("{}kbps {}", quality, format.to_uppercase()),
                )
            };

            ToolOptions {
                output_template,
                format_selector: AUDIO_SELECTOR.to_string(),
                merge_output_format: None,
                post_processors: vec![PostProcess::ExtractAudio {
                    codec: format.to_string(),
                    bitrate_kbps,
                }],
                ffmpeg_location,
                quality_label,
            }
        }
        MediaKind::Video => ToolOptions {
            output_template,
            format_selector: video_selector(quality),
            merge_output_format: Some(VIDEO_CONTAINER.to_string()),
            post_processors: vec![PostProcess::ConvertVideo {
                container: VIDEO_CONTAINER.to_string(),
            }],
            ffmpeg_location,
            quality_label: format!("{}p MP4", quality),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(format: &str, quality: u32) -> ToolOptions {
        build(
            MediaKind::Audio,
            format,
            quality,
            Path::new("/work"),
            Some(Path::new("/opt/ffmpeg/bin/ffmpeg")),
        )
    }

    #[test]
    fn lossless_audio_never_has_bitrate() {
        for format in LOSSLESS_AUDIO_FORMATS {
            let options = audio(format, 320);
            assert_eq!(
                options.post_processors,
                vec![PostProcess::ExtractAudio {
                    codec: format.to_string(),
                    bitrate_kbps: None
                }]
            );
            assert!(!options.to_args().contains(&"--audio-quality".to_string()));
            assert_eq!(
                options.quality_label,
                format!("{} Lossless", format.to_uppercase())
            );
        }
    }

    #[test]
    fn lossy_audio_always_has_bitrate() {
        for format in ["mp3", "aac", "opus", "m4a", "vorbis"] {
            let options = audio(format, 192);
            let args = options.to_args();
            let at = args.iter().position(|a| a == "--audio-quality").unwrap();
            assert_eq!(args[at + 1], "192K");
        }
        assert_eq!(audio("mp3", 192).quality_label, "192kbps MP3");
    }

    #[test]
    fn audio_selects_best_audio_stream() {
        let options = audio("mp3", 128);
        assert_eq!(options.format_selector, "bestaudio/best");
        assert_eq!(options.merge_output_format, None);
        assert_eq!(options.output_template, Path::new("/work/%(title)s.%(ext)s"));
    }

    #[test]
    fn video_selector_falls_back_in_priority_order() {
        let options = build(MediaKind::Video, "mp4", 720, Path::new("/work"), None);
        let alternatives: Vec<&str> = options.format_selector.split('/').collect();
        assert_eq!(
            alternatives,
            vec![
                "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]",
                "bestvideo[height<=720]+bestaudio",
                "best[height<=720]",
            ]
        );
        assert_eq!(options.merge_output_format.as_deref(), Some("mp4"));
        assert_eq!(options.quality_label, "720p MP4");
    }

    #[test]
    fn ffmpeg_location_is_the_tool_directory() {
        let args = audio("mp3", 192).to_args();
        let at = args.iter().position(|a| a == "--ffmpeg-location").unwrap();
        assert_eq!(args[at + 1], "/opt/ffmpeg/bin");

        let bare = build(MediaKind::Video, "mp4", 1080, Path::new("/work"), None);
        assert!(!bare.to_args().contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn bare_ffmpeg_name_leaves_location_to_yt_dlp() {
        let opts = build(
            MediaKind::Audio,
            "mp3",
            192,
            Path::new("/work"),
            Some(Path::new("ffmpeg")),
        );
        assert_eq!(opts.ffmpeg_location, None);
        assert!(!opts.to_args().contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn command_ends_with_url_after_separator() {
        let cmd = audio("mp3", 192).command(Path::new("yt-dlp"), "https://youtu.be/abc");
        let args = cmd.args_lossy();
        assert_eq!(&args[args.len() - 2..], ["--", "https://youtu.be/abc"]);
        assert!(args.windows(2).any(|w| w == ["--print", "after_move:title"]));
    }
}
