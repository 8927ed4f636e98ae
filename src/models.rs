use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DownloadError, DownloadResult};

pub const DEFAULT_FORMAT: &str = "mp3";
pub const DEFAULT_QUALITY: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(DownloadError::InvalidInput(format!(
                "unknown media type '{}'",
                other
            ))),
        }
    }
}

/// A validated download request. Fields are private so a value can only
/// exist after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    kind: MediaKind,
    format: String,
    quality: u32,
}

impl DownloadRequest {
    pub fn new(url: &str, kind: MediaKind, format: &str, quality: u32) -> DownloadResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::MissingInput);
        }

        let format = format.trim().to_ascii_lowercase();
        if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DownloadError::InvalidInput(format!(
                "unsupported format '{}'",
                format
            )));
        }

        if quality == 0 {
            return Err(DownloadError::InvalidInput(
                "quality must be a positive number".to_string(),
            ));
        }

        Ok(Self {
            url: url.to_string(),
            kind,
            format,
            quality,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }
}

/// Quality may arrive as `"192"` or `192`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QualityField {
    Number(u64),
    Text(String),
}

impl QualityField {
    fn parse(&self) -> DownloadResult<u32> {
        let invalid = || DownloadError::InvalidInput(format!("invalid quality '{}'", self));
        match self {
            QualityField::Number(n) => u32::try_from(*n).map_err(|_| invalid()),
            QualityField::Text(s) => s.trim().parse::<u32>().map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for QualityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityField::Number(n) => write!(f, "{}", n),
            QualityField::Text(s) => f.write_str(s),
        }
    }
}

/// Request body as posted by the web client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadPayload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<QualityField>,
}

impl TryFrom<DownloadPayload> for DownloadRequest {
    type Error = DownloadError;

    fn try_from(payload: DownloadPayload) -> Result<Self, Self::Error> {
        let url = payload.url.unwrap_or_default();
        if url.trim().is_empty() {
            return Err(DownloadError::MissingInput);
        }

        let kind = match payload.kind.as_deref() {
            Some(kind) => kind.parse::<MediaKind>()?,
            None => MediaKind::Audio,
        };
        let quality = match payload.quality {
            Some(quality) => quality.parse()?,
            None => DEFAULT_QUALITY,
        };
        let format = payload.format.as_deref().unwrap_or(DEFAULT_FORMAT);

        DownloadRequest::new(&url, kind, format, quality)
    }
}

/// The file left in the download directory once a request finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalArtifact {
    pub path: PathBuf,
    pub filename: String,
    pub quality: String,
    pub kind: MediaKind,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub filename: String,
    pub path: String,
    pub quality: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub size: u64,
}

impl From<&FinalArtifact> for DownloadResponse {
    fn from(artifact: &FinalArtifact) -> Self {
        Self {
            success: true,
            filename: artifact.filename.clone(),
            path: artifact.path.to_string_lossy().to_string(),
            quality: artifact.quality.clone(),
            kind: artifact.kind,
            size: artifact.size,
        }
    }
}
