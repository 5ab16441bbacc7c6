//! Stages remote media into the engine's input directory.
//!
//! Bodies are streamed to a hidden `.<name>.part` file and renamed once
//! the transfer completes, so the engine never sees a truncated input.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Total transfer budget for a video download.
const VIDEO_TIMEOUT: Duration = Duration::from_secs(120);

/// Total transfer budget for an image download.
const IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest extension taken from a URL before falling back to the default.
const MAX_EXTENSION_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Media kind
// ---------------------------------------------------------------------------

/// What a downloaded file will be fed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            Self::Video => ".mp4",
            Self::Image => ".png",
        }
    }

    fn timeout(self) -> Duration {
        match self {
            Self::Video => VIDEO_TIMEOUT,
            Self::Image => IMAGE_TIMEOUT,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A media download that did not produce a usable local file.
#[derive(Debug, thiserror::Error)]
#[error("Failed to download {kind} from: {url} ({source})")]
pub struct DownloadError {
    pub kind: MediaKind,
    pub url: String,
    #[source]
    pub source: DownloadFailure,
}

/// Underlying cause of a [`DownloadError`].
#[derive(Debug, thiserror::Error)]
pub enum DownloadFailure {
    /// Connection, DNS or timeout failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    HttpStatus(u16),

    /// Writing the staged file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// InputResolver
// ---------------------------------------------------------------------------

/// Downloads job media into a staging directory.
#[derive(Debug, Clone)]
pub struct InputResolver {
    client: reqwest::Client,
    staging_dir: PathBuf,
}

impl InputResolver {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(reqwest::Client::new(), staging_dir)
    }

    pub fn with_client(client: reqwest::Client, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            staging_dir: staging_dir.into(),
        }
    }

    /// Download `url` into the staging directory and return the local
    /// filename (relative to the staging directory).
    ///
    /// Without `filename`, a fresh `<kind>_<uuid><ext>` name is used, with
    /// the extension taken from the URL path when it has one.
    pub async fn resolve(
        &self,
        url: &str,
        kind: MediaKind,
        filename: Option<&str>,
    ) -> Result<String, DownloadError> {
        let name = filename
            .and_then(final_component)
            .unwrap_or_else(|| generated_filename(url, kind));

        tracing::debug!(url, %kind, filename = %name, "Downloading media");

        match self.download(url, kind, &name).await {
            Ok(bytes) => {
                tracing::info!(url, %kind, filename = %name, bytes, "Media staged");
                Ok(name)
            }
            Err(source) => {
                tracing::warn!(url, %kind, error = %source, "Media download failed");
                Err(DownloadError {
                    kind,
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    // ---- private helpers ----

    async fn download(&self, url: &str, kind: MediaKind, name: &str) -> Result<u64, DownloadFailure> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let response = self.client.get(url).timeout(kind.timeout()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadFailure::HttpStatus(status.as_u16()));
        }

        let part_path = self.staging_dir.join(format!(".{name}.part"));
        match stream_to_file(response, &part_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&part_path, self.staging_dir.join(name)).await?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                    tracing::debug!(path = %part_path.display(), error = %cleanup, "Partial file not removed");
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file(mut response: reqwest::Response, path: &Path) -> Result<u64, DownloadFailure> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Strip any directory part from a caller-supplied filename.
fn final_component(filename: &str) -> Option<String> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn generated_filename(url: &str, kind: MediaKind) -> String {
    let ext = url_extension(url).unwrap_or_else(|| kind.default_extension().to_string());
    format!("{}_{}{}", kind.as_str(), Uuid::new_v4(), ext)
}

/// Extension (with dot) of the URL's last path segment.
fn url_extension(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let dot = segment.rfind('.')?;
    let ext = &segment[dot + 1..];

    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| format!(".{ext}"))
}
