//! On-disk audio store: uniquely named files plus a retention sweep.
//!
//! Every upload and every synthesized reply lands in one flat directory,
//! which is also what the static file route serves. Names are UUID v4 and
//! files are opened with `create_new`, so concurrent requests can never
//! overwrite each other.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voice_relay_core::error::{Result, VoiceRelayError};

const AUDIO_EXTENSION: &str = "wav";

/// Which side of the exchange a stored file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    /// Copy of the client's upload: `<uuid>.wav`.
    Input,
    /// Synthesized reply: `response_<uuid>.wav`.
    Response,
}

impl AudioKind {
    fn file_name(self) -> String {
        let id = uuid::Uuid::new_v4();
        match self {
            Self::Input => format!("{id}.{AUDIO_EXTENSION}"),
            Self::Response => format!("response_{id}.{AUDIO_EXTENSION}"),
        }
    }
}

/// Reference to a stored audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioRef {
    pub file_name: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Relative URL the static route serves the file at (e.g. `temp/response_<uuid>.wav`).
    pub url: String,
}

/// How long audio files are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Files older than this are removed.
    pub max_age: Option<Duration>,
    /// At most this many files are kept; oldest go first.
    pub max_files: Option<usize>,
}

impl RetentionPolicy {
    /// Build from config values where `0` means "no limit".
    pub fn from_limits(max_age_secs: u64, max_files: usize) -> Self {
        Self {
            max_age: (max_age_secs > 0).then(|| Duration::from_secs(max_age_secs)),
            max_files: (max_files > 0).then_some(max_files),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none() && self.max_files.is_none()
    }
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub overflow: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.overflow
    }
}

pub struct AudioStore {
    dir: PathBuf,
    public_prefix: String,
    retention: RetentionPolicy,
}

impl AudioStore {
    /// Open (and create if needed) the audio directory.
    pub async fn open(
        dir: impl Into<PathBuf>,
        public_prefix: &str,
        retention: RetentionPolicy,
    ) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            VoiceRelayError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;

        Ok(Self {
            dir,
            public_prefix: public_prefix.trim_matches('/').to_string(),
            retention,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Relative URL a file in this store is served at.
    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.public_prefix)
    }

    /// Write `bytes` to a new uniquely named file.
    pub async fn write(&self, kind: AudioKind, bytes: &[u8]) -> Result<AudioRef> {
        let file_name = kind.file_name();
        let path = self.dir.join(&file_name);

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        fill(file, &path, bytes).await?;

        debug!(path = %path.display(), bytes = bytes.len(), ?kind, "Audio stored");

        Ok(AudioRef {
            url: self.url_for(&file_name),
            file_name,
            path,
        })
    }

    /// Audio files currently in the store, with their modification times.
    async fn list(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(AUDIO_EXTENSION) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }

        Ok(files)
    }

    /// Number of audio files currently stored.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    /// Apply the retention policy once.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if self.retention.is_unbounded() {
            return Ok(report);
        }

        let mut files = self.list().await?;
        report.scanned = files.len();
        let now = SystemTime::now();

        if let Some(max_age) = self.retention.max_age {
            let mut kept = Vec::with_capacity(files.len());
            for (path, modified) in files {
                let age = now.duration_since(modified).unwrap_or_default();
                if age > max_age {
                    if remove(&path).await {
                        report.expired += 1;
                    }
                } else {
                    kept.push((path, modified));
                }
            }
            files = kept;
        }

        if let Some(max_files) = self.retention.max_files {
            if files.len() > max_files {
                files.sort_by_key(|(_, modified)| *modified);
                let excess = files.len() - max_files;
                for (path, _) in files.iter().take(excess) {
                    if remove(path).await {
                        report.overflow += 1;
                    }
                }
            }
        }

        if report.removed() > 0 {
            info!(
                dir = %self.dir.display(),
                expired = report.expired,
                overflow = report.overflow,
                "Audio retention sweep"
            );
        }

        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "Audio retention sweep failed");
                        }
                    }
                }
            }
            debug!("Audio sweeper stopped");
        })
    }
}

/// Write `bytes` through `writer`. On failure the file at `path` is removed.
async fn fill<W>(mut writer: W, path: &Path, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;
    drop(writer);

    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "Audio write failed, removing partial file");
        remove(path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Remove a file; a file that is already gone counts as not removed.
async fn remove(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove audio file");
            false
        }
    }
}
