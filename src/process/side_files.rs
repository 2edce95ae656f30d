//! Description, metadata and thumbnail files written during simulated runs

use crate::config::SideFileConfig;
use crate::error::Result;
use crate::sink::ProgressSink;
use crate::types::{Event, MediaFile, SystemErrorCode, VideoMetadata, WorkId};
use crate::utils::{side_file_path, thumbnail_extension, write_if_absent};
use std::path::{Path, PathBuf};

/// Writes the side-files enabled in [`SideFileConfig`] next to a media file
///
/// Existing files are never overwritten. Failures are reported to the sink as
/// [`SystemErrorCode::SideFileFailure`] and never fail the run.
#[derive(Clone)]
pub struct SideFileWriter {
    config: SideFileConfig,
    client: reqwest::Client,
    sink: ProgressSink,
}

impl SideFileWriter {
    /// Create a writer sharing the adapter's HTTP client and sink
    pub fn new(config: SideFileConfig, client: reqwest::Client, sink: ProgressSink) -> Self {
        Self {
            config,
            client,
            sink,
        }
    }

    /// Whether any side-file is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.keep_description || self.config.keep_info_json || self.config.keep_thumbnail
    }

    /// Write every enabled side-file for one simulated item
    ///
    /// Returns the paths that were newly written.
    pub async fn write_all(
        &self,
        id: WorkId,
        file: &MediaFile,
        metadata: &VideoMetadata,
        raw: &serde_json::Value,
    ) -> Vec<PathBuf> {
        let mut written = Vec::new();

        if self.config.keep_description
            && let Some(description) = metadata.description.as_deref()
        {
            let path = side_file_path(file, "description");
            self.record(id, &path, write_if_absent(&path, description.as_bytes()).await, &mut written);
        }

        if self.config.keep_info_json {
            let path = side_file_path(file, "info.json");
            let result = match serde_json::to_vec_pretty(raw) {
                Ok(bytes) => write_if_absent(&path, &bytes).await,
                Err(e) => Err(e.into()),
            };
            self.record(id, &path, result, &mut written);
        }

        if self.config.keep_thumbnail
            && let Some(url) = metadata.thumbnail.as_deref()
        {
            let path = side_file_path(file, &thumbnail_extension(url));
            let result = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                Ok(false)
            } else {
                self.fetch_thumbnail(url, &path).await
            };
            self.record(id, &path, result, &mut written);
        }

        written
    }

    async fn fetch_thumbnail(&self, url: &str, path: &Path) -> Result<bool> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        write_if_absent(path, &bytes).await
    }

    fn record(&self, id: WorkId, path: &Path, result: Result<bool>, written: &mut Vec<PathBuf>) {
        match result {
            Ok(true) => {
                tracing::debug!(work_id = %id, path = %path.display(), "Side-file written");
                self.sink.emit(Event::SideFileWritten {
                    id,
                    path: path.to_path_buf(),
                });
                written.push(path.to_path_buf());
            }
            Ok(false) => {
                tracing::debug!(work_id = %id, path = %path.display(), "Side-file exists, not overwritten");
            }
            Err(e) => {
                tracing::warn!(work_id = %id, path = %path.display(), error = %e, "Failed to write side-file");
                self.sink.system_error(
                    SystemErrorCode::SideFileFailure,
                    format!("Failed to write {}: {}", path.display(), e),
                );
            }
        }
    }
}
