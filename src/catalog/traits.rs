//! Catalog collaborator trait

use crate::types::{DownloadTarget, MediaFile, MediaRecord};
use async_trait::async_trait;

/// Record keeping for the media items a run discovers
///
/// The engine calls into the catalog from its confirmation paths. It never
/// inspects how records are stored; persistence is entirely the implementor's
/// concern.
///
/// # Examples
///
/// ```
/// use media_dl::catalog::{Catalog, InMemoryCatalog};
/// use media_dl::{DownloadTarget, TargetKind};
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = InMemoryCatalog::new();
/// let target = DownloadTarget {
///     id: "chan".into(),
///     name: "Channel".into(),
///     url: "https://example.com/c/chan".into(),
///     kind: TargetKind::Container,
///     save_dir: PathBuf::from("/media/chan"),
/// };
///
/// assert!(catalog.find_match(&target, "Some Clip").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create or update the record for a file the tool reported as complete
    ///
    /// `already_present` is set when the tool skipped the file because it was
    /// already on disk.
    async fn confirm_download(
        &self,
        target: &DownloadTarget,
        file: &MediaFile,
        already_present: bool,
    ) -> crate::Result<MediaRecord>;

    /// Find an existing record under `target` whose name matches `name`
    ///
    /// The matching policy (exact, prefix, truncated) belongs to the
    /// implementation.
    async fn find_match(
        &self,
        target: &DownloadTarget,
        name: &str,
    ) -> crate::Result<Option<MediaRecord>>;

    /// Store a new or enriched record under `target`, returning it as stored
    async fn save(&self, target: &DownloadTarget, record: MediaRecord)
    -> crate::Result<MediaRecord>;

    /// Name of this catalog, for logs
    fn name(&self) -> &'static str;
}
