//! Utility functions for path manipulation and side-file writing

use crate::error::Result;
use crate::types::MediaFile;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extension used for thumbnails whose URL has none
const DEFAULT_THUMBNAIL_EXTENSION: &str = "jpg";

/// Split a path printed by the tool into directory, file name and extension
///
/// Surrounding quotes (the tool quotes merge targets) and whitespace are removed
/// first. A path without a directory component gets an empty directory.
///
/// # Examples
///
/// ```
/// use media_dl::utils::split_media_path;
/// use std::path::PathBuf;
///
/// let file = split_media_path("\"/media/Some Clip.mkv\"");
/// assert_eq!(file.dir, PathBuf::from("/media"));
/// assert_eq!(file.filename, "Some Clip");
/// assert_eq!(file.extension, "mkv");
/// ```
pub fn split_media_path(text: &str) -> MediaFile {
    let trimmed = text.trim().trim_matches('"').trim_matches('\'');
    let path = Path::new(trimmed);

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let filename = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    MediaFile {
        dir,
        filename,
        extension,
    }
}

/// Check whether a file name is one of the per-format fragments the tool writes
/// before merging (e.g. `clip.f137`)
///
/// Reaching 100% on such a fragment does not mean the item is finished.
///
/// # Examples
///
/// ```
/// use media_dl::utils::is_format_fragment;
///
/// assert!(is_format_fragment("clip.f137"));
/// assert!(!is_format_fragment("clip"));
/// assert!(!is_format_fragment("clip.f1234"));
/// ```
#[must_use]
pub fn is_format_fragment(filename: &str) -> bool {
    static FRAGMENT: OnceLock<Regex> = OnceLock::new();
    FRAGMENT
        .get_or_init(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^.*\.f\d{1,3}$").expect("format fragment pattern is valid")
        })
        .is_match(filename)
}

/// Path of a side-file that sits next to a media file (`<dir>/<filename>.<suffix>`)
pub fn side_file_path(file: &MediaFile, suffix: &str) -> PathBuf {
    file.dir.join(format!("{}.{}", file.filename, suffix))
}

/// Extension to use for a thumbnail downloaded from `url`
///
/// Takes the extension of the last URL path segment, ignoring any query string,
/// and falls back to `jpg`.
pub fn thumbnail_extension(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|segment| {
            Path::new(&segment)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .unwrap_or_else(|| DEFAULT_THUMBNAIL_EXTENSION.to_string())
}

/// Write `contents` to `path` unless a file is already there
///
/// Returns `Ok(false)` without touching the file when it exists. Missing parent
/// directories are created.
pub async fn write_if_absent(path: &Path, contents: &[u8]) -> Result<bool> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;

    match file {
        Ok(mut file) => {
            file.write_all(contents).await?;
            file.flush().await?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}
