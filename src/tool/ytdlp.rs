//! Argument builder and binary discovery for yt-dlp compatible downloaders

use super::traits::ArgumentBuilder;
use crate::config::ToolConfig;
use crate::types::WorkItem;
use std::path::PathBuf;

/// Output template used when none is configured
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Builds arguments for `yt-dlp` (and `youtube-dl`, which shares the switches)
///
/// Produces `--newline -o <save_dir>/<template> [--dump-json] [extra...] <url>`.
/// Extra arguments are read from the item's options as a JSON array of strings
/// under `"extra_args"`; non-string entries are skipped.
///
/// # Examples
///
/// ```
/// use media_dl::tool::{ArgumentBuilder, YtDlpArguments};
/// use media_dl::{DownloadTarget, Stage, TargetKind, WorkId, WorkItem};
/// use std::{path::PathBuf, sync::Arc};
///
/// let item = WorkItem {
///     id: WorkId(1),
///     target: Arc::new(DownloadTarget {
///         id: "v1".into(),
///         name: "Clip".into(),
///         url: "https://example.com/watch?v=1".into(),
///         kind: TargetKind::Video,
///         save_dir: PathBuf::from("/media"),
///     }),
///     options: Arc::new(serde_json::json!({ "extra_args": ["-f", "best"] })),
///     stage: Stage::Queued,
/// };
///
/// let args = YtDlpArguments::default().build_args(&item, true);
/// assert_eq!(args.first().map(String::as_str), Some("--newline"));
/// assert!(args.contains(&"--dump-json".to_string()));
/// assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpArguments {
    output_template: String,
}

impl YtDlpArguments {
    /// Builder with a custom output template
    pub fn new(output_template: impl Into<String>) -> Self {
        Self {
            output_template: output_template.into(),
        }
    }
}

impl Default for YtDlpArguments {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_TEMPLATE)
    }
}

impl ArgumentBuilder for YtDlpArguments {
    fn build_args(&self, item: &WorkItem, simulate: bool) -> Vec<String> {
        let output = item.target.save_dir.join(&self.output_template);
        let mut args = vec![
            "--newline".to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        if simulate {
            args.push("--dump-json".to_string());
        }
        if let Some(extra) = item.options.get("extra_args").and_then(|v| v.as_array()) {
            args.extend(extra.iter().filter_map(|v| v.as_str()).map(str::to_string));
        }
        args.push(item.target.url.clone());
        args
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Locate the downloader binary
///
/// An explicit `binary_path` always wins. Otherwise, when `search_path` is set,
/// each of `binary_names` is looked up in `PATH` in order.
pub fn find_binary(config: &ToolConfig) -> Option<PathBuf> {
    if let Some(path) = &config.binary_path {
        return Some(path.clone());
    }
    if !config.search_path {
        return None;
    }
    config
        .binary_names
        .iter()
        .find_map(|name| which::which(name).ok())
}
