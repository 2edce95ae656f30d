//! Core types for media-dl

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Unique identifier for a work item (its DBID)
///
/// Assigned monotonically when a work queue is built and never reused within that
/// queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub i64);

impl WorkId {
    /// Create a new WorkId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for WorkId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<WorkId> for i64 {
    fn from(id: WorkId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for WorkId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a work item inside the work queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Waiting for a worker
    Queued,
    /// Handed to a worker (terminal for successful runs)
    Active,
    /// The run ended with an error; the item stays spent
    Error,
}

/// What kind of thing a download target is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single media item
    Video,
    /// A channel, playlist or folder whose children the tool enumerates itself
    Container,
}

/// A download target handed to the engine by the work source
///
/// The engine only looks at the kind (single item vs container) and identity;
/// everything else is passed through to collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadTarget {
    /// Identity of the target in the caller's catalog
    pub id: String,
    /// Display name
    pub name: String,
    /// Source URL handed to the external tool
    pub url: String,
    /// Single item or container
    pub kind: TargetKind,
    /// Directory that downloaded files and side-files land in
    pub save_dir: PathBuf,
}

impl DownloadTarget {
    /// Whether the tool is expected to enumerate children for this target
    pub fn is_container(&self) -> bool {
        self.kind == TargetKind::Container
    }
}

/// One entry of a work queue
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// Stable identity within the queue
    pub id: WorkId,
    /// The caller's target object
    pub target: Arc<DownloadTarget>,
    /// Resolved option set for the argument builder
    pub options: Arc<serde_json::Value>,
    /// Current lifecycle stage (mutated only by the work queue)
    pub stage: Stage,
}

/// Outcome of one process run, in ascending order of severity
///
/// The ordering is total: a run's outcome can only be raised, never lowered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Finished without complaint
    #[default]
    Ok = 0,
    /// Finished, but the tool printed warnings
    Warning = 1,
    /// Failed
    Error = 2,
    /// The tool refused a file because of a size limit
    FilesizeAbort = 3,
    /// The file was already on disk
    AlreadyDownloaded = 4,
    /// The process was stopped before it finished
    Stopped = 5,
}

impl Severity {
    /// Numeric code of this severity
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Phase tag used for the final snapshot of a run with this outcome
    pub fn final_status(self) -> StatusTag {
        match self {
            Severity::Ok => StatusTag::Finished,
            Severity::Warning => StatusTag::Warning,
            Severity::Error => StatusTag::Error,
            Severity::FilesizeAbort => StatusTag::FilesizeAbort,
            Severity::AlreadyDownloaded => StatusTag::AlreadyDownloaded,
            Severity::Stopped => StatusTag::Stopped,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::FilesizeAbort => "filesize_abort",
            Severity::AlreadyDownloaded => "already_downloaded",
            Severity::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Phase tag of a status snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    /// Tool is resolving the target
    #[default]
    PreProcessing,
    /// Media bytes are being transferred
    Downloading,
    /// Merging or converting after transfer
    PostProcessing,
    /// Simulated run is fetching metadata
    Checking,
    /// Run ended successfully
    Finished,
    /// File was already on disk
    AlreadyDownloaded,
    /// Run ended with warnings
    Warning,
    /// Run ended with an error
    Error,
    /// Run was stopped
    Stopped,
    /// Tool refused a file because of a size limit
    FilesizeAbort,
}

/// Progress snapshot for the item a worker is processing
///
/// Overwritten in place as lines arrive; fields the current line says nothing
/// about stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DlStat {
    /// Current phase
    pub status: StatusTag,
    /// Directory of the file being worked on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// File name without extension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File extension without the dot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Progress percentage (0.0 to 100.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f32>,
    /// Estimated time remaining, as printed by the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    /// Transfer speed, as printed by the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// File size, as printed by the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<String>,
    /// Index of the item inside a container (1-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
    /// Number of items inside a container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u32>,
    /// Whether this snapshot belongs to a simulated run
    #[serde(default)]
    pub simulated: bool,
}

impl DlStat {
    /// Create an empty snapshot with the given phase
    pub fn with_status(status: StatusTag) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Set path, filename and extension from a split media path
    pub fn set_file(&mut self, file: &MediaFile) {
        self.path = Some(file.dir.clone());
        self.filename = Some(file.filename.clone());
        self.extension = Some(file.extension.clone());
    }
}

/// A media file on disk, split the way the tool reports it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Containing directory
    pub dir: PathBuf,
    /// File name without extension
    pub filename: String,
    /// Extension without the dot (may be empty)
    pub extension: String,
}

impl MediaFile {
    /// Full path of the file
    pub fn path(&self) -> PathBuf {
        if self.extension.is_empty() {
            self.dir.join(&self.filename)
        } else {
            self.dir.join(format!("{}.{}", self.filename, self.extension))
        }
    }
}

/// Metadata record printed by the tool for one item during a simulated run
///
/// Only the fields the engine understands are named; the tool prints many more.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Site-specific item id
    #[serde(default)]
    pub id: Option<String>,
    /// Item title
    #[serde(default)]
    pub title: Option<String>,
    /// Canonical page URL
    #[serde(default)]
    pub webpage_url: Option<String>,
    /// Upload date as `YYYYMMDD`
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Upload time as a unix timestamp
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Item description
    #[serde(default)]
    pub description: Option<String>,
    /// Position inside the playlist being scanned
    #[serde(default)]
    pub playlist_index: Option<u32>,
    /// Output path the tool would have written to
    #[serde(default, rename = "_filename")]
    pub filename: Option<String>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl VideoMetadata {
    /// Upload time, preferring the exact timestamp over the date
    pub fn upload_time(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.timestamp {
            return DateTime::from_timestamp(ts, 0);
        }
        let date = NaiveDate::parse_from_str(self.upload_date.as_deref()?, "%Y%m%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

/// A media item as known to the catalog
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Display name
    pub name: Option<String>,
    /// Source URL
    pub source: Option<String>,
    /// File on disk (or the file a simulated run would produce)
    pub file: Option<MediaFile>,
    /// When the item was uploaded
    pub upload_time: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Description text
    pub description: Option<String>,
    /// Position inside the parent container
    pub playlist_index: Option<u32>,
    /// Whether the file has actually been downloaded
    pub downloaded: bool,
}

impl MediaRecord {
    /// Build a fresh record from a simulated-run metadata line
    pub fn from_metadata(meta: &VideoMetadata, file: Option<MediaFile>) -> Self {
        Self {
            name: meta.title.clone(),
            source: meta.webpage_url.clone(),
            file,
            upload_time: meta.upload_time(),
            duration: meta.duration,
            description: meta.description.clone(),
            playlist_index: meta.playlist_index,
            downloaded: false,
        }
    }

    /// Fill in fields that are still unknown from `meta`
    ///
    /// Fields that are already set are never overwritten. Returns `true` if any
    /// field changed.
    pub fn enrich_from(&mut self, meta: &VideoMetadata) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.upload_time, meta.upload_time());
        changed |= fill(&mut self.duration, meta.duration);
        changed |= fill(&mut self.source, meta.webpage_url.clone());
        changed |= fill(&mut self.description, meta.description.clone());
        changed |= fill(&mut self.playlist_index, meta.playlist_index);
        changed
    }

    /// Whether both the name and the file are already known
    pub fn is_fully_known(&self) -> bool {
        self.name.is_some() && self.file.is_some()
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value;
        true
    } else {
        false
    }
}

/// Which confirmation path produced a [`Event::MediaConfirmed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmKind {
    /// The tool finished writing a new file
    Downloaded,
    /// The tool reported the file was already on disk
    AlreadyDownloaded,
    /// A simulated run reported an item
    Simulated,
}

/// Numeric codes for non-fatal system errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemErrorCode {
    /// A metadata line from a simulated run could not be parsed
    InvalidJson = 601,
    /// A simulated run stopped producing metadata
    JsonStall = 602,
    /// The catalog collaborator refused a record
    CatalogFailure = 603,
    /// A side-file could not be written
    SideFileFailure = 604,
    /// The external tool could not be launched
    SpawnFailure = 605,
}

impl SystemErrorCode {
    /// Numeric value reported to the progress channel
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Event emitted during an orchestration run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Live status snapshot for one item
    Status {
        /// Work item ID
        id: WorkId,
        /// Latest snapshot
        stat: DlStat,
    },

    /// A worker accepted an item
    JobStarted {
        /// Work item ID
        id: WorkId,
        /// Number of jobs started so far in this run
        started: usize,
        /// Number of jobs in the run
        total: usize,
    },

    /// The number of jobs in the run changed
    JobCountChanged {
        /// New total
        total: usize,
    },

    /// A worker finished an item
    JobFinished {
        /// Work item ID
        id: WorkId,
        /// Final outcome of the run
        severity: Severity,
    },

    /// The live worker pool changed size
    PoolResized {
        /// Number of workers now in the pool
        size: usize,
    },

    /// The orchestrator finished and every worker has exited
    OperationFinished {
        /// Number of jobs that finished, stopped ones included
        completed: usize,
        /// Number of jobs in the run
        total: usize,
    },

    /// Non-fatal problem inside the engine
    SystemError {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Error attached to one item's error log
    ItemError {
        /// Work item ID
        id: WorkId,
        /// Error message
        message: String,
    },

    /// Warning attached to one item's warning log
    ItemWarning {
        /// Work item ID
        id: WorkId,
        /// Warning message
        message: String,
    },

    /// A media record was created or updated
    MediaConfirmed {
        /// Work item ID
        id: WorkId,
        /// The record as stored in the catalog
        record: MediaRecord,
        /// Which path confirmed it
        kind: ConfirmKind,
    },

    /// A description, metadata or thumbnail file was written
    SideFileWritten {
        /// Work item ID
        id: WorkId,
        /// Path of the written file
        path: PathBuf,
    },
}
