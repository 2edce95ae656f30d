//! Process adapter: one external tool invocation from spawn to final severity
//!
//! The adapter spawns the tool with piped output, feeds stdout through the
//! [`StdoutParser`] while the child runs, and classifies stderr once the child
//! has exited. Everything it learns is reported to the [`ProgressSink`]; the
//! only thing it returns is the run's final [`Severity`].

use super::outcome::Outcome;
use super::parser::{LineAction, StdoutParser};
use super::pipe_reader::AsyncPipeReader;
use super::side_files::SideFileWriter;
use super::stderr::{StderrClass, StderrClassifier};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::sink::ProgressSink;
use crate::tool::ArgumentBuilder;
use crate::types::{
    ConfirmKind, DlStat, Event, MediaFile, MediaRecord, Severity, StatusTag, SystemErrorCode,
    VideoMetadata, WorkItem,
};
use crate::utils::split_media_path;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// How long to wait for stderr to reach end-of-stream after the child exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything an adapter needs besides the work item
///
/// Built once per orchestration run and cloned into every adapter.
#[derive(Clone)]
pub struct AdapterContext {
    /// Engine configuration
    pub config: Arc<Config>,
    /// Options-to-arguments collaborator
    pub arguments: Arc<dyn ArgumentBuilder>,
    /// Record keeping collaborator
    pub catalog: Arc<dyn Catalog>,
    /// Event channel
    pub sink: ProgressSink,
    /// Shared HTTP client for thumbnail downloads
    pub client: reqwest::Client,
    /// Resolved downloader binary (None when it could not be found)
    pub binary: Option<PathBuf>,
    /// Compiled stderr patterns
    pub classifier: Arc<StderrClassifier>,
}

/// Final result of one run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Final severity after every detector has reported
    pub severity: Severity,
    /// The last snapshot emitted for the run
    pub last_stat: DlStat,
}

#[derive(Debug, Default)]
struct StopState {
    pid: AtomicU32,
    alive: AtomicBool,
    requested: AtomicBool,
    killed: AtomicBool,
    /// Held while killing or reaping, so a kill never targets a reaped pid
    reap: Mutex<()>,
}

/// Handle for stopping a running adapter from another task
///
/// Stopping kills the child's whole process group immediately (on unix); the
/// adapter observes the request on its next poll and finishes with
/// [`Severity::Stopped`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    state: Arc<StopState>,
}

impl StopHandle {
    /// Request the run to stop, killing the child if it is alive
    pub fn stop(&self) {
        self.state.requested.store(true, Ordering::SeqCst);
        self.kill();
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Whether a live child was killed
    pub fn was_killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }

    fn register(&self, pid: Option<u32>) {
        self.state.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
        self.state.alive.store(true, Ordering::SeqCst);
    }

    fn mark_exited(&self) {
        let _reap = self.state.reap.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.alive.store(false, Ordering::SeqCst);
    }

    /// `try_wait` on the child, clearing `alive` under the same lock as [`kill`](Self::kill)
    fn try_reap(&self, child: &mut Child) -> std::io::Result<Option<ExitStatus>> {
        let _reap = self.state.reap.lock().unwrap_or_else(PoisonError::into_inner);
        let status = child.try_wait()?;
        if status.is_some() {
            self.state.alive.store(false, Ordering::SeqCst);
        }
        Ok(status)
    }

    fn kill(&self) {
        let _reap = self.state.reap.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.state.alive.load(Ordering::SeqCst) {
            return;
        }
        #[cfg(unix)]
        {
            let pid = self.state.pid.load(Ordering::SeqCst);
            if pid != 0 {
                // The child leads its own process group, so this reaches any
                // helper processes it started as well
                let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
                if rc != 0 {
                    tracing::debug!(
                        pid,
                        error = %std::io::Error::last_os_error(),
                        "killpg failed"
                    );
                }
            }
        }
        self.state.killed.store(true, Ordering::SeqCst);
    }
}

/// Runs one work item through the external tool
pub struct ProcessAdapter {
    item: WorkItem,
    simulate: bool,
    ctx: AdapterContext,
    stop: StopHandle,
    outcome: Outcome,
    parser: StdoutParser,
    side_files: SideFileWriter,
    /// Confirmations already made this run, keyed by item index
    confirmed: HashMap<u32, ConfirmKind>,
    known_items: u32,
    json_deadline: Option<Instant>,
    halted: bool,
    last_stat: DlStat,
}

impl ProcessAdapter {
    /// Prepare a run for `item`; nothing is spawned until [`run`](Self::run)
    pub fn new(item: WorkItem, simulate: bool, ctx: AdapterContext) -> Self {
        let side_files = SideFileWriter::new(
            ctx.config.side_files.clone(),
            ctx.client.clone(),
            ctx.sink.clone(),
        );
        let parser = StdoutParser::new(!item.target.is_container(), simulate);
        Self {
            item,
            simulate,
            ctx,
            stop: StopHandle::default(),
            outcome: Outcome::new(),
            parser,
            side_files,
            confirmed: HashMap::new(),
            known_items: 0,
            json_deadline: None,
            halted: false,
            last_stat: DlStat::default(),
        }
    }

    /// Handle that stops this run from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run the tool to completion (or until stopped) and return the outcome
    pub async fn run(mut self) -> RunResult {
        let id = self.item.id;

        if self.stop.is_requested() {
            self.outcome.raise(Severity::Stopped);
            return self.finish();
        }

        let Some(binary) = self.ctx.binary.clone() else {
            return self.fail_to_start("no downloader binary configured or found in PATH");
        };

        let args = self.ctx.arguments.build_args(&self.item, self.simulate);
        tracing::debug!(
            work_id = %id,
            binary = %binary.display(),
            ?args,
            simulate = self.simulate,
            "Spawning downloader"
        );

        let mut command = Command::new(&binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return self.fail_to_start(&format!("{}: {}", binary.display(), e)),
        };
        self.stop.register(child.id());
        if self.stop.is_requested() {
            // stop() raced with the spawn and saw no live child
            self.stop.stop();
        }

        let mut stdout = AsyncPipeReader::new("stdout");
        let mut stderr = AsyncPipeReader::new("stderr");
        if let Some(pipe) = child.stdout.take()
            && let Err(e) = stdout.attach(pipe)
        {
            tracing::warn!(work_id = %id, error = %e, "Could not read stdout");
        }
        if let Some(pipe) = child.stderr.take()
            && let Err(e) = stderr.attach(pipe)
        {
            tracing::warn!(work_id = %id, error = %e, "Could not read stderr");
        }

        let exit_status = self.poll_child(&mut child, &mut stdout).await;
        self.stop.mark_exited();
        if self.stop.was_killed() {
            self.outcome.raise(Severity::Stopped);
        }

        if !stderr.wait_idle(STDERR_DRAIN_TIMEOUT).await {
            tracing::debug!(work_id = %id, "stderr still open after exit");
        }
        for line in stderr.drain() {
            self.classify_stderr(&line);
        }
        stdout.stop();
        stderr.stop();

        if let Some(code) = exit_status.and_then(|status| status.code())
            && code > 0
            && self.outcome.severity() <= Severity::Error
        {
            self.outcome.raise(Severity::Error);
            self.ctx
                .sink
                .item_error(id, format!("Downloader exited with non-zero code {}", code));
        }

        self.finish()
    }

    async fn poll_child(
        &mut self,
        child: &mut Child,
        stdout: &mut AsyncPipeReader,
    ) -> Option<ExitStatus> {
        let id = self.item.id;
        let poll = self.ctx.config.pool.adapter_poll_interval;

        loop {
            if self.stop.is_requested() && !self.halted {
                tracing::debug!(work_id = %id, "Stop requested");
                self.halt();
            }

            if !self.halted {
                while let Some(line) = stdout.try_next_line() {
                    self.handle_line(&line).await;
                    if self.halted {
                        break;
                    }
                }
            }

            if !self.halted
                && let Some(deadline) = self.json_deadline
                && Instant::now() >= deadline
            {
                tracing::warn!(work_id = %id, "No metadata received before deadline, stopping");
                self.ctx.sink.system_error(
                    SystemErrorCode::JsonStall,
                    format!(
                        "Item {}: no metadata received for {:?}",
                        id, self.ctx.config.scan.json_wait
                    ),
                );
                self.halt();
            }

            if self.halted {
                child.start_kill().ok();
                let discarded = stdout.drain().len();
                if discarded > 0 {
                    tracing::debug!(work_id = %id, discarded, "Discarded stdout after halt");
                }
                // The group is already killed; nothing may signal the pid once it is reaped
                self.stop.mark_exited();
                return child.wait().await.ok();
            }

            match self.stop.try_reap(child) {
                Ok(Some(status)) if stdout.is_idle() && !stdout.has_pending() => {
                    return Some(status);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(work_id = %id, error = %e, "Failed to poll downloader");
                    return None;
                }
            }

            tokio::time::sleep(poll).await;
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let parsed = self.parser.parse(line);
        match parsed.stat.status {
            StatusTag::AlreadyDownloaded => {
                self.outcome.raise(Severity::AlreadyDownloaded);
            }
            StatusTag::FilesizeAbort => {
                self.outcome.raise(Severity::FilesizeAbort);
            }
            _ => {}
        }

        self.last_stat = parsed.stat.clone();
        self.ctx.sink.status(self.item.id, parsed.stat);

        if let Some(action) = parsed.action {
            self.handle_action(action).await;
        }
    }

    async fn handle_action(&mut self, action: LineAction) {
        let id = self.item.id;
        match action {
            LineAction::ConfirmDownloaded(file) => {
                self.confirm_download(file, ConfirmKind::Downloaded).await;
            }
            LineAction::ConfirmPostProcessed(file) => {
                self.confirm_post_processed(file).await;
            }
            LineAction::ConfirmExisting(file) => {
                let counted = self
                    .confirm_download(file, ConfirmKind::AlreadyDownloaded)
                    .await;
                if counted && self.item.target.is_container() {
                    self.note_known_item();
                }
            }
            LineAction::ConfirmSimulated { metadata, raw } => {
                self.confirm_simulated(*metadata, raw).await;
            }
            LineAction::ContainerInSingleTarget => {
                tracing::warn!(work_id = %id, "Container returned for a single-item target");
                self.ctx.sink.item_error(
                    id,
                    "The URL points to a channel or playlist, but the target is a single video",
                );
                self.halt();
            }
            LineAction::InvalidJson(e) => {
                tracing::warn!(work_id = %id, error = %e, "Invalid metadata line");
                self.ctx.sink.system_error(
                    SystemErrorCode::InvalidJson,
                    format!("Item {}: invalid metadata: {}", id, e),
                );
            }
        }
    }

    /// Real-download confirmation; returns `false` if this index was already confirmed
    async fn confirm_download(&mut self, file: MediaFile, kind: ConfirmKind) -> bool {
        let id = self.item.id;
        let key = self.parser.current_index().unwrap_or(0);
        if self.confirmed.contains_key(&key) {
            tracing::debug!(work_id = %id, index = key, "Already confirmed");
            return false;
        }
        self.confirmed.insert(key, kind);
        self.record_download(file, kind).await;
        true
    }

    /// A merge or conversion names the final file of the current item
    ///
    /// Replaces the file of an earlier confirmation for the same index instead
    /// of being dropped as a repeat. Never counts toward early stop.
    async fn confirm_post_processed(&mut self, file: MediaFile) {
        let key = self.parser.current_index().unwrap_or(0);
        match self.confirmed.get(&key).copied() {
            None => {
                self.confirm_download(file, ConfirmKind::Downloaded).await;
            }
            Some(kind) => {
                tracing::debug!(
                    work_id = %self.item.id,
                    index = key,
                    file = %file.path().display(),
                    "Post-processing replaced confirmed file"
                );
                self.record_download(file, kind).await;
            }
        }
    }

    async fn record_download(&self, file: MediaFile, kind: ConfirmKind) {
        let id = self.item.id;
        let already_present = kind == ConfirmKind::AlreadyDownloaded;
        match self
            .ctx
            .catalog
            .confirm_download(&self.item.target, &file, already_present)
            .await
        {
            Ok(record) => {
                tracing::info!(
                    work_id = %id,
                    file = %file.path().display(),
                    already_present,
                    "Media confirmed"
                );
                self.ctx.sink.emit(Event::MediaConfirmed { id, record, kind });
            }
            Err(e) => self.catalog_failure(&e),
        }
    }

    async fn confirm_simulated(&mut self, metadata: VideoMetadata, raw: serde_json::Value) {
        let id = self.item.id;
        self.json_deadline = Some(Instant::now() + self.ctx.config.scan.json_wait);

        let key = self.parser.current_index().unwrap_or(0);
        if self.confirmed.contains_key(&key) {
            return;
        }
        self.confirmed.insert(key, ConfirmKind::Simulated);

        let file = self.resolve_file(&metadata);
        let name = metadata
            .title
            .clone()
            .or_else(|| file.as_ref().map(|f| f.filename.clone()));

        let matched = match &name {
            Some(name) => match self.ctx.catalog.find_match(&self.item.target, name).await {
                Ok(matched) => matched,
                Err(e) => {
                    self.catalog_failure(&e);
                    return;
                }
            },
            None => None,
        };

        let (record, already_known) = match matched {
            None => {
                let mut record = MediaRecord::from_metadata(&metadata, file.clone());
                if record.name.is_none() {
                    record.name = name;
                }
                (record, false)
            }
            Some(mut record) => {
                let known = record.is_fully_known();
                record.enrich_from(&metadata);
                if record.name.is_none() {
                    record.name = name;
                }
                if record.file.is_none() {
                    record.file = file.clone();
                }
                (record, known)
            }
        };

        match self.ctx.catalog.save(&self.item.target, record).await {
            Ok(record) => {
                tracing::debug!(work_id = %id, name = ?record.name, already_known, "Item checked");
                self.ctx.sink.emit(Event::MediaConfirmed {
                    id,
                    record,
                    kind: ConfirmKind::Simulated,
                });
            }
            Err(e) => {
                self.catalog_failure(&e);
                return;
            }
        }

        if let Some(file) = &file
            && self.side_files.is_enabled()
        {
            self.side_files.write_all(id, file, &metadata, &raw).await;
        }

        if already_known && self.item.target.is_container() {
            self.note_known_item();
        }
    }

    /// Where the tool would have written this item
    fn resolve_file(&self, metadata: &VideoMetadata) -> Option<MediaFile> {
        let save_dir = &self.item.target.save_dir;
        if let Some(path) = metadata.filename.as_deref() {
            let mut file = split_media_path(path);
            if file.dir.is_relative() {
                file.dir = save_dir.join(&file.dir);
            }
            return Some(file);
        }
        metadata.title.as_ref().map(|title| MediaFile {
            dir: save_dir.clone(),
            filename: title.clone(),
            extension: String::new(),
        })
    }

    /// Count an already-known item and halt once the configured limit is reached
    fn note_known_item(&mut self) {
        self.known_items += 1;
        if let Some(limit) = self.ctx.config.scan.early_stop_limit
            && self.known_items >= limit
        {
            tracing::info!(
                work_id = %self.item.id,
                known = self.known_items,
                "Early stop: enough already-known items seen"
            );
            self.halt();
        }
    }

    fn classify_stderr(&mut self, line: &str) {
        let id = self.item.id;
        match self.ctx.classifier.classify(line) {
            StderrClass::Ignored | StderrClass::Debug => {}
            StderrClass::Warning => {
                self.outcome.raise(Severity::Warning);
                self.ctx.sink.item_warning(id, line);
            }
            StderrClass::Error => {
                self.outcome.raise(Severity::Error);
                self.ctx.sink.item_error(id, line);
            }
        }
    }

    fn catalog_failure(&self, e: &crate::Error) {
        tracing::warn!(
            work_id = %self.item.id,
            catalog = self.ctx.catalog.name(),
            error = %e,
            "Catalog rejected record"
        );
        self.ctx.sink.system_error(
            SystemErrorCode::CatalogFailure,
            format!("Item {}: {}", self.item.id, e),
        );
    }

    fn halt(&mut self) {
        self.halted = true;
        self.stop.kill();
    }

    fn fail_to_start(mut self, reason: &str) -> RunResult {
        let id = self.item.id;
        tracing::error!(work_id = %id, reason, "Downloader did not start");
        self.outcome.raise(Severity::Error);
        self.ctx
            .sink
            .system_error(SystemErrorCode::SpawnFailure, format!("Item {}: {}", id, reason));
        self.ctx
            .sink
            .item_error(id, format!("Download did not start: {}", reason));
        self.finish()
    }

    fn finish(self) -> RunResult {
        let severity = self.outcome.severity();
        let mut stat = DlStat::with_status(severity.final_status());
        stat.path = self.last_stat.path;
        stat.filename = self.last_stat.filename;
        stat.extension = self.last_stat.extension;
        stat.current_index = self.parser.current_index();
        stat.total_count = self.parser.total_count();
        stat.simulated = self.simulate;

        tracing::debug!(work_id = %self.item.id, %severity, "Run finished");
        self.ctx.sink.status(self.item.id, stat.clone());
        RunResult {
            severity,
            last_stat: stat,
        }
    }
}
