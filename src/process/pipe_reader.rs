//! Background line reader for a child process pipe
//!
//! A reader drains one pipe on its own task and queues complete lines, so the
//! process adapter can poll for output without ever blocking on a read.

use crate::error::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Banners printed by helper programs the tool launches (ffmpeg prints its
/// version and build configuration when it starts). Everything after one of
/// these on the same stream belongs to the helper, not the tool.
const HELPER_BANNER_MARKERS: &[&str] = &["ffmpeg version", "ffprobe version"];

/// Drains a pipe on a background task into a FIFO line queue
///
/// One reader can be attached to several handles in turn; it accepts a new
/// handle once the previous one has reached end-of-stream.
pub struct AsyncPipeReader {
    label: &'static str,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl AsyncPipeReader {
    /// Create an idle reader; `label` only appears in logs
    pub fn new(label: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            label,
            tx,
            rx,
            task: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Start reading `handle` on a background task
    ///
    /// Fails if the reader has been stopped or the previous handle has not
    /// reached end-of-stream yet.
    pub fn attach<R>(&mut self, handle: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Other(format!("{} reader has been stopped", self.label)));
        }
        if !self.is_idle() {
            return Err(Error::Other(format!("{} reader is already attached", self.label)));
        }

        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let label = self.label;
        self.task = Some(tokio::spawn(async move {
            read_lines(handle, tx, cancel, label).await;
        }));
        Ok(())
    }

    /// Whether no handle is currently being read
    pub fn is_idle(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Whether queued lines are waiting to be taken
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take the oldest queued line, if any
    pub fn try_next_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Take every queued line, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Wait until the current handle reaches end-of-stream
    ///
    /// Returns `false` if the reader is still busy when `timeout` elapses.
    pub async fn wait_idle(&mut self, timeout: Duration) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };
        if task.is_finished() {
            return true;
        }
        match tokio::time::timeout(timeout, task).await {
            Ok(_) => {
                self.task = None;
                true
            }
            Err(_) => false,
        }
    }

    /// Ask the background task to exit after its current read
    ///
    /// Idempotent, and harmless on a reader that was never attached.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for AsyncPipeReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_lines<R>(
    handle: R,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    label: &'static str,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();
    let mut suppressed = false;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                if suppressed {
                    continue;
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if is_helper_banner(&line) {
                    tracing::debug!(pipe = label, "Helper banner seen, suppressing rest of stream");
                    suppressed = true;
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                // A broken pipe ends this attachment like end-of-stream would
                tracing::debug!(pipe = label, error = %e, "Pipe read failed");
                break;
            }
        }
    }
}

fn is_helper_banner(line: &str) -> bool {
    HELPER_BANNER_MARKERS
        .iter()
        .any(|marker| line.contains(marker))
}
