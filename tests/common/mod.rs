//! Common test utilities for media-dl integration tests
//!
//! The engine is driven through `/bin/sh`: each item's options carry a
//! `"script"` that stands in for the downloader's output.

#![allow(dead_code)]

use media_dl::{
    ArgumentBuilder, Config, DownloadOrchestrator, DownloadTarget, Event, InMemoryCatalog,
    Severity, TargetKind, WorkItem,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Runs the shell script stored under `"script"` in the item's options
pub struct ScriptArguments;

impl ArgumentBuilder for ScriptArguments {
    fn build_args(&self, item: &WorkItem, _simulate: bool) -> Vec<String> {
        let script = item
            .options
            .get("script")
            .and_then(|v| v.as_str())
            .unwrap_or("true");
        vec!["-c".to_string(), script.to_string()]
    }

    fn name(&self) -> &'static str {
        "script"
    }
}

/// Config pointing at `/bin/sh` with fast polling
pub fn script_config() -> Config {
    let mut config = Config::default();
    config.tool.binary_path = Some(PathBuf::from("/bin/sh"));
    config.tool.search_path = false;
    config.pool.orchestrator_poll_interval = Duration::from_millis(10);
    config.pool.worker_poll_interval = Duration::from_millis(10);
    config.pool.adapter_poll_interval = Duration::from_millis(10);
    config.pool.event_capacity = 10_000;
    config
}

/// Orchestrator running scripts against `catalog`
pub fn script_orchestrator(config: Config, catalog: Arc<InMemoryCatalog>) -> DownloadOrchestrator {
    DownloadOrchestrator::new(config, Arc::new(ScriptArguments), catalog)
        .expect("test config should be valid")
}

pub fn target(id: &str, kind: TargetKind, dir: &Path) -> DownloadTarget {
    DownloadTarget {
        id: id.to_string(),
        name: format!("Target {}", id),
        url: format!("https://example.com/{}", id),
        kind,
        save_dir: dir.to_path_buf(),
    }
}

pub fn script_options(script: &str) -> serde_json::Value {
    serde_json::json!({ "script": script })
}

/// One video target per script
pub fn video_source(dir: &Path, scripts: &[&str]) -> Vec<(DownloadTarget, serde_json::Value)> {
    scripts
        .iter()
        .enumerate()
        .map(|(i, script)| {
            (
                target(&format!("v{}", i + 1), TargetKind::Video, dir),
                script_options(script),
            )
        })
        .collect()
}

/// A `--dump-json` line for a video called `title` stored in `dir`
pub fn metadata_line(title: &str, dir: &Path) -> String {
    serde_json::json!({
        "id": title,
        "title": title,
        "webpage_url": format!("https://example.com/watch?v={}", title),
        "_filename": dir.join(format!("{}.mp4", title)),
        "upload_date": "20240131",
        "duration": 61.0,
        "description": format!("About {}", title),
    })
    .to_string()
}

/// Shell command printing each line on its own
pub fn printf_lines(lines: &[String]) -> String {
    let quoted: Vec<String> = lines.iter().map(|l| format!("'{}'", l)).collect();
    format!("printf '%s\\n' {}", quoted.join(" "))
}

/// Collect events until `OperationFinished`, panicking after `timeout`
pub async fn events_until_finished(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => {
                let done = matches!(event, Event::OperationFinished { .. });
                events.push(event);
                if done {
                    return events;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                panic!("run did not finish in time; got {:?}", events)
            }
        }
    }
}

/// Final severity per work item ID
pub fn finished_severities(events: &[Event]) -> HashMap<i64, Severity> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobFinished { id, severity } => Some((id.get(), *severity)),
            _ => None,
        })
        .collect()
}
