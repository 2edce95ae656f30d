//! Shared test helpers for running `/bin/sh` scripts through the engine.

use crate::catalog::{Catalog, InMemoryCatalog};
use crate::config::Config;
use crate::process::{AdapterContext, StderrClassifier};
use crate::sink::ProgressSink;
use crate::tool::ArgumentBuilder;
use crate::types::{DownloadTarget, Event, Stage, TargetKind, WorkId, WorkItem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Runs the shell script stored under `"script"` in the item's options.
pub(crate) struct ScriptArguments;

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

/// Config that runs `/bin/sh` and polls every 10ms.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.tool.binary_path = Some(PathBuf::from("/bin/sh"));
    config.tool.search_path = false;
    config.pool.orchestrator_poll_interval = Duration::from_millis(10);
    config.pool.worker_poll_interval = Duration::from_millis(10);
    config.pool.adapter_poll_interval = Duration::from_millis(10);
    config.pool.event_capacity = 10_000;
    config
}

pub(crate) fn video_target(id: &str, dir: &Path) -> DownloadTarget {
    DownloadTarget {
        id: id.to_string(),
        name: format!("Video {}", id),
        url: format!("https://example.com/watch?v={}", id),
        kind: TargetKind::Video,
        save_dir: dir.to_path_buf(),
    }
}

pub(crate) fn container_target(id: &str, dir: &Path) -> DownloadTarget {
    DownloadTarget {
        id: id.to_string(),
        name: format!("Channel {}", id),
        url: format!("https://example.com/c/{}", id),
        kind: TargetKind::Container,
        save_dir: dir.to_path_buf(),
    }
}

pub(crate) fn script_options(script: &str) -> serde_json::Value {
    serde_json::json!({ "script": script })
}

pub(crate) fn script_item(id: i64, target: DownloadTarget, script: &str) -> WorkItem {
    WorkItem {
        id: WorkId(id),
        target: Arc::new(target),
        options: Arc::new(script_options(script)),
        stage: Stage::Queued,
    }
}

/// Adapter context over `config`, with a fresh sink.
pub(crate) fn adapter_context(config: Config, catalog: Arc<dyn Catalog>) -> AdapterContext {
    let classifier = StderrClassifier::from_config(&config.stderr).unwrap();
    let sink = ProgressSink::new(config.pool.event_capacity);
    AdapterContext {
        binary: config.tool.binary_path.clone(),
        config: Arc::new(config),
        arguments: Arc::new(ScriptArguments),
        catalog,
        sink,
        client: reqwest::Client::new(),
        classifier: Arc::new(classifier),
    }
}

pub(crate) fn memory_catalog() -> Arc<InMemoryCatalog> {
    Arc::new(InMemoryCatalog::new())
}

/// Every event currently buffered in `rx`.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// JSON metadata line as printed by a simulated run.
pub(crate) fn metadata_line(title: &str, dir: &Path) -> String {
    serde_json::json!({
        "title": title,
        "webpage_url": format!("https://example.com/watch?v={}", title),
        "_filename": dir.join(format!("{}.mp4", title)),
        "duration": 61.0,
    })
    .to_string()
}
