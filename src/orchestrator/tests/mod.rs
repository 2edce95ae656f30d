use super::test_helpers::*;
use super::*;
use crate::catalog::InMemoryCatalog;
use crate::error::Error;
use crate::types::{DownloadTarget, Event, Severity};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;


fn orchestrator(config: Config) -> DownloadOrchestrator {
    DownloadOrchestrator::new(
        config,
        Arc::new(ScriptArguments),
        Arc::new(InMemoryCatalog::new()),
    )
    .unwrap()
}

fn script_source(
    dir: &std::path::Path,
    scripts: &[&str],
) -> Vec<(DownloadTarget, serde_json::Value)> {
    scripts
        .iter()
        .enumerate()
        .map(|(i, script)| {
            (
                video_target(&format!("v{}", i + 1), dir),
                script_options(script),
            )
        })
        .collect()
}

/// Collect events until `OperationFinished` (or the timeout)
async fn events_until_finished(rx: &mut broadcast::Receiver<Event>, timeout: Duration) -> Vec<Event> {
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

fn finished_severities(events: &[Event]) -> HashMap<i64, Severity> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::JobFinished { id, severity } => Some((id.get(), *severity)),
            _ => None,
        })
        .collect()
}
