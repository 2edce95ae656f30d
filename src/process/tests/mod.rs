use super::*;
use crate::catalog::{Catalog, InMemoryCatalog};
use crate::config::Config;
use crate::orchestrator::test_helpers::{
    adapter_context, container_target, drain_events, memory_catalog, metadata_line, script_item,
    test_config, video_target,
};
use crate::types::{
    ConfirmKind, DownloadTarget, Event, MediaFile, MediaRecord, Severity, StatusTag,
    SystemErrorCode,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

async fn run_script(
    config: Config,
    catalog: Arc<dyn Catalog>,
    target: DownloadTarget,
    script: &str,
    simulate: bool,
) -> (RunResult, Vec<Event>) {
    let ctx = adapter_context(config, catalog);
    let mut rx = ctx.sink.subscribe();
    let adapter = ProcessAdapter::new(script_item(1, target, script), simulate, ctx);
    let result = adapter.run().await;
    (result, drain_events(&mut rx))
}

fn confirmations(events: &[Event]) -> Vec<(ConfirmKind, MediaRecord)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::MediaConfirmed { record, kind, .. } => Some((*kind, record.clone())),
            _ => None,
        })
        .collect()
}

fn system_errors(events: &[Event]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::SystemError { code, .. } => Some(*code),
            _ => None,
        })
        .collect()
}

fn item_errors(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ItemError { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn printf_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("printf '%s\\n' '{}'", line))
        .collect::<Vec<_>>()
        .join("; ")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destination_then_completion_is_one_download() {
    let dir = tempdir().unwrap();
    let catalog = memory_catalog();
    let (result, events) = run_script(
        test_config(),
        catalog.clone(),
        video_target("v1", dir.path()),
        "echo '[download] Destination: a.mp4'; echo '[download] 100% of 10MiB in 01:00'",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert_eq!(result.last_stat.status, StatusTag::Finished);

    let confirmed = confirmations(&events);
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].0, ConfirmKind::Downloaded);
    let file = confirmed[0].1.file.clone().unwrap();
    assert_eq!(file.filename, "a");
    assert_eq!(file.extension, "mp4");
    assert_eq!(catalog.records("v1").await.len(), 1);

    // Snapshots arrive in emission order, ending with the final one
    let phases: Vec<StatusTag> = events
        .iter()
        .filter_map(|e| match e {
            Event::Status { stat, .. } => Some(stat.status),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            StatusTag::Downloading,
            StatusTag::Downloading,
            StatusTag::Finished
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_completion_confirms_once() {
    let dir = tempdir().unwrap();
    let script = "echo '[download] Destination: a.mp4'; \
                  echo '[download] 100% of 10MiB in 01:00'; \
                  echo '[download] Destination: a.mp4'; \
                  echo '[download] 100% of 10MiB in 01:00'";
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        script,
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert_eq!(confirmations(&events).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stderr_warning_raises_to_warning() {
    let dir = tempdir().unwrap();
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo 'WARNING: low disk space' >&2",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Warning);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ItemWarning { message, .. } if message == "WARNING: low disk space"
    )));
    assert!(item_errors(&events).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unmatched_stderr_is_an_error() {
    let dir = tempdir().unwrap();
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo 'WARNING: first' >&2; echo 'some random text' >&2",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Error);
    assert_eq!(item_errors(&events), vec!["some random text".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ignorable_stderr_does_not_count() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.stderr.ignore_patterns = vec!["^ERROR: Unable to download video subtitles".to_string()];
    let (result, events) = run_script(
        config,
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo 'ERROR: Unable to download video subtitles for en' >&2; echo '[debug] x' >&2",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert!(item_errors(&events).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn helper_banner_on_stderr_is_not_classified() {
    let dir = tempdir().unwrap();
    let (result, _events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo 'WARNING: before' >&2; echo 'ffmpeg version 6.1' >&2; echo 'configuration: --enable-gpl' >&2",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Warning);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_zero_exit_is_an_error() {
    let dir = tempdir().unwrap();
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "exit 3",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Error);
    assert_eq!(result.last_stat.status, StatusTag::Error);
    let errors = item_errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("non-zero code 3"), "{}", errors[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn higher_severity_survives_non_zero_exit() {
    let dir = tempdir().unwrap();
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo '[download] /m/a.mp4 has already been downloaded'; exit 1",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::AlreadyDownloaded);
    assert_eq!(result.last_stat.status, StatusTag::AlreadyDownloaded);
    assert!(item_errors(&events).is_empty());
    assert_eq!(
        confirmations(&events)[0].0,
        ConfirmKind::AlreadyDownloaded
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filesize_abort_is_reported() {
    let dir = tempdir().unwrap();
    let (result, _events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo '[download] File is larger than max-filesize (9000 bytes > 10 bytes). Aborting.'",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::FilesizeAbort);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_binary_fails_to_start() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.tool.binary_path = Some("/nonexistent/media-dl-tool".into());
    let (result, events) = run_script(
        config,
        memory_catalog(),
        video_target("v1", dir.path()),
        "true",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Error);
    assert!(item_errors(&events)[0].starts_with("Download did not start"));
    assert_eq!(
        system_errors(&events),
        vec![SystemErrorCode::SpawnFailure.code()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_kills_the_process_group() {
    let dir = tempdir().unwrap();
    let ctx = adapter_context(test_config(), memory_catalog());
    let item = script_item(
        1,
        video_target("v1", dir.path()),
        "echo '[download] Destination: a.mp4'; sleep 5; echo done",
    );
    let adapter = ProcessAdapter::new(item, false, ctx);
    let handle = adapter.stop_handle();

    let started = Instant::now();
    let task = tokio::spawn(adapter.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop();
    handle.stop();

    let result = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("adapter should finish promptly after stop")
        .unwrap();
    assert_eq!(result.severity, Severity::Stopped);
    assert_eq!(result.last_stat.status, StatusTag::Stopped);
    assert!(handle.was_killed());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_before_run_never_spawns() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("ran");
    let ctx = adapter_context(test_config(), memory_catalog());
    let item = script_item(
        1,
        video_target("v1", dir.path()),
        &format!("touch '{}'", marker.display()),
    );
    let adapter = ProcessAdapter::new(item, false, ctx);
    adapter.stop_handle().stop();

    let result = adapter.run().await;
    assert_eq!(result.severity, Severity::Stopped);
    assert!(!marker.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn container_for_single_target_is_fatal() {
    let dir = tempdir().unwrap();
    let started = Instant::now();
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        video_target("v1", dir.path()),
        "echo '[download] Downloading video 1 of 40'; sleep 5",
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Stopped);
    assert!(started.elapsed() < Duration::from_secs(4));
    let errors = item_errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("channel or playlist"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_early_stop_after_limit_known_items() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let titles: Vec<String> = (1..=5).map(|i| format!("clip{}", i)).collect();
    for title in &titles {
        catalog
            .insert(
                "chan",
                MediaRecord {
                    name: Some(title.clone()),
                    file: Some(MediaFile {
                        dir: dir.path().to_path_buf(),
                        filename: title.clone(),
                        extension: "mp4".to_string(),
                    }),
                    ..Default::default()
                },
            )
            .await;
    }

    let mut config = test_config();
    config.scan.early_stop_limit = Some(3);
    let lines: Vec<String> = titles.iter().map(|t| metadata_line(t, dir.path())).collect();
    let script = format!("{}; sleep 5", printf_lines(&lines));

    let started = Instant::now();
    let (result, events) = run_script(
        config,
        catalog.clone(),
        container_target("chan", dir.path()),
        &script,
        true,
    )
    .await;

    assert_eq!(result.severity, Severity::Stopped);
    assert!(started.elapsed() < Duration::from_secs(4));

    let confirmed = confirmations(&events);
    let names: Vec<_> = confirmed
        .iter()
        .map(|(_, r)| r.name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["clip1", "clip2", "clip3"]);

    // The matched records were enriched, the unprocessed ones were not
    let records = catalog.records("chan").await;
    assert_eq!(records[2].duration, Some(61.0));
    assert_eq!(records[3].duration, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_matches_without_a_file_do_not_count_towards_early_stop() {
    let dir = tempdir().unwrap();
    let catalog = Arc::new(InMemoryCatalog::new());
    let titles: Vec<String> = (1..=5).map(|i| format!("clip{}", i)).collect();
    for title in &titles {
        catalog
            .insert(
                "chan",
                MediaRecord {
                    name: Some(title.clone()),
                    ..Default::default()
                },
            )
            .await;
    }

    let mut config = test_config();
    config.scan.early_stop_limit = Some(3);
    let lines: Vec<String> = titles.iter().map(|t| metadata_line(t, dir.path())).collect();

    let (result, events) = run_script(
        config,
        catalog.clone(),
        container_target("chan", dir.path()),
        &printf_lines(&lines),
        true,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert_eq!(result.last_stat.total_count, Some(5));
    assert_eq!(confirmations(&events).len(), 5);

    let records = catalog.records("chan").await;
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(MediaRecord::is_fully_known));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn real_early_stop_counts_already_downloaded_items() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.scan.early_stop_limit = Some(3);

    let lines: Vec<String> = (1..=5)
        .flat_map(|i| {
            [
                format!("[download] Downloading video {} of 5", i),
                format!("[download] /m/clip{}.mp4 has already been downloaded", i),
            ]
        })
        .collect();
    let script = format!("{}; sleep 5", printf_lines(&lines));

    let (result, events) = run_script(
        config,
        memory_catalog(),
        container_target("chan", dir.path()),
        &script,
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Stopped);
    let confirmed = confirmations(&events);
    assert_eq!(confirmed.len(), 3);
    assert!(
        confirmed
            .iter()
            .all(|(kind, _)| *kind == ConfirmKind::AlreadyDownloaded)
    );
    assert_eq!(result.last_stat.current_index, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conversion_after_completion_replaces_confirmed_file() {
    let dir = tempdir().unwrap();
    let catalog = memory_catalog();
    let d = dir.path().display();
    let script = printf_lines(&[
        "[download] Downloading video 1 of 1".to_string(),
        format!("[download] Destination: {}/song.webm", d),
        "[download] 100% of 3.00MiB in 00:01".to_string(),
        "[download] 100% of 3.00MiB in 00:01".to_string(),
        format!("[ffmpeg] Destination: {}/song.mp3", d),
    ]);

    let (result, events) = run_script(
        test_config(),
        catalog.clone(),
        container_target("chan", dir.path()),
        &script,
        false,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    let extensions: Vec<String> = confirmations(&events)
        .into_iter()
        .map(|(_, record)| record.file.unwrap().extension)
        .collect();
    assert_eq!(extensions, ["webm", "mp3"]);

    let records = catalog.records("chan").await;
    assert_eq!(records.len(), 1);
    let stored: Vec<&str> = records
        .iter()
        .map(|r| r.file.as_ref().unwrap().extension.as_str())
        .collect();
    assert_eq!(stored, ["mp3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conversion_of_known_item_does_not_count_towards_early_stop() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.scan.early_stop_limit = Some(3);
    let d = dir.path().display();
    let lines = [
        "[download] Downloading video 1 of 2".to_string(),
        format!("[download] {}/a.webm has already been downloaded", d),
        format!("[ffmpeg] Destination: {}/a.mp3", d),
        "[download] Downloading video 2 of 2".to_string(),
        format!("[download] {}/b.mp4 has already been downloaded", d),
    ];
    let script = format!("{}; sleep 1", printf_lines(&lines));

    let (result, events) = run_script(
        config,
        memory_catalog(),
        container_target("chan", dir.path()),
        &script,
        false,
    )
    .await;

    assert_ne!(result.severity, Severity::Stopped);
    let confirmed = confirmations(&events);
    assert_eq!(confirmed.len(), 3);
    assert!(
        confirmed
            .iter()
            .all(|(kind, _)| *kind == ConfirmKind::AlreadyDownloaded)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_metadata_fetch_is_stopped() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.scan.json_wait = Duration::from_millis(300);
    let script = format!(
        "{}; sleep 5",
        printf_lines(&[metadata_line("clip1", dir.path())])
    );

    let started = Instant::now();
    let (result, events) = run_script(
        config,
        memory_catalog(),
        container_target("chan", dir.path()),
        &script,
        true,
    )
    .await;

    assert_eq!(result.severity, Severity::Stopped);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(
        system_errors(&events),
        vec![SystemErrorCode::JsonStall.code()]
    );
    assert_eq!(confirmations(&events).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_metadata_is_non_fatal() {
    let dir = tempdir().unwrap();
    let lines = vec!["{\"title\": ".to_string(), metadata_line("clip1", dir.path())];
    let (result, events) = run_script(
        test_config(),
        memory_catalog(),
        container_target("chan", dir.path()),
        &printf_lines(&lines),
        true,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert_eq!(
        system_errors(&events),
        vec![SystemErrorCode::InvalidJson.code()]
    );
    assert_eq!(confirmations(&events).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_item_creates_record_and_description() {
    let dir = tempdir().unwrap();
    let catalog = memory_catalog();
    let mut config = test_config();
    config.side_files.keep_description = true;

    let line = serde_json::json!({
        "title": "fresh",
        "_filename": dir.path().join("fresh.webm"),
        "description": "a new upload",
        "upload_date": "20240131",
    })
    .to_string();

    let (result, events) = run_script(
        config,
        catalog.clone(),
        container_target("chan", dir.path()),
        &printf_lines(&[line]),
        true,
    )
    .await;

    assert_eq!(result.severity, Severity::Ok);
    assert!(result.last_stat.simulated);

    let records = catalog.records("chan").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("fresh"));
    assert!(!records[0].downloaded);
    assert_eq!(records[0].file.as_ref().unwrap().extension, "webm");
    assert!(records[0].upload_time.is_some());

    let description = dir.path().join("fresh.description");
    assert_eq!(
        std::fs::read_to_string(&description).unwrap(),
        "a new upload"
    );
    assert!(events.iter().any(|e| matches!(
        e,
        Event::SideFileWritten { path, .. } if *path == description
    )));
}
