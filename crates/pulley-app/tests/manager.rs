use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use httpmock::prelude::*;
use pulley_app::{UPLOAD_ERROR_CODE, UploadManager};
use pulley_config::UploaderConfig;
use pulley_core::{
    EnqueueBinaryRequest, EnqueueBlockRequest, EnqueueRequest, FileItem, FormField, TaskId,
    UploadInspector, UploadStatus, UploadWorkflow,
};
use pulley_events::{CANCELED_PROGRESS, ResultEvent};
use pulley_store::ResultStore;
use pulley_telemetry::Metrics;
use pulley_test_support::{RecordingObserver, SampleTree};
use pulley_transport::StaticConnectivity;
use tokio_stream::StreamExt;

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    tree: SampleTree,
    config: UploaderConfig,
    manager: Arc<UploadManager>,
    observer: Arc<RecordingObserver>,
}

impl Harness {
    fn new() -> Result<Self> {
        let tree = SampleTree::new()?;
        let config = UploaderConfig {
            staging_dir: tree.path().join("staging"),
            data_dir: tree.path().join("data"),
            connectivity_poll_ms: 20,
            ..UploaderConfig::default()
        };
        let (manager, observer) = start(&config)?;
        Ok(Self {
            tree,
            config,
            manager,
            observer,
        })
    }

    fn staged_files(&self) -> Result<usize> {
        let dir = self.config.staging_dir.join("requests");
        if !dir.exists() {
            return Ok(0);
        }
        Ok(std::fs::read_dir(dir)?.count())
    }
}

fn start(config: &UploaderConfig) -> Result<(Arc<UploadManager>, Arc<RecordingObserver>)> {
    let handle = UploadManager::start(
        config,
        Arc::new(StaticConnectivity::new(false)),
        Metrics::new()?,
    )?;
    let observer = Arc::new(RecordingObserver::new());
    handle.manager.register_observer(observer.clone());
    Ok((handle.manager, observer))
}

fn multipart(url: String, files: Vec<FileItem>) -> EnqueueRequest {
    EnqueueRequest {
        url,
        method: "POST".into(),
        headers: BTreeMap::new(),
        files,
        data: vec![FormField {
            key: "user".into(),
            value: "42".into(),
        }],
        tag: Some("profile".into()),
        allow_cellular: true,
    }
}

fn binary(url: String, method: &str, path: PathBuf) -> EnqueueBinaryRequest {
    EnqueueBinaryRequest {
        url,
        method: method.into(),
        headers: BTreeMap::new(),
        path,
        tag: None,
        allow_cellular: true,
    }
}

async fn settle(harness: &Harness, task_id: &TaskId) -> Result<()> {
    if !harness.observer.wait_for_terminal(task_id, WAIT).await {
        bail!("task {task_id} never reached a terminal state");
    }
    Ok(())
}

fn assert_strictly_increasing(progress: &[i32]) {
    for pair in progress.windows(2) {
        assert!(pair[0] < pair[1], "progress not increasing: {progress:?}");
    }
}

#[tokio::test]
async fn get_method_is_rejected_without_a_task() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("a.bin", "payload")?;
    let err = harness
        .manager
        .enqueue_binary(binary("http://localhost/upload".into(), "GET", path))
        .await
        .err();
    assert_eq!(err.map(|err| err.code()), Some("invalid_method"));
    assert!(harness.manager.list().await.is_empty());
    assert!(harness.observer.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_multipart_file_reports_io_error_naming_path() -> Result<()> {
    let harness = Harness::new()?;
    let present = harness.tree.write("present.txt", "here")?;
    let missing = harness.tree.missing("ghost.png");
    let request = multipart(
        "http://localhost/upload".into(),
        vec![
            FileItem {
                field_name: "first".into(),
                path: present,
            },
            FileItem {
                field_name: "second".into(),
                path: missing.clone(),
            },
        ],
    );

    let Err(err) = harness.manager.enqueue(request).await else {
        bail!("enqueue should fail");
    };
    assert_eq!(err.code(), "io_error");
    assert!(err.to_string().contains(&missing.display().to_string()));
    assert!(harness.manager.list().await.is_empty());
    assert!(harness.observer.events().is_empty());
    assert_eq!(harness.staged_files()?, 0);
    Ok(())
}

#[tokio::test]
async fn multipart_upload_completes_with_full_progress() -> Result<()> {
    let harness = Harness::new()?;
    let avatar = harness.tree.write("avatar.png", vec![7_u8; 64 * 1024])?;
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/upload").header("accept", "*/*");
        then.status(200).header("x-request", "r-1").body("uploaded");
    });

    let task_id = harness
        .manager
        .enqueue(multipart(
            server.url("/upload"),
            vec![FileItem {
                field_name: "avatar".into(),
                path: avatar.clone(),
            }],
        ))
        .await?;
    assert!(task_id.as_str().starts_with("pulley.upload.background."));
    settle(&harness, &task_id).await?;
    mock.assert();

    let progress = harness.observer.progress_for(&task_id);
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert_strictly_increasing(&progress);

    let results = harness.observer.results_for(&task_id);
    assert_eq!(results.len(), 2);
    assert!(matches!(&results[0], ResultEvent::Enqueued { tag: Some(tag), .. } if tag == "profile"));
    let ResultEvent::Completed {
        message,
        status_code,
        headers,
        tag,
        ..
    } = &results[1]
    else {
        bail!("expected a completed result, got {:?}", results[1]);
    };
    assert_eq!(*status_code, 200);
    assert_eq!(message.as_deref(), Some("uploaded"));
    assert_eq!(headers.get("x-request").map(String::as_str), Some("r-1"));
    assert_eq!(tag.as_deref(), Some("profile"));

    assert!(harness.manager.get(&task_id).await.is_none());
    assert_eq!(harness.staged_files()?, 0);
    assert!(avatar.exists());

    let snapshot = harness.manager.metrics().snapshot();
    assert_eq!(snapshot.uploads_enqueued_total, 1);
    assert_eq!(snapshot.uploads_completed_total, 1);
    assert_eq!(snapshot.active_uploads, 0);
    assert!(snapshot.upload_bytes_sent_total > 64 * 1024);
    Ok(())
}

#[tokio::test]
async fn immediate_cancel_yields_one_terminal_disposition() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("cancel.bin", "cancel me")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(PUT).path("/slow");
        then.status(200).delay(Duration::from_millis(500));
    });

    let task_id = harness
        .manager
        .enqueue_binary(binary(server.url("/slow"), "PUT", path))
        .await?;
    let canceled = harness.manager.cancel(&task_id).await;
    settle(&harness, &task_id).await?;
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(harness.observer.terminal_count(&task_id), 1);
    if canceled {
        assert_eq!(
            harness.observer.progress_for(&task_id).last(),
            Some(&CANCELED_PROGRESS)
        );
        let results = harness.observer.results_for(&task_id);
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[1],
            ResultEvent::Canceled { tag: None, .. }
        ));

        harness.manager.flush_results().await?;
        let persisted = ResultStore::open(harness.config.results_path())?.load_all();
        assert_eq!(
            persisted.last().map(ResultEvent::status),
            Some(UploadStatus::Canceled)
        );
        assert_eq!(persisted, harness.manager.results().await?);
    }
    assert!(harness.manager.list().await.is_empty());
    assert!(!harness.manager.cancel(&task_id).await);
    Ok(())
}

#[tokio::test]
async fn forbidden_binary_upload_fails_with_body_as_message() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("report.pdf", "%PDF-1.7")?;
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/forbidden").body("%PDF-1.7");
        then.status(403).body("not allowed");
    });

    let task_id = harness
        .manager
        .enqueue_binary(binary(server.url("/forbidden"), "POST", path.clone()))
        .await?;
    settle(&harness, &task_id).await?;
    mock.assert();

    let results = harness.observer.results_for(&task_id);
    let Some(ResultEvent::Failed {
        status_code,
        code,
        message,
        ..
    }) = results.last()
    else {
        bail!("expected a failed result, got {results:?}");
    };
    assert_eq!(*status_code, 403);
    assert_eq!(code, UPLOAD_ERROR_CODE);
    assert_eq!(message.as_deref(), Some("not allowed"));
    assert!(path.exists());
    Ok(())
}

#[tokio::test]
async fn transport_error_fails_with_status_500() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("offline.bin", "offline")?;
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let task_id = harness
        .manager
        .enqueue_binary(binary(
            format!("http://127.0.0.1:{port}/upload"),
            "PATCH",
            path,
        ))
        .await?;
    settle(&harness, &task_id).await?;

    let results = harness.observer.results_for(&task_id);
    let Some(ResultEvent::Failed {
        status_code,
        code,
        message,
        ..
    }) = results.last()
    else {
        bail!("expected a failed result, got {results:?}");
    };
    assert_eq!(*status_code, 500);
    assert_eq!(code, "upload_error");
    assert!(message.as_deref().is_some_and(|message| !message.is_empty()));
    Ok(())
}

#[tokio::test]
async fn block_upload_reports_progress_per_block() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("blocks.bin", "abcdefghij")?;
    let server = MockServer::start_async().await;
    for (range, status) in [("bytes 0-3/10", 202), ("bytes 4-7/10", 202), ("bytes 8-9/10", 201)] {
        server.mock(|when, then| {
            when.method(PUT).path("/blocks").header("content-range", range);
            then.status(status).body("ok");
        });
    }

    let task_id = harness
        .manager
        .enqueue_blocks(EnqueueBlockRequest {
            url: server.url("/blocks"),
            method: "PUT".into(),
            headers: BTreeMap::new(),
            path,
            block_size: Some(4),
            tag: Some("chunked".into()),
            allow_cellular: true,
        })
        .await?;
    settle(&harness, &task_id).await?;

    assert_eq!(harness.observer.progress_for(&task_id), vec![0, 40, 80, 100]);
    assert!(matches!(
        harness.observer.results_for(&task_id).last(),
        Some(ResultEvent::Completed {
            status_code: 201,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn results_survive_restart_and_clear() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("keep.txt", "keep")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/keep");
        then.status(200).body("kept");
    });

    let task_id = harness
        .manager
        .enqueue_binary(binary(server.url("/keep"), "POST", path))
        .await?;
    settle(&harness, &task_id).await?;

    let results = harness.manager.results().await?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status(), UploadStatus::Enqueued);
    assert_eq!(results[1].status(), UploadStatus::Completed);
    assert!(results.iter().all(|result| result.task_id() == &task_id));

    harness.manager.flush_results().await?;
    let reopened = ResultStore::open(harness.config.results_path())?;
    assert_eq!(reopened.load_all(), results);
    drop(reopened);
    let (restarted, _observer) = start(&harness.config)?;
    assert_eq!(restarted.results().await?, results);

    harness.manager.clear_results().await?;
    harness.manager.clear_results().await?;
    assert!(harness.manager.results().await?.is_empty());
    assert!(ResultStore::open(harness.config.results_path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn late_listener_receives_cached_results_in_order() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("late.txt", "late")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/late");
        then.status(200);
    });

    let task_id = harness
        .manager
        .enqueue_binary(binary(server.url("/late"), "POST", path))
        .await?;
    settle(&harness, &task_id).await?;

    let mut results = harness.manager.hub().listen_results();
    let first = tokio::time::timeout(WAIT, results.next()).await?;
    let second = tokio::time::timeout(WAIT, results.next()).await?;
    assert_eq!(first.map(|event| event.status()), Some(UploadStatus::Enqueued));
    assert_eq!(second.map(|event| event.status()), Some(UploadStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn background_completion_runs_once_queue_drains() -> Result<()> {
    let harness = Harness::new()?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/drain");
        then.status(200).delay(Duration::from_millis(50));
    });

    let (tx, rx) = tokio::sync::oneshot::channel();
    harness
        .manager
        .set_background_completion(Box::new(move || {
            let _ = tx.send(());
        }));

    let mut ids = Vec::new();
    for index in 0..3 {
        let path = harness.tree.write(&format!("drain-{index}.txt"), "drain")?;
        ids.push(
            harness
                .manager
                .enqueue_binary(binary(server.url("/drain"), "POST", path))
                .await?,
        );
    }

    tokio::time::timeout(WAIT, rx).await??;
    for task_id in &ids {
        assert_eq!(harness.observer.terminal_count(task_id), 1);
    }
    assert!(harness.manager.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn cancel_all_cancels_every_active_task() -> Result<()> {
    let harness = Harness::new()?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/hold");
        then.status(200).delay(Duration::from_secs(5));
    });

    for index in 0..2 {
        let path = harness.tree.write(&format!("hold-{index}.txt"), "hold")?;
        harness
            .manager
            .enqueue_binary(binary(server.url("/hold"), "POST", path))
            .await?;
    }
    assert_eq!(harness.manager.list().await.len(), 2);

    let canceled = harness.manager.cancel_all().await;
    assert_eq!(canceled.len(), 2);
    for task_id in &canceled {
        assert_eq!(
            harness.observer.progress_for(task_id).last(),
            Some(&CANCELED_PROGRESS)
        );
        assert_eq!(harness.observer.terminal_count(task_id), 1);
    }
    let results = harness.manager.results().await?;
    let persisted_cancels = results
        .iter()
        .filter(|result| result.status() == UploadStatus::Canceled)
        .count();
    assert_eq!(persisted_cancels, 2);
    assert!(harness.manager.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn reconcile_keeps_known_tasks_untouched() -> Result<()> {
    let harness = Harness::new()?;
    let path = harness.tree.write("known.txt", "known")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/known");
        then.status(200).delay(Duration::from_secs(2));
    });

    let task_id = harness
        .manager
        .enqueue_binary(binary(server.url("/known"), "POST", path))
        .await?;
    assert!(harness.manager.reconcile().is_empty());
    let task = harness.manager.get(&task_id).await;
    assert!(task.is_some_and(|task| task.task_id == task_id));
    assert!(harness.manager.cancel(&task_id).await);
    Ok(())
}

#[tokio::test]
async fn background_handler_id_is_persisted_for_relaunch() -> Result<()> {
    let harness = Harness::new()?;
    assert!(harness.manager.background_handler()?.is_none());

    let saved = harness.manager.set_background_handler(1_234)?;
    assert_eq!(saved.callback_id, 1_234);

    let (relaunched, _observer) = start(&harness.config)?;
    let loaded = relaunched.background_handler()?;
    assert_eq!(loaded.map(|handler| handler.callback_id), Some(1_234));
    Ok(())
}
