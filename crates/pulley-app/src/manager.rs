//! Upload manager: turns enqueue requests into transport units and transport callbacks
//! into task transitions and events.
//!
//! # Design
//! - Validation and staging happen before any task exists; errors return synchronously.
//! - A task is registered and announced as `enqueued` before its unit is launched, so
//!   `enqueued` always precedes progress for the same id.
//! - Terminal transitions go through [`TaskRegistry::finish`] or [`TaskRegistry::cancel`];
//!   whichever runs first wins, so each task gets exactly one terminal disposition.
//! - Staged bodies are removed when their unit finishes, whatever the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pulley_config::UploaderConfig;
use pulley_core::{
    EnqueueBinaryRequest, EnqueueBlockRequest, EnqueueRequest, TaskId, TaskRegistry,
    UploadError, UploadInspector, UploadResult, UploadStatus, UploadTask, UploadWorkflow,
};
use pulley_events::{EventHub, EventNotifier, ProgressEvent, ResultEvent, UploadObserver};
use pulley_staging::{RequestBodyBuilder, StagingError, remove_staged};
use pulley_store::{HandlerStore, PersistedHandler, ResultStore};
use pulley_telemetry::Metrics;
use pulley_transport::{
    BodySource, ConnectivityMonitor, SessionOptions, TransferMode, TransportDelegate,
    TransportEvent, TransportOutcome, TransportRequest, TransportSession, compose_headers,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Code carried by every `failed` result.
pub const UPLOAD_ERROR_CODE: &str = "upload_error";

/// Status reported for transport-level failures.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Callback run once when a terminal transition leaves no active tasks.
pub type BackgroundCompletion = Box<dyn FnOnce() + Send>;

/// Orchestrates staging, the transport session, the registry and event delivery.
pub struct UploadManager {
    registry: TaskRegistry,
    notifier: EventNotifier,
    session: TransportSession,
    builder: Arc<RequestBodyBuilder>,
    store: Arc<ResultStore>,
    hub: Arc<EventHub>,
    handler: HandlerStore,
    metrics: Metrics,
    block_size: u64,
    bytes_sent: Mutex<HashMap<TaskId, u64>>,
    completion: Mutex<Option<BackgroundCompletion>>,
}

/// Running manager plus the callback workers feeding it.
pub struct ManagerHandle {
    /// Shared manager.
    pub manager: Arc<UploadManager>,
    /// Callback worker tasks; they run until the session is dropped.
    pub workers: Vec<JoinHandle<()>>,
}

impl UploadManager {
    /// Build the session, stores and observers from configuration and start the
    /// callback workers.
    ///
    /// The result store is registered first and the live event hub second, so results
    /// are persisted before they are delivered.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport session cannot be constructed.
    pub fn start(
        config: &UploaderConfig,
        monitor: Arc<dyn ConnectivityMonitor>,
        metrics: Metrics,
    ) -> AppResult<ManagerHandle> {
        let options = SessionOptions {
            default_identifier: config.session_identifier.clone(),
            constrained_identifier: config.constrained_session_identifier.clone(),
            max_connections_per_host: config.max_connections_per_host,
            max_concurrent_uploads: config.max_concurrent_uploads,
            timeout: config.timeout(),
            callback_workers: config.callback_workers,
            connectivity_poll: config.connectivity_poll(),
        };
        let (session, workers) = TransportSession::new(&options, monitor)
            .map_err(|err| AppError::transport("transport.session", err))?;

        let store = Arc::new(
            ResultStore::open(config.results_path())
                .map_err(|err| AppError::store("results.open", err))?,
        );
        let hub = Arc::new(EventHub::new());
        let notifier = EventNotifier::new();
        notifier.register(store.clone());
        notifier.register(hub.clone());

        let manager = Arc::new(Self {
            registry: TaskRegistry::new(config.step_update),
            notifier,
            session,
            builder: Arc::new(RequestBodyBuilder::new(&config.staging_dir)),
            store,
            hub,
            handler: HandlerStore::new(config.handler_path()),
            metrics,
            block_size: config.block_size_bytes,
            bytes_sent: Mutex::new(HashMap::new()),
            completion: Mutex::new(None),
        });
        info!(
            results = %manager.store.path().display(),
            persisted = manager.store.len(),
            workers = workers.len(),
            "upload manager started"
        );
        let workers = workers.spawn(manager.clone());
        Ok(ManagerHandle { manager, workers })
    }

    /// Add an observer after the built-in store and hub.
    pub fn register_observer(&self, observer: Arc<dyn UploadObserver>) {
        self.notifier.register(observer);
    }

    /// Live event streams with caching of undelivered events.
    #[must_use]
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Metrics updated by the manager.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Install the callback run when the last active task finishes. Replaces any
    /// previously installed callback that has not run yet.
    pub fn set_background_completion(&self, completion: BackgroundCompletion) {
        *self.lock_completion() = Some(completion);
    }

    /// Persist the background handler id for a relaunched process.
    ///
    /// # Errors
    ///
    /// Returns an error when the id cannot be written.
    pub fn set_background_handler(&self, callback_id: i64) -> AppResult<PersistedHandler> {
        let saved = self
            .handler
            .save(callback_id)
            .map_err(|err| AppError::store("handler.save", err))?;
        info!(callback_id, "background handler registered");
        Ok(saved)
    }

    /// Background handler id persisted by this or a previous process.
    ///
    /// # Errors
    ///
    /// Returns an error when the persisted id exists but cannot be read.
    pub fn background_handler(&self) -> AppResult<Option<PersistedHandler>> {
        self.handler
            .load()
            .map_err(|err| AppError::store("handler.load", err))
    }

    /// Wait until every persisted result queued so far has reached the log file.
    ///
    /// # Errors
    ///
    /// Returns an error when the log writer has stopped.
    pub async fn flush_results(&self) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.flush())
            .await
            .map_err(|err| AppError::io("results.flush", None, std::io::Error::other(err)))?
            .map_err(|err| AppError::store("results.flush", err))
    }

    /// Register in-flight transport units the registry does not know about, as `running`.
    ///
    /// Returns the ids that were added.
    pub fn reconcile(&self) -> Vec<TaskId> {
        let mut adopted = Vec::new();
        for unit in self.session.in_flight() {
            if self.registry.contains(&unit.task_id) {
                continue;
            }
            let mut task = UploadTask::enqueued(unit.task_id.clone(), unit.tag, unit.allow_cellular);
            task.status = UploadStatus::Running;
            if self.registry.register(task) {
                adopted.push(unit.task_id);
            }
        }
        if !adopted.is_empty() {
            info!(count = adopted.len(), "reattached in-flight uploads");
            self.metrics.set_active_uploads(self.registry.len());
        }
        adopted
    }

    fn launch(&self, request: TransportRequest) -> UploadResult<TaskId> {
        let tag = request.tag.clone();
        let allow_cellular = request.allow_cellular;
        let body = request.body.clone();
        let unit = match self.session.prepare(request) {
            Ok(unit) => unit,
            Err(err) => {
                discard_body(None, &body);
                return Err(UploadError::schedule(err));
            }
        };

        let task_id = unit.task_id().clone();
        if !self
            .registry
            .register(UploadTask::enqueued(task_id.clone(), tag.clone(), allow_cellular))
        {
            warn!(task_id = %task_id, "task id already registered");
        }
        self.notifier.emit_result(&ResultEvent::Enqueued {
            task_id: task_id.clone(),
            tag,
        });
        self.metrics.inc_enqueued();
        self.metrics.set_active_uploads(self.registry.len());

        drop(unit.launch());
        info!(task_id = %task_id, allow_cellular, "upload enqueued");
        Ok(task_id)
    }

    fn on_bytes_sent(&self, task_id: &TaskId, sent: u64, expected: u64) {
        if !self.registry.contains(task_id) {
            return;
        }
        let previous = self.lock_bytes().insert(task_id.clone(), sent).unwrap_or(0);
        self.metrics.add_bytes_sent(sent.saturating_sub(previous));
        if let Some(progress) = self.registry.record_progress(task_id, sent, expected) {
            self.notifier.emit_progress(&progress);
        }
    }

    fn on_finished(&self, task_id: &TaskId, outcome: TransportOutcome, body: &BodySource) {
        discard_body(Some(task_id), body);
        self.lock_bytes().remove(task_id);

        match outcome {
            TransportOutcome::Response { status, headers } if (200..=299).contains(&status) => {
                if let Some(progress) = self.registry.complete_progress(task_id) {
                    self.notifier.emit_progress(&progress);
                }
                if let Some(finished) = self.registry.finish(task_id, UploadStatus::Completed) {
                    self.publish_terminal(&ResultEvent::Completed {
                        task_id: task_id.clone(),
                        message: Some(body_text(finished.body)),
                        status_code: status,
                        headers,
                        tag: finished.task.tag,
                    });
                }
            }
            TransportOutcome::Response { status, .. } => {
                if let Some(finished) = self.registry.finish(task_id, UploadStatus::Failed) {
                    self.publish_terminal(&ResultEvent::Failed {
                        task_id: task_id.clone(),
                        status_code: status,
                        code: UPLOAD_ERROR_CODE.to_string(),
                        message: Some(body_text(finished.body)),
                        details: Vec::new(),
                        tag: finished.task.tag,
                    });
                }
            }
            TransportOutcome::Error { message, details } => {
                if let Some(finished) = self.registry.finish(task_id, UploadStatus::Failed) {
                    self.publish_terminal(&ResultEvent::Failed {
                        task_id: task_id.clone(),
                        status_code: TRANSPORT_FAILURE_STATUS,
                        code: UPLOAD_ERROR_CODE.to_string(),
                        message: Some(message),
                        details,
                        tag: finished.task.tag,
                    });
                }
            }
            TransportOutcome::Canceled => {
                // Units canceled outside `cancel` still owe their canceled progress event.
                if let Some(finished) = self.registry.finish(task_id, UploadStatus::Canceled) {
                    self.announce_canceled(task_id.clone(), finished.task.tag);
                }
            }
        }

        if self.registry.is_empty() {
            self.run_background_completion();
        }
    }

    fn publish_terminal(&self, result: &ResultEvent) {
        self.metrics.inc_finished(result.status().as_str());
        self.metrics.set_active_uploads(self.registry.len());
        info!(
            task_id = %result.task_id(),
            status = result.status().as_str(),
            "upload finished"
        );
        self.notifier.emit_result(result);
    }

    fn announce_canceled(&self, task_id: TaskId, tag: Option<String>) {
        self.metrics.inc_finished(UploadStatus::Canceled.as_str());
        self.metrics.set_active_uploads(self.registry.len());
        info!(task_id = %task_id, "upload canceled");
        self.notifier
            .emit_progress(&ProgressEvent::canceled(task_id.clone(), tag.clone()));
        self.notifier.emit_result(&ResultEvent::Canceled { task_id, tag });
    }

    fn run_background_completion(&self) {
        let completion = self.lock_completion().take();
        if let Some(completion) = completion {
            debug!("no active uploads remain; running background completion");
            completion();
        }
    }

    fn lock_bytes(&self) -> MutexGuard<'_, HashMap<TaskId, u64>> {
        self.bytes_sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_completion(&self) -> MutexGuard<'_, Option<BackgroundCompletion>> {
        self.completion.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UploadWorkflow for UploadManager {
    async fn enqueue(&self, request: EnqueueRequest) -> UploadResult<TaskId> {
        let target = request.validate()?;
        let EnqueueRequest {
            files,
            data,
            tag,
            allow_cellular,
            ..
        } = request;

        let builder = Arc::clone(&self.builder);
        let staged = tokio::task::spawn_blocking(move || builder.build_multipart(&data, &files))
            .await
            .map_err(UploadError::staging)?
            .map_err(staging_error)?;

        let headers = compose_headers(Some(&staged.content_type()), &target.headers);
        self.launch(TransportRequest {
            method: target.method,
            url: target.url,
            headers,
            body: BodySource::staged(staged.path),
            mode: TransferMode::Stream,
            tag,
            allow_cellular,
        })
    }

    async fn enqueue_binary(&self, request: EnqueueBinaryRequest) -> UploadResult<TaskId> {
        let target = request.validate()?;
        self.launch(TransportRequest {
            method: target.method,
            url: target.url,
            headers: compose_headers(None, &target.headers),
            body: BodySource::caller_file(request.path),
            mode: TransferMode::Stream,
            tag: request.tag,
            allow_cellular: request.allow_cellular,
        })
    }

    async fn enqueue_blocks(&self, request: EnqueueBlockRequest) -> UploadResult<TaskId> {
        let target = request.validate()?;
        let block_size = request.block_size.unwrap_or(self.block_size);
        self.launch(TransportRequest {
            method: target.method,
            url: target.url,
            headers: compose_headers(None, &target.headers),
            body: BodySource::caller_file(request.path),
            mode: TransferMode::Blocks { block_size },
            tag: request.tag,
            allow_cellular: request.allow_cellular,
        })
    }

    async fn cancel(&self, task_id: &TaskId) -> bool {
        let Some(task) = self.registry.cancel(task_id) else {
            debug!(task_id = %task_id, "cancel ignored for unknown task");
            return false;
        };
        self.lock_bytes().remove(task_id);
        if !self.session.cancel(task_id) {
            debug!(task_id = %task_id, "transport unit already finished");
        }
        self.announce_canceled(task.task_id, task.tag);
        if self.registry.is_empty() {
            self.run_background_completion();
        }
        true
    }

    async fn cancel_all(&self) -> Vec<TaskId> {
        let mut canceled = Vec::new();
        for task in self.registry.snapshot() {
            if self.cancel(&task.task_id).await {
                canceled.push(task.task_id);
            }
        }
        // Units the registry never saw (not yet reconciled) are stopped too.
        let stray = self.session.cancel_all();
        if !stray.is_empty() {
            debug!(count = stray.len(), "canceled remaining transport units");
        }
        canceled
    }

    async fn clear_results(&self) -> anyhow::Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.clear()).await??;
        self.hub.clear();
        info!("persisted upload results cleared");
        Ok(())
    }
}

#[async_trait]
impl UploadInspector for UploadManager {
    async fn list(&self) -> Vec<UploadTask> {
        self.registry.snapshot()
    }

    async fn get(&self, task_id: &TaskId) -> Option<UploadTask> {
        self.registry.get(task_id)
    }

    async fn results(&self) -> anyhow::Result<Vec<ResultEvent>> {
        Ok(self.store.load_all())
    }
}

impl TransportDelegate for UploadManager {
    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::BytesSent {
                task_id,
                sent,
                expected,
            } => self.on_bytes_sent(&task_id, sent, expected),
            TransportEvent::DataReceived { task_id, chunk } => {
                if !self.registry.append_body(&task_id, &chunk) {
                    debug!(task_id = %task_id, "response chunk for inactive task dropped");
                }
            }
            TransportEvent::Finished {
                task_id,
                outcome,
                body,
            } => self.on_finished(&task_id, outcome, &body),
        }
    }
}

fn staging_error(err: StagingError) -> UploadError {
    match err {
        StagingError::MissingFile { path } => UploadError::MissingFile { path },
        StagingError::Directory { path } => UploadError::DirectoryPath { path },
        StagingError::NoFiles => UploadError::InvalidFiles,
        other @ StagingError::Io { .. } => UploadError::staging(other),
    }
}

fn discard_body(task_id: Option<&TaskId>, body: &BodySource) {
    if !body.delete_after_use {
        return;
    }
    if let Err(err) = remove_staged(&body.path) {
        warn!(
            error = %err,
            task_id = task_id.map(TaskId::as_str),
            path = %body.path.display(),
            "failed to remove staged request body"
        );
    }
}

fn body_text(body: Vec<u8>) -> String {
    String::from_utf8(body).unwrap_or_default()
}
