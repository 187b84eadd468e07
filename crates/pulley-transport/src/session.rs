//! Upload session with an unrestricted and an unmetered-only execution context.
//!
//! # Design
//! - Both contexts share the concurrency caps and the callback workers.
//! - Units wait for a per-host slot, then a global slot, before touching the network.
//! - Every unit owns a cancellation token; canceling races the request and drops it.
//! - A unit always ends with exactly one `Finished` callback carrying its body source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use pulley_core::HttpMethod;
use pulley_events::TaskId;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use tokio::fs::File;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::blocks;
use crate::callbacks::{CallbackDispatcher, CallbackWorkers};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{TransportError, TransportResult};
use crate::events::{TransportEvent, TransportOutcome};
use crate::request::{TransferMode, TransportRequest, collect_headers, to_header_map};

/// Execution context a unit runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// No network restriction.
    Default,
    /// Runs only while connectivity is unmetered.
    Constrained,
}

impl ContextKind {
    /// Context selected by a request's `allow_cellular` flag.
    #[must_use]
    pub const fn for_allow_cellular(allow_cellular: bool) -> Self {
        if allow_cellular {
            Self::Default
        } else {
            Self::Constrained
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Constrained => "constrained",
        }
    }
}

/// Session construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Identifier of the unrestricted context; prefixes its task ids.
    pub default_identifier: String,
    /// Identifier of the unmetered-only context; prefixes its task ids.
    pub constrained_identifier: String,
    /// Concurrent connections allowed per host.
    pub max_connections_per_host: usize,
    /// Concurrent active units across both contexts.
    pub max_concurrent_uploads: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Callback worker count.
    pub callback_workers: usize,
    /// Interval between connectivity checks for constrained units.
    pub connectivity_poll: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_identifier: "pulley.upload.background".to_string(),
            constrained_identifier: "pulley.upload.background.wifi".to_string(),
            max_connections_per_host: 3,
            max_concurrent_uploads: 2,
            timeout: Duration::from_secs(3_600),
            callback_workers: 2,
            connectivity_poll: Duration::from_secs(1),
        }
    }
}

/// Unit known to the session that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightUnit {
    /// Unit identifier.
    pub task_id: TaskId,
    /// Correlation tag supplied at enqueue.
    pub tag: Option<String>,
    /// Whether the unit runs in the unrestricted context.
    pub allow_cellular: bool,
}

/// Handle to the shared upload session.
#[derive(Clone)]
pub struct TransportSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    default: TransportContext,
    constrained: TransportContext,
    units: Mutex<HashMap<TaskId, UnitEntry>>,
    active: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    per_host: usize,
    monitor: Arc<dyn ConnectivityMonitor>,
    dispatcher: CallbackDispatcher,
    connectivity_poll: Duration,
}

struct TransportContext {
    identifier: String,
    client: Client,
}

struct UnitEntry {
    token: CancellationToken,
    tag: Option<String>,
    kind: ContextKind,
}

pub(crate) struct UnitPlan {
    pub(crate) task_id: TaskId,
    pub(crate) kind: ContextKind,
    pub(crate) headers: HeaderMap,
    pub(crate) request: TransportRequest,
}

impl TransportSession {
    /// Build both contexts. The returned workers must be spawned with a delegate to
    /// receive callbacks; events are buffered until then.
    ///
    /// # Errors
    ///
    /// Returns an error when the options are out of range or an HTTP client cannot
    /// be constructed.
    pub fn new(
        options: &SessionOptions,
        monitor: Arc<dyn ConnectivityMonitor>,
    ) -> TransportResult<(Self, CallbackWorkers)> {
        if options.max_concurrent_uploads == 0 {
            return Err(TransportError::InvalidOptions {
                field: "max_concurrent_uploads",
            });
        }
        if options.max_connections_per_host == 0 {
            return Err(TransportError::InvalidOptions {
                field: "max_connections_per_host",
            });
        }
        if options.default_identifier == options.constrained_identifier {
            return Err(TransportError::InvalidOptions {
                field: "constrained_identifier",
            });
        }

        let default = TransportContext {
            identifier: options.default_identifier.clone(),
            client: build_client(options, ContextKind::Default)?,
        };
        let constrained = TransportContext {
            identifier: options.constrained_identifier.clone(),
            client: build_client(options, ContextKind::Constrained)?,
        };
        let (dispatcher, workers) = CallbackDispatcher::new(options.callback_workers);

        let inner = SessionInner {
            default,
            constrained,
            units: Mutex::new(HashMap::new()),
            active: Arc::new(Semaphore::new(options.max_concurrent_uploads)),
            hosts: Mutex::new(HashMap::new()),
            per_host: options.max_connections_per_host,
            monitor,
            dispatcher,
            connectivity_poll: options.connectivity_poll,
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            workers,
        ))
    }

    /// Identifier of a context.
    #[must_use]
    pub fn identifier(&self, kind: ContextKind) -> &str {
        &self.inner.context(kind).identifier
    }

    /// Assign an id and validate headers without starting the unit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidHeader`] for headers that are not valid HTTP.
    pub fn prepare(&self, request: TransportRequest) -> TransportResult<PreparedUnit> {
        let kind = ContextKind::for_allow_cellular(request.allow_cellular);
        let headers = to_header_map(&request.headers)?;
        let task_id = TaskId::generate(&self.inner.context(kind).identifier);
        Ok(PreparedUnit {
            session: self.clone(),
            plan: UnitPlan {
                task_id,
                kind,
                headers,
                request,
            },
        })
    }

    /// Cancel a running unit. Returns `false` for unknown or finished ids.
    #[must_use]
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        self.inner
            .lock_units()
            .get(task_id)
            .is_some_and(|entry| {
                entry.token.cancel();
                true
            })
    }

    /// Cancel every running unit, returning their ids.
    pub fn cancel_all(&self) -> Vec<TaskId> {
        self.inner
            .lock_units()
            .iter()
            .map(|(task_id, entry)| {
                entry.token.cancel();
                task_id.clone()
            })
            .collect()
    }

    /// Units launched and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> Vec<InFlightUnit> {
        let mut listed: Vec<InFlightUnit> = self
            .inner
            .lock_units()
            .iter()
            .map(|(task_id, entry)| InFlightUnit {
                task_id: task_id.clone(),
                tag: entry.tag.clone(),
                allow_cellular: entry.kind == ContextKind::Default,
            })
            .collect();
        listed.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        listed
    }
}

/// Unit with an assigned id, ready to launch.
pub struct PreparedUnit {
    session: TransportSession,
    plan: UnitPlan,
}

impl PreparedUnit {
    /// Identifier the unit will report under.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.plan.task_id
    }

    /// Context the unit will run in.
    #[must_use]
    pub const fn context(&self) -> ContextKind {
        self.plan.kind
    }

    /// Start the unit on the runtime. Must be called from within a Tokio runtime.
    pub fn launch(self) -> JoinHandle<()> {
        let Self { session, plan } = self;
        let token = CancellationToken::new();
        session.inner.lock_units().insert(
            plan.task_id.clone(),
            UnitEntry {
                token: token.clone(),
                tag: plan.request.tag.clone(),
                kind: plan.kind,
            },
        );
        debug!(
            task_id = %plan.task_id,
            context = plan.kind.label(),
            url = %plan.request.url,
            "upload unit launched"
        );
        tokio::spawn(run_unit(session.inner, plan, token))
    }
}

impl SessionInner {
    const fn context(&self, kind: ContextKind) -> &TransportContext {
        match kind {
            ContextKind::Default => &self.default,
            ContextKind::Constrained => &self.constrained,
        }
    }

    fn lock_units(&self) -> MutexGuard<'_, HashMap<TaskId, UnitEntry>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn host_slot(&self, url: &Url) -> Arc<Semaphore> {
        Arc::clone(
            self.lock_hosts()
                .entry(host_key(url))
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host))),
        )
    }

    /// Forget a host's semaphore once no unit holds it.
    fn release_host(&self, url: &Url) {
        let mut hosts = self.lock_hosts();
        let key = host_key(url);
        if hosts
            .get(&key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            hosts.remove(&key);
        }
    }

    fn lock_hosts(&self) -> MutexGuard<'_, HashMap<String, Arc<Semaphore>>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait_for_unmetered(&self, task_id: &TaskId) {
        let mut announced = false;
        while self.monitor.is_metered() {
            if !announced {
                info!(task_id = %task_id, "waiting for unmetered connectivity");
                announced = true;
            }
            tokio::time::sleep(self.connectivity_poll).await;
        }
    }
}

async fn run_unit(inner: Arc<SessionInner>, plan: UnitPlan, token: CancellationToken) {
    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => TransportOutcome::Canceled,
        outcome = execute(&inner, &plan, &token) => outcome,
    };
    inner.lock_units().remove(&plan.task_id);
    inner.release_host(&plan.request.url);

    match &outcome {
        TransportOutcome::Response { status, .. } => {
            debug!(task_id = %plan.task_id, status, "upload unit finished");
        }
        TransportOutcome::Error { message, .. } => {
            info!(task_id = %plan.task_id, error = %message, "upload unit failed");
        }
        TransportOutcome::Canceled => {
            debug!(task_id = %plan.task_id, "upload unit canceled");
        }
    }

    let UnitPlan {
        task_id, request, ..
    } = plan;
    inner.dispatcher.send(TransportEvent::Finished {
        task_id,
        outcome,
        body: request.body,
    });
}

async fn execute(
    inner: &SessionInner,
    plan: &UnitPlan,
    token: &CancellationToken,
) -> TransportOutcome {
    if plan.kind == ContextKind::Constrained {
        inner.wait_for_unmetered(&plan.task_id).await;
    }

    let host = inner.host_slot(&plan.request.url);
    let Ok(_host_permit) = host.acquire_owned().await else {
        return session_closed();
    };
    let Ok(_active_permit) = Arc::clone(&inner.active).acquire_owned().await else {
        return session_closed();
    };

    let client = &inner.context(plan.kind).client;
    match plan.request.mode {
        TransferMode::Stream => stream_body(&inner.dispatcher, client, plan).await,
        TransferMode::Blocks { block_size } => {
            blocks::upload(&inner.dispatcher, client, plan, block_size, token).await
        }
    }
}

async fn stream_body(
    dispatcher: &CallbackDispatcher,
    client: &Client,
    plan: &UnitPlan,
) -> TransportOutcome {
    let file = match File::open(&plan.request.body.path).await {
        Ok(file) => file,
        Err(err) => return TransportOutcome::from_error(&err),
    };
    let total = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(err) => return TransportOutcome::from_error(&err),
    };
    dispatcher.send(TransportEvent::BytesSent {
        task_id: plan.task_id.clone(),
        sent: 0,
        expected: total,
    });

    let progress = dispatcher.clone();
    let task_id = plan.task_id.clone();
    let mut sent = 0_u64;
    let stream = ReaderStream::new(file).inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            sent = sent.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
            progress.send(TransportEvent::BytesSent {
                task_id: task_id.clone(),
                sent,
                expected: total,
            });
        }
    });

    let request = request_for(client, plan)
        .header(CONTENT_LENGTH, total)
        .body(Body::wrap_stream(stream));
    send_and_forward(dispatcher, &plan.task_id, request).await
}

pub(crate) fn request_for(client: &Client, plan: &UnitPlan) -> RequestBuilder {
    client
        .request(method_for(plan.request.method), plan.request.url.clone())
        .headers(plan.headers.clone())
}

pub(crate) async fn send_and_forward(
    dispatcher: &CallbackDispatcher,
    task_id: &TaskId,
    request: RequestBuilder,
) -> TransportOutcome {
    match request.send().await {
        Ok(response) => forward_response(dispatcher, task_id, response).await,
        Err(err) => TransportOutcome::from_error(&err),
    }
}

pub(crate) async fn forward_response(
    dispatcher: &CallbackDispatcher,
    task_id: &TaskId,
    response: Response,
) -> TransportOutcome {
    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) if chunk.is_empty() => {}
            Ok(chunk) => dispatcher.send(TransportEvent::DataReceived {
                task_id: task_id.clone(),
                chunk,
            }),
            Err(err) => return TransportOutcome::from_error(&err),
        }
    }
    TransportOutcome::Response { status, headers }
}

const fn method_for(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
    }
}

fn build_client(options: &SessionOptions, kind: ContextKind) -> TransportResult<Client> {
    Client::builder()
        .timeout(options.timeout)
        .pool_max_idle_per_host(options.max_connections_per_host)
        .build()
        .map_err(|source| TransportError::ClientBuild {
            context: kind.label(),
            source,
        })
}

fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

fn session_closed() -> TransportOutcome {
    TransportOutcome::Error {
        message: "transport session closed".to_string(),
        details: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticConnectivity;

    #[test]
    fn allow_cellular_selects_context() {
        assert_eq!(ContextKind::for_allow_cellular(true), ContextKind::Default);
        assert_eq!(
            ContextKind::for_allow_cellular(false),
            ContextKind::Constrained
        );
    }

    #[test]
    fn zero_caps_and_shared_identifiers_are_rejected() {
        let monitor = Arc::new(StaticConnectivity::default());
        let options = SessionOptions {
            max_concurrent_uploads: 0,
            ..SessionOptions::default()
        };
        assert!(matches!(
            TransportSession::new(&options, monitor.clone()),
            Err(TransportError::InvalidOptions {
                field: "max_concurrent_uploads"
            })
        ));

        let options = SessionOptions {
            constrained_identifier: SessionOptions::default().default_identifier,
            ..SessionOptions::default()
        };
        assert!(matches!(
            TransportSession::new(&options, monitor),
            Err(TransportError::InvalidOptions { .. })
        ));
    }

    #[test]
    fn idle_host_slots_are_released() -> Result<(), Box<dyn std::error::Error>> {
        let monitor = Arc::new(StaticConnectivity::default());
        let (session, _workers) = TransportSession::new(&SessionOptions::default(), monitor)?;
        let inner = &session.inner;
        let first = Url::parse("http://uploads.example:8080/a")?;
        let other = Url::parse("http://uploads.example:9090/b")?;

        let held = inner.host_slot(&first);
        let idle = inner.host_slot(&other);
        assert_eq!(inner.lock_hosts().len(), 2);
        drop(idle);

        inner.release_host(&first);
        inner.release_host(&other);
        assert_eq!(inner.lock_hosts().len(), 1);
        assert!(inner.lock_hosts().contains_key("uploads.example:8080"));

        drop(held);
        inner.release_host(&first);
        assert!(inner.lock_hosts().is_empty());
        Ok(())
    }

    #[test]
    fn methods_map_to_reqwest() {
        assert_eq!(method_for(HttpMethod::Patch), Method::PATCH);
        assert_eq!(method_for(HttpMethod::Put), Method::PUT);
    }
}
