//! =============================================================================
//! Suggestion Service
//! =============================================================================
//!
//! The user-facing orchestration layer. [`ServerManager`] owns the backend
//! process lifecycle (lazy start, heartbeat, restart bookkeeping);
//! [`SuggestionService`] builds completion requests, supersedes stale ones,
//! and relays document events into the pool.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use url::Url;

use crate::config::ServiceConfig;
use crate::documents::DocumentPool;
use crate::metadata::{MetadataFactory, RequestCounter};
use crate::process::{InstalledServerLauncher, ProcessError};
use crate::provider::{CredentialStore, DirectoryInstallation, InstallationCheck, InstallationState};
use crate::rpc::{
    AcceptCompletionParams, BackendLauncher, BackendRequest, CancelRequestParams,
    CompletionResponseBody, DocumentPayload, GetCompletionParams, HeartbeatParams, LaunchEvents,
    Transport, TransportError,
};
use crate::types::{CodeSuggestion, EditorOptions, Position, Range};
use crate::utils;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("completion server is not installed")]
    NotInstalled,
    #[error("completion server {current} is older than required {min_required}")]
    Outdated { current: String, min_required: String },
    #[error("completion server is still starting up")]
    ServiceInstalling,
    #[error("not signed in: no API key available")]
    NotSignedIn,
    /// Control-flow signal for a superseded request, never a user-visible
    /// failure.
    #[error("request superseded by a newer one")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

type LaunchedHook = Box<dyn Fn() + Send + Sync>;

/// Live backend handle. Dropping it closes the heartbeat stop channel, which
/// ends the heartbeat thread.
struct ServerHandle {
    transport: Arc<dyn Transport>,
    _heartbeat_stop: Sender<()>,
    generation: u64,
}

/// Owns the singleton backend handle and its lifecycle:
/// `absent -> starting -> running -> (terminated -> absent)`.
pub struct ServerManager {
    slot: Arc<Mutex<Option<ServerHandle>>>,
    starting: AtomicBool,
    generation: AtomicU64,
    counter: Arc<RequestCounter>,
    metadata: Arc<MetadataFactory>,
    installation: Arc<dyn InstallationCheck>,
    launcher: Arc<dyn BackendLauncher>,
    launched_hook: Arc<Mutex<Option<LaunchedHook>>>,
    last_seen_version: Mutex<Option<String>>,
    heartbeat_interval: Duration,
    support_dirs: Vec<PathBuf>,
}

impl ServerManager {
    pub fn new(
        config: &ServiceConfig,
        installation: Arc<dyn InstallationCheck>,
        launcher: Arc<dyn BackendLauncher>,
        metadata: Arc<MetadataFactory>,
        counter: Arc<RequestCounter>,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            starting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            counter,
            metadata,
            installation,
            launcher,
            launched_hook: Arc::new(Mutex::new(None)),
            last_seen_version: Mutex::new(None),
            heartbeat_interval: config.heartbeat_interval,
            support_dirs: vec![config.bin_dir(), config.runtime_dir(), config.logs_dir()],
        }
    }

    /// Registers the hook invoked every time a backend signals readiness.
    pub fn set_launched_hook(&self, hook: LaunchedHook) {
        *lock(&self.launched_hook) = Some(hook);
    }

    /// Most recent server version reported by the installation check,
    /// including the version of an install that was rejected as outdated.
    pub fn detected_server_version(&self) -> Option<String> {
        lock(&self.last_seen_version).clone()
    }

    /// Returns the live transport, lazily launching the backend if none
    /// exists. Idempotent while a handle is up; a concurrent start attempt
    /// reports the service as still installing rather than racing it.
    pub fn ensure_started(&self) -> Result<Arc<dyn Transport>, ServiceError> {
        if let Some(handle) = lock(&self.slot).as_ref() {
            return Ok(Arc::clone(&handle.transport));
        }
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::ServiceInstalling);
        }
        let result = self.start();
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    /// Transport for best-effort traffic only: never triggers a launch.
    pub fn live_transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.slot)
            .as_ref()
            .map(|handle| Arc::clone(&handle.transport))
    }

    /// Explicitly stops the backend; idempotent if already stopped.
    pub fn terminate(&self) {
        let handle = lock(&self.slot).take();
        if let Some(handle) = handle {
            handle.transport.close();
            self.counter.reset();
            log::debug!("backend terminated on request");
        }
    }

    fn start(&self) -> Result<Arc<dyn Transport>, ServiceError> {
        // Installation state is queried fresh on every attempt; a restart
        // must see an install that appeared or went away in the meantime.
        match self.installation.query() {
            InstallationState::NotInstalled => return Err(ServiceError::NotInstalled),
            InstallationState::Outdated {
                version,
                min_required,
            } => {
                *lock(&self.last_seen_version) = Some(version.clone());
                log::warn!("completion server {version} is older than required {min_required}");
                return Err(ServiceError::Outdated {
                    current: version,
                    min_required,
                });
            }
            InstallationState::Installed { version } => {
                *lock(&self.last_seen_version) = Some(version);
            }
        }

        // Every request carries metadata, and metadata needs a credential;
        // fail before spawning anything.
        if !self.metadata.signed_in() {
            return Err(ServiceError::NotSignedIn);
        }

        self.prepare_support_dirs();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let transport_cell: Arc<OnceLock<Arc<dyn Transport>>> = Arc::new(OnceLock::new());
        let exited = Arc::new(AtomicBool::new(false));

        let on_ready: Box<dyn FnOnce() + Send> = {
            let hook = Arc::clone(&self.launched_hook);
            let cell = Arc::clone(&transport_cell);
            let metadata = Arc::clone(&self.metadata);
            let counter = Arc::clone(&self.counter);
            let interval = self.heartbeat_interval;
            Box::new(move || {
                if let Some(hook) = lock(&hook).as_ref() {
                    hook();
                }
                spawn_heartbeat(stop_rx, cell, metadata, counter, interval);
            })
        };

        let on_exit: Box<dyn FnOnce() + Send> = {
            let slot = Arc::clone(&self.slot);
            let counter = Arc::clone(&self.counter);
            let exited = Arc::clone(&exited);
            Box::new(move || {
                exited.store(true, Ordering::SeqCst);
                let mut slot = lock(&slot);
                // A stale callback from a replaced handle must never clear
                // the current one.
                if slot.as_ref().is_some_and(|h| h.generation == generation) {
                    *slot = None;
                    counter.reset();
                    log::debug!("backend terminated; request counter reset");
                }
            })
        };

        let transport = self.launcher.launch(LaunchEvents { on_ready, on_exit })?;
        let _ = transport_cell.set(Arc::clone(&transport));
        *lock(&self.slot) = Some(ServerHandle {
            transport: Arc::clone(&transport),
            _heartbeat_stop: stop_tx,
            generation,
        });

        // The backend may have died between launch and handle storage; the
        // termination callback saw an empty slot then, so clean up here.
        if exited.load(Ordering::SeqCst) {
            let mut slot = lock(&self.slot);
            if slot.as_ref().is_some_and(|h| h.generation == generation) {
                *slot = None;
            }
            return Err(TransportError::Closed.into());
        }

        Ok(transport)
    }

    fn prepare_support_dirs(&self) {
        for dir in &self.support_dirs {
            if let Err(err) = fs::create_dir_all(dir) {
                log::debug!("could not create support directory {dir:?}: {err}");
            }
        }
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn spawn_heartbeat(
    stop: Receiver<()>,
    transport: Arc<OnceLock<Arc<dyn Transport>>>,
    metadata: Arc<MetadataFactory>,
    counter: Arc<RequestCounter>,
    interval: Duration,
) {
    thread::spawn(move || {
        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(transport) = transport.get() else {
                        continue;
                    };
                    let Some(envelope) = metadata.build(counter.next_request_id()) else {
                        continue;
                    };
                    let beat = BackendRequest::Heartbeat(HeartbeatParams { metadata: envelope });
                    if let Err(err) = transport.request(&beat) {
                        log::warn!("heartbeat failed: {err}");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("heartbeat loop stopped");
    });
}

/// The one completion call currently allowed in flight: its cancellation
/// token and the request id an advisory cancel notice should name.
struct InFlight {
    token: Arc<AtomicBool>,
    request_id: u64,
}

/// Editor-facing entry point: completion requests, document notifications,
/// and lifecycle control.
pub struct SuggestionService {
    project_root: PathBuf,
    documents: DocumentPool,
    manager: ServerManager,
    metadata: Arc<MetadataFactory>,
    counter: Arc<RequestCounter>,
    in_flight: Mutex<Option<InFlight>>,
}

impl SuggestionService {
    pub fn new(
        config: ServiceConfig,
        installation: Arc<dyn InstallationCheck>,
        credentials: Arc<dyn CredentialStore>,
        launcher: Arc<dyn BackendLauncher>,
    ) -> Self {
        let metadata = Arc::new(MetadataFactory::new(&config, credentials));
        let counter = Arc::new(RequestCounter::new());
        let manager = ServerManager::new(
            &config,
            installation,
            launcher,
            Arc::clone(&metadata),
            Arc::clone(&counter),
        );
        Self {
            project_root: config.project_root,
            documents: DocumentPool::new(),
            manager,
            metadata,
            counter,
            in_flight: Mutex::new(None),
        }
    }

    /// Standard wiring: managed installation under the support directory,
    /// spawned with the given extra arguments.
    pub fn with_directory_install(
        config: ServiceConfig,
        credentials: Arc<dyn CredentialStore>,
        server_args: Vec<String>,
    ) -> Self {
        let installation = Arc::new(DirectoryInstallation::new(
            config.bin_dir(),
            config.server_executable.clone(),
            config.min_server_version.clone(),
        ));
        let launcher = Arc::new(InstalledServerLauncher::new(
            Arc::clone(&installation),
            server_args,
            config.runtime_dir(),
        ));
        Self::new(config, installation, credentials, launcher)
    }

    /// Hook invoked every time a backend (re)start signals readiness.
    pub fn on_service_launched(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.manager.set_launched_hook(Box::new(hook));
    }

    pub fn detected_server_version(&self) -> Option<String> {
        self.manager.detected_server_version()
    }

    /// Requests completions for `file` at `cursor`. Initiating a new call
    /// supersedes every outstanding one: superseded callers get
    /// [`ServiceError::Cancelled`], never a stale suggestion list.
    pub fn get_completions(
        &self,
        file: &Url,
        content: &str,
        cursor: Position,
        tab_size: u32,
        indent_size: u32,
        uses_tabs: bool,
    ) -> Result<Vec<CodeSuggestion>, ServiceError> {
        let request_id = self.counter.next_request_id();
        let metadata = self
            .metadata
            .build(request_id)
            .ok_or(ServiceError::NotSignedIn)?;

        // Superseding the previous call and registering this one is a single
        // slot swap under one guard: there is no window where a newer call
        // could miss this one, or this one could outlive a newer one.
        let token = Arc::new(AtomicBool::new(false));
        let superseded = lock(&self.in_flight)
            .replace(InFlight {
                token: Arc::clone(&token),
                request_id,
            })
            .map(|prev| {
                prev.token.store(true, Ordering::SeqCst);
                prev.request_id
            });
        if let Some(id) = superseded {
            self.send_cancel_notice(vec![id]);
        }

        let path = utils::url_to_file_path(file).unwrap_or_else(|| file.to_string());
        let document = DocumentPayload {
            language_id: utils::language_id_for_path(&path).to_string(),
            relative_path: utils::relative_path(&self.project_root, &path),
            text: content.to_string(),
            position: Some(cursor),
            path,
        };
        let other_documents = self
            .documents
            .other_documents(file)
            .into_iter()
            .map(|doc| {
                let path = utils::url_to_file_path(&doc.url).unwrap_or_else(|| doc.url.to_string());
                DocumentPayload {
                    language_id: utils::language_id_for_path(&path).to_string(),
                    relative_path: doc.relative_path,
                    text: doc.content,
                    position: None,
                    path,
                }
            })
            .collect();
        let request = BackendRequest::GetCompletion(GetCompletionParams {
            document,
            options: EditorOptions {
                tab_size,
                indent_size,
                insert_spaces: !uses_tabs,
            },
            other_documents,
            metadata,
        });

        let transport = self.manager.ensure_started()?;
        if token.load(Ordering::SeqCst) {
            return Err(ServiceError::Cancelled);
        }
        let raw = transport.request(&request)?;
        // A newer call may have superseded us while the response was in
        // flight; its result must be discarded, not returned.
        if token.load(Ordering::SeqCst) {
            return Err(ServiceError::Cancelled);
        }

        let body: CompletionResponseBody = if raw.is_null() {
            CompletionResponseBody::default()
        } else {
            serde_json::from_value(raw).map_err(TransportError::Deserialize)?
        };
        Ok(body
            .completions
            .into_iter()
            .map(|entry| CodeSuggestion {
                id: entry.id,
                text: entry.text,
                position: cursor,
                range: Range {
                    start: Position::new(entry.range.start.line, entry.range.start.character),
                    end: Position::new(entry.range.end.line, entry.range.end.character),
                },
            })
            .collect())
    }

    /// Cancels any outstanding completion request without issuing a new one.
    pub fn cancel_request(&self) {
        if let Some(prev) = lock(&self.in_flight).take() {
            prev.token.store(true, Ordering::SeqCst);
            self.send_cancel_notice(vec![prev.request_id]);
        }
    }

    pub fn notify_open_text_document(&self, file: &Url, content: &str) {
        let path = utils::url_to_file_path(file).unwrap_or_else(|| file.to_string());
        let relative = utils::relative_path(&self.project_root, &path);
        self.documents.open(file.clone(), relative, content.to_string());
    }

    pub fn notify_change_text_document(&self, file: &Url, content: &str) {
        let path = utils::url_to_file_path(file).unwrap_or_else(|| file.to_string());
        let relative = utils::relative_path(&self.project_root, &path);
        self.documents
            .update(file.clone(), relative, content.to_string());
    }

    pub fn notify_close_text_document(&self, file: &Url) {
        self.documents.close(file);
    }

    /// Reports an accepted suggestion to the backend. Telemetry-only: wire
    /// failures are swallowed, setup failures still propagate.
    pub fn notify_accepted(&self, suggestion: &CodeSuggestion) -> Result<(), ServiceError> {
        let transport = self.manager.ensure_started()?;
        let envelope = self
            .metadata
            .build(self.counter.next_request_id())
            .ok_or(ServiceError::NotSignedIn)?;
        let notice = BackendRequest::AcceptCompletion(AcceptCompletionParams {
            completion_id: suggestion.id.clone(),
            metadata: envelope,
        });
        if let Err(err) = transport.notify(&notice) {
            log::warn!("accepted-suggestion notice failed: {err}");
        }
        Ok(())
    }

    pub fn terminate(&self) {
        self.manager.terminate();
    }

    /// Sends the advisory cancel notice for superseded completion ids. Sent
    /// outside the in-flight guard, best-effort, and never starts a backend
    /// just to deliver it.
    fn send_cancel_notice(&self, request_ids: Vec<u64>) {
        let Some(transport) = self.manager.live_transport() else {
            return;
        };
        let notice = BackendRequest::CancelRequest(CancelRequestParams { request_ids });
        if let Err(err) = transport.notify(&notice) {
            log::warn!("cancel notice failed: {err}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
