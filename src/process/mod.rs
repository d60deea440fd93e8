//! =============================================================================
//! Backend Process Management
//! =============================================================================
//!
//! Spawns the completion-server child process, speaks the `Content-Length`
//! framed JSON protocol over its stdio, and correlates responses with waiting
//! callers through a pending map fed by a dedicated reader thread.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::provider::DirectoryInstallation;
use crate::rpc::{BackendLauncher, BackendRequest, LaunchEvents, Transport, TransportError};

/// Upper bound on any single request round-trip. A wedged backend surfaces as
/// a transport failure instead of hanging the editor thread forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingMap = Arc<Mutex<HashMap<u64, Sender<Value>>>>;

/// An owned backend server instance. Exactly one exists per live handle; the
/// lifecycle manager replaces it wholesale on restart.
pub struct BackendProcess {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    wire_seq: AtomicU64,
    alive: Arc<AtomicBool>,
    // Isolated working directory for the child's runtime artifacts; removed
    // when the process object is dropped.
    _workdir: TempDir,
}

impl BackendProcess {
    /// Spawns the child and starts the reader thread. `events.on_ready` fires
    /// once the backend emits its `ready` notification; `events.on_exit`
    /// fires exactly once when the connection dies for any reason.
    pub fn spawn(
        executable: &Path,
        args: &[String],
        runtime_root: &Path,
        events: LaunchEvents,
    ) -> Result<Arc<Self>, ProcessError> {
        let workdir = TempDir::new_in(runtime_root)
            .or_else(|_| TempDir::new())
            .map_err(ProcessError::CreateRuntimeDir)?;

        let mut child = Command::new(executable)
            .args(args)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ProcessError::Spawn)?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingStdout)?;
        let stdin = child.stdin.take().ok_or(ProcessError::MissingStdin)?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        spawn_reader(stdout, Arc::clone(&pending), Arc::clone(&alive), events);

        Ok(Arc::new(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            wire_seq: AtomicU64::new(0),
            alive,
            _workdir: workdir,
        }))
    }

    fn write_payload(&self, payload: &Value) -> Result<(), ProcessError> {
        let body = serde_json::to_string(payload).map_err(ProcessError::Serialize)?;
        log::trace!("backend <= {body}");
        let mut stdin = lock(&self.stdin);
        write!(stdin, "Content-Length: {}\r\n\r\n", body.len()).map_err(ProcessError::Write)?;
        stdin.write_all(body.as_bytes()).map_err(ProcessError::Write)?;
        stdin.flush().map_err(ProcessError::Write)
    }

    fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = lock(&self.child);
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Transport for BackendProcess {
    fn request(&self, request: &BackendRequest) -> Result<Value, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let params = request.params()?;
        let id = self.wire_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = bounded(1);
        lock(&self.pending).insert(id, tx);

        let payload = json!({ "id": id, "method": request.method(), "params": params });
        if let Err(err) = self.write_payload(&payload) {
            lock(&self.pending).remove(&id);
            return Err(err.into());
        }

        match rx.recv_timeout(REQUEST_TIMEOUT) {
            Ok(message) => {
                if let Some(error) = message.get("error") {
                    let text = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown backend error");
                    return Err(TransportError::Backend(text.to_string()));
                }
                Ok(message.get("result").cloned().unwrap_or(Value::Null))
            }
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.pending).remove(&id);
                Err(TransportError::Timeout)
            }
            // Reader thread dropped the pending map: connection is gone.
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn notify(&self, request: &BackendRequest) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let payload = json!({ "method": request.method(), "params": request.params()? });
        self.write_payload(&payload).map_err(Into::into)
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for BackendProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Launches the managed server installation. Resolves the executable at
/// launch time, so an installation that appeared after a failed attempt is
/// picked up without reconstructing the service.
pub struct InstalledServerLauncher {
    installation: Arc<DirectoryInstallation>,
    args: Vec<String>,
    runtime_root: PathBuf,
}

impl InstalledServerLauncher {
    pub fn new(
        installation: Arc<DirectoryInstallation>,
        args: Vec<String>,
        runtime_root: PathBuf,
    ) -> Self {
        Self {
            installation,
            args,
            runtime_root,
        }
    }
}

impl BackendLauncher for InstalledServerLauncher {
    fn launch(&self, events: LaunchEvents) -> Result<Arc<dyn Transport>, ProcessError> {
        let executable = self
            .installation
            .resolve_executable()
            .ok_or(ProcessError::ExecutableMissing)?;
        let process = BackendProcess::spawn(&executable, &self.args, &self.runtime_root, events)?;
        Ok(process)
    }
}

fn spawn_reader(
    stdout: ChildStdout,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    events: LaunchEvents,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let LaunchEvents { on_ready, on_exit } = events;
        let mut on_ready = Some(on_ready);
        let mut reader = BufReader::new(stdout);
        loop {
            match read_frame(&mut reader) {
                Ok(message) => {
                    log::trace!("backend => {message}");
                    if let Some(id) = message.get("id").and_then(Value::as_u64) {
                        match lock(&pending).remove(&id) {
                            Some(sender) => {
                                let _ = sender.send(message);
                            }
                            None => log::debug!("dropping response for unknown request {id}"),
                        }
                    } else if message.get("method").and_then(Value::as_str) == Some("ready") {
                        if let Some(callback) = on_ready.take() {
                            callback();
                        }
                    } else {
                        log::debug!("ignoring backend notification: {message}");
                    }
                }
                Err(ProcessError::Eof) | Err(ProcessError::Read(_)) => break,
                Err(err) => {
                    log::warn!("skipping malformed backend frame: {err}");
                    continue;
                }
            }
        }
        alive.store(false, Ordering::SeqCst);
        // Dropping the pending senders unblocks every waiting caller.
        lock(&pending).clear();
        on_exit();
    })
}

fn read_frame<T: Read>(reader: &mut BufReader<T>) -> Result<Value, ProcessError> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).map_err(ProcessError::Read)?;
        if bytes == 0 {
            return Err(ProcessError::Eof);
        }
        let line = line.trim_end();
        if line.is_empty() {
            let Some(len) = content_length else {
                continue;
            };
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(ProcessError::Read)?;
            return serde_json::from_slice(&body).map_err(ProcessError::Deserialize);
        }
        let lowered = line.to_ascii_lowercase();
        if let Some(rest) = lowered.strip_prefix("content-length:") {
            content_length = Some(rest.trim().parse().map_err(|_| ProcessError::InvalidHeader)?);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("completion server executable not found")]
    ExecutableMissing,
    #[error("failed to spawn completion server: {0}")]
    Spawn(std::io::Error),
    #[error("failed to create runtime working directory: {0}")]
    CreateRuntimeDir(std::io::Error),
    #[error("server stdout missing (stdio must be piped)")]
    MissingStdout,
    #[error("server stdin missing (stdio must be piped)")]
    MissingStdin,
    #[error("failed to serialize payload: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write to server stdin: {0}")]
    Write(std::io::Error),
    #[error("io error while reading server stdout: {0}")]
    Read(std::io::Error),
    #[error("failed to parse frame body: {0}")]
    Deserialize(serde_json::Error),
    #[error("unexpected EOF while reading server output")]
    Eof,
    #[error("invalid Content-Length header")]
    InvalidHeader,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[test]
    fn read_frame_parses_content_length_body() {
        let bytes = frame(r#"{"id":1,"result":{"completions":[]}}"#);
        let mut reader = BufReader::new(bytes.as_slice());
        let message = read_frame(&mut reader).unwrap();
        assert_eq!(message["id"], 1);
    }

    #[test]
    fn read_frame_skips_unknown_headers() {
        let mut bytes = b"X-Backend-Hint: warm\r\n".to_vec();
        bytes.extend(frame(r#"{"method":"ready"}"#));
        let mut reader = BufReader::new(bytes.as_slice());
        let message = read_frame(&mut reader).unwrap();
        assert_eq!(message["method"], "ready");
    }

    #[test]
    fn read_frame_reports_eof() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(matches!(read_frame(&mut reader), Err(ProcessError::Eof)));
    }

    #[test]
    fn read_frame_rejects_bad_length() {
        let mut reader = BufReader::new(&b"Content-Length: nope\r\n\r\n"[..]);
        assert!(matches!(
            read_frame(&mut reader),
            Err(ProcessError::InvalidHeader)
        ));
    }
}
