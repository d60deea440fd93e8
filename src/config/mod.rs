//! =============================================================================
//! Configuration And Settings
//! =============================================================================
//!
//! Owns every knob the embedding editor sets once at startup: its own
//! identity, the project root used for relative paths, where the completion
//! server is installed, and the liveness cadence.

use std::path::PathBuf;
use std::time::Duration;

/// How often the background liveness signal fires once the backend is up.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Executable name the installation check looks for when none is configured.
pub const DEFAULT_SERVER_EXECUTABLE: &str = "suggestd";

/// Settings evaluated once when the service is constructed.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Editor identity reported in request metadata (e.g. `"neovim"`).
    pub editor_name: String,
    /// Editor version as reported by the host; normalized before use.
    pub editor_version: String,
    /// Root every open file is made relative to.
    pub project_root: PathBuf,
    /// Directory holding the server installation (`bin/`) and runtime
    /// artifacts (`runtime/`, `logs/`).
    pub support_dir: PathBuf,
    /// Name of the server executable inside `support_dir/bin` or on PATH.
    pub server_executable: String,
    /// Oldest server version the bridge still talks to.
    pub min_server_version: String,
    /// Heartbeat cadence; only tests override this.
    pub heartbeat_interval: Duration,
}

impl ServiceConfig {
    pub fn new(
        editor_name: impl Into<String>,
        editor_version: impl Into<String>,
        project_root: impl Into<PathBuf>,
        support_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            editor_name: editor_name.into(),
            editor_version: editor_version.into(),
            project_root: project_root.into(),
            support_dir: support_dir.into(),
            server_executable: DEFAULT_SERVER_EXECUTABLE.to_string(),
            min_server_version: "1.0.0".to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.support_dir.join("bin")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.support_dir.join("runtime")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.support_dir.join("logs")
    }
}
