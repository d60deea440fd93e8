//! =============================================================================
//! Installation Provider
//! =============================================================================
//!
//! Responsible for answering "is the completion server installed, and which
//! version?" before every lazy start, and for the credential seam the metadata
//! builder reads. The default implementation inspects the support directory
//! first and falls back to PATH, keeping the search order deterministic and
//! testable.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::compare_versions;

/// Result of one installation query. Checked fresh on every start attempt,
/// never cached across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationState {
    Installed { version: String },
    Outdated { version: String, min_required: String },
    NotInstalled,
}

/// Installation/version check consumed by the process lifecycle manager.
pub trait InstallationCheck: Send + Sync {
    fn query(&self) -> InstallationState;
}

/// Opaque API-key provider. Absence of a key is a hard error for any request
/// that carries metadata.
pub trait CredentialStore: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Locates the server executable under `<support>/bin/<name>`, falling back
/// to PATH. The installed version is read from a `VERSION` file next to the
/// resolved executable.
#[derive(Debug, Clone)]
pub struct DirectoryInstallation {
    bin_dir: PathBuf,
    executable: String,
    min_version: String,
}

impl DirectoryInstallation {
    pub fn new(
        bin_dir: impl Into<PathBuf>,
        executable: impl Into<String>,
        min_version: impl Into<String>,
    ) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            executable: executable.into(),
            min_version: min_version.into(),
        }
    }

    /// Resolves the executable path, preferring the managed install over PATH.
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        let managed = self.bin_dir.join(&self.executable);
        if managed.is_file() {
            return Some(managed);
        }
        match which::which(&self.executable) {
            Ok(path) => Some(path),
            Err(which::Error::CannotFindBinaryPath) => None,
            Err(err) => {
                log::warn!("PATH lookup for {} failed: {err}", self.executable);
                None
            }
        }
    }
}

impl InstallationCheck for DirectoryInstallation {
    fn query(&self) -> InstallationState {
        let Some(executable) = self.resolve_executable() else {
            return InstallationState::NotInstalled;
        };

        let Some(version) = read_sibling_version(&executable) else {
            // Dev builds ship without a VERSION file; treat them as present
            // and let the backend reject itself if it is genuinely too old.
            return InstallationState::Installed {
                version: "0.0.0".to_string(),
            };
        };

        if compare_versions(&version, &self.min_version).is_lt() {
            InstallationState::Outdated {
                version,
                min_required: self.min_version.clone(),
            }
        } else {
            InstallationState::Installed { version }
        }
    }
}

fn read_sibling_version(executable: &Path) -> Option<String> {
    let version_file = executable.parent()?.join("VERSION");
    let contents = fs::read_to_string(version_file).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn install(dir: &Path, version: Option<&str>) -> DirectoryInstallation {
        File::create(dir.join("suggestd")).unwrap();
        if let Some(version) = version {
            let mut file = File::create(dir.join("VERSION")).unwrap();
            writeln!(file, "{version}").unwrap();
        }
        DirectoryInstallation::new(dir, "suggestd", "1.4.0")
    }

    #[test]
    fn missing_executable_reports_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let check = DirectoryInstallation::new(dir.path(), "definitely-absent-server", "1.0.0");
        assert_eq!(check.query(), InstallationState::NotInstalled);
    }

    #[test]
    fn old_version_reports_outdated_with_requirement() {
        let dir = tempfile::tempdir().unwrap();
        let check = install(dir.path(), Some("1.2.9"));
        assert_eq!(
            check.query(),
            InstallationState::Outdated {
                version: "1.2.9".to_string(),
                min_required: "1.4.0".to_string(),
            }
        );
    }

    #[test]
    fn current_version_reports_installed() {
        let dir = tempfile::tempdir().unwrap();
        let check = install(dir.path(), Some("1.4.0"));
        assert_eq!(
            check.query(),
            InstallationState::Installed {
                version: "1.4.0".to_string(),
            }
        );
    }

    #[test]
    fn unreadable_version_still_counts_as_installed() {
        let dir = tempfile::tempdir().unwrap();
        let check = install(dir.path(), None);
        assert_eq!(
            check.query(),
            InstallationState::Installed {
                version: "0.0.0".to_string(),
            }
        );
    }
}
