//! =============================================================================
//! Request Metadata
//! =============================================================================
//!
//! Every request the bridge sends carries an envelope identifying the editor,
//! the session, and the credential. The session id is generated once per
//! process; the request id comes from the process-wide counter owned here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::provider::CredentialStore;
use crate::utils::normalize_version;

/// Per-request envelope. Built fresh for every call; never reused.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub ide_name: String,
    pub ide_version: String,
    pub bridge_version: String,
    pub api_key: String,
    pub session_id: String,
    pub request_id: u64,
}

/// Process-wide monotonic request id counter.
///
/// Resets to zero when the backend terminates, so a restarted backend sees
/// request ids starting fresh. That means id 0 may be reused after a restart;
/// the backend protocol scopes ids to one connection, so this is intentional.
#[derive(Debug, Default)]
pub struct RequestCounter {
    request: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next request id. Ids start at 0 and strictly increase until
    /// the next backend termination.
    pub fn next_request_id(&self) -> u64 {
        self.request.fetch_add(1, Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.request.store(0, Ordering::SeqCst);
    }
}

/// Builds [`Metadata`] envelopes. The credential is looked up on every build
/// so a key revoked mid-session stops the bridge at the next request.
pub struct MetadataFactory {
    ide_name: String,
    ide_version: String,
    bridge_version: String,
    session_id: String,
    credentials: Arc<dyn CredentialStore>,
}

impl MetadataFactory {
    pub fn new(config: &ServiceConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            ide_name: config.editor_name.clone(),
            ide_version: normalize_version(&config.editor_version),
            bridge_version: env!("CARGO_PKG_VERSION").to_string(),
            session_id: Uuid::new_v4().to_string(),
            credentials,
        }
    }

    /// Whether a credential is currently available.
    pub fn signed_in(&self) -> bool {
        self.credentials.api_key().is_some()
    }

    /// Builds the envelope for one request. `None` when no API key is
    /// available; callers surface that as a not-signed-in error.
    pub fn build(&self, request_id: u64) -> Option<Metadata> {
        let api_key = self.credentials.api_key()?;
        Some(Metadata {
            ide_name: self.ide_name.clone(),
            ide_version: self.ide_version.clone(),
            bridge_version: self.bridge_version.clone(),
            api_key,
            session_id: self.session_id.clone(),
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct FixedKey(Option<&'static str>);

    impl CredentialStore for FixedKey {
        fn api_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig::new(
            "testeditor",
            "15.2",
            PathBuf::from("/project"),
            PathBuf::from("/support"),
        )
    }

    #[test]
    fn request_ids_are_monotonic_until_reset() {
        let counter = RequestCounter::new();
        assert_eq!(counter.next_request_id(), 0);
        assert_eq!(counter.next_request_id(), 1);
        assert_eq!(counter.next_request_id(), 2);
        counter.reset();
        assert_eq!(counter.next_request_id(), 0);
    }

    #[test]
    fn metadata_normalizes_ide_version_and_keeps_session_stable() {
        let factory = MetadataFactory::new(&config(), Arc::new(FixedKey(Some("key-123"))));
        let first = factory.build(0).unwrap();
        let second = factory.build(1).unwrap();
        assert_eq!(first.ide_version, "15.2.0");
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.request_id, 1);
        assert_eq!(first.api_key, "key-123");
    }

    #[test]
    fn missing_credential_yields_no_metadata() {
        let factory = MetadataFactory::new(&config(), Arc::new(FixedKey(None)));
        assert!(!factory.signed_in());
        assert!(factory.build(0).is_none());
    }
}
