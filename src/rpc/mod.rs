//! =============================================================================
//! RPC Boundary
//! =============================================================================
//!
//! Typed request/response bodies for the backend protocol and the transport
//! seam the rest of the crate talks through. The live implementation is the
//! spawned child process in `process`; tests substitute in-memory fakes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::Metadata;
use crate::process::ProcessError;
use crate::types::{EditorOptions, Position};

/// One document as the backend sees it. The completion target carries the
/// cursor; context documents do not.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub path: String,
    pub relative_path: String,
    pub text: String,
    pub language_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatParams {
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCompletionParams {
    pub document: DocumentPayload,
    pub options: EditorOptions,
    pub other_documents: Vec<DocumentPayload>,
    pub metadata: Metadata,
}

/// Advisory cancellation notice; the backend is free to ignore it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequestParams {
    pub request_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCompletionParams {
    pub completion_id: String,
    pub metadata: Metadata,
}

/// Every request the bridge can put on the wire.
#[derive(Debug, Clone)]
pub enum BackendRequest {
    Heartbeat(HeartbeatParams),
    GetCompletion(GetCompletionParams),
    CancelRequest(CancelRequestParams),
    AcceptCompletion(AcceptCompletionParams),
}

impl BackendRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Heartbeat(_) => "heartbeat",
            Self::GetCompletion(_) => "getCompletions",
            Self::CancelRequest(_) => "cancelRequest",
            Self::AcceptCompletion(_) => "acceptCompletion",
        }
    }

    pub fn params(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Heartbeat(body) => serde_json::to_value(body),
            Self::GetCompletion(body) => serde_json::to_value(body),
            Self::CancelRequest(body) => serde_json::to_value(body),
            Self::AcceptCompletion(body) => serde_json::to_value(body),
        }
    }
}

/// Wire shape of a `getCompletions` result. Everything is defaulted so a
/// backend that omits fields (or whole items' ranges) still parses; missing
/// coordinates become 0 rather than an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionResponseBody {
    pub completions: Vec<CompletionEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionEntry {
    pub id: String,
    pub text: String,
    pub range: WireRange,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct WireRange {
    pub start: WirePosition,
    pub end: WirePosition,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct WirePosition {
    pub line: u32,
    pub character: u32,
}

/// Async request/response channel to the backend. `request` blocks the caller
/// until the response arrives (or the transport gives up); `notify` is
/// fire-and-forget.
pub trait Transport: Send + Sync {
    fn request(&self, request: &BackendRequest) -> Result<Value, TransportError>;

    fn notify(&self, request: &BackendRequest) -> Result<(), TransportError>;

    /// Tears the connection down. Live transports kill the child process;
    /// in-memory fakes need nothing.
    fn close(&self) {}
}

/// Callbacks the lifecycle manager wires into a launch. `on_ready` fires once
/// the backend signals readiness, `on_exit` once the connection is gone for
/// any reason.
pub struct LaunchEvents {
    pub on_ready: Box<dyn FnOnce() + Send>,
    pub on_exit: Box<dyn FnOnce() + Send>,
}

/// Produces a live transport. The lifecycle manager owns exactly one at a
/// time and goes through this seam so tests never spawn real processes.
pub trait BackendLauncher: Send + Sync {
    fn launch(&self, events: LaunchEvents) -> Result<Arc<dyn Transport>, ProcessError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("backend connection is closed")]
    Closed,
    #[error("timed out waiting for backend response")]
    Timeout,
    #[error("backend rejected request: {0}")]
    Backend(String),
    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to parse backend response: {0}")]
    Deserialize(serde_json::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_response_defaults_missing_fields() {
        let body: CompletionResponseBody = serde_json::from_value(json!({
            "completions": [
                { "id": "c-1", "text": "foo" },
                { "id": "c-2", "text": "bar", "range": { "start": { "line": 2 } } },
            ]
        }))
        .unwrap();

        assert_eq!(body.completions.len(), 2);
        let first = body.completions[0].range;
        assert_eq!((first.start.line, first.start.character), (0, 0));
        assert_eq!((first.end.line, first.end.character), (0, 0));
        let second = body.completions[1].range;
        assert_eq!(second.start.line, 2);
        assert_eq!(second.start.character, 0);
    }

    #[test]
    fn empty_response_parses_to_no_completions() {
        let body: CompletionResponseBody = serde_json::from_value(json!({})).unwrap();
        assert!(body.completions.is_empty());
    }

    #[test]
    fn document_payload_omits_absent_cursor() {
        let payload = DocumentPayload {
            path: "/p/a.rs".to_string(),
            relative_path: "a.rs".to_string(),
            text: "fn main() {}".to_string(),
            language_id: "rust".to_string(),
            position: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("position").is_none());
        assert_eq!(value["relativePath"], json!("a.rs"));
        assert_eq!(value["languageId"], json!("rust"));
    }
}
