//! =============================================================================
//! Shared Types
//! =============================================================================
//!
//! Plain data carried across module boundaries: cursor coordinates, editor
//! formatting options, and the suggestion objects handed back to the editor.
//! Wire-only request/response shapes live in `rpc` instead.

use serde::{Deserialize, Serialize};

/// Zero-based cursor coordinates, mirroring what editors report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Replacement span a suggestion applies to (start/end positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Formatting preferences forwarded with every completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorOptions {
    pub tab_size: u32,
    pub indent_size: u32,
    pub insert_spaces: bool,
}

/// A normalized completion produced from one backend response item. Never
/// mutated after construction; the editor keeps it around only to hand the id
/// back through `notify_accepted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSuggestion {
    /// Backend-assigned completion id.
    pub id: String,
    /// Replacement text.
    pub text: String,
    /// Cursor position the completion was requested at.
    pub position: Position,
    /// Span of existing text the suggestion replaces.
    pub range: Range,
}
