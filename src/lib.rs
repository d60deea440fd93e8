//! =============================================================================
//! Crate Entry Points
//! =============================================================================
//!
//! The bridge sits between an editor and a locally spawned code-completion
//! server. Each concern lives in its own module: configuration, installation
//! discovery, process management, the typed RPC boundary, open-document
//! tracking, and the user-facing suggestion service that ties them together.

pub mod config;
pub mod documents;
pub mod metadata;
pub mod process;
pub mod provider;
pub mod rpc;
pub mod service;
pub mod types;
pub mod utils;

pub use service::{ServiceError, SuggestionService};
