//! Core type definitions for PortLink.
//!
//! This crate defines the fundamental, backend-agnostic types used throughout
//! the middleware:
//! - Module and port identifiers (UUID v7)
//! - Element paths and immutable data-element snapshots
//! - The rights bitmask gating privileged operations and event delivery
//! - The general event model and its coalescing subject keys
//!
//! All backend-specific types (cloud adapters, WebDAV clients, UI models)
//! belong in their respective modules, not here.

mod element;
mod event;
mod ids;
mod path;
mod rights;

pub use element::{DataElement, ElementKind};
pub use event::{
    ElementEventType, EventKind, EventSubject, GeneralEvent, LogLevel, ProviderStateFlags,
    SystemStateKind, TopologyChange,
};
pub use ids::{ModuleId, PortId, SubscriberId};
pub use path::{ElementPath, PathError, MAX_PATH_DEPTH};
pub use rights::Rights;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
}
