//! Webview hosting core for Oriel windows.
//!
//! Coordinates the lifecycle of embedded web-content surfaces:
//! - Registration table for webview identity and security metadata
//! - Custom-protocol resource loading scoped to per-webview resource roots
//! - Logical port mapping, with tunnel resolution for remote targets
//! - Fixed permission policy on the shared webview session partition
//!
//! Window creation, file/network IO, and tunnel plumbing live elsewhere and
//! are consumed through the traits in [`services`].

pub mod manager;
pub mod metadata;
pub mod permissions;
pub mod port_mapping;
pub mod protocol;
pub mod services;

pub use manager::{ShortcutTarget, WebviewManager};
pub use metadata::{
    MetadataDelta, PortMapping, RegistrationDelta, RegistrationMetadata, RemoteConnectionData,
    WebviewRegistration,
};
pub use permissions::{permission_allowed, WEBVIEW_PARTITION_ID};
pub use port_mapping::WebviewPortMappingProvider;
pub use protocol::{ResourceResponse, ResponseDetails, WebviewProtocolProvider};
