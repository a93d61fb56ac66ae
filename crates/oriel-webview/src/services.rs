//! Collaborator interfaces consumed by the webview core.
//!
//! File/network IO, tunnel resolution, window lookup, and the session
//! partition are owned by other subsystems; the core only talks to them
//! through these traits, injected at [`crate::WebviewManager`] construction.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::metadata::RemoteConnectionData;

/// Reads local resources on behalf of the protocol provider.
#[async_trait]
pub trait FileService: Send + Sync {
    async fn read(&self, uri: &Url) -> io::Result<Vec<u8>>;
}

/// Content fetched over the network, with the mime type the remote reported.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

/// Executes http(s) fetches on behalf of the protocol provider.
#[async_trait]
pub trait RequestService: Send + Sync {
    async fn fetch(&self, uri: &Url) -> io::Result<FetchedContent>;
}

/// Local endpoint of an opened tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelAddress {
    pub host: String,
    pub port: u16,
}

/// Opens network paths to a remote authority for mapped ports.
#[async_trait]
pub trait TunnelService: Send + Sync {
    async fn open_tunnel(
        &self,
        remote: &RemoteConnectionData,
        remote_port: u16,
    ) -> io::Result<TunnelAddress>;
}

/// The renderable unit behind a webview. Can be destroyed independently of
/// the webview's logical registration.
pub trait ContentSurface: Send + Sync {
    fn is_destroyed(&self) -> bool;
    fn set_ignore_menu_shortcuts(&self, enabled: bool);
}

/// A live application window.
pub trait WindowHandle: Send + Sync {
    /// The window's primary content surface, if it still has one.
    fn content_surface(&self) -> Option<Arc<dyn ContentSurface>>;
}

/// Lookup of application windows by id.
pub trait WindowRegistry: Send + Sync {
    fn window(&self, window_id: u32) -> Option<Arc<dyn WindowHandle>>;
}

/// Direct lookup of content surfaces by id.
pub trait SurfaceRegistry: Send + Sync {
    fn surface(&self, surface_id: u32) -> Option<Arc<dyn ContentSurface>>;
}

/// Decides a permission request by name.
pub type PermissionHandler = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// The session partition all webviews share. The manager installs the
/// process-wide permission policy here exactly once, at construction.
pub trait WebviewSession: Send + Sync {
    fn set_permission_request_handler(&self, handler: PermissionHandler);
    fn set_permission_check_handler(&self, handler: PermissionHandler);
}
