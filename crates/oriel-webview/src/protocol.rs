//! Resource loading for the webview custom protocol.
//!
//! `WebviewProtocolProvider` holds, per webview id, the metadata slice that
//! authorizes resource loads: the owning window, the extension origin, and
//! the local resource roots. A request outside the roots resolves as denied
//! without ever reaching the file/network collaborators. In-root requests
//! are read through the collaborators and correlated by a numeric request
//! id, so a terminal response can also be delivered out-of-band via
//! [`WebviewProtocolProvider::did_load_resource`].

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use oriel_common::WebviewId;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::metadata::{RegistrationDelta, WebviewRegistration};
use crate::services::{FileService, RequestService};

/// Terminal outcome of a resource load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ResourceResponse {
    Success {
        data: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
    AccessDenied,
    NotFound,
    NotModified,
    Timeout,
    Failed,
}

/// Extra information a resolver may attach to a terminal response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// Per-webview slice of the registration the protocol provider needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMetadata {
    pub window_id: u32,
    pub extension_location: Option<Url>,
    pub local_resource_roots: Vec<Url>,
}

struct PendingRequest {
    webview_id: WebviewId,
    tx: oneshot::Sender<ResourceResponse>,
}

struct ProtocolState {
    webviews: HashMap<WebviewId, ResourceMetadata>,
    pending: HashMap<u64, PendingRequest>,
    next_request_id: u64,
}

pub struct WebviewProtocolProvider {
    file_service: Arc<dyn FileService>,
    request_service: Arc<dyn RequestService>,
    state: Mutex<ProtocolState>,
}

impl WebviewProtocolProvider {
    pub fn new(file_service: Arc<dyn FileService>, request_service: Arc<dyn RequestService>) -> Self {
        Self {
            file_service,
            request_service,
            state: Mutex::new(ProtocolState {
                webviews: HashMap::new(),
                pending: HashMap::new(),
                next_request_id: 1,
            }),
        }
    }

    pub fn register_webview(&self, id: &WebviewId, registration: &WebviewRegistration) {
        let mut state = self.state.lock().unwrap();
        state.webviews.insert(
            id.clone(),
            ResourceMetadata {
                window_id: registration.window_id,
                extension_location: registration.extension_location.clone(),
                local_resource_roots: registration.local_resource_roots.clone(),
            },
        );
        debug!(webview_id = %id, "protocol metadata registered");
    }

    /// Remove the webview's metadata. Any request still in flight for this
    /// id resolves as not-found instead of hanging.
    pub fn unregister_webview(&self, id: &WebviewId) {
        let completed = {
            let mut state = self.state.lock().unwrap();
            state.webviews.remove(id);
            let stale: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, req)| req.webview_id == *id)
                .map(|(request_id, _)| *request_id)
                .collect();
            stale
                .into_iter()
                .filter_map(|request_id| state.pending.remove(&request_id))
                .collect::<Vec<_>>()
        };
        for request in completed {
            let _ = request.tx.send(ResourceResponse::NotFound);
        }
        debug!(webview_id = %id, "protocol metadata unregistered");
    }

    pub fn update_webview_metadata(&self, id: &WebviewId, delta: &RegistrationDelta) {
        let mut state = self.state.lock().unwrap();
        if let Some(metadata) = state.webviews.get_mut(id) {
            if let Some(loc) = &delta.extension_location {
                metadata.extension_location = Some(loc.clone());
            }
            if let Some(roots) = &delta.local_resource_roots {
                metadata.local_resource_roots = roots.clone();
            }
        }
    }

    /// The metadata currently held for a webview, if registered.
    pub fn metadata(&self, id: &WebviewId) -> Option<ResourceMetadata> {
        self.state.lock().unwrap().webviews.get(id).cloned()
    }

    /// Resolve a resource request issued by the given webview.
    ///
    /// The URI must fall under one of the webview's registered resource
    /// roots; otherwise the request is denied before any collaborator is
    /// invoked. Allowed requests are keyed by a fresh request id so the
    /// terminal response can arrive through [`Self::did_load_resource`] —
    /// either from the collaborator read below or out-of-band.
    pub async fn load_resource(&self, id: &WebviewId, uri: &Url) -> ResourceResponse {
        let (request_id, rx) = {
            let mut state = self.state.lock().unwrap();
            let Some(metadata) = state.webviews.get(id) else {
                return ResourceResponse::AccessDenied;
            };
            let allowed = metadata
                .local_resource_roots
                .iter()
                .any(|root| is_equal_or_parent(uri, root));
            if !allowed {
                warn!(webview_id = %id, uri = %uri, "resource request outside resource roots");
                return ResourceResponse::AccessDenied;
            }

            let request_id = state.next_request_id;
            state.next_request_id += 1;
            let (tx, rx) = oneshot::channel();
            state.pending.insert(
                request_id,
                PendingRequest {
                    webview_id: id.clone(),
                    tx,
                },
            );
            (request_id, rx)
        };

        let outcome = self.read_resource(uri).await;
        self.did_load_resource(request_id, outcome, None);

        // If the webview was unregistered while the read was in flight, the
        // pending entry has already been completed and the read result was
        // discarded above.
        rx.await.unwrap_or(ResourceResponse::Failed)
    }

    /// Deliver the terminal response for a pending request. A request id
    /// with no pending entry (late result for an unregistered webview, or a
    /// duplicate delivery) is discarded silently.
    pub fn did_load_resource(
        &self,
        request_id: u64,
        response: ResourceResponse,
        details: Option<ResponseDetails>,
    ) {
        let pending = self.state.lock().unwrap().pending.remove(&request_id);
        let Some(request) = pending else {
            debug!(request_id, "stale resource response discarded");
            return;
        };

        let response = match (response, details) {
            (ResourceResponse::Success { data, mime: None }, Some(details)) => {
                ResourceResponse::Success {
                    data,
                    mime: details.mime,
                }
            }
            (response, _) => response,
        };
        let _ = request.tx.send(response);
    }

    async fn read_resource(&self, uri: &Url) -> ResourceResponse {
        match uri.scheme() {
            "file" => match self.file_service.read(uri).await {
                Ok(data) => {
                    let mime = mime_from_extension(uri.path());
                    ResourceResponse::Success {
                        data,
                        mime: Some(mime.to_string()),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => ResourceResponse::NotFound,
                Err(e) => {
                    warn!(uri = %uri, error = %e, "file read failed");
                    ResourceResponse::Failed
                }
            },
            "http" | "https" => match self.request_service.fetch(uri).await {
                Ok(content) => ResourceResponse::Success {
                    data: content.data,
                    mime: content.mime,
                },
                Err(e) => {
                    warn!(uri = %uri, error = %e, "fetch failed");
                    ResourceResponse::Failed
                }
            },
            other => {
                warn!(uri = %uri, scheme = other, "unsupported resource scheme");
                ResourceResponse::Failed
            }
        }
    }
}

/// Whether `uri` equals `root` or lives underneath it. Authority and scheme
/// must match exactly; the path check is segment-aligned, so `file:///a`
/// does not cover `file:///ab`.
fn is_equal_or_parent(uri: &Url, root: &Url) -> bool {
    if uri.scheme() != root.scheme()
        || uri.host_str() != root.host_str()
        || uri.port_or_known_default() != root.port_or_known_default()
    {
        return false;
    }
    let root_path = root.path().trim_end_matches('/');
    if root_path.is_empty() {
        return true;
    }
    let path = uri.path();
    if path == root_path {
        return true;
    }
    path.starts_with(root_path) && path.as_bytes().get(root_path.len()) == Some(&b'/')
}

/// Guess MIME type from file extension.
fn mime_from_extension(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "wasm" => "application/wasm",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RegistrationMetadata;
    use crate::services::FetchedContent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StaticFiles {
        reads: AtomicUsize,
    }

    impl StaticFiles {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FileService for StaticFiles {
        async fn read(&self, uri: &Url) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if uri.path().ends_with("missing.html") {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
            } else {
                Ok(format!("contents of {}", uri.path()).into_bytes())
            }
        }
    }

    struct StaticFetch {
        fetches: AtomicUsize,
    }

    impl StaticFetch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RequestService for StaticFetch {
        async fn fetch(&self, _uri: &Url) -> io::Result<FetchedContent> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedContent {
                data: b"remote".to_vec(),
                mime: Some("text/html".to_string()),
            })
        }
    }

    /// File service that parks every read until released.
    struct BlockedFiles {
        release: Notify,
    }

    #[async_trait]
    impl FileService for BlockedFiles {
        async fn read(&self, _uri: &Url) -> io::Result<Vec<u8>> {
            self.release.notified().await;
            Ok(b"late".to_vec())
        }
    }

    fn registration(roots: &[&str]) -> WebviewRegistration {
        RegistrationMetadata {
            local_resource_roots: roots.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
        .normalize(1)
        .unwrap()
    }

    fn provider_with(
        files: Arc<StaticFiles>,
        fetch: Arc<StaticFetch>,
        roots: &[&str],
    ) -> WebviewProtocolProvider {
        let provider = WebviewProtocolProvider::new(files, fetch);
        provider.register_webview(&WebviewId::from("w1"), &registration(roots));
        provider
    }

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn request_under_root_is_read() {
        let files = StaticFiles::new();
        let provider = provider_with(files.clone(), StaticFetch::new(), &["file:///a"]);

        let response = provider
            .load_resource(&WebviewId::from("w1"), &uri("file:///a/x.html"))
            .await;
        match response {
            ResourceResponse::Success { data, mime } => {
                assert_eq!(data, b"contents of /a/x.html");
                assert_eq!(mime.as_deref(), Some("text/html"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(files.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_outside_roots_is_denied_without_touching_collaborators() {
        let files = StaticFiles::new();
        let fetch = StaticFetch::new();
        let provider = provider_with(files.clone(), fetch.clone(), &["file:///a"]);

        let response = provider
            .load_resource(&WebviewId::from("w1"), &uri("file:///b/x.html"))
            .await;
        assert_eq!(response, ResourceResponse::AccessDenied);
        assert_eq!(files.reads.load(Ordering::SeqCst), 0);
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn root_match_is_segment_aligned() {
        let files = StaticFiles::new();
        let provider = provider_with(files.clone(), StaticFetch::new(), &["file:///a"]);

        let response = provider
            .load_resource(&WebviewId::from("w1"), &uri("file:///ab/x.html"))
            .await;
        assert_eq!(response, ResourceResponse::AccessDenied);
        assert_eq!(files.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_webview_is_denied() {
        let provider = provider_with(StaticFiles::new(), StaticFetch::new(), &["file:///a"]);
        let response = provider
            .load_resource(&WebviewId::from("nope"), &uri("file:///a/x.html"))
            .await;
        assert_eq!(response, ResourceResponse::AccessDenied);
    }

    #[tokio::test]
    async fn missing_file_resolves_not_found() {
        let provider = provider_with(StaticFiles::new(), StaticFetch::new(), &["file:///a"]);
        let response = provider
            .load_resource(&WebviewId::from("w1"), &uri("file:///a/missing.html"))
            .await;
        assert_eq!(response, ResourceResponse::NotFound);
    }

    #[tokio::test]
    async fn https_root_routes_through_request_service() {
        let fetch = StaticFetch::new();
        let provider = provider_with(
            StaticFiles::new(),
            fetch.clone(),
            &["https://cdn.example.com/assets"],
        );

        let response = provider
            .load_resource(
                &WebviewId::from("w1"),
                &uri("https://cdn.example.com/assets/app.js"),
            )
            .await;
        assert!(matches!(response, ResourceResponse::Success { .. }));
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregister_resolves_in_flight_request_as_not_found() {
        let files = Arc::new(BlockedFiles {
            release: Notify::new(),
        });
        let provider = Arc::new(WebviewProtocolProvider::new(
            files.clone(),
            StaticFetch::new(),
        ));
        provider.register_webview(&WebviewId::from("w1"), &registration(&["file:///a"]));

        let task = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                provider
                    .load_resource(&WebviewId::from("w1"), &uri("file:///a/x.html"))
                    .await
            })
        };
        // Let the request reach the parked file read.
        tokio::task::yield_now().await;

        provider.unregister_webview(&WebviewId::from("w1"));
        files.release.notify_one();

        assert_eq!(task.await.unwrap(), ResourceResponse::NotFound);
        // The late read result was discarded; nothing is left pending.
        assert!(provider.state.lock().unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn stale_did_load_resource_is_discarded() {
        let provider = provider_with(StaticFiles::new(), StaticFetch::new(), &["file:///a"]);
        // No pending request 42 exists; must not panic, must not create state.
        provider.did_load_resource(
            42,
            ResourceResponse::Success {
                data: b"x".to_vec(),
                mime: None,
            },
            None,
        );
        assert!(provider.state.lock().unwrap().pending.is_empty());
    }

    #[test]
    fn details_fill_missing_mime() {
        let provider = WebviewProtocolProvider::new(StaticFiles::new(), StaticFetch::new());
        let (tx, mut rx) = oneshot::channel();
        provider.state.lock().unwrap().pending.insert(
            7,
            PendingRequest {
                webview_id: WebviewId::from("w1"),
                tx,
            },
        );

        provider.did_load_resource(
            7,
            ResourceResponse::Success {
                data: b"x".to_vec(),
                mime: None,
            },
            Some(ResponseDetails {
                mime: Some("image/png".to_string()),
            }),
        );
        match rx.try_recv().unwrap() {
            ResourceResponse::Success { mime, .. } => {
                assert_eq!(mime.as_deref(), Some("image/png"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn update_replaces_only_present_fields() {
        let provider = WebviewProtocolProvider::new(StaticFiles::new(), StaticFetch::new());
        let id = WebviewId::from("w1");
        provider.register_webview(&id, &registration(&["file:///a"]));

        let delta = crate::metadata::MetadataDelta {
            local_resource_roots: Some(vec!["file:///b".into()]),
            ..Default::default()
        }
        .normalize()
        .unwrap();
        provider.update_webview_metadata(&id, &delta);

        let metadata = provider.metadata(&id).unwrap();
        assert_eq!(metadata.local_resource_roots[0].as_str(), "file:///b");
        assert_eq!(metadata.window_id, 1);
    }

    #[test]
    fn mime_table_basics() {
        assert_eq!(mime_from_extension("/a/index.html"), "text/html");
        assert_eq!(mime_from_extension("/a/app.mjs"), "application/javascript");
        assert_eq!(mime_from_extension("/a/data.bin"), "application/octet-stream");
        assert_eq!(mime_from_extension("/a/noext"), "application/octet-stream");
    }

    #[test]
    fn equal_or_parent_respects_authority() {
        let root = uri("https://cdn.example.com/assets");
        assert!(is_equal_or_parent(&uri("https://cdn.example.com/assets/x.js"), &root));
        assert!(!is_equal_or_parent(&uri("https://evil.example.com/assets/x.js"), &root));
        assert!(!is_equal_or_parent(&uri("http://cdn.example.com/assets/x.js"), &root));
    }
}
