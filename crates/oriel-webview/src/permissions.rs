//! Fixed permission policy for the shared webview session.

/// Partition id of the session every webview runs in.
pub const WEBVIEW_PARTITION_ID: &str = "webview";

/// Process-wide permission policy: clipboard read is the single permission
/// webview content may hold; everything else is denied. Pure function of
/// the permission name, no per-webview state.
pub fn permission_allowed(permission: &str) -> bool {
    permission == "clipboard-read"
}
