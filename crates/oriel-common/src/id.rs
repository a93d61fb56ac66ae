use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque identity of a registered webview. Minted by the workbench layer
/// before the webview starts loading content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebviewId(String);

impl WebviewId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WebviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for WebviewId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WebviewId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for WebviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
