use crate::id::WebviewId;

#[derive(Debug, thiserror::Error)]
pub enum WebviewError {
    #[error("invalid windowId: {0}")]
    InvalidWindow(u32),

    #[error("invalid surfaceId: {0}")]
    InvalidSurface(u32),

    #[error("unknown webview: {0}")]
    UnknownRegistration(WebviewId),

    #[error("malformed uri '{uri}': {reason}")]
    Normalization { uri: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OrielError {
    #[error(transparent)]
    Webview(#[from] WebviewError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
