pub mod errors;
pub mod id;

pub use errors::{OrielError, WebviewError};
pub use id::{new_id, WebviewId};

pub type Result<T> = std::result::Result<T, OrielError>;
