pub mod config;
pub mod db;
pub mod error;
pub mod lane;
pub mod model;
pub mod preview;
pub mod remote;
pub mod retry;
pub mod service;

pub use error::{PreviewError, ServiceError};
pub use remote::{RemoteActionProvider, RemoteError};
pub use service::BatchService;
