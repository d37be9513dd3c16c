//! Boundary to the remote account service.
//!
//! The protocol client lives outside this crate. Implementations of
//! [`RemoteActionProvider`] translate their native failures into
//! [`RemoteError`] (usually via [`RemoteError::classify`]) so the orchestrator
//! never looks at raw error shapes.
use crate::model::EntityItem;
use crate::retry;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The service asked us to wait before calling again.
    #[error("FLOOD_WAIT_{seconds}")]
    RateLimited { seconds: u64 },
    /// Session or authorization is gone; nothing else will succeed.
    #[error("{code}: {message}")]
    SessionFatal { code: String, message: String },
    #[error("{}: {message}", .code.as_deref().unwrap_or("UNKNOWN_ERROR"))]
    Other {
        code: Option<String>,
        message: String,
    },
}

/// Stable `{code, message}` pair stored in job results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    /// Build the right variant from a raw RPC failure.
    ///
    /// `seconds` is the structured wait hint when the client exposes one.
    pub fn classify(code: Option<&str>, message: &str, seconds: Option<f64>) -> Self {
        if let Some(hint) = seconds.filter(|s| s.is_finite()) {
            return RemoteError::RateLimited {
                seconds: retry::wait_seconds(hint),
            };
        }
        let haystack = code.map_or_else(|| message.to_string(), |c| format!("{c} {message}"));
        if let Some(secs) = retry::flood_wait_hint(&haystack) {
            return RemoteError::RateLimited { seconds: secs };
        }
        if retry::is_session_fatal(&haystack) {
            let code = code
                .map(str::to_string)
                .or_else(|| retry::fatal_keyword(&haystack).map(str::to_string))
                .unwrap_or_else(|| "SESSION_FATAL".to_string());
            return RemoteError::SessionFatal {
                code,
                message: message.to_string(),
            };
        }
        RemoteError::Other {
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    pub fn other(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Other {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// True for `SessionFatal`, and for `Other` errors whose code or message
    /// still carries a session-fatal keyword.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            RemoteError::SessionFatal { .. } => true,
            RemoteError::RateLimited { .. } => false,
            RemoteError::Other { code, message } => {
                code.as_deref().is_some_and(retry::is_session_fatal)
                    || retry::is_session_fatal(message)
            }
        }
    }

    pub fn normalize(&self) -> NormalizedError {
        match self {
            RemoteError::RateLimited { seconds } => NormalizedError {
                code: "FLOOD_WAIT".to_string(),
                message: format!("FLOOD_WAIT_{seconds}"),
            },
            RemoteError::SessionFatal { code, message } => NormalizedError {
                code: code.clone(),
                message: message.clone(),
            },
            RemoteError::Other { code, message } => NormalizedError {
                code: code.clone().unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
                message: message.clone(),
            },
        }
    }
}

/// Per-item remote operations plus candidate listing for the
/// provider-sourced previews.
#[async_trait]
pub trait RemoteActionProvider: Send + Sync {
    async fn remove_contact(&self, item: &EntityItem) -> Result<(), RemoteError>;

    async fn leave_group(&self, item: &EntityItem) -> Result<(), RemoteError>;

    async fn leave_channel(&self, item: &EntityItem) -> Result<(), RemoteError>;

    async fn purge_private_history(&self, item: &EntityItem) -> Result<(), RemoteError>;

    async fn list_deleted_contacts(&self) -> Result<Vec<EntityItem>, RemoteError>;

    async fn list_non_friend_chats(&self) -> Result<Vec<EntityItem>, RemoteError>;

    async fn list_bot_chats(&self) -> Result<Vec<EntityItem>, RemoteError>;
}
