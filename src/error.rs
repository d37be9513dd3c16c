use crate::remote::RemoteError;
use thiserror::Error;

/// Why a preview token could not be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreviewError {
    #[error("PREVIEW_TOKEN_INVALID")]
    TokenInvalid,
    #[error("PREVIEW_ACTION_MISMATCH")]
    ActionMismatch,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        warnings: Vec<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    /// Stable code for API error bodies.
    pub fn code(&self) -> String {
        match self {
            ServiceError::Validation { .. } => "VALIDATION".to_string(),
            ServiceError::NotFound(_) => "NOT_FOUND".to_string(),
            ServiceError::Remote(err) => err.normalize().code,
            ServiceError::Storage(_) => "STORAGE".to_string(),
        }
    }
}

impl From<PreviewError> for ServiceError {
    fn from(err: PreviewError) -> Self {
        ServiceError::validation(format!("preview token is invalid or expired ({err})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::validation("x").code(), "VALIDATION");
        assert_eq!(ServiceError::NotFound("job".into()).code(), "NOT_FOUND");
        assert_eq!(
            ServiceError::from(RemoteError::other("PEER_ID_INVALID", "bad peer")).code(),
            "PEER_ID_INVALID"
        );
        assert_eq!(
            ServiceError::from(anyhow::anyhow!("disk full")).code(),
            "STORAGE"
        );
    }

    #[test]
    fn preview_errors_become_validation() {
        let err = ServiceError::from(PreviewError::ActionMismatch);
        assert_eq!(err.code(), "VALIDATION");
        assert!(err.to_string().contains("PREVIEW_ACTION_MISMATCH"));
    }
}
