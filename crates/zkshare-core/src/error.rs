use thiserror::Error;

pub type ShareResult<T> = Result<T, ShareError>;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("download limit reached: {0}")]
    Exhausted(String),

    /// AEAD tag mismatch. Deliberately carries no detail: a wrong key and
    /// corrupted data must be indistinguishable to the caller.
    #[error("authentication failed")]
    AuthenticationFailure,

    #[error("peer did not respond within {0} seconds")]
    PeerTimeout(u64),

    #[error("verification phrase mismatch, exchange aborted")]
    VerificationMismatch,

    #[error("operation cancelled")]
    Cancelled,

    #[error("password required")]
    PasswordRequired,

    #[error("invalid password")]
    InvalidPassword,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ShareError {
    /// True when the record exists but can no longer be used (expired or out of
    /// downloads). A UI shows "gone" for these rather than "never existed".
    pub fn is_gone(&self) -> bool {
        matches!(self, ShareError::Expired(_) | ShareError::Exhausted(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ShareError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ShareError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gone_covers_expired_and_exhausted_only() {
        assert!(ShareError::Expired("a".into()).is_gone());
        assert!(ShareError::Exhausted("a".into()).is_gone());
        assert!(!ShareError::NotFound("a".into()).is_gone());
        assert!(!ShareError::AuthenticationFailure.is_gone());
    }

    #[test]
    fn authentication_failure_has_no_detail() {
        assert_eq!(
            ShareError::AuthenticationFailure.to_string(),
            "authentication failed"
        );
    }
}
