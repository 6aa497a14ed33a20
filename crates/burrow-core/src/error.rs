use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Outcomes of a link store operation that are not a plain success.
///
/// `NotFound`, `Gone` and `DuplicateUrl` are expected outcomes that callers
/// translate into user-visible responses. The remaining variants describe a
/// misbehaving medium.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("link not found: {0}")]
    NotFound(String),
    #[error("link has been deleted: {0}")]
    Gone(String),
    #[error("original url {original_url} is already shortened as {existing_id}")]
    DuplicateUrl {
        original_url: String,
        existing_id: String,
    },
    #[error("link id already exists: {0}")]
    IdConflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot io failed: {0}")]
    Io(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Builds a [`StorageError::DuplicateUrl`].
    pub fn duplicate(original_url: impl Into<String>, existing_id: impl Into<String>) -> Self {
        Self::DuplicateUrl {
            original_url: original_url.into(),
            existing_id: existing_id.into(),
        }
    }

    /// Whether this error is an expected outcome rather than a backend fault.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Gone(_) | Self::DuplicateUrl { .. } | Self::IdConflict(_)
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_carries_existing_id() {
        let err = StorageError::duplicate("https://example.org", "abc");
        assert_eq!(
            err,
            StorageError::DuplicateUrl {
                original_url: "https://example.org".to_string(),
                existing_id: "abc".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "original url https://example.org is already shortened as abc"
        );
    }

    #[test]
    fn expected_outcomes() {
        assert!(StorageError::NotFound("x".into()).is_expected());
        assert!(StorageError::Gone("x".into()).is_expected());
        assert!(StorageError::duplicate("u", "x").is_expected());
        assert!(!StorageError::Unavailable("down".into()).is_expected());
        assert!(!StorageError::Io("disk".into()).is_expected());
    }
}
