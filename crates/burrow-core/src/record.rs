use serde::{Deserialize, Serialize};

/// Owner assigned to links created without a known user.
pub const ANONYMOUS_USER: &str = "no-user";

/// A shortened link managed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Short identifier chosen by the caller.
    pub id: String,
    /// The URL that was shortened.
    pub original_url: String,
    /// Owner of the link, or [`ANONYMOUS_USER`].
    pub user_id: String,
    /// Soft-delete flag. Deleted records keep their id reserved.
    #[serde(default)]
    pub deleted: bool,
}

impl LinkRecord {
    /// Creates a live record.
    pub fn new(
        id: impl Into<String>,
        original_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            original_url: original_url.into(),
            user_id: user_id.into(),
            deleted: false,
        }
    }

    /// Creates a live record owned by [`ANONYMOUS_USER`].
    pub fn anonymous(id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self::new(id, original_url, ANONYMOUS_USER)
    }

    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}
