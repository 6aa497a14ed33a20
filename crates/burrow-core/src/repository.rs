use crate::error::Result;
use crate::record::LinkRecord;
use async_trait::async_trait;

/// A read-only view of a link repository.
///
/// Every adapter must produce the same observable outcomes for these calls,
/// whatever medium it stores records in.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Returns the original URL of a live link.
    ///
    /// Fails with `NotFound` if the id was never stored and with `Gone` if the
    /// link has been soft-deleted.
    async fn get_by_id(&self, id: &str) -> Result<String>;

    /// Returns the id of the live link shortening `original_url`.
    async fn get_by_original_url(&self, original_url: &str) -> Result<String>;

    /// Lists the live links owned by `user_id` in insertion order.
    /// An unknown user yields an empty list.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<LinkRecord>>;

    /// Checks that the backing medium can serve requests.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new link.
    ///
    /// Returns `Err(DuplicateUrl)` if a live link already shortens the same
    /// URL, and `Err(IdConflict)` if the id has ever been used.
    async fn add(&self, record: LinkRecord) -> Result<()>;

    /// Inserts several links. Whether a failure leaves earlier entries
    /// committed is adapter specific and documented on each implementation.
    async fn add_batch(&self, records: Vec<LinkRecord>) -> Result<()>;

    /// Soft-deletes the given ids owned by `user_id`.
    /// Ids owned by someone else, unknown or already deleted are skipped.
    async fn delete_batch(&self, ids: Vec<String>, user_id: &str) -> Result<()>;

    /// Releases the medium. Called once when the owning store shuts down.
    async fn close(&self) -> Result<()>;
}
