use std::path::PathBuf;
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/shortener_storage.csv";

/// Settings used by [`Store::open`](crate::Store::open) to pick a backend.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    /// PostgreSQL connection string. When unset the snapshot store is used.
    #[builder(default, setter(into))]
    pub database_dsn: Option<String>,
    /// Snapshot file used when the relational backend is not available.
    #[builder(default = PathBuf::from(DEFAULT_FILE_STORAGE_PATH), setter(into))]
    pub file_storage_path: PathBuf,
    #[builder(default = 5)]
    pub max_connections: u32,
    /// Upper bound on establishing the first database connection.
    #[builder(default = Duration::from_secs(5))]
    pub connect_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
