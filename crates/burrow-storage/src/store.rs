use crate::config::StorageConfig;
use crate::memory::InMemoryRepository;
use crate::postgres::PostgresRepository;
use crate::snapshot::SnapshotRepository;
use burrow_core::{LinkRecord, Repository, Result, StorageError};
use sqlx::postgres::PgPoolOptions;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Which adapter a [`Store`] was built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Snapshot,
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Postgres => write!(f, "postgres"),
            Backend::Snapshot => write!(f, "snapshot"),
            Backend::Memory => write!(f, "in-memory"),
        }
    }
}

/// The link store used by the rest of the service.
///
/// A store owns exactly one adapter for its whole lifetime. It is created once
/// at startup, shared by reference, and torn down with [`Store::shutdown`]
/// after the server has stopped accepting requests.
pub struct Store {
    repository: Arc<dyn Repository>,
    backend: Backend,
    /// Background deletions not yet applied.
    deletions: TaskTracker,
    /// Set when the configured database could not be used at startup.
    degraded: Option<StorageError>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("pending_deletions", &self.deletions.len())
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Builds the store described by `config`.
    ///
    /// The relational backend is used when a DSN is configured and both the
    /// connection and the schema bootstrap succeed. Any failure on that path
    /// falls back to the snapshot store; opening never fails. A store that
    /// fell back keeps serving but reports itself unhealthy in
    /// [`Store::liveness`].
    pub async fn open(config: &StorageConfig) -> Self {
        let mut degraded = None;
        if let Some(dsn) = config.database_dsn.as_deref() {
            match open_postgres(dsn, config).await {
                Ok(repository) => {
                    info!("using postgres link store");
                    return Self::from_repository(repository, Backend::Postgres);
                }
                Err(err) => {
                    warn!(error = %err, "postgres unavailable, falling back to snapshot store");
                    degraded = Some(StorageError::Unavailable(format!(
                        "configured database is unavailable: {err}"
                    )));
                }
            }
        }

        let repository = SnapshotRepository::open(&config.file_storage_path);
        if repository.inner().is_empty() {
            info!(path = %repository.path().display(), "using empty snapshot link store");
        } else {
            info!(
                path = %repository.path().display(),
                links = repository.inner().len(),
                "using snapshot link store"
            );
        }

        let mut store = Self::from_repository(repository, Backend::Snapshot);
        store.degraded = degraded;
        store
    }

    /// A store without any persistence.
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new(), Backend::Memory)
    }

    /// Wraps an already constructed adapter.
    pub fn from_repository<R: Repository>(repository: R, backend: Backend) -> Self {
        Self {
            repository: Arc::new(repository),
            backend,
            deletions: TaskTracker::new(),
            degraded: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Whether the store runs on a fallback because the configured database
    /// was unavailable.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Returns the original URL behind `id`.
    ///
    /// Fails with `NotFound` for unknown ids and `Gone` for deleted ones.
    pub async fn resolve(&self, id: &str) -> Result<String> {
        self.repository.get_by_id(id).await
    }

    /// Stores a new link. A URL that is already shortened yields
    /// `DuplicateUrl` carrying the id to hand out instead.
    pub async fn create(
        &self,
        id: impl Into<String>,
        original_url: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<()> {
        self.repository
            .add(LinkRecord::new(id, original_url, user_id))
            .await
    }

    /// Stores `(id, original_url)` pairs for one user.
    pub async fn create_batch(&self, links: Vec<(String, String)>, user_id: &str) -> Result<()> {
        let records = links
            .into_iter()
            .map(|(id, url)| LinkRecord::new(id, url, user_id))
            .collect();
        self.repository.add_batch(records).await
    }

    /// Lists the live links of `user_id` in the order they were created.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<LinkRecord>> {
        self.repository.list_by_user(user_id).await
    }

    /// Schedules the deletion of `ids` owned by `user_id` and returns at once.
    ///
    /// The deletion runs on a background task. Errors are logged there and
    /// never reach the caller; the handle only exists so tests can wait for
    /// it. [`Store::shutdown`] waits for every pending deletion.
    pub fn delete_for_user(&self, ids: Vec<String>, user_id: impl Into<String>) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let user_id = user_id.into();

        self.deletions.spawn(async move {
            let requested = ids.len();
            match repository.delete_batch(ids, &user_id).await {
                Ok(()) => debug!(user_id = %user_id, requested, "deletion applied"),
                Err(err) => warn!(user_id = %user_id, requested, error = %err, "deletion failed"),
            }
        })
    }

    /// Checks that the active backend can serve requests.
    ///
    /// Fails with `Unavailable` for a store that fell back from the
    /// configured database.
    pub async fn liveness(&self) -> Result<()> {
        if let Some(err) = &self.degraded {
            return Err(err.clone());
        }
        self.repository.health_check().await
    }

    /// Waits for pending deletions, then releases the backend: flushes the
    /// snapshot or closes the pool.
    pub async fn shutdown(&self) {
        self.deletions.close();
        if !self.deletions.is_empty() {
            info!(pending = self.deletions.len(), "waiting for pending deletions");
        }
        self.deletions.wait().await;

        info!(backend = %self.backend, "shutting down link store");
        if let Err(err) = self.repository.close().await {
            warn!(backend = %self.backend, error = %err, "link store did not close cleanly");
        }
    }
}

async fn open_postgres(dsn: &str, config: &StorageConfig) -> Result<PostgresRepository> {
    let options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout);

    let repository = PostgresRepository::connect_with(options, dsn).await?;
    if let Err(err) = repository.bootstrap().await {
        repository.close().await?;
        return Err(err);
    }

    Ok(repository)
}
