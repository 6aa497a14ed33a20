use async_trait::async_trait;
use burrow_core::{LinkRecord, ReadRepository, Repository, Result, StorageError};
use sqlx::postgres::{PgPool, PgPoolCopyExt, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Schema bootstrap, safe to run against an already initialised database.
pub const SCHEMA: &str = include_str!("../ddl/postgres/links.sql");

const PRIMARY_KEY: &str = "links_pkey";

const COPY_LINKS: &str =
    "COPY links (id, original_url, user_id, deleted) FROM STDIN WITH (FORMAT csv)";

/// PostgreSQL implementation of the repository contract.
///
/// Uniqueness of live URLs is enforced by a partial unique index, so a
/// soft-deleted link does not block shortening its URL again. Ids are the
/// primary key and are never reused, soft-deleted rows included.
///
/// [`Repository::add_batch`] is atomic: the whole batch is sent as one `COPY`
/// statement and a single failing row leaves nothing behind.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a pool with the given options.
    pub async fn connect_with(options: PgPoolOptions, database_url: &str) -> Result<Self> {
        let pool = options
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `links` table and its indexes if they are absent.
    pub async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("postgres schema ready");
        Ok(())
    }

    async fn insert(&self, record: &LinkRecord) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO links (id, original_url, user_id, deleted)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.id)
        .bind(&record.original_url)
        .bind(&record.user_id)
        .bind(record.deleted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Turns a failed single-row insert into the matching conflict.
    ///
    /// `None` means the url conflict was reported but the live row holding
    /// the url is gone by now, so the insert may be attempted again.
    async fn insert_error(&self, err: sqlx::Error, record: &LinkRecord) -> Option<StorageError> {
        match violated_constraint(&err) {
            Some(Some(name)) if name == PRIMARY_KEY => {
                Some(StorageError::IdConflict(record.id.clone()))
            }
            Some(_) => {
                let lookup = self.get_by_original_url(&record.original_url).await;
                conflict_from_lookup(&record.original_url, lookup)
            }
            None => Some(map_sqlx_error(err)),
        }
    }

    /// Finds the first batch entry that collides with a stored link.
    async fn batch_error(&self, err: sqlx::Error, records: &[LinkRecord]) -> StorageError {
        let message = err.to_string();

        let conflict = match violated_constraint(&err) {
            Some(Some(name)) if name == PRIMARY_KEY => self.first_taken_id(records).await,
            Some(_) => self.first_taken_url(records).await,
            None => return map_sqlx_error(err),
        };

        match conflict {
            Ok(Some(conflict)) => conflict,
            Ok(None) => StorageError::Query(message),
            Err(lookup) => lookup,
        }
    }

    async fn first_taken_id(&self, records: &[LinkRecord]) -> Result<Option<StorageError>> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let rows = sqlx::query("SELECT id FROM links WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut taken = HashSet::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(map_sqlx_error)?;
            taken.insert(id);
        }

        Ok(records
            .iter()
            .find(|r| taken.contains(&r.id))
            .map(|r| StorageError::IdConflict(r.id.clone())))
    }

    async fn first_taken_url(&self, records: &[LinkRecord]) -> Result<Option<StorageError>> {
        let urls: Vec<String> = records.iter().map(|r| r.original_url.clone()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, original_url
            FROM links
            WHERE original_url = ANY($1)
              AND NOT deleted
            "#,
        )
        .bind(urls)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut taken = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(map_sqlx_error)?;
            let url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
            taken.insert(url, id);
        }

        Ok(records
            .iter()
            .filter(|r| !r.deleted)
            .find_map(|r| {
                taken
                    .get(&r.original_url)
                    .map(|existing| StorageError::duplicate(&r.original_url, existing))
            }))
    }
}

/// `Some(constraint)` if `err` is a unique violation.
fn violated_constraint(err: &sqlx::Error) -> Option<Option<String>> {
    err.as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.constraint().map(str::to_owned))
}

/// Resolves a url conflict through the live row that caused it.
fn conflict_from_lookup(original_url: &str, lookup: Result<String>) -> Option<StorageError> {
    match lookup {
        Ok(existing_id) => Some(StorageError::duplicate(original_url, existing_id)),
        Err(StorageError::NotFound(_)) => None,
        Err(err) => Some(err),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn record_from_row(row: &PgRow) -> Result<LinkRecord> {
    Ok(LinkRecord {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        user_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        deleted: row.try_get("deleted").map_err(map_sqlx_error)?,
    })
}

/// Reports the first id or live URL repeated inside `records`.
fn conflict_within(records: &[LinkRecord]) -> Option<StorageError> {
    let mut ids = HashSet::with_capacity(records.len());
    let mut urls: HashMap<&str, &str> = HashMap::with_capacity(records.len());

    for record in records {
        if !ids.insert(record.id.as_str()) {
            return Some(StorageError::IdConflict(record.id.clone()));
        }
        if record.deleted {
            continue;
        }
        if let Some(existing) = urls.get(record.original_url.as_str()) {
            return Some(StorageError::duplicate(&record.original_url, *existing));
        }
        urls.insert(&record.original_url, &record.id);
    }

    None
}

/// Encodes `records` as the CSV payload of [`COPY_LINKS`].
///
/// Every field is quoted so that empty strings are not read back as NULL.
fn encode_copy_rows(records: &[LinkRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    for record in records {
        let deleted = if record.deleted { "true" } else { "false" };
        writer
            .write_record([
                record.id.as_str(),
                record.original_url.as_str(),
                record.user_id.as_str(),
                deleted,
            ])
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| StorageError::InvalidData(e.to_string()))
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get_by_id(&self, id: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, deleted
            FROM links
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(id.to_owned()));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Gone(id.to_owned()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT id
            FROM links
            WHERE original_url = $1
              AND NOT deleted
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.try_get("id").map_err(map_sqlx_error),
            None => Err(StorageError::NotFound(original_url.to_owned())),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_url, user_id, deleted
            FROM links
            WHERE user_id = $1
              AND NOT deleted
            ORDER BY seq
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn add(&self, record: LinkRecord) -> Result<()> {
        let mut retried = false;

        loop {
            let Err(err) = self.insert(&record).await else {
                return Ok(());
            };

            match self.insert_error(err, &record).await {
                Some(conflict) => return Err(conflict),
                None if !retried => {
                    debug!(id = %record.id, url = %record.original_url, "conflicting link vanished, retrying insert");
                    retried = true;
                }
                None => {
                    return Err(StorageError::Query(format!(
                        "url {} keeps conflicting with a link that no longer exists",
                        record.original_url
                    )));
                }
            }
        }
    }

    async fn add_batch(&self, records: Vec<LinkRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(conflict) = conflict_within(&records) {
            return Err(conflict);
        }

        let payload = encode_copy_rows(&records)?;
        let mut copy = self
            .pool
            .copy_in_raw(COPY_LINKS)
            .await
            .map_err(map_sqlx_error)?;

        let sent = copy.send(payload).await.map(|_| ());
        if let Err(err) = sent {
            // the connection is unusable for anything else until the copy ends
            let _ = copy.abort("batch payload rejected").await;
            return Err(map_sqlx_error(err));
        }

        match copy.finish().await {
            Ok(rows) => {
                debug!(rows, "copied link batch");
                Ok(())
            }
            Err(err) => Err(self.batch_error(err, &records).await),
        }
    }

    async fn delete_batch(&self, ids: Vec<String>, user_id: &str) -> Result<()> {
        let requested = ids.len();

        let result = sqlx::query(
            r#"
            UPDATE links
            SET deleted = TRUE
            WHERE id = ANY($1)
              AND user_id = $2
              AND NOT deleted
            "#,
        )
        .bind(ids)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            user_id = %user_id,
            requested,
            deleted = result.rows_affected(),
            "soft-deleted links"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
