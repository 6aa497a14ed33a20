use async_trait::async_trait;
use burrow_core::{LinkRecord, ReadRepository, Repository, Result, StorageError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// In-memory storage entry for a link.
#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    user_id: String,
    deleted: bool,
}

impl Entry {
    fn from_record(record: LinkRecord) -> (String, Self) {
        let entry = Self {
            original_url: record.original_url,
            user_id: record.user_id,
            deleted: record.deleted,
        };
        (record.id, entry)
    }

    fn to_record(&self, id: &str) -> LinkRecord {
        LinkRecord {
            id: id.to_owned(),
            original_url: self.original_url.clone(),
            user_id: self.user_id.clone(),
            deleted: self.deleted,
        }
    }
}

/// The forward map and its derived indexes. Only ever touched under the
/// repository lock, so the three maps always agree with each other.
#[derive(Debug, Default)]
struct Tables {
    /// id -> entry, including soft-deleted entries.
    links: HashMap<String, Entry>,
    /// original url -> id, live entries only.
    by_url: HashMap<String, String>,
    /// user id -> ids in insertion order, including soft-deleted ids.
    by_user: HashMap<String, Vec<String>>,
    /// Every id in insertion order.
    order: Vec<String>,
}

impl Tables {
    fn insert(&mut self, record: LinkRecord) -> Result<()> {
        if self.links.contains_key(&record.id) {
            return Err(StorageError::IdConflict(record.id));
        }

        if !record.deleted {
            if let Some(existing) = self.by_url.get(&record.original_url) {
                return Err(StorageError::duplicate(record.original_url, existing.clone()));
            }
            self.by_url
                .insert(record.original_url.clone(), record.id.clone());
        }

        self.by_user
            .entry(record.user_id.clone())
            .or_default()
            .push(record.id.clone());
        self.order.push(record.id.clone());
        let (id, entry) = Entry::from_record(record);
        self.links.insert(id, entry);

        Ok(())
    }

    /// Derives the user index from `order` and `links`.
    fn rebuild_user_index(&self) -> HashMap<String, Vec<String>> {
        let mut by_user: HashMap<String, Vec<String>> = HashMap::new();
        for id in &self.order {
            if let Some(entry) = self.links.get(id) {
                by_user
                    .entry(entry.user_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        by_user
    }

    /// Derives the live url index from `order` and `links`.
    fn rebuild_url_index(&self) -> HashMap<String, String> {
        self.order
            .iter()
            .filter_map(|id| {
                let entry = self.links.get(id)?;
                (!entry.deleted).then(|| (entry.original_url.clone(), id.clone()))
            })
            .collect()
    }

    /// Returns `true` if the id was live and owned by `user_id`.
    fn soft_delete(&mut self, id: &str, user_id: &str) -> bool {
        let Some(entry) = self.links.get_mut(id) else {
            return false;
        };
        if entry.deleted || entry.user_id != user_id {
            return false;
        }

        entry.deleted = true;
        if self.by_url.get(&entry.original_url).map(String::as_str) == Some(id) {
            self.by_url.remove(&entry.original_url);
        }
        true
    }
}

/// In-memory implementation of the [`Repository`] trait.
///
/// All maps live behind a single lock so that the duplicate check and the
/// insert of [`Repository::add`] happen as one step. Of two concurrent inserts
/// of the same URL exactly one wins.
///
/// [`Repository::add_batch`] is best-effort: entries are inserted in order and
/// the first failure aborts the batch, leaving the entries before it committed.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryRepository {
    /// Creates an empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with `records`.
    ///
    /// Records that collide with an earlier one are skipped.
    pub fn from_records(records: impl IntoIterator<Item = LinkRecord>) -> Self {
        let mut tables = Tables::default();
        let mut live_urls = HashSet::new();

        for record in records {
            let conflicting = tables.links.contains_key(&record.id)
                || (!record.deleted && !live_urls.insert(record.original_url.clone()));
            if conflicting {
                debug!(id = %record.id, url = %record.original_url, "skipping conflicting record");
                continue;
            }

            tables.order.push(record.id.clone());
            let (id, entry) = Entry::from_record(record);
            tables.links.insert(id, entry);
        }

        tables.by_user = tables.rebuild_user_index();
        tables.by_url = tables.rebuild_url_index();

        Self {
            tables: RwLock::new(tables),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns every live `(id, original_url)` pair in insertion order.
    pub fn live_pairs(&self) -> Vec<(String, String)> {
        let tables = self.tables.read();
        tables
            .order
            .iter()
            .filter_map(|id| {
                let entry = tables.links.get(id)?;
                (!entry.deleted).then(|| (id.clone(), entry.original_url.clone()))
            })
            .collect()
    }

    /// Number of records ever stored, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.tables.read().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`Repository::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get_by_id(&self, id: &str) -> Result<String> {
        let tables = self.tables.read();

        match tables.links.get(id) {
            None => Err(StorageError::NotFound(id.to_owned())),
            Some(entry) if entry.deleted => Err(StorageError::Gone(id.to_owned())),
            Some(entry) => Ok(entry.original_url.clone()),
        }
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<String> {
        self.tables
            .read()
            .by_url
            .get(original_url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(original_url.to_owned()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<LinkRecord>> {
        let tables = self.tables.read();

        let Some(ids) = tables.by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| {
                let entry = tables.links.get(id)?;
                (!entry.deleted).then(|| entry.to_record(id))
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::Unavailable(
                "in-memory store has been closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn add(&self, record: LinkRecord) -> Result<()> {
        trace!(id = %record.id, url = %record.original_url, "inserting link");
        self.tables.write().insert(record)
    }

    async fn add_batch(&self, records: Vec<LinkRecord>) -> Result<()> {
        let total = records.len();
        let mut tables = self.tables.write();

        for (inserted, record) in records.into_iter().enumerate() {
            if let Err(err) = tables.insert(record) {
                debug!(inserted, total, error = %err, "batch insert aborted");
                return Err(err);
            }
        }

        Ok(())
    }

    async fn delete_batch(&self, ids: Vec<String>, user_id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let deleted = ids
            .iter()
            .filter(|id| tables.soft_delete(id, user_id))
            .count();

        debug!(user_id = %user_id, requested = ids.len(), deleted, "soft-deleted links");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(id: &str, url: &str, user: &str) -> LinkRecord {
        LinkRecord::new(id, url, user)
    }

    /// The incrementally maintained indexes must match a rebuild from the
    /// forward records.
    fn assert_indexes_consistent(repo: &InMemoryRepository) {
        let tables = repo.tables.read();

        assert_eq!(tables.rebuild_user_index(), tables.by_user);
        assert_eq!(tables.rebuild_url_index(), tables.by_url);
        assert_eq!(tables.order.len(), tables.links.len());
    }

    #[tokio::test]
    async fn add_and_get() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();

        assert_eq!(repo.get_by_id("abc").await.unwrap(), "https://example.org");
        assert_eq!(
            repo.get_by_original_url("https://example.org").await.unwrap(),
            "abc"
        );
    }

    #[tokio::test]
    async fn get_nonexistent() {
        let repo = InMemoryRepository::new();

        let err = repo.get_by_id("nope").await.unwrap_err();
        assert_eq!(err, StorageError::NotFound("nope".to_string()));

        let err = repo.get_by_original_url("https://nope.org").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_url_reports_existing_id() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();
        let err = repo
            .add(record("xyz", "https://example.org", "u2"))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::duplicate("https://example.org", "abc"));
        assert_eq!(repo.get_by_id("abc").await.unwrap(), "https://example.org");
        assert_eq!(
            repo.get_by_id("xyz").await.unwrap_err(),
            StorageError::NotFound("xyz".to_string())
        );
        assert_eq!(
            repo.get_by_original_url("https://example.org").await.unwrap(),
            "abc"
        );
    }

    #[tokio::test]
    async fn id_conflict() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://one.org", "u1")).await.unwrap();
        let err = repo
            .add(record("abc", "https://two.org", "u1"))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::IdConflict("abc".to_string()));
    }

    #[tokio::test]
    async fn deleted_record_is_gone() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();
        repo.delete_batch(vec!["abc".to_string()], "u1").await.unwrap();

        assert_eq!(
            repo.get_by_id("abc").await.unwrap_err(),
            StorageError::Gone("abc".to_string())
        );
        assert!(repo
            .get_by_original_url("https://example.org")
            .await
            .is_err());
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn delete_by_other_user_is_skipped() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();
        repo.delete_batch(vec!["abc".to_string(), "unknown".to_string()], "u2")
            .await
            .unwrap();

        assert_eq!(repo.get_by_id("abc").await.unwrap(), "https://example.org");
    }

    #[tokio::test]
    async fn deleting_twice_is_a_no_op() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();
        repo.delete_batch(vec!["abc".to_string()], "u1").await.unwrap();
        repo.delete_batch(vec!["abc".to_string()], "u1").await.unwrap();

        assert!(matches!(
            repo.get_by_id("abc").await.unwrap_err(),
            StorageError::Gone(_)
        ));
    }

    #[tokio::test]
    async fn deleted_url_can_be_shortened_again() {
        let repo = InMemoryRepository::new();

        repo.add(record("abc", "https://example.org", "u1"))
            .await
            .unwrap();
        repo.delete_batch(vec!["abc".to_string()], "u1").await.unwrap();
        repo.add(record("def", "https://example.org", "u1"))
            .await
            .unwrap();

        assert_eq!(
            repo.get_by_original_url("https://example.org").await.unwrap(),
            "def"
        );
        // the tombstoned id stays reserved
        let err = repo
            .add(record("abc", "https://other.org", "u1"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::IdConflict("abc".to_string()));
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn list_by_user_in_insertion_order() {
        let repo = InMemoryRepository::new();

        repo.add(record("a", "https://a.org", "u")).await.unwrap();
        repo.add(record("c", "https://c.org", "other")).await.unwrap();
        repo.add(record("b", "https://b.org", "u")).await.unwrap();

        let ids: Vec<_> = repo
            .list_by_user("u")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(repo.list_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_user_skips_deleted() {
        let repo = InMemoryRepository::new();

        repo.add(record("a", "https://a.org", "u")).await.unwrap();
        repo.add(record("b", "https://b.org", "u")).await.unwrap();
        repo.delete_batch(vec!["a".to_string()], "u").await.unwrap();

        let records = repo.list_by_user("u").await.unwrap();
        assert_eq!(records, vec![record("b", "https://b.org", "u")]);
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let repo = InMemoryRepository::new();
        repo.add(record("x", "https://taken.org", "u")).await.unwrap();

        let err = repo
            .add_batch(vec![
                record("a", "https://a.org", "u"),
                record("b", "https://taken.org", "u"),
                record("c", "https://c.org", "u"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::duplicate("https://taken.org", "x"));
        // entries before the poisoned one stay committed
        assert_eq!(repo.get_by_id("a").await.unwrap(), "https://a.org");
        assert!(matches!(
            repo.get_by_id("b").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            repo.get_by_id("c").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn batch_with_repeated_url_conflicts_with_earlier_entry() {
        let repo = InMemoryRepository::new();

        let err = repo
            .add_batch(vec![
                record("a", "https://a.org", "u"),
                record("b", "https://a.org", "u"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::duplicate("https://a.org", "a"));
    }

    #[tokio::test]
    async fn from_records_skips_conflicts() {
        let repo = InMemoryRepository::from_records(vec![
            LinkRecord::anonymous("a", "https://a.org"),
            LinkRecord::anonymous("a", "https://other.org"),
            LinkRecord::anonymous("b", "https://a.org"),
            LinkRecord::anonymous("c", "https://c.org"),
        ]);

        assert_eq!(
            repo.live_pairs(),
            vec![
                ("a".to_string(), "https://a.org".to_string()),
                ("c".to_string(), "https://c.org".to_string()),
            ]
        );
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn from_records_rebuilds_indexes_around_deleted_links() {
        let mut deleted = record("a", "https://a.org", "u1");
        deleted.deleted = true;
        let repo = InMemoryRepository::from_records(vec![
            deleted,
            record("b", "https://a.org", "u1"),
            record("c", "https://c.org", "u2"),
        ]);

        assert_eq!(
            repo.get_by_original_url("https://a.org").await.unwrap(),
            "b"
        );
        assert!(matches!(
            repo.get_by_id("a").await.unwrap_err(),
            StorageError::Gone(_)
        ));
        let ids: Vec<_> = repo
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b"]);
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn health_until_closed() {
        let repo = InMemoryRepository::new();

        repo.health_check().await.unwrap();
        repo.close().await.unwrap();

        assert!(matches!(
            repo.health_check().await.unwrap_err(),
            StorageError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_url_have_one_winner() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..16u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.add(LinkRecord::new(
                    format!("id-{i:03}"),
                    "https://race.org",
                    "u",
                ))
                .await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(StorageError::DuplicateUrl { .. }) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(losers, 15);
        assert_indexes_consistent(&repo);
    }

    #[tokio::test]
    async fn concurrent_access() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.add(LinkRecord::new(
                    format!("code-{i:03}"),
                    format!("https://example{i}.com"),
                    "u",
                ))
                .await
                .unwrap();
            }));
        }

        for i in 0..10u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let _ = repo.get_by_id(&format!("code-{i:03}")).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..10u64 {
            let url = repo.get_by_id(&format!("code-{i:03}")).await.unwrap();
            assert_eq!(url, format!("https://example{i}.com"));
        }
        assert_eq!(repo.list_by_user("u").await.unwrap().len(), 10);
    }
}
