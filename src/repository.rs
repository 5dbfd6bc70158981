//! Generic paginated CRUD over one resource kind.

use chrono::{SubsecRound, Utc};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

use crate::attachments::{is_managed, AttachmentStore};
use crate::error::{ResourceError, ResourceResult};
use crate::id::RecordId;
use crate::record::{is_blank, sanitize_fields, Fields, Record};
use crate::resource::ResourceSchema;
use crate::store::DocumentStore;

/// One page of a listing, shaped like the list envelope
#[derive(Debug, Serialize)]
pub struct Page {
    pub total: u64,
    pub page: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
    pub limit: u64,
    pub data: Vec<Record>,
}

pub struct Repository {
    schema: ResourceSchema,
    store: Arc<dyn DocumentStore>,
    attachments: Arc<AttachmentStore>,
    max_page_limit: u64,
}

impl Repository {
    pub fn new(
        schema: ResourceSchema,
        store: Arc<dyn DocumentStore>,
        attachments: Arc<AttachmentStore>,
        max_page_limit: u64,
    ) -> Self {
        Self {
            schema,
            store,
            attachments,
            max_page_limit,
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Upload side-channel shared with the handlers
    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    /// Newest-first page. Missing or zero `page`/`limit` fall back to defaults;
    /// `limit` is capped at the configured maximum.
    pub async fn list(&self, page: Option<u64>, limit: Option<u64>) -> ResourceResult<Page> {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(self.schema.default_limit)
            .min(self.max_page_limit);
        let skip = (page - 1).saturating_mul(limit);

        let total = self.store.count(&self.schema.kind).await?;
        let data = if skip >= total {
            Vec::new()
        } else {
            self.store.find_page(&self.schema.kind, skip, limit).await?
        };

        Ok(Page {
            total,
            page,
            total_pages: total.div_ceil(limit),
            limit,
            data,
        })
    }

    pub async fn create(&self, fields: Fields) -> ResourceResult<Record> {
        let fields = sanitize_fields(fields).map_err(ResourceError::Validation)?;

        let missing: Vec<&str> = self
            .schema
            .required
            .iter()
            .map(String::as_str)
            .filter(|name| fields.get(*name).map_or(true, is_blank))
            .collect();
        if !missing.is_empty() {
            return Err(ResourceError::missing_fields(&missing));
        }

        let now = Utc::now().trunc_subsecs(3);
        let record = Record {
            id: RecordId::generate(now.timestamp()),
            fields,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&self.schema.kind, &record).await?;
        debug!("Created {} record {}", self.schema.kind, record.id);
        Ok(record)
    }

    pub async fn get(&self, raw_id: &str) -> ResourceResult<Record> {
        let id = self.parse_id(raw_id)?;
        self.store
            .find_by_id(&self.schema.kind, &id)
            .await?
            .ok_or_else(|| self.not_found(&id))
    }

    /// Shallow-merge `changes` over the stored fields.
    ///
    /// A replaced system-managed attachment is removed after the write succeeds.
    pub async fn update(&self, raw_id: &str, changes: Fields) -> ResourceResult<Record> {
        let id = self.parse_id(raw_id)?;
        let changes = sanitize_fields(changes).map_err(ResourceError::Validation)?;

        let blank: Vec<&str> = self
            .schema
            .required
            .iter()
            .map(String::as_str)
            .filter(|name| changes.get(*name).is_some_and(is_blank))
            .collect();
        if !blank.is_empty() {
            return Err(ResourceError::missing_fields(&blank));
        }

        let mut record = self
            .store
            .find_by_id(&self.schema.kind, &id)
            .await?
            .ok_or_else(|| self.not_found(&id))?;

        let previous_attachment = self
            .schema
            .attachment_field()
            .and_then(|field| record.text(field))
            .map(str::to_string);

        for (name, value) in changes {
            record.fields.insert(name, value);
        }
        record.updated_at = Utc::now().trunc_subsecs(3);

        if !self.store.replace(&self.schema.kind, &record).await? {
            return Err(self.not_found(&id));
        }

        if let (Some(field), Some(old)) = (self.schema.attachment_field(), previous_attachment) {
            if record.text(field) != Some(old.as_str()) && is_managed(&old) {
                self.attachments.delete(&old).await;
            }
        }

        Ok(record)
    }

    pub async fn delete(&self, raw_id: &str) -> ResourceResult<()> {
        let id = self.parse_id(raw_id)?;
        let removed = self
            .store
            .delete_by_id(&self.schema.kind, &id)
            .await?
            .ok_or_else(|| self.not_found(&id))?;

        self.remove_attachment_of(&removed).await;
        Ok(())
    }

    /// Remove every record of this kind. Returns how many were removed.
    pub async fn delete_all(&self) -> ResourceResult<u64> {
        let removed = self.store.delete_many(&self.schema.kind).await?;
        for record in &removed {
            self.remove_attachment_of(record).await;
        }
        Ok(removed.len() as u64)
    }

    async fn remove_attachment_of(&self, record: &Record) {
        let path = self
            .schema
            .attachment_field()
            .and_then(|field| record.text(field));
        if let Some(path) = path {
            if is_managed(path) {
                self.attachments.delete(path).await;
            }
        }
    }

    fn parse_id(&self, raw_id: &str) -> ResourceResult<RecordId> {
        RecordId::parse(raw_id).ok_or_else(|| ResourceError::InvalidIdentifier {
            kind: self.schema.kind.clone(),
            id: raw_id.to_string(),
        })
    }

    fn not_found(&self, id: &RecordId) -> ResourceError {
        ResourceError::NotFound {
            kind: self.schema.kind.clone(),
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::resource::default_catalogue;
    use crate::store::{SqliteStore, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the real store and counts every call that reaches it
    struct CountingStore {
        inner: SqliteStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn insert(&self, kind: &str, record: &Record) -> StoreResult<()> {
            self.hit();
            self.inner.insert(kind, record).await
        }
        async fn find_page(&self, kind: &str, skip: u64, limit: u64) -> StoreResult<Vec<Record>> {
            self.hit();
            self.inner.find_page(kind, skip, limit).await
        }
        async fn count(&self, kind: &str) -> StoreResult<u64> {
            self.hit();
            self.inner.count(kind).await
        }
        async fn find_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>> {
            self.hit();
            self.inner.find_by_id(kind, id).await
        }
        async fn replace(&self, kind: &str, record: &Record) -> StoreResult<bool> {
            self.hit();
            self.inner.replace(kind, record).await
        }
        async fn delete_by_id(&self, kind: &str, id: &RecordId) -> StoreResult<Option<Record>> {
            self.hit();
            self.inner.delete_by_id(kind, id).await
        }
        async fn delete_many(&self, kind: &str) -> StoreResult<Vec<Record>> {
            self.hit();
            self.inner.delete_many(kind).await
        }
    }

    struct Fixture {
        repo: Arc<Repository>,
        store: Arc<CountingStore>,
        data_dir: tempfile::TempDir,
        _db_guard: tempfile::TempDir,
    }

    async fn fixture(kind: &str) -> Fixture {
        let (pool, db_guard) = db::create_test_connection_in_temporary_file().await.unwrap();
        db::init_database_schema(&pool).await.unwrap();
        let store = Arc::new(CountingStore {
            inner: SqliteStore::new(pool),
            calls: AtomicUsize::new(0),
        });
        let data_dir = tempfile::tempdir().unwrap();
        let schema = default_catalogue()
            .into_iter()
            .find(|s| s.kind == kind)
            .unwrap();
        let repo = Arc::new(Repository::new(
            schema,
            store.clone(),
            Arc::new(AttachmentStore::new(data_dir.path())),
            100,
        ));
        Fixture {
            repo,
            store,
            data_dir,
            _db_guard: db_guard,
        }
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn faq(n: usize) -> Fields {
        fields(json!({"question": format!("Question {}", n), "answer": "Yes"}))
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let f = fixture("courses").await;
        let created = f
            .repo
            .create(fields(json!({
                "title": "Beautician Training",
                "description": "Six month course",
                "image": "uploads/courses/x.png",
                "number": 1,
            })))
            .await
            .unwrap();

        let fetched = f.repo.get(created.id.as_str()).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.fields["number"], 1);
        let keys: Vec<&String> = fetched.fields.keys().collect();
        assert_eq!(keys, ["title", "description", "image", "number"]);
    }

    #[tokio::test]
    async fn test_create_reports_every_missing_field() {
        let f = fixture("courses").await;
        let err = f
            .repo
            .create(fields(json!({"description": "  ", "image": "a.png"})))
            .await
            .unwrap_err();
        match err {
            ResourceError::Validation(msg) => {
                assert!(msg.contains("title"), "{}", msg);
                assert!(msg.contains("description"), "{}", msg);
                assert!(!msg.contains("image"), "{}", msg);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(f.repo.list(None, None).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_list_pagination_math() {
        let f = fixture("faqs").await;
        for n in 0..23 {
            f.repo.create(faq(n)).await.unwrap();
        }

        let first = f.repo.list(None, None).await.unwrap();
        assert_eq!(first.total, 23);
        assert_eq!(first.limit, 10);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.data[0].fields["question"], "Question 22");

        let last = f.repo.list(Some(3), Some(10)).await.unwrap();
        assert_eq!(last.data.len(), 3);
        assert_eq!(last.data[2].fields["question"], "Question 0");

        let beyond = f.repo.list(Some(9), Some(10)).await.unwrap();
        assert!(beyond.data.is_empty());
        assert_eq!(beyond.total, 23);

        let seven = f.repo.list(Some(1), Some(7)).await.unwrap();
        assert_eq!(seven.total_pages, 4);
    }

    #[tokio::test]
    async fn test_list_clamps_and_defaults_limit() {
        let f = fixture("gallery").await;
        let defaulted = f.repo.list(Some(0), Some(0)).await.unwrap();
        assert_eq!(defaulted.page, 1);
        assert_eq!(defaulted.limit, 20);
        assert_eq!(defaulted.total_pages, 0);

        let clamped = f.repo.list(None, Some(10_000)).await.unwrap();
        assert_eq!(clamped.limit, 100);
    }

    #[tokio::test]
    async fn test_malformed_ids_never_reach_the_store() {
        let f = fixture("faqs").await;
        for raw in ["not-a-valid-id", "", "123", "zzzzzzzzzzzzzzzzzzzzzzzz"] {
            assert!(matches!(
                f.repo.get(raw).await,
                Err(ResourceError::InvalidIdentifier { .. })
            ));
            assert!(matches!(
                f.repo.update(raw, faq(1)).await,
                Err(ResourceError::InvalidIdentifier { .. })
            ));
            assert!(matches!(
                f.repo.delete(raw).await,
                Err(ResourceError::InvalidIdentifier { .. })
            ));
        }
        assert_eq!(f.store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_absent_ids_are_not_found() {
        let f = fixture("faqs").await;
        let absent = "0123456789abcdef01234567";
        assert!(matches!(f.repo.get(absent).await, Err(ResourceError::NotFound { .. })));
        assert!(matches!(
            f.repo.update(absent, faq(1)).await,
            Err(ResourceError::NotFound { .. })
        ));
        assert!(matches!(f.repo.delete(absent).await, Err(ResourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_second_delete_is_not_found() {
        let f = fixture("faqs").await;
        let record = f.repo.create(faq(1)).await.unwrap();
        f.repo.delete(record.id.as_str()).await.unwrap();
        assert!(matches!(
            f.repo.delete(record.id.as_str()).await,
            Err(ResourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_merges_shallowly() {
        let f = fixture("faqs").await;
        let record = f.repo.create(faq(1)).await.unwrap();

        let updated = f
            .repo
            .update(record.id.as_str(), fields(json!({"answer": "No", "order": 3})))
            .await
            .unwrap();
        assert_eq!(updated.fields["question"], "Question 1");
        assert_eq!(updated.fields["answer"], "No");
        assert_eq!(updated.fields["order"], 3);
        assert_eq!(updated.created_at, record.created_at);

        let err = f
            .repo
            .update(record.id.as_str(), fields(json!({"question": ""})))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation(_)));
        assert_eq!(f.repo.get(record.id.as_str()).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_replacing_attachment_removes_old_file() {
        let f = fixture("gallery").await;
        let attachments = AttachmentStore::new(f.data_dir.path());
        let schema = f.repo.schema().clone();
        let old = attachments.store(&schema, b"a", "a.png", "image/png").await.unwrap();
        let new = attachments.store(&schema, b"b", "b.png", "image/png").await.unwrap();

        let record = f
            .repo
            .create(fields(json!({"image": old, "caption": "Graduation"})))
            .await
            .unwrap();
        let updated = f
            .repo
            .update(record.id.as_str(), fields(json!({"image": new})))
            .await
            .unwrap();

        assert_eq!(updated.fields["caption"], "Graduation");
        assert!(!f.data_dir.path().join(&old).exists());
        assert!(f.data_dir.path().join(&new).exists());

        f.repo.delete(record.id.as_str()).await.unwrap();
        assert!(!f.data_dir.path().join(&new).exists());
    }

    #[tokio::test]
    async fn test_unchanged_or_external_attachment_is_kept() {
        let f = fixture("gallery").await;
        let attachments = AttachmentStore::new(f.data_dir.path());
        let path = attachments
            .store(f.repo.schema(), b"a", "a.png", "image/png")
            .await
            .unwrap();

        let record = f.repo.create(fields(json!({"image": path}))).await.unwrap();
        f.repo
            .update(record.id.as_str(), fields(json!({"image": path, "caption": "x"})))
            .await
            .unwrap();
        assert!(f.data_dir.path().join(&path).exists());

        let external = f
            .repo
            .create(fields(json!({"image": "https://cdn.example.org/a.png"})))
            .await
            .unwrap();
        f.repo.delete(external.id.as_str()).await.unwrap();
        assert!(f.data_dir.path().join(&path).exists());
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_attachment_is_already_gone() {
        let f = fixture("gallery").await;
        let record = f
            .repo
            .create(fields(json!({"image": "uploads/gallery/missing.png"})))
            .await
            .unwrap();
        f.repo.delete(record.id.as_str()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_one_kind() {
        let f = fixture("faqs").await;
        for n in 0..3 {
            f.repo.create(faq(n)).await.unwrap();
        }
        let other = Repository::new(
            default_catalogue().into_iter().find(|s| s.kind == "bank-details").unwrap(),
            f.store.clone(),
            Arc::new(AttachmentStore::new(f.data_dir.path())),
            100,
        );
        other
            .create(fields(json!({
                "bankName": "Bank",
                "accountName": "Org",
                "accountNumber": "0001",
            })))
            .await
            .unwrap();

        assert_eq!(f.repo.delete_all().await.unwrap(), 3);
        assert_eq!(f.repo.list(None, None).await.unwrap().total, 0);
        assert_eq!(other.list(None, None).await.unwrap().total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_of_distinct_records() {
        let f = fixture("faqs").await;
        let mut ids = Vec::new();
        for n in 0..40 {
            ids.push(f.repo.create(faq(n)).await.unwrap().id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let repo = f.repo.clone();
                tokio::spawn(async move { repo.delete(id.as_str()).await })
            })
            .collect();
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                panic!("concurrent delete failed: {:?}", e);
            }
        }
        assert_eq!(f.repo.list(None, None).await.unwrap().total, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_double_delete_yields_one_not_found() {
        let f = fixture("faqs").await;
        for n in 0..30 {
            let id = f.repo.create(faq(n)).await.unwrap().id;

            let first = {
                let repo = f.repo.clone();
                let id = id.clone();
                tokio::spawn(async move { repo.delete(id.as_str()).await })
            };
            let second = {
                let repo = f.repo.clone();
                tokio::spawn(async move { repo.delete(id.as_str()).await })
            };
            let outcomes = [first.await.unwrap(), second.await.unwrap()];

            let deleted = outcomes.iter().filter(|r| r.is_ok()).count();
            let not_found = outcomes
                .iter()
                .filter(|r| matches!(r, Err(ResourceError::NotFound { .. })))
                .count();
            assert_eq!((deleted, not_found), (1, 1), "round {}: {:?}", n, outcomes);
        }
        assert_eq!(f.repo.list(None, None).await.unwrap().total, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_all_races_with_single_deletes() {
        let f = fixture("faqs").await;
        let mut ids = Vec::new();
        for n in 0..20 {
            ids.push(f.repo.create(faq(n)).await.unwrap().id);
        }

        let bulk = {
            let repo = f.repo.clone();
            tokio::spawn(async move { repo.delete_all().await })
        };
        let singles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let repo = f.repo.clone();
                tokio::spawn(async move { repo.delete(id.as_str()).await })
            })
            .collect();

        let bulk_removed = bulk.await.unwrap().unwrap();
        let mut single_removed = 0;
        for handle in singles {
            match handle.await.unwrap() {
                Ok(()) => single_removed += 1,
                Err(ResourceError::NotFound { .. }) => {}
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }
        assert_eq!(bulk_removed + single_removed, 20);
    }
}
