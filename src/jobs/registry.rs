use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::record::{JobId, JobRecord};
use crate::conversation::ConversationReference;
use crate::error::{HeraldError, Result};
use crate::storage::StateStore;

/// Bot-scope key holding the whole job snapshot.
pub const JOBS_KEY: &str = "bot/jobs";

type JobLog = BTreeMap<JobId, JobRecord>;

/// Durable map of job id to [`JobRecord`], shared by every conversation.
///
/// Each mutation reads the full snapshot, applies the change and writes it back
/// conditioned on the version it read. A concurrent writer makes the write fail
/// with a conflict, and the mutation is replayed against a fresh snapshot.
/// No update is silently lost as long as the storage checks and writes
/// atomically; both backends do, [`FileStorage`](crate::storage::FileStorage)
/// across processes via its per-key file lock.
#[derive(Clone)]
pub struct JobRegistry {
    state: StateStore,
    max_attempts: u32,
}

impl JobRegistry {
    pub fn new(state: StateStore, max_attempts: u32) -> Self {
        Self {
            state,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a job under a freshly allocated id.
    pub async fn create(&self, reference: ConversationReference) -> Result<JobRecord> {
        let record = self
            .mutate(|jobs| {
                let id = next_id(jobs, Utc::now().timestamp_millis());
                let record = JobRecord::new(id, reference.clone());
                jobs.insert(id, record.clone());
                Ok(record)
            })
            .await?;
        info!(job_id = %record.id, conversation = %record.reference, "job created");
        Ok(record)
    }

    /// Creates a job under a caller-chosen id. An existing id is reported as
    /// [`HeraldError::DuplicateJob`] and nothing is written.
    pub async fn create_with_id(
        &self,
        id: JobId,
        reference: ConversationReference,
    ) -> Result<JobRecord> {
        let record = self
            .mutate(|jobs| {
                if jobs.contains_key(&id) {
                    return Err(HeraldError::DuplicateJob(id));
                }
                let record = JobRecord::new(id, reference.clone());
                jobs.insert(id, record.clone());
                Ok(record)
            })
            .await?;
        info!(job_id = %id, conversation = %record.reference, "job created");
        Ok(record)
    }

    pub async fn lookup(&self, id: JobId) -> Result<Option<JobRecord>> {
        let snapshot = self.state.load::<JobLog>(JOBS_KEY).await?;
        Ok(snapshot.value.get(&id).cloned())
    }

    /// All jobs, ordered by id.
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let snapshot = self.state.load::<JobLog>(JOBS_KEY).await?;
        Ok(snapshot.value.into_values().collect())
    }

    /// Transitions a job to completed. Fails with [`HeraldError::JobNotFound`]
    /// for an unknown id and [`HeraldError::AlreadyCompleted`] when it was
    /// completed before.
    pub async fn mark_complete(&self, id: JobId) -> Result<JobRecord> {
        let record = self
            .mutate(|jobs| {
                let record = jobs.get_mut(&id).ok_or(HeraldError::JobNotFound(id))?;
                if !record.complete() {
                    return Err(HeraldError::AlreadyCompleted(id));
                }
                Ok(record.clone())
            })
            .await?;
        info!(job_id = %id, "job marked complete");
        Ok(record)
    }

    async fn mutate<T, F>(&self, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut JobLog) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            let mut snapshot = self.state.load::<JobLog>(JOBS_KEY).await?;
            let out = apply(&mut snapshot.value)?;
            match self.state.save(JOBS_KEY, &mut snapshot).await {
                Ok(()) => return Ok(out),
                Err(err) if err.is_conflict() && attempt < self.max_attempts => {
                    debug!(attempt, "job log changed underneath us, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "failed to persist job log");
                    return Err(err.into());
                }
            }
        }
    }
}

/// Next id: the current time in milliseconds, bumped past the highest id in
/// use so two jobs created within the same millisecond still differ.
fn next_id(jobs: &JobLog, now_millis: i64) -> JobId {
    let now = u64::try_from(now_millis).unwrap_or(0);
    let floor = jobs
        .keys()
        .next_back()
        .map(|id| id.0.saturating_add(1))
        .unwrap_or(0);
    JobId(now.max(floor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Account;
    use crate::error::StorageError;
    use crate::storage::{MemoryStorage, Precondition, Storage, StoreItem};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn reference(conversation: &str) -> ConversationReference {
        ConversationReference {
            channel_id: "cli".into(),
            conversation_id: conversation.into(),
            user: Account::new("ada"),
            bot: Account::new("herald"),
        }
    }

    fn registry() -> JobRegistry {
        JobRegistry::new(StateStore::new(Arc::new(MemoryStorage::new())), 5)
    }

    /// Rejects the first `failures` writes with a version conflict.
    struct ContendedStorage {
        inner: MemoryStorage,
        failures: AtomicU32,
    }

    #[async_trait]
    impl Storage for ContendedStorage {
        async fn read(&self, key: &str) -> std::result::Result<Option<StoreItem>, StorageError> {
            self.inner.read(key).await
        }

        async fn write(
            &self,
            key: &str,
            value: Value,
            precondition: Precondition,
        ) -> std::result::Result<u64, StorageError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Conflict { key: key.into() });
            }
            self.inner.write(key, value, precondition).await
        }

        async fn append(
            &self,
            key: &str,
            values: Vec<Value>,
        ) -> std::result::Result<(), StorageError> {
            self.inner.append(key, values).await
        }

        async fn drain(&self, key: &str) -> std::result::Result<Vec<Value>, StorageError> {
            self.inner.drain(key).await
        }
    }

    fn contended(failures: u32, max_attempts: u32) -> JobRegistry {
        let storage = ContendedStorage {
            inner: MemoryStorage::new(),
            failures: AtomicU32::new(failures),
        };
        JobRegistry::new(StateStore::new(Arc::new(storage)), max_attempts)
    }

    #[tokio::test]
    async fn create_adds_pending_record() {
        let registry = registry();
        let record = registry.create(reference("c1")).await.unwrap();

        assert!(!record.completed);
        assert_eq!(registry.lookup(record.id).await.unwrap(), Some(record));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rapid_creates_get_distinct_ids() {
        let registry = registry();
        let mut ids = Vec::new();
        for _ in 0..20 {
            ids.push(registry.create(reference("c1")).await.unwrap().id);
        }
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(unique.len(), 20);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_without_mutation() {
        let registry = registry();
        registry.create_with_id(JobId(1), reference("c1")).await.unwrap();

        let err = registry
            .create_with_id(JobId(1), reference("c2"))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::DuplicateJob(JobId(1))));

        let jobs = registry.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].reference.conversation_id, "c1");
    }

    #[tokio::test]
    async fn mark_complete_is_monotonic() {
        let registry = registry();
        registry.create_with_id(JobId(1), reference("c1")).await.unwrap();

        let done = registry.mark_complete(JobId(1)).await.unwrap();
        assert!(done.completed);

        let err = registry.mark_complete(JobId(1)).await.unwrap_err();
        assert!(matches!(err, HeraldError::AlreadyCompleted(JobId(1))));
        assert!(registry.lookup(JobId(1)).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn mark_complete_unknown_id() {
        let registry = registry();
        let err = registry.mark_complete(JobId(9999)).await.unwrap_err();
        assert!(matches!(err, HeraldError::JobNotFound(JobId(9999))));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_one_job_leaves_others_alone() {
        let registry = registry();
        for id in 1..=3 {
            registry.create_with_id(JobId(id), reference("c1")).await.unwrap();
        }
        registry.mark_complete(JobId(2)).await.unwrap();

        let flags: Vec<(u64, bool)> = registry
            .list()
            .await
            .unwrap()
            .iter()
            .map(|r| (r.id.0, r.completed))
            .collect();
        assert_eq!(flags, vec![(1, false), (2, true), (3, false)]);
    }

    #[tokio::test]
    async fn conflict_is_retried() {
        let registry = contended(2, 5);
        let record = registry.create(reference("c1")).await.unwrap();
        assert_eq!(registry.lookup(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn persistent_conflict_surfaces_as_persist_error() {
        let registry = contended(10, 3);
        let err = registry.create(reference("c1")).await.unwrap_err();
        assert!(matches!(err, HeraldError::PersistStore(_)));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[test]
    fn next_id_never_goes_backwards() {
        let mut jobs = JobLog::new();
        assert_eq!(next_id(&jobs, 1_000), JobId(1_000));

        jobs.insert(JobId(5_000), JobRecord::new(JobId(5_000), reference("c1")));
        assert_eq!(next_id(&jobs, 1_000), JobId(5_001));
        assert_eq!(next_id(&jobs, 9_000), JobId(9_000));
        assert_eq!(next_id(&JobLog::new(), -5), JobId(0));
    }
}
