use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::repository::{ApplicationRecord, ApplicationRepository, BlobStore, RepositoryError};
use crate::workflows::onboarding::domain::{ApplicationId, StorageKey};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl InMemoryApplicationRepository {
    pub fn len(&self) -> usize {
        self.records.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn modify<T, E>(
        &self,
        id: &ApplicationId,
        apply: impl FnOnce(&mut ApplicationRecord) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let mut guard = lock(&self.records)?;
        let stored = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let mut draft = stored.clone();
        let outcome = apply(&mut draft)?;
        *stored = draft;
        Ok(outcome)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard.get(id).cloned())
    }

    fn latest_incomplete(&self, email: &str) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard
            .values()
            .filter(|record| !record.submitted && record.email.eq_ignore_ascii_case(email))
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.application_id.cmp(&b.application_id))
            })
            .cloned())
    }
}

/// Keeps uploaded bytes in memory under `<folder>/<sequence>-<file name>` keys.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryBlobStore {
    pub fn get(&self, key: &StorageKey) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|guard| guard.get(&key.0).cloned())
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StorageKey, RepositoryError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let folder = folder.trim_matches('/');
        let file_name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
        let key = if folder.is_empty() {
            format!("{sequence:06}-{file_name}")
        } else {
            format!("{folder}/{sequence:06}-{file_name}")
        };

        lock(&self.blobs)?.insert(key.clone(), bytes);
        Ok(StorageKey(key))
    }
}
