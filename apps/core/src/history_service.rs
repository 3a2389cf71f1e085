use std::sync::Arc;

use crate::config::{validate, Config, ConfigError};
use crate::history_store::{HistoryStore, StoreError, StoreLocation};
use crate::model::SearchRecord;
use crate::suggestion_coordinator::{RecordsFuture, SuggestionSource};

/// Cloneable handle to one shared [`HistoryStore`]. Every call runs on the
/// blocking pool so the caller's thread never waits on SQLite.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<HistoryStore>,
    location: StoreLocation,
    max_entries: usize,
}

impl HistoryService {
    pub fn open(location: StoreLocation, max_entries: usize) -> Result<Self, StoreError> {
        let store = HistoryStore::open(&location)?;
        Ok(Self {
            store: Arc::new(store),
            location,
            max_entries,
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(StoreLocation::Memory, usize::MAX)
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        validate(config)?;
        let service = Self::open(
            StoreLocation::File(config.history_db_path.clone()),
            config.max_history_entries as usize,
        )?;
        Ok(service)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn is_open(&self) -> bool {
        self.store.is_open()
    }

    /// Inserts one record and trims the history to the retention cap.
    pub async fn insert(&self, record: SearchRecord) -> Result<bool, StoreError> {
        let max_entries = self.max_entries;
        self.run(move |store| {
            let inserted = store.insert(&record)?;
            if inserted {
                store.prune(max_entries)?;
            }
            Ok(inserted)
        })
        .await
    }

    pub async fn insert_batch(&self, records: Vec<SearchRecord>) -> Result<usize, StoreError> {
        let max_entries = self.max_entries;
        self.run(move |store| {
            let inserted = store.insert_batch(&records)?;
            if inserted > 0 {
                store.prune(max_entries)?;
            }
            Ok(inserted)
        })
        .await
    }

    pub async fn query_recent(&self, limit: usize) -> Result<Vec<SearchRecord>, StoreError> {
        self.run(move |store| store.query_recent(limit)).await
    }

    pub async fn query_prefix(
        &self,
        term: String,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, StoreError> {
        self.run(move |store| store.query_prefix(&term, limit)).await
    }

    /// Every stored search, newest first, capped at `limit`.
    pub async fn query_all(&self, limit: Option<usize>) -> Result<Vec<SearchRecord>, StoreError> {
        self.query_recent(limit.unwrap_or(usize::MAX)).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.run(|store| store.count()).await
    }

    pub async fn delete_all(&self) -> Result<usize, StoreError> {
        self.run(|store| store.delete_all()).await
    }

    /// Deletes every record, then re-runs `init` for the same location.
    pub async fn clear_history(&self) -> Result<usize, StoreError> {
        let location = self.location.clone();
        self.run(move |store| {
            let removed = store.delete_all()?;
            store.init(&location)?;
            Ok(removed)
        })
        .await
    }

    pub fn close(&self) {
        self.store.close();
    }

    pub fn reopen(&self) -> Result<(), StoreError> {
        self.store.init(&self.location)
    }

    async fn run<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&HistoryStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || job(&store))
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

impl SuggestionSource for HistoryService {
    fn recent(&self, limit: usize) -> RecordsFuture {
        let service = self.clone();
        Box::pin(async move { service.query_recent(limit).await })
    }

    fn prefix(&self, term: String, limit: usize) -> RecordsFuture {
        let service = self.clone();
        Box::pin(async move { service.query_prefix(term, limit).await })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
