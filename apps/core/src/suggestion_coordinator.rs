use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::history_store::StoreError;
use crate::model::{QueryKind, SearchRecord};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub type RecordsFuture = Pin<Box<dyn Future<Output = Result<Vec<SearchRecord>, StoreError>> + Send>>;

/// Where suggestion lookups are answered from.
pub trait SuggestionSource: Send + Sync {
    fn recent(&self, limit: usize) -> RecordsFuture;

    fn prefix(&self, term: String, limit: usize) -> RecordsFuture;
}

/// One finished lookup, tagged with the generation of the request that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionUpdate {
    pub kind: QueryKind,
    pub term: Option<String>,
    pub generation: u64,
    pub records: Vec<SearchRecord>,
}

struct QueryHandle {
    generation: u64,
    term: Option<String>,
    limit: usize,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl QueryHandle {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
        tracing::trace!(
            generation = self.generation,
            term = ?self.term,
            limit = self.limit,
            "suggestion query cancelled"
        );
    }
}

/// Keeps at most one outstanding query per [`QueryKind`] and filters out
/// results of superseded or cancelled requests.
pub struct SuggestionQueryCoordinator {
    source: Arc<dyn SuggestionSource>,
    runtime: Handle,
    debounce: Duration,
    next_generation: u64,
    recent: Option<QueryHandle>,
    prefix: Option<QueryHandle>,
    updates_tx: mpsc::UnboundedSender<SuggestionUpdate>,
    updates_rx: mpsc::UnboundedReceiver<SuggestionUpdate>,
}

impl SuggestionQueryCoordinator {
    pub fn new(source: Arc<dyn SuggestionSource>, runtime: Handle, debounce: Duration) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            source,
            runtime,
            debounce,
            next_generation: 0,
            recent: None,
            prefix: None,
            updates_tx,
            updates_rx,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    pub fn has_pending(&self, kind: QueryKind) -> bool {
        self.slot(kind).is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.recent.is_none() && self.prefix.is_none()
    }

    /// Issues a recent-history lookup right away, replacing any outstanding
    /// recent or prefix query.
    pub fn request_recent(&mut self, limit: usize) -> u64 {
        self.cancel(QueryKind::Prefix);
        self.start(QueryKind::Recent, None, limit, Duration::ZERO)
    }

    /// Restarts the debounce timer for a prefix lookup of `term`.
    pub fn request_filtered(&mut self, term: &str, limit: usize) -> u64 {
        let delay = self.debounce;
        self.start(QueryKind::Prefix, Some(term.to_string()), limit, delay)
    }

    pub fn request_filtered_now(&mut self, term: &str, limit: usize) -> u64 {
        self.start(QueryKind::Prefix, Some(term.to_string()), limit, Duration::ZERO)
    }

    pub fn cancel(&mut self, kind: QueryKind) {
        if let Some(handle) = self.slot_mut(kind).take() {
            handle.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel(QueryKind::Recent);
        self.cancel(QueryKind::Prefix);
    }

    /// Returns the next update whose request is still current, without
    /// waiting. Stale updates are discarded.
    pub fn try_next(&mut self) -> Option<SuggestionUpdate> {
        while let Ok(update) = self.updates_rx.try_recv() {
            if self.accept(&update) {
                return Some(update);
            }
        }
        None
    }

    /// Waits for the next current update. Returns `None` straight away when
    /// no query is outstanding.
    pub async fn next_update(&mut self) -> Option<SuggestionUpdate> {
        loop {
            if self.is_idle() {
                return self.try_next();
            }
            let update = self.updates_rx.recv().await?;
            if self.accept(&update) {
                return Some(update);
            }
        }
    }

    fn start(&mut self, kind: QueryKind, term: Option<String>, limit: usize, delay: Duration) -> u64 {
        self.cancel(kind);
        self.next_generation += 1;
        let generation = self.next_generation;

        let cancelled = Arc::new(AtomicBool::new(false));
        let task = self.runtime.spawn(run_query(
            Arc::clone(&self.source),
            self.updates_tx.clone(),
            Arc::clone(&cancelled),
            kind,
            term.clone(),
            limit,
            generation,
            delay,
        ));

        *self.slot_mut(kind) = Some(QueryHandle {
            generation,
            term,
            limit,
            cancelled,
            task,
        });
        generation
    }

    fn accept(&mut self, update: &SuggestionUpdate) -> bool {
        let slot = self.slot_mut(update.kind);
        let current = slot
            .as_ref()
            .is_some_and(|handle| handle.generation == update.generation);
        if current {
            slot.take();
        } else {
            tracing::trace!(generation = update.generation, "dropping stale suggestions");
        }
        current
    }

    fn slot(&self, kind: QueryKind) -> &Option<QueryHandle> {
        match kind {
            QueryKind::Recent => &self.recent,
            QueryKind::Prefix => &self.prefix,
        }
    }

    fn slot_mut(&mut self, kind: QueryKind) -> &mut Option<QueryHandle> {
        match kind {
            QueryKind::Recent => &mut self.recent,
            QueryKind::Prefix => &mut self.prefix,
        }
    }
}

impl Drop for SuggestionQueryCoordinator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_query(
    source: Arc<dyn SuggestionSource>,
    updates: mpsc::UnboundedSender<SuggestionUpdate>,
    cancelled: Arc<AtomicBool>,
    kind: QueryKind,
    term: Option<String>,
    limit: usize,
    generation: u64,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if cancelled.load(Ordering::SeqCst) {
        return;
    }

    let lookup = match (kind, &term) {
        (QueryKind::Prefix, Some(term)) => source.prefix(term.clone(), limit),
        _ => source.recent(limit),
    };
    // Suggestions are best-effort: a failed lookup shows an empty list.
    let records = lookup.await.unwrap_or_else(|error| {
        tracing::warn!("suggestion lookup failed: {error}");
        Vec::new()
    });

    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    let _ = updates.send(SuggestionUpdate {
        kind,
        term,
        generation,
        records,
    });
}

#[cfg(test)]
mod tests {
    use super::{SuggestionQueryCoordinator, SuggestionSource, SuggestionUpdate};
    use crate::history_store::StoreError;
    use crate::model::{QueryKind, SearchRecord};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct FailingSource;

    impl SuggestionSource for FailingSource {
        fn recent(&self, _limit: usize) -> super::RecordsFuture {
            Box::pin(async { Err::<Vec<SearchRecord>, _>(StoreError::StoreClosed) })
        }

        fn prefix(&self, _term: String, _limit: usize) -> super::RecordsFuture {
            Box::pin(async { Err::<Vec<SearchRecord>, _>(StoreError::StoreClosed) })
        }
    }

    #[tokio::test]
    async fn store_failure_delivers_empty_list() {
        let mut coordinator = SuggestionQueryCoordinator::new(
            Arc::new(FailingSource),
            Handle::current(),
            Duration::ZERO,
        );
        let generation = coordinator.request_recent(5);

        let update = coordinator.next_update().await.unwrap();
        assert_eq!(
            update,
            SuggestionUpdate {
                kind: QueryKind::Recent,
                term: None,
                generation,
                records: Vec::<SearchRecord>::new(),
            }
        );
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn idle_coordinator_does_not_wait() {
        let mut coordinator = SuggestionQueryCoordinator::new(
            Arc::new(FailingSource),
            Handle::current(),
            Duration::ZERO,
        );
        assert!(coordinator.next_update().await.is_none());
    }
}
