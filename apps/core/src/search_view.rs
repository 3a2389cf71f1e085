use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::history_service::HistoryService;
use crate::history_store::StoreError;
use crate::listeners::ListenerRegistries;
use crate::model::{normalize_term, now_epoch_millis, stamp_batch, SearchRecord};
use crate::suggestion_coordinator::{SuggestionQueryCoordinator, SuggestionUpdate, DEFAULT_DEBOUNCE};
use crate::view_state::{CommitError, Effect, SearchViewStateMachine, TrailingIcon, ViewState};
use crate::voice::{SpeechRecognizer, VoiceError, VoiceSearchBridge};

/// The host UI the widget drives. Every method defaults to doing nothing.
pub trait HostShell {
    fn show_keyboard(&mut self) {}

    fn hide_keyboard(&mut self) {}

    fn clear_focus(&mut self) {}

    fn set_text(&mut self, _text: &str) {}

    fn show_suggestions(&mut self, _records: &[SearchRecord]) {}

    fn show_search_card(&mut self) {}

    fn show_listening_card(&mut self) {}

    fn show_partial_transcript(&mut self, _text: &str) {}

    fn set_trailing_icon(&mut self, _icon: TrailingIcon) {}

    fn request_voice_permission(&mut self) {}
}

pub struct NoopShell;

impl HostShell for NoopShell {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchViewOptions {
    pub history_enabled: bool,
    pub voice_enabled: bool,
    pub suggestion_limit: usize,
    pub debounce: Duration,
}

impl Default for SearchViewOptions {
    fn default() -> Self {
        Self {
            history_enabled: true,
            voice_enabled: true,
            suggestion_limit: 5,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl From<&Config> for SearchViewOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            history_enabled: cfg.history_enabled,
            voice_enabled: cfg.voice_enabled,
            suggestion_limit: usize::from(cfg.max_suggestions_shown),
            debounce: cfg.debounce(),
        }
    }
}

pub struct SearchView {
    machine: SearchViewStateMachine,
    coordinator: SuggestionQueryCoordinator,
    history: HistoryService,
    runtime: Handle,
    voice: VoiceSearchBridge,
    shell: Box<dyn HostShell>,
    listeners: ListenerRegistries,
    suggestions: Vec<SearchRecord>,
    suggestion_limit: usize,
    history_enabled: bool,
    pending_writes: Vec<JoinHandle<()>>,
    last_stamp: i64,
}

impl SearchView {
    pub fn new(history: HistoryService, runtime: Handle, options: SearchViewOptions) -> Self {
        let coordinator = SuggestionQueryCoordinator::new(
            Arc::new(history.clone()),
            runtime.clone(),
            options.debounce,
        );
        Self {
            machine: SearchViewStateMachine::default(),
            coordinator,
            history,
            runtime,
            voice: VoiceSearchBridge::new(options.voice_enabled),
            shell: Box::new(NoopShell),
            listeners: ListenerRegistries::default(),
            suggestions: Vec::new(),
            suggestion_limit: options.suggestion_limit,
            history_enabled: options.history_enabled,
            pending_writes: Vec::new(),
            last_stamp: 0,
        }
    }

    pub fn with_shell(mut self, shell: Box<dyn HostShell>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn SpeechRecognizer>) -> Self {
        self.voice.attach(recognizer);
        self
    }

    pub fn state(&self) -> ViewState {
        self.machine.state()
    }

    pub fn text(&self) -> &str {
        self.machine.text()
    }

    pub fn suggestions(&self) -> &[SearchRecord] {
        &self.suggestions
    }

    pub fn suggestion_limit(&self) -> usize {
        self.suggestion_limit
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn voice(&self) -> &VoiceSearchBridge {
        &self.voice
    }

    pub fn listeners(&self) -> &ListenerRegistries {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistries {
        &mut self.listeners
    }

    pub fn text_changed(&mut self, text: &str) {
        let effects = self.machine.on_text_changed(text);
        self.apply(effects);
    }

    pub fn focus_changed(&mut self, focused: bool) {
        let effects = self.machine.on_focus_changed(focused);
        self.apply(effects);
    }

    /// Commits whatever is in the field.
    pub fn submit(&mut self) -> Result<(), CommitError> {
        let term = self.machine.text().to_string();
        self.search(&term)
    }

    pub fn search(&mut self, term: &str) -> Result<(), CommitError> {
        let effects = self.machine.commit(term)?;
        self.apply(effects);
        Ok(())
    }

    pub fn select_suggestion(&mut self, index: usize) -> Result<(), CommitError> {
        let term = self
            .suggestions
            .get(index)
            .map(|record| record.term.clone())
            .ok_or(CommitError::UnknownSuggestion(index))?;
        self.search(&term)
    }

    pub fn clear_clicked(&mut self) {
        let effects = self.machine.on_clear_clicked();
        self.apply(effects);
    }

    pub fn mic_clicked(&mut self) {
        let readiness = self.voice.readiness();
        if readiness == Err(VoiceError::PermissionNeeded) {
            self.shell.request_voice_permission();
        }
        let effects = self.machine.on_mic_tapped(readiness);
        self.apply(effects);
    }

    pub fn permission_result(&mut self, granted: bool) {
        let readiness = self.voice.permission_result(granted);
        let effects = self.machine.on_permission_result(readiness);
        self.apply(effects);
    }

    pub fn voice_partial(&mut self, text: &str) {
        let Some(transcript) = self.voice.on_partial(text).map(str::to_string) else {
            return;
        };
        let effects = self.machine.on_voice_partial(&transcript);
        self.apply(effects);
    }

    /// Final recognizer candidates, best first.
    pub fn voice_results<S: AsRef<str>>(&mut self, candidates: &[S]) {
        let effects = match self.voice.on_final(candidates) {
            Ok(term) => self.machine.on_voice_final(&term),
            Err(error) => self.machine.on_voice_error(error),
        };
        self.apply(effects);
    }

    /// Raw recognizer error code.
    pub fn voice_error(&mut self, code: i32) {
        let error = self.voice.on_error(code);
        let effects = self.machine.on_voice_error(error);
        self.apply(effects);
    }

    pub fn back_pressed(&mut self) -> bool {
        let (handled, effects) = self.machine.back();
        self.apply(effects);
        handled
    }

    pub fn close(&mut self) {
        let effects = self.machine.close();
        self.apply(effects);
    }

    /// Replaces the field text as if the host had set it.
    pub fn set_search_term(&mut self, term: &str) {
        self.shell.set_text(term);
        self.text_changed(term);
    }

    /// Shows a caller-supplied list in place of history suggestions.
    pub fn set_suggestions(&mut self, records: Vec<SearchRecord>) {
        self.coordinator.cancel_all();
        self.show(records);
    }

    /// Stores `terms` in one batch, newest first in the order given.
    pub fn persist_suggestions<S: AsRef<str>>(&mut self, terms: &[S]) {
        if !self.history_enabled {
            return;
        }
        if terms.is_empty() {
            return;
        }
        let records = stamp_batch(terms, self.next_stamp());
        if records.is_empty() {
            return;
        }
        let history = self.history.clone();
        self.spawn_write(async move {
            if let Err(error) = history.insert_batch(records).await {
                tracing::warn!("failed to persist suggestions: {error}");
            }
        });
    }

    pub fn set_suggestion_limit(&mut self, limit: usize) {
        self.suggestion_limit = limit;
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.coordinator.set_debounce(debounce);
    }

    /// Turning history off stops lookups, empties the list and deletes the
    /// stored history. The shared store itself stays open, so turning history
    /// back on starts from empty.
    pub fn set_history_enabled(&mut self, enabled: bool) {
        if self.history_enabled == enabled {
            return;
        }
        self.history_enabled = enabled;
        if enabled {
            return;
        }

        self.coordinator.cancel_all();
        self.show(Vec::new());
        let history = self.history.clone();
        self.spawn_write(async move {
            match history.delete_all().await {
                Ok(removed) => tracing::info!(removed, "history disabled, stored searches deleted"),
                Err(error) => tracing::warn!("failed to delete history: {error}"),
            }
        });
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) {
        self.voice.set_enabled(enabled);
        if !enabled && self.machine.state() == ViewState::VoiceListening {
            self.close();
        }
    }

    pub async fn clear_history(&mut self) -> Result<usize, StoreError> {
        self.flush_writes().await;
        self.coordinator.cancel_all();
        let removed = self.history.clear_history().await?;
        self.show(Vec::new());
        tracing::info!(removed, "search history cleared");
        Ok(removed)
    }

    pub async fn all_searches(&self, limit: Option<usize>) -> Result<Vec<SearchRecord>, StoreError> {
        self.history.query_all(limit).await
    }

    /// Delivers every suggestion result that is ready, without waiting.
    /// Returns how many lists were shown.
    pub fn poll_suggestions(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(update) = self.coordinator.try_next() {
            self.deliver(update);
            delivered += 1;
        }
        delivered
    }

    /// Waits for the next suggestion result. `None` when no lookup is pending.
    pub async fn next_suggestions(&mut self) -> Option<Vec<SearchRecord>> {
        let update = self.coordinator.next_update().await?;
        self.deliver(update);
        Some(self.suggestions.clone())
    }

    pub fn pending_writes(&self) -> usize {
        self.pending_writes
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Waits for every fire-and-forget write issued so far.
    pub async fn flush_writes(&mut self) {
        for handle in self.pending_writes.drain(..) {
            if let Err(error) = handle.await {
                tracing::warn!("history write task failed: {error}");
            }
        }
    }

    /// Cancels lookups, detaches the recognizer and drops all listeners. The
    /// history handle is shared and stays open.
    pub fn teardown(&mut self) {
        self.coordinator.cancel_all();
        self.voice.detach();
        self.listeners.clear_all();
        self.suggestions.clear();
    }

    fn deliver(&mut self, update: SuggestionUpdate) {
        if !self.history_enabled {
            return;
        }
        tracing::debug!(
            kind = ?update.kind,
            generation = update.generation,
            count = update.records.len(),
            "suggestions delivered"
        );
        self.show(update.records);
    }

    fn show(&mut self, mut records: Vec<SearchRecord>) {
        records.truncate(self.suggestion_limit);
        self.suggestions = records;
        self.shell.show_suggestions(&self.suggestions);
        self.listeners.notify_new_suggestions(&self.suggestions);
    }

    fn persist(&mut self, term: &str) {
        if !self.history_enabled {
            return;
        }
        let Some(term) = normalize_term(term) else {
            return;
        };
        let record = SearchRecord::new(&term, self.next_stamp());
        let history = self.history.clone();
        self.spawn_write(async move {
            if let Err(error) = history.insert(record).await {
                tracing::warn!("failed to persist search: {error}");
            }
        });
    }

    /// Wall-clock millis, never at or below the previous stamp, so recency
    /// order survives a clock stepping backwards.
    fn next_stamp(&mut self) -> i64 {
        self.last_stamp = now_epoch_millis().max(self.last_stamp.saturating_add(1));
        self.last_stamp
    }

    fn spawn_write<F>(&mut self, write: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        // Writes land in the order they were issued.
        let earlier: Vec<JoinHandle<()>> = self
            .pending_writes
            .drain(..)
            .filter(|handle| !handle.is_finished())
            .collect();
        let handle = self.runtime.spawn(async move {
            for handle in earlier {
                if let Err(error) = handle.await {
                    tracing::warn!("history write task failed: {error}");
                }
            }
            write.await;
        });
        self.pending_writes.push(handle);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelQuery(kind) => self.coordinator.cancel(kind),
                Effect::CancelAllQueries => self.coordinator.cancel_all(),
                Effect::RequestRecent => {
                    if self.history_enabled {
                        self.coordinator.request_recent(self.suggestion_limit);
                    }
                }
                Effect::RequestFiltered { term, debounce } => {
                    if !self.history_enabled {
                        continue;
                    }
                    if debounce {
                        self.coordinator.request_filtered(&term, self.suggestion_limit);
                    } else {
                        self.coordinator
                            .request_filtered_now(&term, self.suggestion_limit);
                    }
                }
                Effect::ClearSuggestions => {
                    self.suggestions.clear();
                    self.shell.show_suggestions(&[]);
                }
                Effect::ShowSearchCard => self.shell.show_search_card(),
                Effect::ShowListeningCard => self.shell.show_listening_card(),
                Effect::StartVoiceCapture => {
                    if let Err(error) = self.voice.start_listening() {
                        let followup = self.machine.on_voice_error(error);
                        self.apply(followup);
                    }
                }
                Effect::StopVoiceCapture => self.voice.stop_listening(),
                Effect::ShowPartialTranscript(text) => self.shell.show_partial_transcript(&text),
                Effect::OpenKeyboard => self.shell.show_keyboard(),
                Effect::CloseKeyboard => self.shell.hide_keyboard(),
                Effect::ClearFocus => self.shell.clear_focus(),
                Effect::ClearText => self.shell.set_text(""),
                Effect::SetText(text) => self.shell.set_text(&text),
                Effect::SetTrailingIcon(icon) => self.shell.set_trailing_icon(icon),
                Effect::PersistSearch(term) => self.persist(&term),
                Effect::NotifySearch(term) => self.listeners.notify_search(&term),
                Effect::NotifyVoiceSearch(term) => self.listeners.notify_voice_search(&term),
                Effect::NotifyVoiceError(error) => self.listeners.notify_voice_error(error),
                Effect::NotifyFocusChanged(focused) => {
                    self.listeners.notify_focus_changed(focused)
                }
                Effect::NotifyClearClicked => self.listeners.notify_clear_clicked(),
                Effect::NotifyMicClicked => self.listeners.notify_mic_clicked(),
            }
        }
    }
}
