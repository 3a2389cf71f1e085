use std::sync::Arc;

use crate::model::SearchRecord;
use crate::voice::VoiceError;

pub trait SearchListener: Send + Sync {
    fn on_search(&self, term: &str);
}

/// Focus, button and commit interaction with the field.
pub trait InteractionListener: Send + Sync {
    fn on_focus_changed(&self, _focused: bool) {}

    fn on_clear_clicked(&self) {}

    /// Every mic tap, whether or not voice search can start.
    fn on_voice_button_click(&self) {}

    fn on_search(&self, _term: &str) {}
}

pub trait VoiceListener: Send + Sync {
    fn on_voice_search(&self, _term: &str) {}

    fn on_voice_error(&self, error: VoiceError);
}

pub trait SuggestionListener: Send + Sync {
    fn on_new_suggestions(&self, records: &[SearchRecord]);
}

impl<F> SearchListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_search(&self, term: &str) {
        self(term)
    }
}

impl<F> SuggestionListener for F
where
    F: Fn(&[SearchRecord]) + Send + Sync,
{
    fn on_new_suggestions(&self, records: &[SearchRecord]) {
        self(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct Registry<L: ?Sized> {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<L>)>,
}

impl<L: ?Sized> Default for Registry<L> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<L: ?Sized> Registry<L> {
    pub fn add(&mut self, listener: Arc<L>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners in registration order, detached from the registry so it can
    /// be changed while they are being called.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

#[derive(Default)]
pub struct ListenerRegistries {
    pub search: Registry<dyn SearchListener>,
    pub interaction: Registry<dyn InteractionListener>,
    pub voice: Registry<dyn VoiceListener>,
    pub suggestions: Registry<dyn SuggestionListener>,
}

impl ListenerRegistries {
    /// Search listeners first, then interaction listeners.
    pub fn notify_search(&self, term: &str) {
        for listener in self.search.snapshot() {
            listener.on_search(term);
        }
        for listener in self.interaction.snapshot() {
            listener.on_search(term);
        }
    }

    pub fn notify_voice_search(&self, term: &str) {
        for listener in self.voice.snapshot() {
            listener.on_voice_search(term);
        }
    }

    pub fn notify_voice_error(&self, error: VoiceError) {
        for listener in self.voice.snapshot() {
            listener.on_voice_error(error);
        }
    }

    pub fn notify_focus_changed(&self, focused: bool) {
        for listener in self.interaction.snapshot() {
            listener.on_focus_changed(focused);
        }
    }

    pub fn notify_clear_clicked(&self) {
        for listener in self.interaction.snapshot() {
            listener.on_clear_clicked();
        }
    }

    pub fn notify_mic_clicked(&self) {
        for listener in self.interaction.snapshot() {
            listener.on_voice_button_click();
        }
    }

    pub fn notify_new_suggestions(&self, records: &[SearchRecord]) {
        for listener in self.suggestions.snapshot() {
            listener.on_new_suggestions(records);
        }
    }

    pub fn clear_all(&mut self) {
        self.search.clear();
        self.interaction.clear();
        self.voice.clear();
        self.suggestions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_empty()
            && self.interaction.is_empty()
            && self.voice.is_empty()
            && self.suggestions.is_empty()
    }
}
