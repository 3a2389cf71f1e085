use crate::model::{normalize_term, QueryKind};
use crate::voice::VoiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    #[default]
    Default,
    FocusedEmpty,
    FocusedTextPresent,
    FocusedTextPresentPendingSearch,
    UnfocusedTextPresent,
    VoiceListening,
}

impl ViewState {
    pub fn is_focused(self) -> bool {
        matches!(
            self,
            Self::FocusedEmpty | Self::FocusedTextPresent | Self::FocusedTextPresentPendingSearch
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingIcon {
    Mic,
    Clear,
}

/// Work the widget has to carry out after an event. Emitted in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CancelQuery(QueryKind),
    CancelAllQueries,
    RequestRecent,
    /// `debounce: false` issues the prefix query right away.
    RequestFiltered { term: String, debounce: bool },
    ClearSuggestions,
    ShowSearchCard,
    ShowListeningCard,
    StartVoiceCapture,
    StopVoiceCapture,
    ShowPartialTranscript(String),
    OpenKeyboard,
    CloseKeyboard,
    ClearFocus,
    ClearText,
    SetText(String),
    SetTrailingIcon(TrailingIcon),
    PersistSearch(String),
    NotifySearch(String),
    NotifyVoiceSearch(String),
    NotifyVoiceError(VoiceError),
    NotifyFocusChanged(bool),
    NotifyClearClicked,
    NotifyMicClicked,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("search term is empty")]
    EmptyTerm,
    #[error("no suggestion at position {0}")]
    UnknownSuggestion(usize),
}

#[derive(Debug, Default)]
pub struct SearchViewStateMachine {
    state: ViewState,
    text: String,
    focused: bool,
}

impl SearchViewStateMachine {
    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn on_text_changed(&mut self, text: &str) -> Vec<Effect> {
        self.text = text.to_string();
        let has_text = !text.trim().is_empty();

        if self.state == ViewState::VoiceListening {
            return Vec::new();
        }

        if !self.focused {
            // Programmatic text updates: only the resting state follows the text.
            return match (self.state, has_text) {
                (ViewState::Default, true) => self.transition(ViewState::UnfocusedTextPresent),
                (ViewState::UnfocusedTextPresent, false) => self.transition(ViewState::Default),
                _ => Vec::new(),
            };
        }

        if !has_text {
            return self.transition(ViewState::FocusedEmpty);
        }

        let mut effects = self.transition(ViewState::FocusedTextPresentPendingSearch);
        effects.push(Effect::RequestFiltered {
            term: self.text.clone(),
            debounce: true,
        });
        effects
    }

    /// Gaining focus settles the state from the current text, whatever state
    /// the field was left in when it last lost focus.
    pub fn on_focus_changed(&mut self, focused: bool) -> Vec<Effect> {
        let was_focused = self.focused;
        self.focused = focused;
        let mut effects = vec![Effect::NotifyFocusChanged(focused)];
        if !focused
            || self.state == ViewState::VoiceListening
            || (was_focused && self.state.is_focused())
        {
            return effects;
        }

        let target = if self.text.trim().is_empty() {
            ViewState::FocusedEmpty
        } else {
            ViewState::FocusedTextPresent
        };
        if !was_focused {
            effects.push(Effect::ShowSearchCard);
            effects.push(Effect::OpenKeyboard);
        }
        effects.extend(self.transition(target));
        effects
    }

    pub fn on_clear_clicked(&mut self) -> Vec<Effect> {
        if self.state == ViewState::VoiceListening {
            return Vec::new();
        }

        self.text.clear();
        let mut effects = vec![Effect::NotifyClearClicked, Effect::ClearText];
        let target = if self.focused {
            ViewState::FocusedEmpty
        } else {
            ViewState::Default
        };
        effects.extend(self.transition(target));
        effects
    }

    /// `readiness` is the voice bridge's verdict for this tap. Interaction
    /// listeners hear about the tap before readiness is acted on.
    pub fn on_mic_tapped(&mut self, readiness: Result<(), VoiceError>) -> Vec<Effect> {
        let mut effects = vec![Effect::NotifyMicClicked];
        match readiness {
            Ok(()) => effects.extend(self.transition(ViewState::VoiceListening)),
            Err(error) => effects.push(Effect::NotifyVoiceError(error)),
        }
        effects
    }

    /// Outcome of a permission request. Unlike a tap, nothing is reported to
    /// interaction listeners.
    pub fn on_permission_result(&mut self, readiness: Result<(), VoiceError>) -> Vec<Effect> {
        match readiness {
            Ok(()) => self.transition(ViewState::VoiceListening),
            Err(error) => vec![Effect::NotifyVoiceError(error)],
        }
    }

    pub fn on_voice_partial(&mut self, transcript: &str) -> Vec<Effect> {
        if self.state != ViewState::VoiceListening {
            return Vec::new();
        }
        vec![Effect::ShowPartialTranscript(transcript.to_string())]
    }

    /// A final transcript commits it as a search. A blank one counts as
    /// [`VoiceError::NoResults`].
    pub fn on_voice_final(&mut self, transcript: &str) -> Vec<Effect> {
        if self.state != ViewState::VoiceListening {
            return Vec::new();
        }
        let Some(term) = normalize_term(transcript) else {
            return self.on_voice_error(VoiceError::NoResults);
        };

        let mut effects = vec![Effect::NotifyVoiceSearch(term.clone())];
        effects.extend(self.commit_normalized(term));
        effects
    }

    /// Errors arriving outside of a listening session are dropped, so one
    /// failed attempt produces exactly one notification.
    pub fn on_voice_error(&mut self, error: VoiceError) -> Vec<Effect> {
        if self.state != ViewState::VoiceListening {
            tracing::debug!(?error, "voice error outside listening session ignored");
            return Vec::new();
        }
        let mut effects = vec![Effect::NotifyVoiceError(error)];
        effects.extend(self.transition(ViewState::Default));
        effects
    }

    pub fn commit(&mut self, term: &str) -> Result<Vec<Effect>, CommitError> {
        let term = normalize_term(term).ok_or(CommitError::EmptyTerm)?;
        Ok(self.commit_normalized(term))
    }

    /// Returns `(handled, effects)`. Back is not handled in the default state.
    pub fn back(&mut self) -> (bool, Vec<Effect>) {
        if self.state == ViewState::Default {
            return (false, Vec::new());
        }
        (true, self.close())
    }

    pub fn close(&mut self) -> Vec<Effect> {
        self.transition(ViewState::Default)
    }

    fn commit_normalized(&mut self, term: String) -> Vec<Effect> {
        let mut effects = self.transition(ViewState::UnfocusedTextPresent);
        if self.text != term {
            self.text = term.clone();
            effects.push(Effect::SetText(term.clone()));
        }
        effects.push(Effect::PersistSearch(term.clone()));
        effects.push(Effect::NotifySearch(term));
        effects
    }

    fn transition(&mut self, target: ViewState) -> Vec<Effect> {
        if self.state == target {
            return Vec::new();
        }
        tracing::debug!(from = ?self.state, to = ?target, "search view transition");

        let mut effects = Vec::new();
        if self.state == ViewState::VoiceListening {
            effects.push(Effect::StopVoiceCapture);
            effects.push(Effect::ShowSearchCard);
        }
        self.state = target;
        if !target.is_focused() {
            self.focused = false;
        }

        match target {
            ViewState::Default => {
                self.text.clear();
                effects.extend([
                    Effect::CancelAllQueries,
                    Effect::ClearSuggestions,
                    Effect::CloseKeyboard,
                    Effect::ClearText,
                    Effect::ClearFocus,
                    Effect::SetTrailingIcon(TrailingIcon::Mic),
                ]);
            }
            ViewState::FocusedEmpty => effects.extend([
                Effect::CancelQuery(QueryKind::Prefix),
                Effect::ClearSuggestions,
                Effect::RequestRecent,
                Effect::SetTrailingIcon(TrailingIcon::Mic),
            ]),
            ViewState::FocusedTextPresent => effects.extend([
                Effect::RequestFiltered {
                    term: self.text.clone(),
                    debounce: false,
                },
                Effect::SetTrailingIcon(TrailingIcon::Clear),
            ]),
            ViewState::FocusedTextPresentPendingSearch => effects.extend([
                Effect::CancelQuery(QueryKind::Recent),
                Effect::SetTrailingIcon(TrailingIcon::Clear),
            ]),
            ViewState::UnfocusedTextPresent => effects.extend([
                Effect::CancelAllQueries,
                Effect::ClearSuggestions,
                Effect::CloseKeyboard,
                Effect::ClearFocus,
                Effect::SetTrailingIcon(TrailingIcon::Clear),
            ]),
            ViewState::VoiceListening => effects.extend([
                Effect::CancelAllQueries,
                Effect::ClearSuggestions,
                Effect::CloseKeyboard,
                Effect::ShowListeningCard,
                Effect::StartVoiceCapture,
            ]),
        }
        effects
    }
}
