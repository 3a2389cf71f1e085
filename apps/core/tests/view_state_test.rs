use searchview_core::model::QueryKind;
use searchview_core::view_state::{
    CommitError, Effect, SearchViewStateMachine, TrailingIcon, ViewState,
};
use searchview_core::voice::VoiceError;

fn count(effects: &[Effect], wanted: &Effect) -> usize {
    effects.iter().filter(|effect| *effect == wanted).count()
}

#[test]
fn focus_with_empty_text_requests_recent_exactly_once() {
    let mut machine = SearchViewStateMachine::default();
    assert_eq!(machine.state(), ViewState::Default);

    let effects = machine.on_focus_changed(true);
    assert_eq!(machine.state(), ViewState::FocusedEmpty);
    assert_eq!(count(&effects, &Effect::RequestRecent), 1);

    let again = machine.on_focus_changed(true);
    assert_eq!(machine.state(), ViewState::FocusedEmpty);
    assert_eq!(count(&again, &Effect::RequestRecent), 0);
    assert_eq!(again, vec![Effect::NotifyFocusChanged(true)]);
}

#[test]
fn focus_with_text_filters_immediately() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_text_changed("rust");
    assert_eq!(machine.state(), ViewState::UnfocusedTextPresent);

    let effects = machine.on_focus_changed(true);
    assert_eq!(machine.state(), ViewState::FocusedTextPresent);
    assert!(effects.contains(&Effect::RequestFiltered {
        term: "rust".to_string(),
        debounce: false,
    }));
    assert_eq!(count(&effects, &Effect::RequestRecent), 0);
}

#[test]
fn typing_moves_to_pending_search_and_debounces() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);

    let effects = machine.on_text_changed("c");
    assert_eq!(machine.state(), ViewState::FocusedTextPresentPendingSearch);
    assert_eq!(
        effects,
        vec![
            Effect::CancelQuery(QueryKind::Recent),
            Effect::SetTrailingIcon(TrailingIcon::Clear),
            Effect::RequestFiltered {
                term: "c".to_string(),
                debounce: true,
            },
        ]
    );
}

#[test]
fn erasing_text_returns_to_recent_history() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed("ca");

    let effects = machine.on_text_changed("");
    assert_eq!(machine.state(), ViewState::FocusedEmpty);
    assert_eq!(
        effects,
        vec![
            Effect::CancelQuery(QueryKind::Prefix),
            Effect::ClearSuggestions,
            Effect::RequestRecent,
            Effect::SetTrailingIcon(TrailingIcon::Mic),
        ]
    );
}

#[test]
fn commit_moves_to_unfocused_and_persists() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed(" weather ");

    let effects = machine.commit(" weather ").unwrap();
    assert_eq!(machine.state(), ViewState::UnfocusedTextPresent);
    assert!(!machine.is_focused());
    assert!(effects.contains(&Effect::CancelAllQueries));
    assert!(effects.contains(&Effect::ClearSuggestions));
    assert!(effects.contains(&Effect::CloseKeyboard));
    assert!(effects.contains(&Effect::SetText("weather".to_string())));
    assert_eq!(
        effects[effects.len() - 2..],
        [
            Effect::PersistSearch("weather".to_string()),
            Effect::NotifySearch("weather".to_string()),
        ]
    );
}

#[test]
fn repeated_commit_still_persists_and_notifies() {
    let mut machine = SearchViewStateMachine::default();
    machine.commit("rust").unwrap();

    let effects = machine.commit("rust").unwrap();
    assert_eq!(
        effects,
        vec![
            Effect::PersistSearch("rust".to_string()),
            Effect::NotifySearch("rust".to_string()),
        ]
    );
}

#[test]
fn empty_commit_is_rejected_without_effects() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);

    assert_eq!(machine.commit(""), Err(CommitError::EmptyTerm));
    assert_eq!(machine.commit("   "), Err(CommitError::EmptyTerm));
    assert_eq!(machine.state(), ViewState::FocusedEmpty);
}

#[test]
fn clear_button_empties_text_and_requests_recent() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed("tok");

    let effects = machine.on_clear_clicked();
    assert_eq!(machine.state(), ViewState::FocusedEmpty);
    assert_eq!(machine.text(), "");
    assert_eq!(effects[0], Effect::NotifyClearClicked);
    assert_eq!(effects[1], Effect::ClearText);
    assert_eq!(count(&effects, &Effect::RequestRecent), 1);
}

#[test]
fn losing_focus_only_notifies() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed("abc");

    let effects = machine.on_focus_changed(false);
    assert_eq!(effects, vec![Effect::NotifyFocusChanged(false)]);
    assert_eq!(machine.state(), ViewState::FocusedTextPresentPendingSearch);
}

#[test]
fn mic_ready_starts_listening() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);

    let effects = machine.on_mic_tapped(Ok(()));
    assert_eq!(machine.state(), ViewState::VoiceListening);
    assert_eq!(
        effects,
        vec![
            Effect::NotifyMicClicked,
            Effect::CancelAllQueries,
            Effect::ClearSuggestions,
            Effect::CloseKeyboard,
            Effect::ShowListeningCard,
            Effect::StartVoiceCapture,
        ]
    );
    assert!(!machine.is_focused());
    assert_eq!(machine.on_mic_tapped(Ok(())), vec![Effect::NotifyMicClicked]);
}

#[test]
fn mic_not_ready_notifies_and_stays() {
    let mut machine = SearchViewStateMachine::default();
    let effects = machine.on_mic_tapped(Err(VoiceError::PermissionNeeded));
    assert_eq!(
        effects,
        vec![
            Effect::NotifyMicClicked,
            Effect::NotifyVoiceError(VoiceError::PermissionNeeded),
        ]
    );
    assert_eq!(machine.state(), ViewState::Default);
}

#[test]
fn voice_error_while_listening_returns_to_default_once() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_mic_tapped(Ok(()));

    let effects = machine.on_voice_error(VoiceError::Unavailable);
    assert_eq!(machine.state(), ViewState::Default);
    assert_eq!(
        count(&effects, &Effect::NotifyVoiceError(VoiceError::Unavailable)),
        1
    );
    assert!(effects.contains(&Effect::StopVoiceCapture));

    assert!(machine.on_voice_error(VoiceError::Unavailable).is_empty());
}

#[test]
fn partial_transcripts_only_show_while_listening() {
    let mut machine = SearchViewStateMachine::default();
    assert!(machine.on_voice_partial("hel").is_empty());

    machine.on_mic_tapped(Ok(()));
    assert_eq!(
        machine.on_voice_partial("hel"),
        vec![Effect::ShowPartialTranscript("hel".to_string())]
    );
    assert_eq!(machine.state(), ViewState::VoiceListening);
}

#[test]
fn final_transcript_commits_as_voice_search() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_mic_tapped(Ok(()));

    let effects = machine.on_voice_final("pizza near me");
    assert_eq!(machine.state(), ViewState::UnfocusedTextPresent);
    assert_eq!(
        effects[0],
        Effect::NotifyVoiceSearch("pizza near me".to_string())
    );
    assert!(effects.contains(&Effect::PersistSearch("pizza near me".to_string())));
    assert!(effects.contains(&Effect::NotifySearch("pizza near me".to_string())));
}

#[test]
fn blank_final_transcript_is_no_results() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_mic_tapped(Ok(()));

    let effects = machine.on_voice_final("  ");
    assert_eq!(machine.state(), ViewState::Default);
    assert_eq!(effects[0], Effect::NotifyVoiceError(VoiceError::NoResults));
}

#[test]
fn back_resets_to_default_and_reports_handled() {
    let mut machine = SearchViewStateMachine::default();
    assert_eq!(machine.back(), (false, Vec::new()));

    machine.on_focus_changed(true);
    machine.on_text_changed("abc");
    let (handled, effects) = machine.back();
    assert!(handled);
    assert_eq!(machine.state(), ViewState::Default);
    assert_eq!(machine.text(), "");
    assert!(effects.contains(&Effect::CancelAllQueries));
    assert!(effects.contains(&Effect::ClearText));
    assert!(effects.contains(&Effect::ClearFocus));
    assert!(effects.contains(&Effect::SetTrailingIcon(TrailingIcon::Mic)));
}

#[test]
fn programmatic_text_while_unfocused_does_not_query() {
    let mut machine = SearchViewStateMachine::default();
    let effects = machine.on_text_changed("preset");
    assert_eq!(machine.state(), ViewState::UnfocusedTextPresent);
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::RequestFiltered { .. } | Effect::RequestRecent)));

    machine.on_text_changed("");
    assert_eq!(machine.state(), ViewState::Default);
}

#[test]
fn refocus_after_blur_settles_state_from_text() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_focus_changed(false);
    assert_eq!(machine.state(), ViewState::FocusedEmpty);

    machine.on_text_changed("cat");
    let effects = machine.on_focus_changed(true);

    assert_eq!(machine.state(), ViewState::FocusedTextPresent);
    assert!(effects.contains(&Effect::OpenKeyboard));
    assert_eq!(
        count(
            &effects,
            &Effect::RequestFiltered {
                term: "cat".to_string(),
                debounce: false,
            }
        ),
        1
    );
}

#[test]
fn refocus_after_blur_with_text_erased_shows_recent() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed("cat");
    machine.on_focus_changed(false);

    machine.on_text_changed("");
    let effects = machine.on_focus_changed(true);

    assert_eq!(machine.state(), ViewState::FocusedEmpty);
    assert_eq!(count(&effects, &Effect::RequestRecent), 1);
}

#[test]
fn repeated_focus_while_typing_keeps_debounce() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_focus_changed(true);
    machine.on_text_changed("ca");

    let effects = machine.on_focus_changed(true);
    assert_eq!(effects, vec![Effect::NotifyFocusChanged(true)]);
    assert_eq!(machine.state(), ViewState::FocusedTextPresentPendingSearch);
}

#[test]
fn voice_error_clears_focus_reported_while_listening() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_mic_tapped(Ok(()));
    machine.on_focus_changed(true);
    assert!(machine.is_focused());

    machine.on_voice_error(VoiceError::NoResults);
    assert_eq!(machine.state(), ViewState::Default);
    assert!(!machine.is_focused());

    let effects = machine.on_focus_changed(true);
    assert!(effects.contains(&Effect::OpenKeyboard));
    assert_eq!(count(&effects, &Effect::RequestRecent), 1);
}

#[test]
fn permission_grant_starts_listening_without_second_click() {
    let mut machine = SearchViewStateMachine::default();
    machine.on_mic_tapped(Err(VoiceError::PermissionNeeded));

    let effects = machine.on_permission_result(Ok(()));
    assert_eq!(machine.state(), ViewState::VoiceListening);
    assert_eq!(count(&effects, &Effect::NotifyMicClicked), 0);
    assert!(effects.contains(&Effect::StartVoiceCapture));
}
