use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::{self, ConfigError};
use crate::history_service::{HistoryService, ServiceError};
use crate::history_store::{StoreError, StoreLocation};
use crate::listeners::{InteractionListener, SearchListener, SuggestionListener, VoiceListener};
use crate::model::{now_epoch_millis, stamp_batch, SearchRecord};
use crate::search_view::{HostShell, SearchView, SearchViewOptions};
use crate::view_state::{CommitError, TrailingIcon, ViewState};
use crate::voice::{ListeningConfig, SpeechRecognizer, VoiceError};

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("usage: {0}")]
    Usage(String),
}

impl From<ServiceError> for RuntimeError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Config(error) => Self::Config(error),
            ServiceError::Store(error) => Self::Store(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Command {
    #[default]
    Interactive,
    Recent(usize),
    Prefix { term: String, limit: usize },
    Record(Vec<String>),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub in_memory: bool,
    pub command: Command,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, RuntimeError> {
    let mut options = RuntimeOptions::default();
    let mut rest = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--config needs a path".into()))?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--db" => {
                let path = iter
                    .next()
                    .ok_or_else(|| RuntimeError::Usage("--db needs a path".into()))?;
                options.db_path = Some(PathBuf::from(path));
            }
            "--memory" => options.in_memory = true,
            flag if flag.starts_with("--") => {
                return Err(RuntimeError::Usage(format!("unknown flag {flag}")));
            }
            _ => rest.push(arg.clone()),
        }
    }

    if options.in_memory && options.db_path.is_some() {
        return Err(RuntimeError::Usage(
            "--db and --memory cannot be combined".into(),
        ));
    }
    options.command = parse_command(&rest)?;
    Ok(options)
}

fn parse_command(words: &[String]) -> Result<Command, RuntimeError> {
    let Some((name, args)) = words.split_first() else {
        return Ok(Command::Interactive);
    };
    match name.as_str() {
        "recent" => Ok(Command::Recent(parse_limit(args.first())?)),
        "prefix" => {
            let term = args
                .first()
                .ok_or_else(|| RuntimeError::Usage("prefix needs a term".into()))?;
            Ok(Command::Prefix {
                term: term.clone(),
                limit: parse_limit(args.get(1))?,
            })
        }
        "record" if !args.is_empty() => Ok(Command::Record(args.to_vec())),
        "record" => Err(RuntimeError::Usage("record needs at least one term".into())),
        "clear" => Ok(Command::Clear),
        other => Err(RuntimeError::Usage(format!("unknown command {other}"))),
    }
}

fn parse_limit(raw: Option<&String>) -> Result<usize, RuntimeError> {
    match raw {
        None => Ok(DEFAULT_LIST_LIMIT),
        Some(raw) => raw
            .parse()
            .map_err(|_| RuntimeError::Usage(format!("invalid limit {raw}"))),
    }
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let mut cfg = config::load(options.config_path.as_deref())?;
    if options.config_path.is_none() && !cfg.config_path.exists() {
        config::save(&cfg)?;
        eprintln!(
            "[searchview-core] wrote default config to {}",
            cfg.config_path.display()
        );
    }
    if let Some(db_path) = options.db_path {
        cfg.history_db_path = db_path;
    }

    match crate::logging::init(&cfg.log_level) {
        Ok(log_path) => tracing::info!("logging to {}", log_path.display()),
        Err(error) => eprintln!("[searchview-core] logging unavailable: {error}"),
    }

    let history = if options.in_memory {
        HistoryService::open(StoreLocation::Memory, cfg.max_history_entries as usize)?
    } else {
        HistoryService::from_config(&cfg)?
    };
    tracing::info!(
        location = %history.location(),
        max_entries = history.max_entries(),
        "history store opened"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let sink = EventSink::stdout();

    match options.command {
        Command::Recent(limit) => {
            let records = runtime.block_on(history.query_recent(limit))?;
            emit_records(&sink, &records);
        }
        Command::Prefix { term, limit } => {
            let records = runtime.block_on(history.query_prefix(term, limit))?;
            emit_records(&sink, &records);
        }
        Command::Record(terms) => {
            let records = stamp_batch(&terms, now_epoch_millis());
            let recorded = runtime.block_on(history.insert_batch(records))?;
            sink.emit(&HostEvent::Recorded { count: recorded });
        }
        Command::Clear => {
            let removed = runtime.block_on(history.clear_history())?;
            sink.emit(&HostEvent::Cleared { count: removed });
        }
        Command::Interactive => {
            let options = SearchViewOptions::from(&cfg);
            let stdin = std::io::stdin();
            run_session(&runtime, history.clone(), options, stdin.lock(), &sink)?;
        }
    }

    history.close();
    Ok(())
}

fn emit_records(sink: &EventSink, records: &[SearchRecord]) {
    for record in records {
        sink.emit(&HostEvent::Record {
            term: record.term.clone(),
            timestamp: record.timestamp,
        });
    }
}

/// Everything the demo host prints, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    ShowKeyboard,
    HideKeyboard,
    ClearFocus,
    SetText { text: String },
    Suggestions { terms: Vec<String> },
    SearchCard,
    ListeningCard,
    PartialTranscript { text: String },
    TrailingIcon { icon: TrailingIcon },
    PermissionRequested,
    Search { term: String },
    VoiceSearch { term: String },
    VoiceError { error: VoiceError, code: u32 },
    FocusChanged { focused: bool },
    ClearClicked,
    MicClicked,
    NewSuggestions { terms: Vec<String> },
    State { state: ViewState, text: String },
    Record { term: String, timestamp: i64 },
    Recorded { count: usize },
    Cleared { count: usize },
    Error { message: String },
}

#[derive(Clone)]
pub struct EventSink {
    out: Arc<Mutex<dyn Write + Send>>,
}

impl EventSink {
    pub fn new(out: Arc<Mutex<dyn Write + Send>>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Arc::new(Mutex::new(std::io::stdout())))
    }

    pub fn emit(&self, event: &HostEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!("failed to encode host event: {error}");
                return;
            }
        };
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

fn terms_of(records: &[SearchRecord]) -> Vec<String> {
    records.iter().map(|record| record.term.clone()).collect()
}

struct ConsoleShell {
    sink: EventSink,
}

impl HostShell for ConsoleShell {
    fn show_keyboard(&mut self) {
        self.sink.emit(&HostEvent::ShowKeyboard);
    }

    fn hide_keyboard(&mut self) {
        self.sink.emit(&HostEvent::HideKeyboard);
    }

    fn clear_focus(&mut self) {
        self.sink.emit(&HostEvent::ClearFocus);
    }

    fn set_text(&mut self, text: &str) {
        self.sink.emit(&HostEvent::SetText {
            text: text.to_string(),
        });
    }

    fn show_suggestions(&mut self, records: &[SearchRecord]) {
        self.sink.emit(&HostEvent::Suggestions {
            terms: terms_of(records),
        });
    }

    fn show_search_card(&mut self) {
        self.sink.emit(&HostEvent::SearchCard);
    }

    fn show_listening_card(&mut self) {
        self.sink.emit(&HostEvent::ListeningCard);
    }

    fn show_partial_transcript(&mut self, text: &str) {
        self.sink.emit(&HostEvent::PartialTranscript {
            text: text.to_string(),
        });
    }

    fn set_trailing_icon(&mut self, icon: TrailingIcon) {
        self.sink.emit(&HostEvent::TrailingIcon { icon });
    }

    fn request_voice_permission(&mut self) {
        self.sink.emit(&HostEvent::PermissionRequested);
    }
}

struct ConsoleListener {
    sink: EventSink,
}

impl SearchListener for ConsoleListener {
    fn on_search(&self, term: &str) {
        self.sink.emit(&HostEvent::Search {
            term: term.to_string(),
        });
    }
}

impl InteractionListener for ConsoleListener {
    fn on_focus_changed(&self, focused: bool) {
        self.sink.emit(&HostEvent::FocusChanged { focused });
    }

    fn on_clear_clicked(&self) {
        self.sink.emit(&HostEvent::ClearClicked);
    }

    fn on_voice_button_click(&self) {
        self.sink.emit(&HostEvent::MicClicked);
    }
}

impl VoiceListener for ConsoleListener {
    fn on_voice_search(&self, term: &str) {
        self.sink.emit(&HostEvent::VoiceSearch {
            term: term.to_string(),
        });
    }

    fn on_voice_error(&self, error: VoiceError) {
        self.sink.emit(&HostEvent::VoiceError {
            error,
            code: error.code(),
        });
    }
}

impl SuggestionListener for ConsoleListener {
    fn on_new_suggestions(&self, records: &[SearchRecord]) {
        self.sink.emit(&HostEvent::NewSuggestions {
            terms: terms_of(records),
        });
    }
}

/// Stands in for a speech engine: transcripts are typed with `say`/`hear`.
struct ConsoleRecognizer;

impl SpeechRecognizer for ConsoleRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    fn permission_granted(&self) -> bool {
        true
    }

    fn start(&mut self, _config: &ListeningConfig) -> Result<(), i32> {
        Ok(())
    }

    fn stop(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Focus,
    Blur,
    Type(String),
    Submit,
    Select(usize),
    Clear,
    Mic,
    Say(String),
    Hear(String),
    VoiceError(i32),
    Back,
    State,
    Quit,
}

pub fn parse_session_command(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (name, arg) = match line.split_once(' ') {
        Some((name, arg)) => (name, arg),
        None => (line, ""),
    };
    match name {
        "focus" => Ok(SessionCommand::Focus),
        "blur" => Ok(SessionCommand::Blur),
        "type" => Ok(SessionCommand::Type(arg.to_string())),
        "submit" => Ok(SessionCommand::Submit),
        "select" => arg
            .trim()
            .parse()
            .map(SessionCommand::Select)
            .map_err(|_| format!("invalid suggestion index '{arg}'")),
        "clear" => Ok(SessionCommand::Clear),
        "mic" => Ok(SessionCommand::Mic),
        "say" => Ok(SessionCommand::Say(arg.to_string())),
        "hear" => Ok(SessionCommand::Hear(arg.to_string())),
        "voice-error" => arg
            .trim()
            .parse()
            .map(SessionCommand::VoiceError)
            .map_err(|_| format!("invalid recognizer code '{arg}'")),
        "back" => Ok(SessionCommand::Back),
        "state" => Ok(SessionCommand::State),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Drives one widget from line commands until `quit` or end of input.
pub fn run_session<R: BufRead>(
    runtime: &tokio::runtime::Runtime,
    history: HistoryService,
    options: SearchViewOptions,
    input: R,
    sink: &EventSink,
) -> Result<(), RuntimeError> {
    let mut view = SearchView::new(history, runtime.handle().clone(), options)
        .with_shell(Box::new(ConsoleShell { sink: sink.clone() }))
        .with_recognizer(Box::new(ConsoleRecognizer));

    let listener = Arc::new(ConsoleListener { sink: sink.clone() });
    let registries = view.listeners_mut();
    registries.search.add(listener.clone());
    registries.interaction.add(listener.clone());
    registries.voice.add(listener.clone());
    registries.suggestions.add(listener);

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_session_command(&line) {
            Ok(command) => command,
            Err(message) => {
                sink.emit(&HostEvent::Error { message });
                continue;
            }
        };
        if command == SessionCommand::Quit {
            break;
        }
        apply_session_command(&mut view, command, sink);
        while runtime.block_on(view.next_suggestions()).is_some() {}
    }

    runtime.block_on(view.flush_writes());
    view.teardown();
    Ok(())
}

fn apply_session_command(view: &mut SearchView, command: SessionCommand, sink: &EventSink) {
    match command {
        SessionCommand::Focus => view.focus_changed(true),
        SessionCommand::Blur => view.focus_changed(false),
        SessionCommand::Type(text) => view.text_changed(&text),
        SessionCommand::Submit => report(sink, view.submit()),
        SessionCommand::Select(index) => report(sink, view.select_suggestion(index)),
        SessionCommand::Clear => view.clear_clicked(),
        SessionCommand::Mic => view.mic_clicked(),
        SessionCommand::Say(text) => view.voice_partial(&text),
        SessionCommand::Hear(text) => view.voice_results(&[text]),
        SessionCommand::VoiceError(code) => view.voice_error(code),
        SessionCommand::Back => {
            view.back_pressed();
        }
        SessionCommand::State => sink.emit(&HostEvent::State {
            state: view.state(),
            text: view.text().to_string(),
        }),
        SessionCommand::Quit => {}
    }
}

fn report(sink: &EventSink, outcome: Result<(), CommitError>) {
    if let Err(error) = outcome {
        sink.emit(&HostEvent::Error {
            message: error.to_string(),
        });
    }
}
