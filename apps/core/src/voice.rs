use serde::Serialize;

/// Recognizer error codes the bridge tells apart. Anything else is reported
/// as [`VoiceError::Unavailable`].
pub const RECOGNIZER_SPEECH_TIMEOUT: i32 = 6;
pub const RECOGNIZER_NO_MATCH: i32 = 7;
pub const RECOGNIZER_INSUFFICIENT_PERMISSIONS: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum VoiceError {
    #[error("voice search is unavailable")]
    Unavailable,
    #[error("no host context to start voice search from")]
    MissingContext,
    #[error("record-audio permission is needed")]
    PermissionNeeded,
    #[error("record-audio permission was denied")]
    PermissionDenied,
    #[error("voice search produced no results")]
    NoResults,
}

impl VoiceError {
    pub fn code(self) -> u32 {
        match self {
            Self::Unavailable => 100,
            Self::MissingContext => 110,
            Self::PermissionNeeded => 120,
            Self::PermissionDenied => 130,
            Self::NoResults => 140,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            100 => Some(Self::Unavailable),
            110 => Some(Self::MissingContext),
            120 => Some(Self::PermissionNeeded),
            130 => Some(Self::PermissionDenied),
            140 => Some(Self::NoResults),
            _ => None,
        }
    }

    pub fn from_recognizer_code(code: i32) -> Self {
        match code {
            RECOGNIZER_SPEECH_TIMEOUT | RECOGNIZER_NO_MATCH => Self::NoResults,
            RECOGNIZER_INSUFFICIENT_PERMISSIONS => Self::PermissionDenied,
            _ => Self::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListeningConfig {
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub partial_results: bool,
    pub max_results: u32,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            language: None,
            prompt: None,
            partial_results: true,
            max_results: 1,
        }
    }
}

/// Host speech-recognition capability.
pub trait SpeechRecognizer: Send {
    fn is_available(&self) -> bool;

    fn permission_granted(&self) -> bool;

    /// Starts capture. `Err` carries the recognizer's numeric error code.
    fn start(&mut self, config: &ListeningConfig) -> Result<(), i32>;

    fn stop(&mut self);
}

pub struct VoiceSearchBridge {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    config: ListeningConfig,
    enabled: bool,
    listening: bool,
    transcript: String,
}

impl VoiceSearchBridge {
    pub fn new(enabled: bool) -> Self {
        Self {
            recognizer: None,
            config: ListeningConfig::default(),
            enabled,
            listening: false,
            transcript: String::new(),
        }
    }

    pub fn attach(&mut self, recognizer: Box<dyn SpeechRecognizer>) {
        self.detach();
        self.recognizer = Some(recognizer);
    }

    /// Stops any capture in progress and drops the recognizer.
    pub fn detach(&mut self) {
        self.stop_listening();
        self.recognizer = None;
    }

    pub fn is_attached(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop_listening();
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn listening_config(&self) -> &ListeningConfig {
        &self.config
    }

    pub fn set_listening_config(&mut self, config: ListeningConfig) {
        self.config = config;
    }

    pub fn readiness(&self) -> Result<(), VoiceError> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            return Err(VoiceError::MissingContext);
        };
        if !self.enabled {
            return Err(VoiceError::Unavailable);
        }
        if !recognizer.permission_granted() {
            return Err(VoiceError::PermissionNeeded);
        }
        if !recognizer.is_available() {
            return Err(VoiceError::Unavailable);
        }
        Ok(())
    }

    pub fn start_listening(&mut self) -> Result<(), VoiceError> {
        self.readiness()?;
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or(VoiceError::MissingContext)?;
        recognizer.start(&self.config).map_err(|code| {
            tracing::warn!(code, "speech recognizer refused to start");
            VoiceError::from_recognizer_code(code)
        })?;
        self.listening = true;
        self.transcript.clear();
        tracing::debug!("voice capture started");
        Ok(())
    }

    pub fn stop_listening(&mut self) {
        if !self.listening {
            return;
        }
        self.listening = false;
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
    }

    /// Appends a partial hypothesis to the running transcript and returns the
    /// transcript so far. Ignored when no capture is running.
    pub fn on_partial(&mut self, text: &str) -> Option<&str> {
        if !self.listening {
            return None;
        }
        self.transcript.push_str(text);
        Some(&self.transcript)
    }

    /// Ends the session with the recognizer's candidates, best first.
    pub fn on_final<S: AsRef<str>>(&mut self, candidates: &[S]) -> Result<String, VoiceError> {
        self.listening = false;
        candidates
            .iter()
            .map(|candidate| candidate.as_ref().trim())
            .find(|candidate| !candidate.is_empty())
            .map(str::to_string)
            .ok_or(VoiceError::NoResults)
    }

    pub fn on_error(&mut self, code: i32) -> VoiceError {
        self.listening = false;
        let error = VoiceError::from_recognizer_code(code);
        tracing::warn!(code, ?error, "voice search failed");
        error
    }

    /// Answer to a permission request made after [`VoiceError::PermissionNeeded`].
    /// A refusal is reported as `PermissionDenied`, a grant re-checks readiness.
    pub fn permission_result(&self, granted: bool) -> Result<(), VoiceError> {
        if !granted {
            return Err(VoiceError::PermissionDenied);
        }
        self.readiness()
    }
}

#[cfg(test)]
mod tests {
    use super::VoiceError;

    #[test]
    fn codes_round_trip_through_numeric_form() {
        for error in [
            VoiceError::Unavailable,
            VoiceError::MissingContext,
            VoiceError::PermissionNeeded,
            VoiceError::PermissionDenied,
            VoiceError::NoResults,
        ] {
            assert_eq!(VoiceError::from_code(error.code()), Some(error));
        }
        assert_eq!(VoiceError::from_code(101), None);
    }

    #[test]
    fn recognizer_codes_collapse_to_voice_errors() {
        assert_eq!(VoiceError::from_recognizer_code(6), VoiceError::NoResults);
        assert_eq!(VoiceError::from_recognizer_code(7), VoiceError::NoResults);
        assert_eq!(VoiceError::from_recognizer_code(9), VoiceError::PermissionDenied);
        assert_eq!(VoiceError::from_recognizer_code(2), VoiceError::Unavailable);
        assert_eq!(VoiceError::from_recognizer_code(-1), VoiceError::Unavailable);
    }
}
