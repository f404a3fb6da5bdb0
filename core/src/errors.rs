use thiserror::Error;

/// Faults raised by the settings store, the model registry and the template
/// loader. Generation failures are values, see [`GenerationFailure`].
#[derive(Debug, Error)]
pub enum QuillError {
    #[error("Settings store unavailable: {0}")]
    SettingsUnavailable(String),
    #[error("Settings could not be encoded or decoded: {0}")]
    SettingsFormat(String),
    #[error("No custom model at index {index} (have {len})")]
    ModelIndexOutOfRange { index: usize, len: usize },
    #[error("Template folder could not be read: {0}")]
    TemplateIo(String),
}

impl QuillError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SettingsUnavailable(_) => "CFG-1001",
            Self::SettingsFormat(_) => "CFG-1002",
            Self::ModelIndexOutOfRange { .. } => "CFG-1003",
            Self::TemplateIo(_) => "TPL-1001",
        }
    }
    pub fn explain(&self) -> &'static str {
        match self {
            Self::SettingsUnavailable(_) => "The settings database could not be reached.",
            Self::SettingsFormat(_) => "Persisted settings were not valid JSON or base64.",
            Self::ModelIndexOutOfRange { .. } => "Only user-added models can be removed, by position.",
            Self::TemplateIo(_) => "The template folder exists but listing or reading it failed.",
        }
    }
}

impl From<r2d2::Error> for QuillError {
    fn from(err: r2d2::Error) -> Self {
        Self::SettingsUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for QuillError {
    fn from(err: rusqlite::Error) -> Self {
        Self::SettingsUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        Self::SettingsFormat(err.to_string())
    }
}

/// Category of a failed generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MissingCredential,
    UnknownModel,
    TransportError,
    MalformedResponse,
    EmptyContent,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "GEN-1001",
            Self::UnknownModel => "GEN-1002",
            Self::TransportError => "GEN-1003",
            Self::MalformedResponse => "GEN-1004",
            Self::EmptyContent => "GEN-1005",
        }
    }
    pub fn explain(&self) -> &'static str {
        match self {
            Self::MissingCredential => "No API key is configured for the model's provider.",
            Self::UnknownModel => "The model id is neither built in nor user-added.",
            Self::TransportError => "The provider could not be reached or rejected the request.",
            Self::MalformedResponse => "The provider answered with an unexpected response shape.",
            Self::EmptyContent => "The provider answered successfully but generated no text.",
        }
    }
}

/// A typed failure carried by [`crate::agents::GenerationOutcome::Failure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl GenerationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_credential(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MissingCredential, message)
    }

    pub fn unknown_model(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnknownModel, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn empty_content(message: impl Into<String>) -> Self {
        Self::new(FailureKind::EmptyContent, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_are_distinct() {
        let kinds = [
            FailureKind::MissingCredential,
            FailureKind::UnknownModel,
            FailureKind::TransportError,
            FailureKind::MalformedResponse,
            FailureKind::EmptyContent,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn failure_displays_its_message() {
        let failure = GenerationFailure::transport("connection reset");
        assert_eq!(failure.to_string(), "connection reset");
        assert_eq!(failure.kind, FailureKind::TransportError);
    }
}
