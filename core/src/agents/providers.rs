//! Provider kinds and the built-in model catalogue.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The three remote backends a model can be served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenRouter chat-completions aggregator.
    Aggregator,
    /// Gemini `generateContent` API.
    SingleTurn,
    /// DeepSeek OpenAI-compatible chat API.
    ChatCompatible,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Aggregator,
        ProviderKind::SingleTurn,
        ProviderKind::ChatCompatible,
    ];

    /// Persisted tag, also shown next to model labels.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Aggregator => "openrouter",
            Self::SingleTurn => "gemini",
            Self::ChatCompatible => "deepseek",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Aggregator => "OpenRouter",
            Self::SingleTurn => "Gemini",
            Self::ChatCompatible => "DeepSeek",
        }
    }

    /// Parse a persisted tag. Anything unrecognised is routed through the
    /// aggregator, which accepts arbitrary vendor-prefixed model ids.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Self::SingleTurn,
            "deepseek" => Self::ChatCompatible,
            _ => Self::Aggregator,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lossy(&raw))
    }
}

/// A selectable model and the provider that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(rename = "value")]
    pub id: String,
    #[serde(rename = "label")]
    pub display_label: String,
    pub provider: ProviderKind,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, display_label: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            display_label: display_label.into(),
            provider,
        }
    }

    /// Label used by model pickers, e.g. `Gemini Flash (openrouter)`.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.display_label, self.provider.id())
    }
}

pub struct ModelSeed {
    pub id: &'static str,
    pub label: &'static str,
    pub provider: ProviderKind,
}

pub const BUILT_IN_MODELS: &[ModelSeed] = &[
    ModelSeed {
        id: "deepseek/deepseek-chat",
        label: "DeepSeek Chat",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "openai/chatgpt-4o-latest",
        label: "GPT-4O Latest",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "openai/gpt-4o-mini",
        label: "GPT-4O Mini",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "google/gemini-flash-1.5",
        label: "Gemini Flash",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "google/gemini-pro-1.5",
        label: "Gemini Pro",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "openai/gpt-3.5-turbo",
        label: "GPT-3.5 Turbo",
        provider: ProviderKind::Aggregator,
    },
    ModelSeed {
        id: "deepseek-chat",
        label: "deepseek-chat",
        provider: ProviderKind::ChatCompatible,
    },
];

pub fn built_in_models() -> Vec<ModelDescriptor> {
    BUILT_IN_MODELS
        .iter()
        .map(|seed| ModelDescriptor::new(seed.id, seed.label, seed.provider))
        .collect()
}
