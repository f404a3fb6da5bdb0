//! Persisted settings and the stores that load and save them.
//!
//! Settings are passed around as an explicit [`SettingsStore`] service. The
//! SQLite store keeps non-secret values as one JSON document and writes API
//! keys to their own table so they never appear in the settings blob.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::providers::{ModelDescriptor, ProviderKind};
use crate::db::DbPool;
use crate::errors::QuillError;

pub const DEFAULT_MODEL: &str = "google/gemini-flash-1.5";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;

const SETTINGS_KEY: &str = "quill.settings";

/// Everything the extension persists between sessions.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub openrouter_api_key: String,
    pub gemini_api_key: String,
    pub deepseek_api_key: String,
    pub default_model: String,
    pub template_path: String,
    pub custom_models: Vec<ModelDescriptor>,
    /// Zero disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openrouter_api_key: String::new(),
            gemini_api_key: String::new(),
            deepseek_api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            template_path: String::new(),
            custom_models: Vec::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub fn credentials(&self) -> CredentialSet {
        CredentialSet::new()
            .with(ProviderKind::Aggregator, self.openrouter_api_key.clone())
            .with(ProviderKind::SingleTurn, self.gemini_api_key.clone())
            .with(ProviderKind::ChatCompatible, self.deepseek_api_key.clone())
    }

    pub fn credential(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Aggregator => &self.openrouter_api_key,
            ProviderKind::SingleTurn => &self.gemini_api_key,
            ProviderKind::ChatCompatible => &self.deepseek_api_key,
        }
    }

    pub fn set_credential(&mut self, kind: ProviderKind, secret: &str) {
        let secret = secret.trim().to_string();
        match kind {
            ProviderKind::Aggregator => self.openrouter_api_key = secret,
            ProviderKind::SingleTurn => self.gemini_api_key = secret,
            ProviderKind::ChatCompatible => self.deepseek_api_key = secret,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn without_credentials(&self) -> Self {
        let mut public = self.clone();
        for kind in ProviderKind::ALL {
            public.set_credential(kind, "");
        }
        public
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("credentials", &self.credentials())
            .field("default_model", &self.default_model)
            .field("template_path", &self.template_path)
            .field("custom_models", &self.custom_models)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// One secret per provider. Empty or whitespace-only secrets count as absent.
#[derive(Clone, Default)]
pub struct CredentialSet {
    aggregator: Option<String>,
    single_turn: Option<String>,
    chat_compatible: Option<String>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ProviderKind, secret: impl Into<String>) -> Self {
        self.set(kind, secret);
        self
    }

    pub fn set(&mut self, kind: ProviderKind, secret: impl Into<String>) {
        let secret = Some(secret.into());
        match kind {
            ProviderKind::Aggregator => self.aggregator = secret,
            ProviderKind::SingleTurn => self.single_turn = secret,
            ProviderKind::ChatCompatible => self.chat_compatible = secret,
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        let slot = match kind {
            ProviderKind::Aggregator => &self.aggregator,
            ProviderKind::SingleTurn => &self.single_turn,
            ProviderKind::ChatCompatible => &self.chat_compatible,
        };
        slot.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in ProviderKind::ALL {
            let shown = if self.get(kind).is_some() { "<set>" } else { "<missing>" };
            map.entry(&kind.id(), &shown);
        }
        map.finish()
    }
}

/// Load/save contract for the settings blob.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, QuillError>;
    fn save(&self, settings: &Settings) -> Result<(), QuillError>;
}

/// Keeps settings in memory, for hosts that persist the blob themselves.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, QuillError> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| QuillError::SettingsUnavailable("settings lock poisoned".into()))
    }

    fn save(&self, settings: &Settings) -> Result<(), QuillError> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| QuillError::SettingsUnavailable("settings lock poisoned".into()))?;
        *guard = settings.clone();
        Ok(())
    }
}

/// Settings persisted in the `app_settings` and `ai_credentials` tables.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: DbPool,
}

impl SqliteSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self) -> Result<Settings, QuillError> {
        let conn = self.pool.get()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let mut settings = match value {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Settings::default(),
        };
        for kind in ProviderKind::ALL {
            if let Some(secret) = load_secret(&conn, kind.id())? {
                settings.set_credential(kind, &secret);
            }
        }
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), QuillError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = serde_json::to_string(&settings.without_credentials())?;
        tx.execute(
            "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![SETTINGS_KEY, payload, now],
        )?;

        for kind in ProviderKind::ALL {
            let trimmed = settings.credential(kind).trim();
            if trimmed.is_empty() {
                tx.execute(
                    "DELETE FROM ai_credentials WHERE provider_id = ?1",
                    params![kind.id()],
                )?;
            } else {
                let encoded = B64_ENGINE.encode(trimmed.as_bytes());
                tx.execute(
                    "INSERT INTO ai_credentials (provider_id, secret, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(provider_id) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at",
                    params![kind.id(), encoded, now],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn load_secret(conn: &rusqlite::Connection, provider_id: &str) -> Result<Option<String>, QuillError> {
    let secret: Option<String> = conn
        .query_row(
            "SELECT secret FROM ai_credentials WHERE provider_id = ?1",
            params![provider_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(s) = secret {
        let decoded = B64_ENGINE
            .decode(s.as_bytes())
            .map_err(|_| QuillError::SettingsFormat("failed to decode stored credential".into()))?;
        let value = String::from_utf8(decoded).map_err(|_| {
            QuillError::SettingsFormat("stored credential was not valid UTF-8".into())
        })?;
        Ok(Some(value))
    } else {
        Ok(None)
    }
}
