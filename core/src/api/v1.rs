//! Version 1 of the editor command surface.
//!
//! Commands are thin wrappers that read settings through the injected store,
//! call the dispatcher and hand results back to the host as plain values.
//! The host supplies the editor and notification primitives.

use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;

use crate::agents::config::{Settings, SettingsStore};
use crate::agents::providers::{ModelDescriptor, ProviderKind};
use crate::agents::transport::{ReqwestTransport, Transport};
use crate::agents::{GenerationOutcome, GenerationRequest, ProviderAdapters, ProviderEndpoints};
use crate::db::DbPool;
use crate::dispatcher::GenerationDispatcher;
use crate::errors::QuillError;
use crate::registry::{self, ModelRegistry};
use crate::templates::{Template, TemplateProvider};

pub const SUCCESS_NOTICE_MS: u64 = 3000;
pub const FAILURE_NOTICE_MS: u64 = 5000;
pub const PENDING_NOTICE: &str = "Generating content...";

/// Shared state handed to every command.
#[derive(Clone)]
pub struct QuillState {
    pub store: Arc<dyn SettingsStore>,
    pub dispatcher: Arc<GenerationDispatcher>,
    pub templates: Arc<dyn TemplateProvider>,
    /// Serialises custom-model edits so the registry lock is only taken to
    /// read a snapshot and to commit, never across the store write.
    model_edits: Arc<Mutex<()>>,
}

impl QuillState {
    /// Wire the production stack. The request timeout is read once here, so
    /// changing it takes effect on the next bootstrap.
    pub fn bootstrap(
        store: Arc<dyn SettingsStore>,
        templates: Arc<dyn TemplateProvider>,
        event_log: Option<DbPool>,
    ) -> Result<Self> {
        let settings = store.load()?;
        let transport = ReqwestTransport::new(settings.request_timeout())?;
        Self::with_transport(
            store,
            templates,
            Arc::new(transport),
            &ProviderEndpoints::default(),
            event_log,
        )
    }

    pub fn with_transport(
        store: Arc<dyn SettingsStore>,
        templates: Arc<dyn TemplateProvider>,
        transport: Arc<dyn Transport>,
        endpoints: &ProviderEndpoints,
        event_log: Option<DbPool>,
    ) -> Result<Self> {
        let registry = ModelRegistry::load(store.clone())?;
        let adapters = ProviderAdapters::with_endpoints(transport, endpoints);
        let mut dispatcher = GenerationDispatcher::new(Arc::new(RwLock::new(registry)), adapters);
        if let Some(pool) = event_log {
            dispatcher = dispatcher.with_event_log(pool);
        }
        Ok(Self {
            store,
            dispatcher: Arc::new(dispatcher),
            templates,
            model_edits: Arc::new(Mutex::new(())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    Replace,
    Insert,
}

/// Generated text and what the host should do with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditInstruction {
    pub mode: EditMode,
    pub text: String,
}

impl EditInstruction {
    /// Inserted text is set off from its surroundings by blank lines.
    pub fn new(mode: EditMode, generated: &str) -> Self {
        let text = match mode {
            EditMode::Replace => generated.to_string(),
            EditMode::Insert => format!("\n\n{generated}\n\n"),
        };
        Self { mode, text }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    pub ch: usize,
}

/// Editor primitives supplied by the host application.
pub trait EditorHost {
    fn selection(&self) -> String;
    /// Position at the end of the current selection.
    fn cursor(&self) -> CursorPosition;
    fn replace_selection(&mut self, text: &str);
    fn insert_at(&mut self, cursor: CursorPosition, text: &str);
}

pub trait Notifier {
    fn notify(&self, message: &str, duration_ms: u64);
    /// Show a notice that stays up until [`clear_pending`](Self::clear_pending).
    fn show_pending(&self, message: &str);
    fn clear_pending(&self);
}

/// Pending notice that is cleared when dropped, whichever way the command ends.
struct PendingNotice<'a, N: Notifier>(&'a N);

impl<'a, N: Notifier> PendingNotice<'a, N> {
    fn show(notifier: &'a N, message: &str) -> Self {
        notifier.show_pending(message);
        Self(notifier)
    }
}

impl<N: Notifier> Drop for PendingNotice<'_, N> {
    fn drop(&mut self) {
        self.0.clear_pending();
    }
}

/// Run one generation through the dispatcher, reading credentials from the
/// store at call time so key changes apply immediately.
pub async fn generate_text(
    state: &QuillState,
    request: GenerationRequest,
) -> Result<GenerationOutcome, String> {
    let settings = load_settings(state).await?;
    Ok(state
        .dispatcher
        .dispatch_request(&request, &settings.credentials())
        .await)
}

/// Replace the selection with generated text.
pub async fn generate_replace<E: EditorHost, N: Notifier>(
    state: &QuillState,
    editor: &mut E,
    notifier: &N,
    prompt: &str,
    model_id: Option<&str>,
) -> Option<EditInstruction> {
    run_edit_command(state, editor, notifier, EditMode::Replace, prompt, model_id).await
}

/// Insert generated text after the selection.
pub async fn generate_insert<E: EditorHost, N: Notifier>(
    state: &QuillState,
    editor: &mut E,
    notifier: &N,
    prompt: &str,
    model_id: Option<&str>,
) -> Option<EditInstruction> {
    run_edit_command(state, editor, notifier, EditMode::Insert, prompt, model_id).await
}

async fn run_edit_command<E: EditorHost, N: Notifier>(
    state: &QuillState,
    editor: &mut E,
    notifier: &N,
    mode: EditMode,
    prompt: &str,
    model_id: Option<&str>,
) -> Option<EditInstruction> {
    let selection = editor.selection();
    if selection.is_empty() {
        notifier.notify("Select some text first", FAILURE_NOTICE_MS);
        return None;
    }
    let cursor = editor.cursor();
    let pending = PendingNotice::show(notifier, PENDING_NOTICE);

    let settings = match load_settings(state).await {
        Ok(settings) => settings,
        Err(err) => {
            drop(pending);
            notifier.notify(&format!("Request failed: {err}"), FAILURE_NOTICE_MS);
            return None;
        }
    };
    let model_id = model_id.unwrap_or(&settings.default_model);
    let request = GenerationRequest::new(prompt, selection, model_id);

    let outcome = state
        .dispatcher
        .dispatch_request(&request, &settings.credentials())
        .await;
    drop(pending);

    match outcome {
        GenerationOutcome::Success { text } => {
            let instruction = EditInstruction::new(mode, &text);
            match mode {
                EditMode::Replace => editor.replace_selection(&instruction.text),
                EditMode::Insert => editor.insert_at(cursor, &instruction.text),
            }
            notifier.notify("Content generated", SUCCESS_NOTICE_MS);
            Some(instruction)
        }
        GenerationOutcome::Failure(failure) => {
            notifier.notify(&format!("Request failed: {}", failure.message), FAILURE_NOTICE_MS);
            None
        }
    }
}

/// Picker entry for a model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelOption {
    pub id: String,
    pub label: String,
    pub provider: ProviderKind,
}

pub fn list_models(state: &QuillState) -> Result<Vec<ModelOption>, String> {
    let registry = state.dispatcher.registry();
    let registry = registry.read().map_err(|e| e.to_string())?;
    Ok(registry
        .list_all()
        .into_iter()
        .map(|m| ModelOption {
            label: m.display_name(),
            id: m.id,
            provider: m.provider,
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddModelInput {
    pub value: String,
    pub label: String,
    pub provider: ProviderKind,
}

/// Append a user model; both id and label are required.
pub fn add_custom_model(
    state: &QuillState,
    input: AddModelInput,
) -> Result<Vec<ModelDescriptor>, String> {
    let id = input.value.trim();
    let label = input.label.trim();
    if id.is_empty() || label.is_empty() {
        return Err("Fill in all fields".to_string());
    }
    let descriptor = ModelDescriptor::new(id, label, input.provider);
    edit_custom_models(state, move |custom| {
        registry::push_custom(custom, descriptor);
        Ok(())
    })
}

pub fn remove_custom_model(
    state: &QuillState,
    index: usize,
) -> Result<Vec<ModelDescriptor>, String> {
    edit_custom_models(state, |custom| registry::take_custom(custom, index).map(drop))
}

/// Apply `edit` to a snapshot of the user-added models, save it, then commit
/// it to the registry. Dispatches keep resolving against the old list while
/// the store is written.
fn edit_custom_models(
    state: &QuillState,
    edit: impl FnOnce(&mut Vec<ModelDescriptor>) -> Result<(), QuillError>,
) -> Result<Vec<ModelDescriptor>, String> {
    let _edit = state.model_edits.lock().map_err(|e| e.to_string())?;
    let shared = state.dispatcher.registry();
    let (store, mut custom) = {
        let current = shared.read().map_err(|e| e.to_string())?;
        (current.store(), current.custom_models().to_vec())
    };

    edit(&mut custom).map_err(describe)?;
    registry::save_custom(store.as_ref(), &custom).map_err(describe)?;

    shared
        .write()
        .map_err(|e| e.to_string())?
        .commit_custom(custom.clone());
    Ok(custom)
}

/// Settings as shown to the UI: secrets reduced to presence flags.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub default_model: String,
    pub template_path: String,
    pub request_timeout_secs: u64,
    pub custom_models: Vec<ModelDescriptor>,
    pub configured_providers: Vec<ProviderKind>,
}

pub fn get_settings(state: &QuillState) -> Result<SettingsView, String> {
    let settings = state.store.load().map_err(describe)?;
    let credentials = settings.credentials();
    Ok(SettingsView {
        configured_providers: ProviderKind::ALL
            .into_iter()
            .filter(|kind| credentials.get(*kind).is_some())
            .collect(),
        default_model: settings.default_model,
        template_path: settings.template_path,
        request_timeout_secs: settings.request_timeout_secs,
        custom_models: settings.custom_models,
    })
}

pub fn set_api_key(state: &QuillState, provider: ProviderKind, api_key: &str) -> Result<(), String> {
    update_settings(state, |settings| settings.set_credential(provider, api_key))
}

pub fn set_default_model(state: &QuillState, model_id: &str) -> Result<(), String> {
    let model_id = model_id.to_string();
    update_settings(state, move |settings| settings.default_model = model_id)
}

pub fn set_template_path(state: &QuillState, path: &str) -> Result<(), String> {
    let path = path.trim().to_string();
    update_settings(state, move |settings| settings.template_path = path)
}

pub fn list_templates(state: &QuillState) -> Result<Vec<Template>, String> {
    let settings = state.store.load().map_err(describe)?;
    state
        .templates
        .templates(&settings.template_path)
        .map_err(describe)
}

fn update_settings(state: &QuillState, apply: impl FnOnce(&mut Settings)) -> Result<(), String> {
    let mut settings = state.store.load().map_err(describe)?;
    apply(&mut settings);
    state.store.save(&settings).map_err(describe)
}

/// Error text shown to the user, prefixed with the catalogue code.
fn describe(err: QuillError) -> String {
    format!("[{}] {err}", err.code())
}

async fn load_settings(state: &QuillState) -> Result<Settings, String> {
    let store = state.store.clone();
    spawn_blocking(move || store.load())
        .await
        .map_err(|e| e.to_string())?
        .map_err(describe)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;
    use crate::agents::config::MemorySettingsStore;
    use crate::agents::test_support::SpyTransport;
    use crate::errors::FailureKind;
    use crate::templates::FsTemplateProvider;

    #[derive(Default)]
    struct FakeEditor {
        doc: String,
        selection: String,
        cursor: Option<CursorPosition>,
        inserted: Vec<(CursorPosition, String)>,
    }

    impl EditorHost for FakeEditor {
        fn selection(&self) -> String {
            self.selection.clone()
        }
        fn cursor(&self) -> CursorPosition {
            self.cursor.unwrap_or(CursorPosition { line: 0, ch: 0 })
        }
        fn replace_selection(&mut self, text: &str) {
            self.doc = self.doc.replace(&self.selection, text);
            self.selection.clear();
        }
        fn insert_at(&mut self, cursor: CursorPosition, text: &str) {
            self.inserted.push((cursor, text.to_string()));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Shown {
        Notice(String, u64),
        Pending(String),
        Cleared,
    }

    #[derive(Default)]
    struct Notices(RefCell<Vec<Shown>>);

    impl Notifier for Notices {
        fn notify(&self, message: &str, duration_ms: u64) {
            self.0
                .borrow_mut()
                .push(Shown::Notice(message.to_string(), duration_ms));
        }
        fn show_pending(&self, message: &str) {
            self.0.borrow_mut().push(Shown::Pending(message.to_string()));
        }
        fn clear_pending(&self) {
            self.0.borrow_mut().push(Shown::Cleared);
        }
    }

    impl Notices {
        fn last(&self) -> String {
            self.0
                .borrow()
                .iter()
                .rev()
                .find_map(|shown| match shown {
                    Shown::Notice(message, _) => Some(message.clone()),
                    _ => None,
                })
                .unwrap_or_default()
        }

        fn history(&self) -> Vec<Shown> {
            self.0.borrow().clone()
        }
    }

    fn state_with(spy: Arc<SpyTransport>, settings: Settings) -> QuillState {
        let vault = std::env::temp_dir();
        QuillState::with_transport(
            Arc::new(MemorySettingsStore::new(settings)),
            Arc::new(FsTemplateProvider::new(vault)),
            spy,
            &ProviderEndpoints::default(),
            None,
        )
        .unwrap()
    }

    fn keyed_settings() -> Settings {
        let mut settings = Settings::default();
        settings.set_credential(ProviderKind::Aggregator, "sk-or");
        settings.set_credential(ProviderKind::ChatCompatible, "sk-ds");
        settings
    }

    fn editor_with_selection() -> FakeEditor {
        FakeEditor {
            doc: "intro draft outro".into(),
            selection: "draft".into(),
            cursor: Some(CursorPosition { line: 0, ch: 11 }),
            ..FakeEditor::default()
        }
    }

    fn reply(text: &str) -> Arc<SpyTransport> {
        SpyTransport::replying(200, json!({ "choices": [{ "message": { "content": text } }] }))
    }

    #[tokio::test]
    async fn replace_substitutes_the_selection() {
        let spy = reply("final");
        let state = state_with(spy.clone(), keyed_settings());
        let mut editor = editor_with_selection();
        let notices = Notices::default();

        let instruction = generate_replace(&state, &mut editor, &notices, "Polish", None)
            .await
            .unwrap();
        assert_eq!(instruction, EditInstruction { mode: EditMode::Replace, text: "final".into() });
        assert_eq!(editor.doc, "intro final outro");
        assert_eq!(
            notices.history(),
            vec![
                Shown::Pending(PENDING_NOTICE.into()),
                Shown::Cleared,
                Shown::Notice("Content generated".into(), SUCCESS_NOTICE_MS),
            ]
        );
        assert_eq!(spy.last_request().body["model"], "google/gemini-flash-1.5");
    }

    #[tokio::test]
    async fn insert_pads_text_at_the_selection_end() {
        let spy = reply("extra");
        let state = state_with(spy, keyed_settings());
        let mut editor = editor_with_selection();
        let notices = Notices::default();

        generate_insert(&state, &mut editor, &notices, "Continue", Some("deepseek-chat"))
            .await
            .unwrap();
        assert_eq!(editor.doc, "intro draft outro");
        assert_eq!(
            editor.inserted,
            vec![(CursorPosition { line: 0, ch: 11 }, "\n\nextra\n\n".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_selection_is_refused_without_dispatch() {
        let spy = reply("unused");
        let state = state_with(spy.clone(), keyed_settings());
        let mut editor = FakeEditor::default();
        let notices = Notices::default();

        let result = generate_replace(&state, &mut editor, &notices, "p", None).await;
        assert!(result.is_none());
        assert_eq!(
            notices.history(),
            vec![Shown::Notice("Select some text first".into(), FAILURE_NOTICE_MS)]
        );
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn failures_are_reported_and_leave_the_document_alone() {
        let spy = reply("unused");
        let state = state_with(spy.clone(), Settings::default());
        let mut editor = editor_with_selection();
        let notices = Notices::default();

        let result = generate_replace(&state, &mut editor, &notices, "p", None).await;
        assert!(result.is_none());
        assert_eq!(editor.doc, "intro draft outro");
        assert!(notices.last().starts_with("Request failed: "));
        let history = notices.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], Shown::Pending(PENDING_NOTICE.into()));
        assert_eq!(history[1], Shown::Cleared);
        assert!(matches!(&history[2], Shown::Notice(_, ms) if *ms == FAILURE_NOTICE_MS));
        assert_eq!(spy.calls(), 0);
    }

    #[tokio::test]
    async fn new_api_key_applies_without_restart() {
        let spy = reply("hi");
        let state = state_with(spy, Settings::default());
        let request = GenerationRequest::new("p", "c", "deepseek-chat");

        let before = generate_text(&state, request.clone()).await.unwrap();
        assert_eq!(before.failure_kind(), Some(FailureKind::MissingCredential));

        set_api_key(&state, ProviderKind::ChatCompatible, "  sk-ds  ").unwrap();
        let after = generate_text(&state, request).await.unwrap();
        assert_eq!(after, GenerationOutcome::success("hi"));
    }

    #[test]
    fn custom_models_can_be_added_listed_and_removed() {
        let state = state_with(reply("x"), Settings::default());
        let err = add_custom_model(
            &state,
            AddModelInput {
                value: "gemini-1.5-pro".into(),
                label: " ".into(),
                provider: ProviderKind::SingleTurn,
            },
        )
        .unwrap_err();
        assert_eq!(err, "Fill in all fields");

        let custom = add_custom_model(
            &state,
            AddModelInput {
                value: "gemini-1.5-pro".into(),
                label: "Gemini Pro".into(),
                provider: ProviderKind::SingleTurn,
            },
        )
        .unwrap();
        assert_eq!(custom.len(), 1);

        let options = list_models(&state).unwrap();
        let last = options.last().unwrap();
        assert_eq!(last.label, "Gemini Pro (gemini)");
        assert_eq!(get_settings(&state).unwrap().custom_models.len(), 1);

        assert!(remove_custom_model(&state, 0).unwrap().is_empty());
        let err = remove_custom_model(&state, 0).unwrap_err();
        assert!(err.starts_with("[CFG-1003]"));
    }

    /// Store whose `save` blocks until the test releases it.
    struct GatedStore {
        inner: MemorySettingsStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl SettingsStore for GatedStore {
        fn load(&self) -> Result<Settings, QuillError> {
            self.inner.load()
        }
        fn save(&self, settings: &Settings) -> Result<(), QuillError> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            self.inner.save(settings)
        }
    }

    #[test]
    fn models_stay_resolvable_while_an_edit_is_saved() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemorySettingsStore::default(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let state = QuillState::with_transport(
            store,
            Arc::new(FsTemplateProvider::new(std::env::temp_dir())),
            reply("x"),
            &ProviderEndpoints::default(),
            None,
        )
        .unwrap();

        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                add_custom_model(
                    &state,
                    AddModelInput {
                        value: "acme/m".into(),
                        label: "Acme".into(),
                        provider: ProviderKind::Aggregator,
                    },
                )
            })
        };
        entered_rx.recv().unwrap();

        let registry = state.dispatcher.registry();
        let during = registry
            .try_read()
            .map(|current| {
                (
                    current.resolve("deepseek-chat").is_some(),
                    current.resolve("acme/m").is_some(),
                )
            })
            .ok();
        assert_eq!(during, Some((true, false)));

        release_tx.send(()).unwrap();
        let custom = writer.join().unwrap().unwrap();
        assert_eq!(custom.len(), 1);
        assert!(registry.read().unwrap().resolve("acme/m").is_some());
    }

    #[test]
    fn settings_view_reports_configured_providers_only() {
        let state = state_with(reply("x"), keyed_settings());
        set_default_model(&state, "deepseek-chat").unwrap();
        let view = get_settings(&state).unwrap();
        assert_eq!(view.default_model, "deepseek-chat");
        assert_eq!(
            view.configured_providers,
            vec![ProviderKind::Aggregator, ProviderKind::ChatCompatible]
        );
    }

    #[test]
    fn templates_come_from_the_configured_folder() {
        let vault = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(vault.path().join("prompts")).unwrap();
        std::fs::write(vault.path().join("prompts/tone.md"), "Make it friendlier").unwrap();
        let state = QuillState::with_transport(
            Arc::new(MemorySettingsStore::default()),
            Arc::new(FsTemplateProvider::new(vault.path())),
            reply("x"),
            &ProviderEndpoints::default(),
            None,
        )
        .unwrap();

        assert!(list_templates(&state).unwrap().is_empty());
        set_template_path(&state, "prompts").unwrap();
        let templates = list_templates(&state).unwrap();
        assert_eq!(templates[0].name, "tone");
    }
}
