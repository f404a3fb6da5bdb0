//! Generation dispatcher: the single entry point the editor commands call.
//!
//! Resolves the model, checks the credential, builds the combined prompt,
//! hands it to the provider adapter and applies the empty-content policy.
//! Every path ends in a [`GenerationOutcome`]; a failed request is terminal
//! for that call and is never retried.

use std::sync::{Arc, PoisonError, RwLock};

use log::{info, warn};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;

use crate::agents::config::CredentialSet;
use crate::agents::providers::{ModelDescriptor, ProviderKind};
use crate::agents::{GenerationOutcome, GenerationRequest, ProviderAdapters};
use crate::db::DbPool;
use crate::errors::GenerationFailure;
use crate::logging::{log_event, DISPATCH_MODULE};
use crate::registry::ModelRegistry;

pub struct GenerationDispatcher {
    registry: Arc<RwLock<ModelRegistry>>,
    adapters: ProviderAdapters,
    event_log: Option<DbPool>,
}

impl GenerationDispatcher {
    pub fn new(registry: Arc<RwLock<ModelRegistry>>, adapters: ProviderAdapters) -> Self {
        Self {
            registry,
            adapters,
            event_log: None,
        }
    }

    /// Record every outcome in the `event_log` table of `pool`.
    pub fn with_event_log(mut self, pool: DbPool) -> Self {
        self.event_log = Some(pool);
        self
    }

    pub fn registry(&self) -> Arc<RwLock<ModelRegistry>> {
        self.registry.clone()
    }

    pub async fn dispatch(
        &self,
        prompt_text: &str,
        context_text: &str,
        model_id: &str,
        credentials: &CredentialSet,
    ) -> GenerationOutcome {
        let request = GenerationRequest::new(prompt_text, context_text, model_id);
        self.dispatch_request(&request, credentials).await
    }

    pub async fn dispatch_request(
        &self,
        request: &GenerationRequest,
        credentials: &CredentialSet,
    ) -> GenerationOutcome {
        let Some(descriptor) = self.resolve(&request.model_id) else {
            let outcome: GenerationOutcome = GenerationFailure::unknown_model(format!(
                "Model {} is not configured",
                request.model_id
            ))
            .into();
            self.record(request, None, &outcome).await;
            return outcome;
        };

        let Some(credential) = credentials.get(descriptor.provider) else {
            let outcome: GenerationOutcome = GenerationFailure::missing_credential(format!(
                "Set the {} API key first",
                descriptor.provider.display_name()
            ))
            .into();
            self.record(request, Some(descriptor.provider), &outcome).await;
            return outcome;
        };

        let prompt = request.combined_prompt();
        let outcome = self
            .adapters
            .get(descriptor.provider)
            .generate(&descriptor.id, &prompt, credential)
            .await;
        let outcome = reject_empty(outcome, &descriptor);
        self.record(request, Some(descriptor.provider), &outcome).await;
        outcome
    }

    /// The read guard is dropped before the caller awaits anything.
    fn resolve(&self, model_id: &str) -> Option<ModelDescriptor> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.resolve(model_id).cloned()
    }

    async fn record(
        &self,
        request: &GenerationRequest,
        provider: Option<ProviderKind>,
        outcome: &GenerationOutcome,
    ) {
        let provider_id = provider.map(|p| p.id());
        match outcome {
            GenerationOutcome::Success { text } => info!(
                "generation via {} with {} returned {} chars",
                provider_id.unwrap_or("-"),
                request.model_id,
                text.chars().count()
            ),
            GenerationOutcome::Failure(failure) => warn!(
                "generation via {} with {} failed [{}]: {}",
                provider_id.unwrap_or("-"),
                request.model_id,
                failure.kind.code(),
                failure.message
            ),
        }

        let Some(pool) = self.event_log.clone() else {
            return;
        };
        let (level, code, message, explain, detail) = match outcome {
            GenerationOutcome::Success { text } => (
                "info",
                "GEN-0200",
                "AI generation succeeded",
                None,
                json!({ "preview": text.chars().take(200).collect::<String>() }),
            ),
            GenerationOutcome::Failure(failure) => (
                "warn",
                failure.kind.code(),
                "AI generation failed",
                Some(failure.kind.explain()),
                json!({ "error": failure.message }),
            ),
        };
        let mut data = json!({
            "provider": provider_id,
            "model": request.model_id,
            "prompt_sha256": prompt_fingerprint(&request.combined_prompt()),
        });
        if let (Some(target), Some(extra)) = (data.as_object_mut(), detail.as_object()) {
            target.extend(extra.clone());
        }

        let result = spawn_blocking(move || {
            let conn = pool.get().map_err(|err| err.to_string())?;
            log_event(
                &conn,
                level,
                Some(code),
                DISPATCH_MODULE,
                message,
                explain,
                Some(data),
            )
            .map_err(|err| err.to_string())
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("failed to write generation event: {err}"),
            Err(err) => warn!("event log task failed: {err}"),
        }
    }
}

/// Blank output is a failure no matter which provider produced it.
fn reject_empty(outcome: GenerationOutcome, descriptor: &ModelDescriptor) -> GenerationOutcome {
    match outcome {
        GenerationOutcome::Success { text } if text.trim().is_empty() => {
            GenerationFailure::empty_content(format!(
                "{} returned empty content",
                descriptor.display_name()
            ))
            .into()
        }
        other => other,
    }
}

fn prompt_fingerprint(prompt: &str) -> String {
    format!("{:x}", Sha256::digest(prompt.as_bytes()))
}
