//! Known models: the fixed built-in catalogue followed by user-added entries.

use std::sync::Arc;

use log::info;

use crate::agents::config::SettingsStore;
use crate::agents::providers::{built_in_models, ModelDescriptor};
use crate::errors::QuillError;

pub struct ModelRegistry {
    built_in: Vec<ModelDescriptor>,
    custom: Vec<ModelDescriptor>,
    store: Arc<dyn SettingsStore>,
}

impl ModelRegistry {
    /// Build the registry from the user-added models persisted in `store`.
    pub fn load(store: Arc<dyn SettingsStore>) -> Result<Self, QuillError> {
        let custom = store.load()?.custom_models;
        Ok(Self {
            built_in: built_in_models(),
            custom,
            store,
        })
    }

    /// First match wins, built-ins searched before user-added models.
    pub fn resolve(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.built_in
            .iter()
            .chain(self.custom.iter())
            .find(|m| m.id == model_id)
    }

    /// Built-ins followed by user-added models, in insertion order.
    pub fn list_all(&self) -> Vec<ModelDescriptor> {
        self.built_in.iter().chain(self.custom.iter()).cloned().collect()
    }

    pub fn custom_models(&self) -> &[ModelDescriptor] {
        &self.custom
    }

    /// Append a user model and persist. Ids are not checked for uniqueness:
    /// an entry whose id is already taken stays listed but never resolves,
    /// because [`resolve`](Self::resolve) returns the earlier entry.
    pub fn add(&mut self, descriptor: ModelDescriptor) -> Result<(), QuillError> {
        let mut custom = self.custom.clone();
        push_custom(&mut custom, descriptor);
        save_custom(self.store.as_ref(), &custom)?;
        self.custom = custom;
        Ok(())
    }

    /// Remove the user model at `index` (position among user-added models
    /// only) and persist. Built-ins cannot be removed.
    pub fn remove(&mut self, index: usize) -> Result<ModelDescriptor, QuillError> {
        let mut custom = self.custom.clone();
        let removed = take_custom(&mut custom, index)?;
        save_custom(self.store.as_ref(), &custom)?;
        self.custom = custom;
        Ok(removed)
    }

    pub(crate) fn store(&self) -> Arc<dyn SettingsStore> {
        self.store.clone()
    }

    /// Swap in a user-added list that has already been saved.
    pub(crate) fn commit_custom(&mut self, custom: Vec<ModelDescriptor>) {
        self.custom = custom;
    }
}

pub(crate) fn push_custom(custom: &mut Vec<ModelDescriptor>, descriptor: ModelDescriptor) {
    info!(
        "adding custom model {} via {}",
        descriptor.id, descriptor.provider
    );
    custom.push(descriptor);
}

pub(crate) fn take_custom(
    custom: &mut Vec<ModelDescriptor>,
    index: usize,
) -> Result<ModelDescriptor, QuillError> {
    if index >= custom.len() {
        return Err(QuillError::ModelIndexOutOfRange {
            index,
            len: custom.len(),
        });
    }
    let removed = custom.remove(index);
    info!("removing custom model {}", removed.id);
    Ok(removed)
}

/// Write `custom` as the user-added list, keeping every other setting.
pub(crate) fn save_custom(
    store: &dyn SettingsStore,
    custom: &[ModelDescriptor],
) -> Result<(), QuillError> {
    let mut settings = store.load()?;
    settings.custom_models = custom.to_vec();
    store.save(&settings)
}
