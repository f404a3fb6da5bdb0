pub mod adapters;
pub mod config;
pub mod providers;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapters::{
    GenerationOutcome, GenerationRequest, ProviderAdapter, ProviderAdapters, ProviderEndpoints,
};
pub use config::{CredentialSet, Settings, SettingsStore};
pub use providers::{ModelDescriptor, ProviderKind};
pub use transport::{ReqwestTransport, Transport};
