//! Configuration loading.

mod settings;

pub use settings::{
    ConfigError, OrchestratorSettings, ProvidersDocument, ServerSettings, SubscriptionEntry,
};
