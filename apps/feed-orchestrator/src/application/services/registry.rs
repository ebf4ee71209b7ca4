//! Provider Registry
//!
//! Owns the set of configured providers and their mutable health records.
//! The registry is an explicitly owned, injected object whose lifecycle is
//! tied to the orchestrator instance; nothing here is process-global.
//!
//! # Locking
//!
//! Health records are mutated concurrently by every active connection's
//! message path and by the periodic health-check task. Each provider slot
//! carries its own locks so independent providers never contend; the outer
//! list lock is only taken for registration and iteration.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::domain::health::{
    HealthThresholds, HealthTransition, ProviderHealth, ProviderHealthSnapshot,
};
use crate::domain::provider::{InstrumentClass, PriorityTier, Provider, ProviderId};

// =============================================================================
// Errors
// =============================================================================

/// Registry operation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A provider with this id is already registered.
    #[error("provider {0} is already registered")]
    DuplicateProvider(ProviderId),

    /// No provider with this id is registered.
    #[error("unknown provider {0}")]
    UnknownProvider(ProviderId),
}

// =============================================================================
// Slots
// =============================================================================

/// One registered provider with its own fine-grained locks.
#[derive(Debug)]
struct ProviderSlot {
    descriptor: RwLock<Provider>,
    health: RwLock<ProviderHealth>,
}

impl ProviderSlot {
    fn new(provider: Provider) -> Self {
        Self {
            descriptor: RwLock::new(provider),
            health: RwLock::new(ProviderHealth::new()),
        }
    }
}

/// Combined provider + health view for the status surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusSnapshot {
    /// Provider descriptor.
    pub provider: Provider,
    /// Health record snapshot.
    pub health: ProviderHealthSnapshot,
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of configured providers and their health records.
#[derive(Debug)]
pub struct ProviderRegistry {
    /// Slots in registration order.
    slots: RwLock<Vec<Arc<ProviderSlot>>>,
    /// Thresholds applied on every health evaluation.
    thresholds: HealthThresholds,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

impl ProviderRegistry {
    /// Create an empty registry with the given health thresholds.
    #[must_use]
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            thresholds,
        }
    }

    /// Register a provider. Registration order is selection tie-break
    /// order and is preserved for the lifetime of the registry.
    pub fn register(&self, provider: Provider) -> Result<(), RegistryError> {
        let mut slots = self.slots.write();
        if slots.iter().any(|s| s.descriptor.read().id == provider.id) {
            return Err(RegistryError::DuplicateProvider(provider.id));
        }

        tracing::info!(provider = %provider.id, endpoint = %provider.endpoint, "provider registered");
        slots.push(Arc::new(ProviderSlot::new(provider)));
        Ok(())
    }

    /// Mark a provider active or inactive. Providers are never removed.
    pub fn set_active(&self, id: &str, active: bool) -> Result<(), RegistryError> {
        let slot = self.slot(id)?;
        slot.descriptor.write().active = active;
        Ok(())
    }

    /// Update a provider's declared cost per message.
    pub fn update_cost(&self, id: &str, cost_per_message: f64) -> Result<(), RegistryError> {
        let slot = self.slot(id)?;
        slot.descriptor.write().cost_per_message = cost_per_message;
        Ok(())
    }

    /// Update a provider's priority tier.
    pub fn update_priority(&self, id: &str, priority: PriorityTier) -> Result<(), RegistryError> {
        let slot = self.slot(id)?;
        slot.descriptor.write().priority = priority;
        Ok(())
    }

    /// Record a successfully processed message.
    pub fn record_success(&self, id: &str) {
        if let Ok(slot) = self.slot(id) {
            slot.health.write().record_success();
        }
    }

    /// Record an error attributed to a provider.
    pub fn record_error(&self, id: &str) {
        if let Ok(slot) = self.slot(id) {
            slot.health.write().record_error();
        }
    }

    /// Record a malformed-message validation error.
    ///
    /// Validation errors feed the provider error rate but do not affect
    /// connection state.
    pub fn record_validation_error(&self, id: &str) {
        tracing::debug!(provider = id, "validation error recorded");
        self.record_error(id);
    }

    /// Record an observed latency sample for a provider.
    pub fn record_latency(&self, id: &str, latency_ms: f64) {
        if let Ok(slot) = self.slot(id) {
            slot.health.write().record_latency(latency_ms);
        }
    }

    /// Run one health-check pass over every provider.
    ///
    /// Idempotent per state: returns only the transitions that occurred
    /// on this pass, for the orchestrator to emit as events.
    pub fn tick(&self) -> Vec<(ProviderId, HealthTransition)> {
        let slots: Vec<Arc<ProviderSlot>> = self.slots.read().iter().cloned().collect();
        let mut transitions = Vec::new();

        for slot in slots {
            let id = slot.descriptor.read().id.clone();
            if let Some(transition) = slot.health.write().tick(None, &self.thresholds) {
                transitions.push((id, transition));
            }
        }

        transitions
    }

    /// Health snapshot for one provider.
    #[must_use]
    pub fn health_snapshot(&self, id: &str) -> Option<ProviderHealthSnapshot> {
        self.slot(id).ok().map(|slot| slot.health.read().snapshot())
    }

    /// Descriptor clone for one provider.
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<Provider> {
        self.slot(id).ok().map(|slot| slot.descriptor.read().clone())
    }

    /// Selection candidates for an instrument class, in registration
    /// order: active providers paired with their health snapshots.
    #[must_use]
    pub fn candidates(&self, class: InstrumentClass) -> Vec<(Provider, ProviderHealthSnapshot)> {
        self.slots
            .read()
            .iter()
            .filter_map(|slot| {
                let descriptor = slot.descriptor.read();
                if descriptor.active && descriptor.supports(class) {
                    Some((descriptor.clone(), slot.health.read().snapshot()))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Status snapshots of every registered provider, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderStatusSnapshot> {
        self.slots
            .read()
            .iter()
            .map(|slot| ProviderStatusSnapshot {
                provider: slot.descriptor.read().clone(),
                health: slot.health.read().snapshot(),
            })
            .collect()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    fn slot(&self, id: &str) -> Result<Arc<ProviderSlot>, RegistryError> {
        self.slots
            .read()
            .iter()
            .find(|s| s.descriptor.read().id == id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
