//! Application layer - use cases, port definitions, and the event stream.

/// Typed event stream consumed by external collaborators.
pub mod events;

/// Port interfaces for transports, authenticators, and credentials.
pub mod ports;

/// Orchestration services.
pub mod services;
