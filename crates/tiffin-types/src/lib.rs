//! Common types for the tiffin marketplace.
//!
//! Shared data model for orders, the delivery ledger, tracking stages, chef
//! applications and chefs, together with the event, storage, API and
//! configuration-validation types used across the workspace.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Chef application records.
pub mod application;
/// Chefs, coordinates and nearby-match results.
pub mod chef;
/// Event types for inter-service communication.
pub mod events;
/// Delivery timestamp ledger.
pub mod ledger;
/// Actions, actors and outcomes of workflow calls.
pub mod lifecycle;
/// Orders, line items and payment state.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Customer-facing tracking stages.
pub mod stage;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use application::*;
pub use chef::*;
pub use events::*;
pub use ledger::*;
pub use lifecycle::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use stage::*;
pub use storage::*;
pub use utils::{normalize_place, truncate_id};
pub use validation::*;
