//! Core marketplace logic for the tiffin system.
//!
//! Holds the order lifecycle and its delivery-tracking derivation, the
//! chef application workflow, the polling synchronizer used by tracking
//! views, and the nearby chef search. The engine ties these to storage,
//! geocoding and the event bus, and the builder assembles an engine from
//! configured implementations.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod nearby;
pub mod state;
pub mod tracking;

pub use builder::{BuilderError, MarketplaceBuilder, MarketplaceFactories};
pub use engine::{event_bus::EventBus, EngineError, MarketplaceEngine};
pub use nearby::NearbyMatcher;
pub use state::{
	ApplicationError, ApplicationWorkflow, LifecycleError, OrderStateMachine, Transition,
};
pub use tracking::{
	derive_stage, order_response, tracking_summary, HttpOrderSource, OrderSource, OrderTracker,
	StorageOrderSource, TrackerHandle, TrackingError, TrackingSnapshot,
};
