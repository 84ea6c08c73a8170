//! State management for orders and chef applications.
//!
//! Pure transition rules live next to the storage-backed services that
//! load, apply, persist and publish them.

pub mod application;
pub mod order;
pub mod transition;

pub use application::{ApplicationError, ApplicationWorkflow};
pub use order::OrderStateMachine;
pub use transition::{LifecycleError, Transition};
