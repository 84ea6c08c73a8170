//! Event handlers for processing marketplace events.
//!
//! Order events are terminal for the engine; they are logged and left to
//! external collaborators. Approved applications are handed to the
//! application handler, which provisions the chef.

pub mod application;

pub use application::{ApplicationHandler, HandlerError};
