//! Small string helpers shared across crates.

pub mod formatting;

pub use formatting::{normalize_place, truncate_id};
