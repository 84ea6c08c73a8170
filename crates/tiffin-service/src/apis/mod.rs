//! Request handling behind the HTTP routes.
//!
//! Each function takes the engine plus already-extracted request data and
//! returns either a response body or an [`tiffin_types::APIError`].

pub mod applications;
pub mod chefs;
pub mod orders;
