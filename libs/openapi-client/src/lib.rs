//! Wire models for the Persephone control-plane API.

pub mod models;

pub use models::*;
