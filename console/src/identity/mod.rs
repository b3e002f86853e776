//! Run identity resolution

pub mod store;

pub use store::{FileRunIdentity, MemoryRunIdentity, RunIdentityExt};
