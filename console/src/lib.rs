//! Persephone console library
//!
//! Run-lifecycle orchestration for the upload, prepare, deploy and monitor
//! stages of the Persephone control plane.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod logs;
pub mod stages;
pub mod storage;
pub mod utils;
pub mod workers;
