//! Control-plane HTTP access

pub mod client;
pub mod control_plane;
pub mod runs;

pub use client::HttpClient;
pub use control_plane::ControlPlaneExt;
