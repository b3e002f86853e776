//! Local storage

pub mod current_run;
pub mod layout;
pub mod settings;
