//! Command-line application layer

pub mod options;
pub mod render;
pub mod run;
