//! Rendering engines.

pub mod backend;
pub mod cpu;
