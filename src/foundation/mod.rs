pub mod config;
pub mod core;
pub mod error;
pub mod ids;
pub mod logging;
pub(crate) mod math;
