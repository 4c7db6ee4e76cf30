//! Render executor: worker slots, cancellation, and the frame → encoder loop.

pub mod control;
pub mod render;
pub mod slots;

pub use control::{CancelToken, ProgressFn, RenderControl};
pub use render::RenderExecutor;
pub use slots::{WorkerSlot, WorkerSlots};
