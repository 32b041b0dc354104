//! pran-mirror library
//!
//! Mirror device logic: a [`director::Director`] turning bus traffic into
//! visual state and clip requests, and the runtime that drives it.

pub mod director;
pub mod runtime;

pub use director::{Director, Scene, VisualState};
pub use runtime::MirrorRuntime;
