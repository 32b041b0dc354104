//! pran-table library
//!
//! Audio-queue scheduler for the table device. The [`scheduler`] module holds
//! the pure state machine; [`runtime`] drives it from the Dispatch Bus, the
//! audio output and timers.

pub mod ambience;
pub mod catalog_client;
pub mod error;
pub mod output;
pub mod runtime;
pub mod scheduler;
pub mod timers;

pub use error::{Error, Result};
pub use runtime::{AmbiencePaths, TableRuntime};
pub use scheduler::{Action, Input, Scheduler, SchedulerConfig};
