//! # Pran Common Library
//!
//! Shared code for the Pran installation services and devices:
//! - Session domain types (phase, age group, mood, category)
//! - Audio and pran catalog types
//! - Dispatch Bus events and the in-process EventBus
//! - Configuration loading
//! - Database schema and repositories
//! - Admin token helpers
//! - Master election for audio authority
//! - WebSocket bus client used by the device runtimes

pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod election;
pub mod error;
pub mod events;
pub mod session;

pub use catalog::{AudioClip, ClipCategory, CuePoint, Pran};
pub use error::{Error, Result};
pub use events::{BusEvent, EventBus};
pub use session::{AgeGroup, Category, Mood, Phase, SessionSnapshot};

/// Fixed room key of the single live session
pub const ROOM_KEY: &str = "live";
