//! Database schema and queries

pub mod catalog;
pub mod init;
pub mod session;
pub mod settings;

pub use init::*;
