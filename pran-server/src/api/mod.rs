//! HTTP and WebSocket handlers for pran-server

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod health;
pub mod session;
pub mod sse;
pub mod ws;

pub use auth::auth_middleware;
pub use health::health_routes;
