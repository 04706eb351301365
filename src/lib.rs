//! Offline-first synchronization and caching core for a personal fitness
//! tracker.
//!
//! Data stays usable while the device is offline and reconciles with a
//! remote document store when connectivity returns:
//! - reads go cache → remote-if-online → local-fallback and never fail due
//!   to connectivity
//! - writes persist locally first and push to the remote store best-effort
//! - an explicit sync pass pushes offline work and pulls remote changes
//!
//! [`FitClient`] is the entry point; it aggregates one service per entity
//! (profile, workouts and plans, weight log, friend graph) over a shared
//! synchronization core.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod remote;
pub mod services;
pub mod store;
pub mod sync;
pub mod types;

pub use api::{ApiError, ApiResult, ErrorCode};
pub use client::FitClient;
pub use config::Config;
