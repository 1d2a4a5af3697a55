//! Geo Post Service
//!
//! Accepts geotagged posts with an optional image attachment and finds posts
//! within a radius of a point. Attachments go to object storage; posts go to
//! a search index keyed by the same id.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
