//! Axum HTTP API for the frame extraction pipeline.
//!
//! This crate provides:
//! - Multipart video submission behind HS256 bearer tokens
//! - Job status listing and archive download
//! - Prometheus metrics and health reporting

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use auth::{AuthUser, Claims, JwtKeys};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{RetrievalService, SubmissionService};
pub use state::AppState;
