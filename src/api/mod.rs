//! HTTP API.
//!
//! Facility, patient and document resources plus the AI query routes,
//! mounted under `/api/v1`. `api_router()` returns a composable `Router`;
//! `server` owns the listener and the background retry worker.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_server_on, ApiServer, ServerError};
pub use types::ApiContext;
