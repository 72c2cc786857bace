//! HTTP surface of the triage service.
//!
//! `api_router()` returns a composable `Router` with every route nested
//! under `/api/`; `server::serve` binds it and runs until shutdown.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, ApiServer, ServerError};
pub use types::AppContext;
