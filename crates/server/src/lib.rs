//! HTTP boundary for the civic report intake pipeline.
//!
//! Thin plumbing around [`intake::IngestionPipeline`]: multipart parsing,
//! identity extraction, status-code mapping, and an in-memory issue store
//! standing in for the real persistence layer. All admission, validation,
//! classification, and dedup semantics live in the pipeline crates.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::start_server;
pub use store::{InMemoryIssueStore, NewIssue, StoredIssue};
