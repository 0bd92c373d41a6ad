//! ask-bot — session-aware chat gateway for Vertex AI models.
//!
//! The binary in `main.rs` wires these modules together; the library split
//! exists so integration tests can drive the router and backends directly.

pub mod agents;
pub mod chat;
pub mod config;
pub mod error;
pub mod gcp;
pub mod http;
pub mod instructions;
pub mod llm;
pub mod logger;
pub mod retrieval;
pub mod runtime;
