//! # Gateway Core
//!
//! Core types, traits, and error handling for the edge gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Inbound and outbound request types
//! - Backend responses and static fallbacks
//! - The backend executor abstraction
//! - Error types and their HTTP status mapping

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types
pub use backend::BackendExecutor;
pub use error::{GatewayError, GatewayResult};
pub use request::{BackendRequest, ProxyRequest};
pub use response::{BackendResponse, FallbackResponse};
pub use types::{Principal, ResourceClass};
