//! # Gateway Routing
//!
//! Path-prefix routing for the edge gateway.
//!
//! The route table is built once from configuration and never mutated.
//! Lookups pick the longest prefix that matches on a segment boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod table;

// Re-export main types
pub use table::{Route, RouteMatch, RouteTable};
