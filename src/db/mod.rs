//! Database layer.
//!
//! This module provides MySQL access:
//! - Connection wrapper and transactions
//! - Session registry with idle cleanup
//! - Schema introspection
//! - Type mappings and parameter binding

pub mod connection;
pub mod params;
pub mod schema;
pub mod session;
pub mod types;

pub use connection::{MySqlConnection, MySqlTransaction};
pub use schema::SchemaInspector;
pub use session::{ConnectionStats, SessionInfo, SessionRegistry};
