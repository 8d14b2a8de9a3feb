//! MySQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to find database settings in a project, hold several MySQL sessions at
//! once, and run SQL against the current one.

pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::MySqlService;
