//! # algol-client
//!
//! Client library for the algol admin console.
//!
//! This crate provides:
//! - Async TCP connect with timeouts and keep-alive
//! - Request/reply correlation by message identifier
//! - Access to the connection's dispatcher for unsolicited messages

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::ClientConfig;
pub use error::ClientError;
