//! Device communication layer.
//!
//! Provides the framed TCP exchange used for probes and commands.

pub mod connection;

pub use connection::send_request;
