//! Protocol layer for device communication.
//!
//! This module handles building requests, framing them on the wire, and
//! parsing replies from Kasa plugs.

pub mod codec;
pub mod commands;
pub mod response;
