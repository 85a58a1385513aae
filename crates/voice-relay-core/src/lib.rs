//! Core types, config and errors for Voice Relay.

pub mod config;
pub mod error;
pub mod types;
