//! Domain types: wire messages, session model, errors and settings.

pub mod error;
pub mod message;
pub mod models;
pub mod settings;
