//! `ea-domain`: types shared by every editor-api crate: the error enum,
//! configuration, and structured trace events.

pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
