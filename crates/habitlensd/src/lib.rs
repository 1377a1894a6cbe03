//! habitlensd: HTTP face and activity verification daemon.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
