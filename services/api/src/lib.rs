//! services/api/src/lib.rs
//!
//! Library surface of the api service, so the binaries and the
//! integration tests share the same adapters and web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
