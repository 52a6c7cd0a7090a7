//! Durable alert delivery.
//!
//! The engine hands accepted alerts to an
//! [`AlertSink`](klaxon_engine::AlertSink); this crate provides the
//! PostgREST-backed implementation used in production.

pub mod error;
pub mod rest;

pub use error::SinkError;
pub use rest::{RestSink, RestSinkConfig};
