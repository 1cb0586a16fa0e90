//! Core types and trait definitions for the mailvault archive.
//!
//! This crate is deliberately free of database and MIME dependencies. It
//! holds the reconciliation engine, which decides for every incoming message
//! whether it is already archived, has merely moved within its container, or
//! is new. Storage, parsing and fingerprinting are supplied through traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod capability;
pub mod error;
pub mod message;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
