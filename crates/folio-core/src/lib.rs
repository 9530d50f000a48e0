//! # Folio Core
//!
//! Shared logic for folio: data models, page chunking, the exact-search
//! vector index, embedder and store traits, and the hybrid ranker.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Durable storage
//! is reached only through the [`store::Store`] and
//! [`index::IndexPersistence`] traits, which the application crate
//! implements.
//!
//! ```text
//! pages ──▶ chunk ──▶ embed ──▶ index (add)
//! query ──▶ embed ──▶ index (search) ──▶ search (score, filter, group) ──▶ results
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod store;
