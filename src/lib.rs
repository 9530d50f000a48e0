//! # Folio
//!
//! Local document search: ingest PDFs and text files, chunk them by page,
//! embed the chunks into a persistent vector index, and answer queries with
//! a hybrid of keyword overlap and vector similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Extract  │──▶│ Chunk+Embed │──▶│ SQLite store │
//! │ PDF/text │   │ (folio-core)│   │ + vector idx │
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │
//!                                         ▼
//!                                  ┌─────────────┐
//!                                  │HybridRanker │──▶ CLI (folio)
//!                                  └─────────────┘
//! ```
//!
//! The pure pipeline (models, chunker, index, ranker) lives in `folio-core`.
//! This crate supplies the SQLite store, the on-disk index snapshot, the
//! embedding providers, text extraction, and the `folio` binary.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Shared store, index, and embedder handles |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` |
//! | [`snapshot`] | Atomic on-disk index persistence |
//! | [`embedding`] | Embedding provider selection |
//! | [`extract`] | Page text extraction |
//! | [`ingest`] | Document lifecycle |
//! | [`search`], [`get`], [`stats`] | Command output |
//! | [`logging`] | Tracing subscriber setup |

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod snapshot;
pub mod sqlite_store;
pub mod stats;
