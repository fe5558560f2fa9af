//! Core types, graph storage, and configuration for atlas.
//!
//! This crate provides the foundational data structures used across all atlas crates:
//! - [`types`] — Entities, relationships, and file records
//! - [`error`] — The [`EngineError`](error::EngineError) taxonomy shared by every component
//! - [`store`] — The [`GraphStore`](store::GraphStore) trait for graph persistence
//! - [`sqlite`] — SQLite-backed implementation of `GraphStore`
//! - [`config`] — Configuration loading from `.code-graph-rag/config.json`
//! - [`cursor`] — Opaque, fingerprinted pagination cursors
//! - [`hash`] — Deterministic content hashing (truncated SHA-256)
//! - [`session`] — Resumable batch-index sessions persisted as JSON

pub mod config;
pub mod cursor;
pub mod error;
pub mod hash;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod types;
