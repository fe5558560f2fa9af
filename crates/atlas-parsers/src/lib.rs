//! Multi-language parsing pipeline for atlas.
//!
//! - [`registry`] — extension → grammar mapping, lazily loaded per process
//! - [`treesitter`] — CST production with incremental reparse and deadlines
//! - [`analyzers`] — one analyzer per language emitting entities + relationships
//!   under shared circuit breakers
//! - [`incremental`] — content-hash keyed LRU cache and the batch parser
//! - [`walker`] — ignore-respecting repository walk with exclusion globs
//!
//! Supported languages: JavaScript, TypeScript, Python, C, C++, Rust, Go,
//! Java, C#, VBA, and Markdown.

pub mod analyzers;
pub mod fallback;
pub mod incremental;
pub mod registry;
pub mod treesitter;
pub mod walker;
