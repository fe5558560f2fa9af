//! The atlas engine: coordination and query layer over the graph and
//! semantic stores.
//!
//! - [`bus`] — in-process pub/sub for agent events
//! - [`scheduler`] — admission control, per-agent caps, cancellation,
//!   deadlines
//! - [`agents`] — the parser/indexer/query/semantic/orchestrator agent set
//! - [`metrics`] — process-level counters
//! - [`pipeline`] — walk → parse → commit → embed, plus resumable batch
//!   sessions and incremental re-index
//! - [`query`] — structural traversal and hybrid semantic search
//! - [`ops`] — the transport-neutral operation surface with the
//!   `{ok, ...}` response envelope

pub mod agents;
pub mod bus;
pub mod logging;
pub mod metrics;
pub mod ops;
pub mod pipeline;
pub mod query;
pub mod scheduler;
