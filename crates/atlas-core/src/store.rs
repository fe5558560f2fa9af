use crate::error::EngineError;
use crate::types::{
    Entity, FileCommit, FileRecord, GraphStats, RelDirection, RelKind, TraversedEdge,
};

/// Options for name-pattern entity lookups.
#[derive(Debug, Clone, Default)]
pub struct NameQuery {
    /// Maximum number of entities in the full result set.
    pub limit: Option<usize>,
    /// Entities per page. `None` returns the whole (limited) set.
    pub page_size: Option<usize>,
    /// Opaque cursor from a previous page. Stable across identical query
    /// inputs; expires with `InvalidArgument` once the result set changes.
    pub cursor: Option<String>,
}

/// One page of a name lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    /// Present while more pages remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Persistence seam for the code graph.
///
/// Implementations guarantee a single writer at a time; concurrent readers
/// may proceed during a write transaction.
pub trait GraphStore {
    /// Atomically replace all rows originating from `commit.file_path`:
    /// delete that file's entities and from-side relationships, insert the
    /// new rows, and upsert the file record. Issuing identical commits
    /// consecutively leaves identical state.
    fn commit_file(&mut self, commit: &FileCommit) -> Result<(), EngineError>;

    /// Entities in a file, ordered by start line.
    fn entities_by_file(&self, file_path: &str) -> Result<Vec<Entity>, EngineError>;

    /// Lookup by canonical id.
    fn entity_by_id(&self, id: &str) -> Result<Option<Entity>, EngineError>;

    /// Case-sensitive regular-expression lookup over entity names. Supports
    /// anchored exact (`^name$`) and substring patterns, bounded by `limit`
    /// and paged with `page_size` + opaque cursor.
    fn find_entities_by_name(
        &self,
        pattern: &str,
        query: &NameQuery,
    ) -> Result<EntityPage, EngineError>;

    /// BFS expansion from `entity_id` up to `max_depth`, following edges in
    /// `direction` and keeping only `kinds` when non-empty. Each returned
    /// edge carries the depth at which it was reached.
    fn relationships_for(
        &self,
        entity_id: &str,
        direction: RelDirection,
        kinds: &[RelKind],
        max_depth: u32,
    ) -> Result<Vec<TraversedEdge>, EngineError>;

    /// All relationships whose from-side entity lives in `file_path`.
    fn relationships_by_file(&self, file_path: &str) -> Result<Vec<TraversedEdge>, EngineError>;

    /// Aggregate totals over the stored graph.
    fn stats(&self) -> Result<GraphStats, EngineError>;

    /// The bookkeeping record for one file, if indexed.
    fn file_record(&self, file_path: &str) -> Result<Option<FileRecord>, EngineError>;

    /// All file records.
    fn file_records(&self) -> Result<Vec<FileRecord>, EngineError>;

    /// Remove a file's rows and record. Idempotent.
    fn delete_file(&mut self, file_path: &str) -> Result<(), EngineError>;

    /// Drop all rows.
    fn reset(&mut self) -> Result<(), EngineError>;
}
