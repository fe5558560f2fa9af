use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use tracing::debug;

use crate::cursor;
use crate::error::EngineError;
use crate::store::{EntityPage, GraphStore, NameQuery};
use crate::types::{
    Entity, EntityKind, FileCommit, FileRecord, GraphStats, Location, Point, RelDirection,
    RelKind, Relationship, TraversedEdge,
};

const SCHEMA_VERSION: u32 = 1;

/// SQLite-backed implementation of the [`GraphStore`] trait.
///
/// One writer at a time (the connection is `&mut` on write paths); readers
/// proceed under WAL. Commits are per-file atomic.
pub struct SqliteGraphStore {
    conn: Connection,
}

impl SqliteGraphStore {
    /// Open or create a graph database at the given path.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = SqliteGraphStore { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory graph database (for testing).
    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteGraphStore { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), EngineError> {
        // Version gate before touching tables: a mismatched on-disk schema is
        // a SchemaError, and the caller decides whether to re-initialize.
        let has_meta: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'atlas_meta'",
                [],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if has_meta {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT value FROM atlas_meta WHERE key = 'schema_version'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(found) = found {
                let found: u32 = found.parse().unwrap_or(0);
                if found != SCHEMA_VERSION {
                    return Err(EngineError::Schema {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
        }

        self.conn.execute_batch(
            "
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS atlas_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Entities
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                file_path TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                start_column INTEGER NOT NULL,
                start_index INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                end_column INTEGER NOT NULL,
                end_index INTEGER NOT NULL,
                modifiers TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_entities_file ON entities(file_path);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
            CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind);

            -- Relationships; to_id may name an external symbol with no entity row
            CREATE TABLE IF NOT EXISTS relationships (
                id INTEGER PRIMARY KEY,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                from_file TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE (from_id, to_id, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_id);
            CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_id);
            CREATE INDEX IF NOT EXISTS idx_rel_file ON relationships(from_file);

            -- One row per indexed file
            CREATE TABLE IF NOT EXISTS files (
                file_path TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                language TEXT NOT NULL,
                last_parsed_at TEXT NOT NULL,
                parse_time_ms INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO atlas_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        Ok(())
    }

    /// Get the current schema version.
    pub fn schema_version(&self) -> Result<u32, EngineError> {
        let version: String = self.conn.query_row(
            "SELECT value FROM atlas_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        version
            .parse()
            .map_err(|e| EngineError::Io(format!("invalid schema version: {e}")))
    }

    fn row_to_entity(row: &rusqlite::Row) -> SqlResult<Entity> {
        let kind_str: String = row.get("kind")?;
        let kind = EntityKind::parse(&kind_str).unwrap_or(EntityKind::Variable);
        let modifiers: String = row.get("modifiers")?;
        let metadata: String = row.get("metadata")?;
        Ok(Entity {
            id: row.get("id")?,
            name: row.get("name")?,
            kind,
            file_path: row.get("file_path")?,
            location: Location {
                start: Point {
                    line: row.get("start_line")?,
                    column: row.get("start_column")?,
                    index: row.get("start_index")?,
                },
                end: Point {
                    line: row.get("end_line")?,
                    column: row.get("end_column")?,
                    index: row.get("end_index")?,
                },
            },
            modifiers: serde_json::from_str(&modifiers).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }

    fn row_to_relationship(row: &rusqlite::Row) -> SqlResult<Relationship> {
        let kind_str: String = row.get("kind")?;
        let kind = RelKind::parse(&kind_str).unwrap_or(RelKind::Uses);
        let metadata: String = row.get("metadata")?;
        Ok(Relationship {
            from: row.get("from_id")?,
            to: row.get("to_id")?,
            kind,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        })
    }

    fn row_to_file_record(row: &rusqlite::Row) -> SqlResult<FileRecord> {
        Ok(FileRecord {
            file_path: row.get("file_path")?,
            content_hash: row.get("content_hash")?,
            language: row.get("language")?,
            last_parsed_at: row.get("last_parsed_at")?,
            parse_time_ms: row.get("parse_time_ms")?,
            error_count: row.get("error_count")?,
        })
    }

    /// Edges directly adjacent to one entity id, unfiltered by kind.
    fn adjacent(
        &self,
        entity_id: &str,
        direction: RelDirection,
    ) -> Result<Vec<Relationship>, EngineError> {
        let sql = match direction {
            RelDirection::Outgoing => "SELECT * FROM relationships WHERE from_id = ?1",
            RelDirection::Incoming => "SELECT * FROM relationships WHERE to_id = ?1",
            RelDirection::Both => "SELECT * FROM relationships WHERE from_id = ?1 OR to_id = ?1",
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![entity_id], Self::row_to_relationship)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

impl GraphStore for SqliteGraphStore {
    fn commit_file(&mut self, commit: &FileCommit) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM entities WHERE file_path = ?1",
            params![commit.file_path],
        )?;
        tx.execute(
            "DELETE FROM relationships WHERE from_file = ?1",
            params![commit.file_path],
        )?;

        {
            let mut insert_entity = tx.prepare(
                "INSERT OR REPLACE INTO entities
                 (id, name, kind, file_path, start_line, start_column, start_index,
                  end_line, end_column, end_index, modifiers, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for e in &commit.entities {
                insert_entity.execute(params![
                    e.id,
                    e.name,
                    e.kind.as_str(),
                    e.file_path,
                    e.location.start.line,
                    e.location.start.column,
                    e.location.start.index,
                    e.location.end.line,
                    e.location.end.column,
                    e.location.end.index,
                    serde_json::to_string(&e.modifiers)?,
                    serde_json::to_string(&e.metadata)?,
                ])?;
            }

            // Duplicate (from, to, kind) triples collapse to one row.
            let mut insert_rel = tx.prepare(
                "INSERT INTO relationships (from_id, to_id, kind, from_file, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (from_id, to_id, kind) DO NOTHING",
            )?;
            for r in &commit.relationships {
                insert_rel.execute(params![
                    r.from,
                    r.to,
                    r.kind.as_str(),
                    commit.file_path,
                    serde_json::to_string(&r.metadata)?,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO files (file_path, content_hash, language, last_parsed_at, parse_time_ms, error_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (file_path) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 language = excluded.language,
                 last_parsed_at = excluded.last_parsed_at,
                 parse_time_ms = excluded.parse_time_ms,
                 error_count = excluded.error_count",
            params![
                commit.record.file_path,
                commit.record.content_hash,
                commit.record.language,
                commit.record.last_parsed_at,
                commit.record.parse_time_ms,
                commit.record.error_count,
            ],
        )?;

        tx.commit()?;
        debug!(
            file = %commit.file_path,
            entities = commit.entities.len(),
            relationships = commit.relationships.len(),
            "committed file"
        );
        Ok(())
    }

    fn entities_by_file(&self, file_path: &str) -> Result<Vec<Entity>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM entities WHERE file_path = ?1 ORDER BY start_line, start_column")?;
        let rows = stmt
            .query_map(params![file_path], Self::row_to_entity)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn entity_by_id(&self, id: &str) -> Result<Option<Entity>, EngineError> {
        let mut stmt = self.conn.prepare("SELECT * FROM entities WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], Self::row_to_entity)
            .optional()?)
    }

    fn find_entities_by_name(
        &self,
        pattern: &str,
        query: &NameQuery,
    ) -> Result<EntityPage, EngineError> {
        let re = Regex::new(pattern)
            .map_err(|e| EngineError::InvalidArgument(format!("bad name pattern: {e}")))?;

        let mut stmt = self
            .conn
            .prepare("SELECT * FROM entities ORDER BY file_path, start_line, start_column")?;
        let mut matched = Vec::new();
        let rows = stmt.query_map([], Self::row_to_entity)?;
        for entity in rows.filter_map(|r| r.ok()) {
            if !re.is_match(&entity.name) {
                continue;
            }
            matched.push(entity);
            if let Some(limit) = query.limit {
                if matched.len() >= limit {
                    break;
                }
            }
        }

        // Fingerprint the query inputs and the matched ids so a cursor stays
        // valid exactly until a commit changes this result set.
        let limit_tag = query
            .limit
            .map(|l| l.to_string())
            .unwrap_or_default();
        let fingerprint = cursor::fingerprint(
            [pattern, limit_tag.as_str()]
                .into_iter()
                .chain(matched.iter().map(|e| e.id.as_str())),
        );
        let offset = match &query.cursor {
            Some(token) => cursor::decode(token, fingerprint)?,
            None => 0,
        };

        let page_size = query.page_size.unwrap_or(matched.len().max(1));
        let end = offset.saturating_add(page_size).min(matched.len());
        let next_cursor = if end < matched.len() {
            Some(cursor::encode(end, fingerprint))
        } else {
            None
        };
        let entities = matched
            .get(offset..end)
            .map(|s| s.to_vec())
            .unwrap_or_default();
        Ok(EntityPage {
            entities,
            next_cursor,
        })
    }

    fn relationships_for(
        &self,
        entity_id: &str,
        direction: RelDirection,
        kinds: &[RelKind],
        max_depth: u32,
    ) -> Result<Vec<TraversedEdge>, EngineError> {
        let mut out = Vec::new();
        let mut visited_edges: HashSet<(String, String, RelKind)> = HashSet::new();
        let mut seen_nodes: HashSet<String> = HashSet::new();
        seen_nodes.insert(entity_id.to_string());
        let mut frontier = vec![entity_id.to_string()];

        for depth in 1..=max_depth.max(1) {
            let mut next = Vec::new();
            for node in &frontier {
                for rel in self.adjacent(node, direction)? {
                    if !kinds.is_empty() && !kinds.contains(&rel.kind) {
                        continue;
                    }
                    let key = (rel.from.clone(), rel.to.clone(), rel.kind);
                    if !visited_edges.insert(key) {
                        continue;
                    }
                    let far = if rel.from == *node {
                        rel.to.clone()
                    } else {
                        rel.from.clone()
                    };
                    out.push(TraversedEdge {
                        relationship: rel,
                        depth,
                    });
                    if seen_nodes.insert(far.clone()) {
                        next.push(far);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        Ok(out)
    }

    fn relationships_by_file(&self, file_path: &str) -> Result<Vec<TraversedEdge>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM relationships WHERE from_file = ?1")?;
        let rows = stmt
            .query_map(params![file_path], Self::row_to_relationship)?
            .filter_map(|r| r.ok())
            .map(|relationship| TraversedEdge {
                relationship,
                depth: 1,
            })
            .collect();
        Ok(rows)
    }

    fn stats(&self) -> Result<GraphStats, EngineError> {
        let total_entities: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        let total_relationships: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        let files_indexed: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;

        let mut by_kind = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM entities GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            by_kind.insert(row.0, row.1);
        }

        let mut by_language = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT f.language, COUNT(e.id)
             FROM files f LEFT JOIN entities e ON e.file_path = f.file_path
             GROUP BY f.language",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            by_language.insert(row.0, row.1);
        }

        Ok(GraphStats {
            total_entities,
            total_relationships,
            files_indexed,
            by_kind,
            by_language,
        })
    }

    fn file_record(&self, file_path: &str) -> Result<Option<FileRecord>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM files WHERE file_path = ?1")?;
        Ok(stmt
            .query_row(params![file_path], Self::row_to_file_record)
            .optional()?)
    }

    fn file_records(&self) -> Result<Vec<FileRecord>, EngineError> {
        let mut stmt = self.conn.prepare("SELECT * FROM files ORDER BY file_path")?;
        let rows = stmt
            .query_map([], Self::row_to_file_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn delete_file(&mut self, file_path: &str) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM entities WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM relationships WHERE from_file = ?1",
            params![file_path],
        )?;
        tx.execute("DELETE FROM files WHERE file_path = ?1", params![file_path])?;
        tx.commit()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.conn.execute_batch(
            "DELETE FROM entities;
             DELETE FROM relationships;
             DELETE FROM files;",
        )?;
        Ok(())
    }
}
