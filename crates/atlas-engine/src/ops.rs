//! Transport-neutral operation surface.
//!
//! [`Engine`] wires every component together for one project root and
//! exposes the operation set an MCP (or any other) adapter dispatches to.
//! Every operation returns the `{ok:true, data}` / `{ok:false, kind,
//! message}` envelope; errors never escape as panics. Long-running
//! operations run under the scheduler with a deadline and a cancellation
//! token derived from the engine's shutdown token.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use atlas_core::config::EngineConfig;
use atlas_core::error::EngineError;
use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::{GraphStore, NameQuery};
use atlas_core::types::RelKind;
use atlas_parsers::incremental::{FileChange, IncrementalParser};
use atlas_semantic::embedder::HashEmbedder;
use atlas_semantic::indexer::SemanticIndexer;
use atlas_semantic::vector::VectorStore;

use crate::agents::{register_all, AgentKind};
use crate::bus::{KnowledgeBus, TOPIC_QUERY_ISSUED};
use crate::metrics::EngineMetrics;
use crate::pipeline::{IndexOptions, IndexPipeline};
use crate::query::{HotspotMetric, QueryEngine};
use crate::scheduler::{ResourceManager, QUERY_DEADLINE, TOOL_CALL_DEADLINE};

/// Wrap a successful payload in the response envelope.
pub fn ok_envelope(data: impl Serialize) -> Value {
    json!({ "ok": true, "data": data })
}

/// Wrap an error in the response envelope.
pub fn err_envelope(error: &EngineError) -> Value {
    json!({
        "ok": false,
        "kind": error.kind(),
        "message": error.to_string(),
    })
}

fn envelope<T: Serialize>(result: Result<T, EngineError>) -> Value {
    match result {
        Ok(data) => ok_envelope(data),
        Err(e) => err_envelope(&e),
    }
}

pub struct Engine {
    root: PathBuf,
    config: EngineConfig,
    graph: Arc<Mutex<SqliteGraphStore>>,
    parser: Arc<IncrementalParser>,
    semantic: Arc<SemanticIndexer>,
    bus: Arc<KnowledgeBus>,
    scheduler: Arc<ResourceManager>,
    metrics: Arc<EngineMetrics>,
    pipeline: Arc<IndexPipeline>,
    query: Arc<QueryEngine>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Open (or create) the engine state for a project root: loads
    /// configuration, opens `graph.db` and `vectors.db` under
    /// `.code-graph-rag/`, and registers the agent set.
    pub fn open(root: &Path) -> Result<Self, EngineError> {
        let root = root.to_path_buf();
        let config = EngineConfig::load(&root);
        let state_dir = config.state_dir(&root);

        let graph = Arc::new(Mutex::new(SqliteGraphStore::open(
            &state_dir.join("graph.db"),
        )?));
        let vectors = Arc::new(VectorStore::open(
            &state_dir.join("vectors.db"),
            config.embedding.dimension,
        )?);
        let provider = Arc::new(HashEmbedder::new(config.embedding.dimension));
        let semantic = Arc::new(SemanticIndexer::new(vectors, provider));

        let bus = Arc::new(KnowledgeBus::new());
        let scheduler = Arc::new(ResourceManager::new(
            config.effective_cpu_workers(),
            config.scheduler.io_workers,
        ));
        register_all(&scheduler);
        let metrics = Arc::new(EngineMetrics::new());

        let pipeline = Arc::new(IndexPipeline::new(
            root.clone(),
            state_dir,
            config.clone(),
            Arc::new(IncrementalParser::new()),
            Arc::clone(&graph),
            Arc::clone(&semantic),
            Arc::clone(&bus),
            Arc::clone(&metrics),
        ));
        let parser = pipeline_parser(&pipeline);
        let query = Arc::new(QueryEngine::new(
            root.clone(),
            Arc::clone(&graph),
            Arc::clone(&semantic),
        ));

        info!(root = %root.display(), "engine opened");
        Ok(Self {
            root,
            config,
            graph,
            parser,
            semantic,
            bus,
            scheduler,
            metrics,
            pipeline,
            query,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<KnowledgeBus> {
        &self.bus
    }

    /// Cancels all in-flight work owned by the engine.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the liveness monitor: every heartbeat interval, agents idle
    /// beyond three intervals are logged (never killed). Runs until
    /// shutdown.
    pub fn spawn_heartbeat_monitor(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(&self.scheduler);
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(crate::scheduler::HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for name in scheduler.idle_agents(3) {
                            tracing::debug!("agent {name} idle beyond heartbeat window");
                        }
                    }
                }
            }
        })
    }

    // -----------------------------------------------------------------
    // Indexing operations
    // -----------------------------------------------------------------

    pub async fn index(&self, path: Option<String>, opts: IndexOptions) -> Value {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.shutdown.child_token();
        let stop = self.bridge_cancellation(&cancel);
        let result = self
            .scheduler
            .run(
                AgentKind::Orchestrator.name(),
                AgentKind::Orchestrator.pool(),
                TOOL_CALL_DEADLINE,
                cancel.clone(),
                move || pipeline.index(path.as_deref().map(Path::new), &opts, Some(stop)),
            )
            .await;
        // Release the cancellation watcher now that the work settled.
        cancel.cancel();
        let result = match result {
            Ok(report) => self.drain_embeddings().await.map(|_| report),
            Err(e) => Err(e),
        };
        envelope(result.map(|report| {
            json!({
                "filesIndexed": report.files_indexed,
                "entities": report.entities,
                "relationships": report.relationships,
                "durationMs": report.duration_ms,
                "fromCache": report.from_cache,
                "errors": report.errors,
                "errorCount": report.error_count,
            })
        }))
    }

    pub async fn batch_index(
        &self,
        path: Option<String>,
        session_id: Option<String>,
        max_files: Option<usize>,
    ) -> Value {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.shutdown.child_token();
        let result = self
            .scheduler
            .run(
                AgentKind::Indexer.name(),
                AgentKind::Indexer.pool(),
                TOOL_CALL_DEADLINE,
                cancel,
                move || {
                    pipeline.batch_index(
                        path.as_deref().map(Path::new),
                        session_id.as_deref(),
                        max_files,
                        &IndexOptions::default(),
                    )
                },
            )
            .await;
        let result = match result {
            Ok(progress) => self.drain_embeddings().await.map(|_| progress),
            Err(e) => Err(e),
        };
        envelope(result.map(|p| {
            json!({
                "sessionId": p.session_id,
                "done": p.done,
                "processed": p.processed,
                "remaining": p.remaining,
                "percent": p.percent,
                "errors": p.errors,
            })
        }))
    }

    pub async fn clean_index(&self, path: Option<String>) -> Value {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.shutdown.child_token();
        let stop = self.bridge_cancellation(&cancel);
        let result = self
            .scheduler
            .run(
                AgentKind::Orchestrator.name(),
                AgentKind::Orchestrator.pool(),
                TOOL_CALL_DEADLINE,
                cancel.clone(),
                move || {
                    pipeline.clean_index(
                        path.as_deref().map(Path::new),
                        &IndexOptions::default(),
                        Some(stop),
                    )
                },
            )
            .await;
        cancel.cancel();
        let result = match result {
            Ok(report) => self.drain_embeddings().await.map(|_| report),
            Err(e) => Err(e),
        };
        envelope(result)
    }

    /// Apply editor-driven file changes incrementally.
    pub async fn apply_changes(&self, changes: Vec<FileChange>) -> Value {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.shutdown.child_token();
        let result = self
            .scheduler
            .run(
                AgentKind::Parser.name(),
                AgentKind::Parser.pool(),
                TOOL_CALL_DEADLINE,
                cancel,
                move || pipeline.apply_changes(&changes),
            )
            .await;
        let result = match result {
            Ok(results) => self.drain_embeddings().await.map(|_| results.len()),
            Err(e) => Err(e),
        };
        envelope(result.map(|n| json!({ "reparsed": n })))
    }

    /// Mirror a cancellation token into a flag the blocking batch loop can
    /// poll between chunks.
    fn bridge_cancellation(&self, cancel: &CancellationToken) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        let watched = Arc::clone(&flag);
        let token = cancel.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            watched.store(true, Ordering::Relaxed);
        });
        flag
    }

    async fn drain_embeddings(&self) -> Result<usize, EngineError> {
        let pipeline = Arc::clone(&self.pipeline);
        self.scheduler
            .run(
                AgentKind::Semantic.name(),
                AgentKind::Semantic.pool(),
                TOOL_CALL_DEADLINE,
                self.shutdown.child_token(),
                move || pipeline.refresh_embeddings(),
            )
            .await
    }

    // -----------------------------------------------------------------
    // Query operations
    // -----------------------------------------------------------------

    async fn run_query<T, F>(&self, task: F) -> Value
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    {
        self.metrics.add(&self.metrics.queries, 1);
        let result = self
            .scheduler
            .run(
                AgentKind::Query.name(),
                AgentKind::Query.pool(),
                QUERY_DEADLINE,
                self.shutdown.child_token(),
                task,
            )
            .await;
        if result.is_err() {
            self.metrics.add(&self.metrics.errors, 1);
        }
        envelope(result)
    }

    /// Free-form entry point: an entity id resolves structurally, anything
    /// else runs through hybrid search.
    pub async fn query(&self, input: String, k: usize) -> Value {
        self.bus
            .publish(TOPIC_QUERY_ISSUED, json!({ "query": input }));
        let graph = Arc::clone(&self.graph);
        let query = Arc::clone(&self.query);
        self.run_query(move || {
            let looks_like_id = {
                let graph = graph.lock().expect("graph lock");
                graph.entity_by_id(&input)?
            };
            match looks_like_id {
                Some(entity) => {
                    let edges = query.list_relationships(&entity.id, 1, &[])?;
                    Ok(json!({ "entity": entity, "relationships": edges }))
                }
                None => {
                    let page = query.semantic_search(&input, k, None, None, None)?;
                    Ok(json!({ "results": page.results }))
                }
            }
        })
        .await
    }

    pub async fn list_file_entities(&self, path: String) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.list_file_entities(&path)).await
    }

    pub async fn list_entity_relationships(
        &self,
        entity_name: String,
        depth: u32,
        kinds: Vec<String>,
    ) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || {
            let kinds = parse_kinds(&kinds)?;
            let ranked = query.resolve_entity(&entity_name, None)?;
            let Some(best) = ranked.first() else {
                return Err(EngineError::InvalidArgument(format!(
                    "no entity matches name: {entity_name}"
                )));
            };
            let edges = query.list_relationships(&best.entity.id, depth, &kinds)?;
            Ok(json!({ "entity": best.entity, "relationships": edges }))
        })
        .await
    }

    pub async fn resolve_entity(&self, name: String, file_hint: Option<String>) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.resolve_entity(&name, file_hint.as_deref()))
            .await
    }

    pub async fn get_entity_source(
        &self,
        entity_id: String,
        context_lines: u32,
        max_bytes: usize,
    ) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.get_source_snippet(&entity_id, context_lines, max_bytes))
            .await
    }

    pub async fn semantic_search(
        &self,
        q: String,
        k: usize,
        page_size: Option<usize>,
        cursor: Option<String>,
    ) -> Value {
        self.bus.publish(TOPIC_QUERY_ISSUED, json!({ "query": q }));
        let query = Arc::clone(&self.query);
        self.run_query(move || query.semantic_search(&q, k, None, page_size, cursor.as_deref()))
            .await
    }

    pub async fn find_similar_code(
        &self,
        code: Option<String>,
        entity_id: Option<String>,
        k: usize,
    ) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.find_similar_code(code.as_deref(), entity_id.as_deref(), k))
            .await
    }

    pub async fn analyze_code_impact(&self, entity_id: String, depth: u32) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.impact(&entity_id, depth)).await
    }

    pub async fn analyze_hotspots(&self, metric: String, limit: usize) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || {
            let metric = HotspotMetric::parse(&metric).ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "unknown hotspot metric: {metric} (expected complexity|fan_in|fan_out)"
                ))
            })?;
            query.hotspots(metric, limit)
        })
        .await
    }

    pub async fn detect_code_clones(&self, min_similarity: f32) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.detect_code_clones(min_similarity))
            .await
    }

    pub async fn cross_language_search(&self, q: String, languages: Vec<String>, k: usize) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.cross_language_search(&q, &languages, k))
            .await
    }

    pub async fn find_related_concepts(&self, entity_id: String, k: usize) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.find_related_concepts(&entity_id, k))
            .await
    }

    pub async fn suggest_refactoring(&self, file_path: String) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.suggest_refactoring(&file_path))
            .await
    }

    pub async fn get_graph(&self, limit: usize) -> Value {
        let query = Arc::clone(&self.query);
        self.run_query(move || query.graph_dump(limit)).await
    }

    pub async fn get_graph_stats(&self) -> Value {
        let graph = Arc::clone(&self.graph);
        self.run_query(move || {
            let graph = graph.lock().expect("graph lock");
            graph.stats()
        })
        .await
    }

    /// Quick name lookup with limit, bypassing rank scoring. Pages with the
    /// same opaque-cursor contract as the other listing operations.
    pub async fn find_entities(
        &self,
        pattern: String,
        limit: Option<usize>,
        page_size: Option<usize>,
        cursor: Option<String>,
    ) -> Value {
        let graph = Arc::clone(&self.graph);
        self.run_query(move || {
            let graph = graph.lock().expect("graph lock");
            graph.find_entities_by_name(
                &pattern,
                &NameQuery {
                    limit,
                    page_size,
                    cursor,
                },
            )
        })
        .await
    }

    // -----------------------------------------------------------------
    // Introspection and maintenance
    // -----------------------------------------------------------------

    pub fn get_metrics(&self) -> Value {
        ok_envelope(self.metrics.snapshot(self.parser.throughput()))
    }

    pub fn get_agent_metrics(&self) -> Value {
        ok_envelope(self.scheduler.agent_metrics())
    }

    pub fn get_bus_stats(&self) -> Value {
        ok_envelope(self.bus.stats())
    }

    pub fn clear_bus_topic(&self, topic: &str) -> Value {
        ok_envelope(json!({ "cleared": self.bus.clear_topic(topic) }))
    }

    pub fn get_cache_stats(&self) -> Value {
        ok_envelope(self.parser.cache_stats())
    }

    pub fn get_semantic_stats(&self) -> Value {
        ok_envelope(self.semantic.stats())
    }

    pub async fn reset_graph(&self) -> Value {
        let graph = Arc::clone(&self.graph);
        let semantic = Arc::clone(&self.semantic);
        let parser = Arc::clone(&self.parser);
        let result = self
            .scheduler
            .run(
                AgentKind::Orchestrator.name(),
                AgentKind::Orchestrator.pool(),
                TOOL_CALL_DEADLINE,
                self.shutdown.child_token(),
                move || {
                    graph.lock().expect("graph lock").reset()?;
                    semantic.store().reset()?;
                    parser.clear_cache();
                    Ok(json!({ "reset": true }))
                },
            )
            .await;
        envelope(result)
    }
}

fn pipeline_parser(pipeline: &IndexPipeline) -> Arc<IncrementalParser> {
    Arc::clone(pipeline.parser())
}

fn parse_kinds(kinds: &[String]) -> Result<Vec<RelKind>, EngineError> {
    kinds
        .iter()
        .map(|k| {
            RelKind::parse(k)
                .ok_or_else(|| EngineError::InvalidArgument(format!("unknown relationship type: {k}")))
        })
        .collect()
}
