//! Query engine: structural traversal and hybrid semantic search over the
//! current consistent snapshot.
//!
//! Hybrid search embeds the query, takes vector top-K, then re-ranks with
//! structural bonuses (name substring, same-file-as-hint), annotating each
//! result with the signals that contributed. All listing/search operations
//! paginate with opaque cursors that stay valid until the underlying result
//! set changes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Reversed};
use serde::Serialize;

use atlas_core::error::EngineError;
use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::{GraphStore, NameQuery};
use atlas_core::types::{Entity, EntityKind, RelDirection, RelKind, TraversedEdge};
use atlas_semantic::embedder::embedding_input;
use atlas_semantic::indexer::SemanticIndexer;

/// Relationship kinds that carry impact: a change to the target can affect
/// the source.
pub const IMPACT_KINDS: [RelKind; 5] = [
    RelKind::Calls,
    RelKind::Imports,
    RelKind::Inherits,
    RelKind::Implements,
    RelKind::MemberOf,
];

#[derive(Debug, Clone, Serialize)]
pub struct RankedEntity {
    pub entity: Entity,
    pub score: f64,
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub reachable: Vec<Entity>,
    pub edges: Vec<TraversedEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotspotMetric {
    Complexity,
    FanIn,
    FanOut,
}

impl HotspotMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "complexity" => Some(HotspotMetric::Complexity),
            "fan_in" => Some(HotspotMetric::FanIn),
            "fan_out" => Some(HotspotMetric::FanOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotEntry {
    pub entity: Entity,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub entity: Entity,
    pub score: f32,
    pub structural_matches: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticPage {
    pub results: Vec<SemanticHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneCluster {
    pub entity_ids: Vec<String>,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefactorSuggestion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub kind: String,
    pub message: String,
}

pub struct QueryEngine {
    root: PathBuf,
    graph: Arc<Mutex<SqliteGraphStore>>,
    semantic: Arc<SemanticIndexer>,
}

impl QueryEngine {
    pub fn new(
        root: PathBuf,
        graph: Arc<Mutex<SqliteGraphStore>>,
        semantic: Arc<SemanticIndexer>,
    ) -> Self {
        Self {
            root,
            graph,
            semantic,
        }
    }

    /// Rank entities for a name: exact > prefix > substring, then path-hint
    /// suffix overlap, then entity-kind priority.
    pub fn resolve_entity(
        &self,
        name: &str,
        file_hint: Option<&str>,
    ) -> Result<Vec<RankedEntity>, EngineError> {
        let pattern = regex::escape(name);
        let candidates = {
            let graph = self.graph.lock().expect("graph lock");
            graph
                .find_entities_by_name(&pattern, &NameQuery::default())?
                .entities
        };

        let mut ranked: Vec<RankedEntity> = candidates
            .into_iter()
            .map(|entity| {
                let mut score = 0.0;
                let mut signals = Vec::new();
                if entity.name == name {
                    score += 3.0;
                    signals.push("exact".to_string());
                } else if entity.name.starts_with(name) {
                    score += 2.0;
                    signals.push("prefix".to_string());
                } else {
                    score += 1.0;
                    signals.push("substring".to_string());
                }
                if let Some(hint) = file_hint {
                    let overlap = suffix_overlap(&entity.file_path, hint);
                    if overlap > 0 {
                        score += 0.1 * overlap as f64;
                        signals.push("path_hint".to_string());
                    }
                }
                score += kind_priority(entity.kind);
                RankedEntity {
                    entity,
                    score,
                    signals,
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        Ok(ranked)
    }

    pub fn list_file_entities(&self, path: &str) -> Result<Vec<Entity>, EngineError> {
        let graph = self.graph.lock().expect("graph lock");
        graph.entities_by_file(path)
    }

    pub fn list_relationships(
        &self,
        entity_id: &str,
        depth: u32,
        kinds: &[RelKind],
    ) -> Result<Vec<TraversedEdge>, EngineError> {
        let graph = self.graph.lock().expect("graph lock");
        graph.relationships_for(entity_id, RelDirection::Both, kinds, depth.max(1))
    }

    /// Reverse reachability: everything that (transitively) depends on the
    /// entity through the impact-carrying edge kinds.
    pub fn impact(&self, entity_id: &str, depth: u32) -> Result<ImpactReport, EngineError> {
        let edges = {
            let graph = self.graph.lock().expect("graph lock");
            graph.relationships_for(
                entity_id,
                RelDirection::Incoming,
                &IMPACT_KINDS,
                depth.max(1),
            )?
        };

        let mut dependency_graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for edge in &edges {
            dependency_graph.add_edge(
                edge.relationship.from.as_str(),
                edge.relationship.to.as_str(),
                (),
            );
        }

        let mut reachable_ids = HashSet::new();
        if dependency_graph.contains_node(entity_id) {
            let reversed = Reversed(&dependency_graph);
            let mut bfs = Bfs::new(reversed, entity_id);
            while let Some(node) = bfs.next(reversed) {
                if node != entity_id {
                    reachable_ids.insert(node.to_string());
                }
            }
        }

        let graph = self.graph.lock().expect("graph lock");
        let mut reachable = Vec::new();
        let mut sorted_ids: Vec<String> = reachable_ids.into_iter().collect();
        sorted_ids.sort();
        for id in sorted_ids {
            if let Some(entity) = graph.entity_by_id(&id)? {
                reachable.push(entity);
            }
        }
        Ok(ImpactReport { reachable, edges })
    }

    /// Entities ranked by a structural heat metric.
    pub fn hotspots(
        &self,
        metric: HotspotMetric,
        limit: usize,
    ) -> Result<Vec<HotspotEntry>, EngineError> {
        let (entities, in_degree, out_degree) = {
            let graph = self.graph.lock().expect("graph lock");
            let records = graph.file_records()?;
            let mut entities = Vec::new();
            let mut in_degree: HashMap<String, u64> = HashMap::new();
            let mut out_degree: HashMap<String, u64> = HashMap::new();
            for record in &records {
                entities.extend(graph.entities_by_file(&record.file_path)?);
                for edge in graph.relationships_by_file(&record.file_path)? {
                    *out_degree.entry(edge.relationship.from).or_default() += 1;
                    *in_degree.entry(edge.relationship.to).or_default() += 1;
                }
            }
            (entities, in_degree, out_degree)
        };

        let mut entries: Vec<HotspotEntry> = entities
            .into_iter()
            .map(|entity| {
                let fan_in = in_degree.get(&entity.id).copied().unwrap_or(0);
                let fan_out = out_degree.get(&entity.id).copied().unwrap_or(0);
                let span = (entity.location.end.line.saturating_sub(entity.location.start.line)
                    + 1) as u64;
                let value = match metric {
                    HotspotMetric::FanIn => fan_in,
                    HotspotMetric::FanOut => fan_out,
                    HotspotMetric::Complexity => span + fan_in + fan_out,
                };
                HotspotEntry { entity, value }
            })
            .filter(|entry| entry.value > 0)
            .collect();
        entries.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Hybrid semantic + structural search with cursor pagination.
    pub fn semantic_search(
        &self,
        query: &str,
        k: usize,
        file_hint: Option<&str>,
        page_size: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<SemanticPage, EngineError> {
        let ranked = self.hybrid_candidates(query, k, file_hint, None)?;
        paginate(ranked, query, k, page_size, cursor)
    }

    /// Hybrid search restricted to a set of languages.
    pub fn cross_language_search(
        &self,
        query: &str,
        languages: &[String],
        k: usize,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        let language_by_file: HashMap<String, String> = {
            let graph = self.graph.lock().expect("graph lock");
            graph
                .file_records()?
                .into_iter()
                .map(|r| (r.file_path, r.language))
                .collect()
        };
        let allowed: HashSet<&str> = languages.iter().map(|l| l.as_str()).collect();
        let hits = self.hybrid_candidates(query, k * 4, None, None)?;
        Ok(hits
            .into_iter()
            .filter(|hit| {
                language_by_file
                    .get(&hit.entity.file_path)
                    .is_some_and(|lang| allowed.is_empty() || allowed.contains(lang.as_str()))
            })
            .take(k)
            .collect())
    }

    /// Nearest stored vectors to an existing entity, excluding itself.
    pub fn find_related_concepts(
        &self,
        entity_id: &str,
        k: usize,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        let entity = self.require_entity(entity_id)?;
        let vector = match self.semantic.store().get(entity_id)? {
            Some(v) => v,
            None => self.semantic.provider().embed(&embedding_input(&entity)),
        };
        self.neighbors(&vector, k, Some(entity_id))
    }

    /// Nearest stored vectors to an ad-hoc code snippet or an entity.
    pub fn find_similar_code(
        &self,
        code: Option<&str>,
        entity_id: Option<&str>,
        k: usize,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        match (code, entity_id) {
            (Some(code), _) => {
                let vector = self.semantic.provider().embed(code);
                self.neighbors(&vector, k, None)
            }
            (None, Some(id)) => self.find_related_concepts(id, k),
            (None, None) => Err(EngineError::InvalidArgument(
                "find_similar_code requires code or entityId".to_string(),
            )),
        }
    }

    /// Clusters of entities whose embeddings agree beyond `min_similarity`.
    pub fn detect_code_clones(
        &self,
        min_similarity: f32,
    ) -> Result<Vec<CloneCluster>, EngineError> {
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(EngineError::InvalidArgument(
                "minSimilarity must be within [0, 1]".to_string(),
            ));
        }
        let store = self.semantic.store();
        let ids = store.entity_ids()?;
        let vectors: Vec<(String, Vec<f32>)> = ids
            .into_iter()
            .filter_map(|id| store.get(&id).ok().flatten().map(|v| (id, v)))
            .collect();

        // Union-find over the similarity graph: every pair above threshold
        // joins its endpoints' clusters, merging two existing clusters when
        // both sides are already assigned. Reported similarity is the
        // weakest pair inside the cluster.
        let mut sets = DisjointSet::new(vectors.len());
        let mut weakest: HashMap<usize, f32> = HashMap::new();
        for i in 0..vectors.len() {
            for j in (i + 1)..vectors.len() {
                let score = atlas_semantic::vector::cosine(&vectors[i].1, &vectors[j].1);
                if score < min_similarity {
                    continue;
                }
                let root_i = sets.find(i);
                let root_j = sets.find(j);
                let merged_min = weakest
                    .remove(&root_i)
                    .unwrap_or(1.0)
                    .min(weakest.remove(&root_j).unwrap_or(1.0))
                    .min(score);
                let root = sets.union(root_i, root_j);
                weakest.insert(root, merged_min);
            }
        }

        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for idx in 0..vectors.len() {
            members.entry(sets.find(idx)).or_default().push(idx);
        }
        let mut out: Vec<CloneCluster> = members
            .into_iter()
            .filter(|(_, indices)| indices.len() >= 2)
            .map(|(root, indices)| {
                let mut entity_ids: Vec<String> =
                    indices.iter().map(|m| vectors[*m].0.clone()).collect();
                entity_ids.sort();
                CloneCluster {
                    entity_ids,
                    similarity: weakest.get(&root).copied().unwrap_or(min_similarity),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity_ids.cmp(&b.entity_ids))
        });
        Ok(out)
    }

    /// Lazily read an entity's source, with context lines and a byte cap.
    pub fn get_source_snippet(
        &self,
        entity_id: &str,
        context_lines: u32,
        max_bytes: usize,
    ) -> Result<Snippet, EngineError> {
        let entity = self.require_entity(entity_id)?;
        let full_path = self.root.join(&entity.file_path);
        let content = std::fs::read_to_string(&full_path)?;
        let lines: Vec<&str> = content.lines().collect();

        let start = entity
            .location
            .start
            .line
            .saturating_sub(1)
            .saturating_sub(context_lines) as usize;
        let end = ((entity.location.end.line + context_lines) as usize).min(lines.len());
        let mut text = lines[start.min(lines.len())..end].join("\n");

        let mut truncated = false;
        if text.len() > max_bytes {
            let mut cut = max_bytes;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            truncated = true;
        }
        Ok(Snippet {
            text,
            start_line: start as u32 + 1,
            end_line: end as u32,
            truncated,
        })
    }

    /// Per-file heuristics over graph shape: long functions, high fan-in,
    /// crowded files.
    pub fn suggest_refactoring(
        &self,
        file_path: &str,
    ) -> Result<Vec<RefactorSuggestion>, EngineError> {
        let entities = self.list_file_entities(file_path)?;
        let mut suggestions = Vec::new();

        if entities.len() > 30 {
            suggestions.push(RefactorSuggestion {
                entity_id: None,
                kind: "split_file".to_string(),
                message: format!(
                    "{file_path} declares {} entities; consider splitting it into focused modules",
                    entities.len()
                ),
            });
        }

        let graph = self.graph.lock().expect("graph lock");
        for entity in &entities {
            let span = entity
                .location
                .end
                .line
                .saturating_sub(entity.location.start.line)
                + 1;
            if matches!(entity.kind, EntityKind::Function | EntityKind::Method) && span > 60 {
                suggestions.push(RefactorSuggestion {
                    entity_id: Some(entity.id.clone()),
                    kind: "long_function".to_string(),
                    message: format!(
                        "{} spans {span} lines; consider extracting helpers",
                        entity.name
                    ),
                });
            }
            let fan_in = graph
                .relationships_for(&entity.id, RelDirection::Incoming, &[], 1)?
                .len();
            if fan_in > 10 {
                suggestions.push(RefactorSuggestion {
                    entity_id: Some(entity.id.clone()),
                    kind: "high_fan_in".to_string(),
                    message: format!(
                        "{} has {fan_in} direct dependents; changes here ripple widely",
                        entity.name
                    ),
                });
            }
        }
        Ok(suggestions)
    }

    /// Bounded node + edge dump for visualization.
    pub fn graph_dump(&self, limit: usize) -> Result<serde_json::Value, EngineError> {
        let graph = self.graph.lock().expect("graph lock");
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for record in graph.file_records()? {
            for entity in graph.entities_by_file(&record.file_path)? {
                if nodes.len() >= limit {
                    break;
                }
                nodes.push(serde_json::json!({
                    "id": entity.id,
                    "name": entity.name,
                    "kind": entity.kind.as_str(),
                    "file": entity.file_path,
                }));
            }
            for edge in graph.relationships_by_file(&record.file_path)? {
                if edges.len() >= limit {
                    break;
                }
                edges.push(serde_json::json!({
                    "from": edge.relationship.from,
                    "to": edge.relationship.to,
                    "kind": edge.relationship.kind.as_str(),
                }));
            }
        }
        Ok(serde_json::json!({ "nodes": nodes, "edges": edges }))
    }

    fn require_entity(&self, entity_id: &str) -> Result<Entity, EngineError> {
        let graph = self.graph.lock().expect("graph lock");
        graph
            .entity_by_id(entity_id)?
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown entity: {entity_id}")))
    }

    fn neighbors(
        &self,
        vector: &[f32],
        k: usize,
        exclude: Option<&str>,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        let hits = self
            .semantic
            .store()
            .search_top_k(vector, k.saturating_add(1), None)?;
        let graph = self.graph.lock().expect("graph lock");
        let mut out = Vec::new();
        for hit in hits {
            if Some(hit.entity_id.as_str()) == exclude {
                continue;
            }
            if let Some(entity) = graph.entity_by_id(&hit.entity_id)? {
                out.push(SemanticHit {
                    entity,
                    score: hit.score,
                    structural_matches: vec!["vector".to_string()],
                });
            }
            if out.len() >= k {
                break;
            }
        }
        Ok(out)
    }

    /// The shared hybrid ranking: vector candidates re-scored with
    /// structural bonuses; structural-only fallback when no embeddings
    /// exist yet.
    fn hybrid_candidates(
        &self,
        query: &str,
        k: usize,
        file_hint: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        let tokens = atlas_semantic::embedder::tokenize(query);
        let store = self.semantic.store();

        let mut hits: Vec<SemanticHit> = Vec::new();
        if !store.is_empty()? {
            let vector = self.semantic.provider().embed(query);
            // Over-fetch so structural bonuses can reorder the tail.
            let candidates = store.search_top_k(&vector, (k * 4).max(16), None)?;
            let graph = self.graph.lock().expect("graph lock");
            for hit in candidates {
                if Some(hit.entity_id.as_str()) == exclude {
                    continue;
                }
                let Some(entity) = graph.entity_by_id(&hit.entity_id)? else {
                    continue;
                };
                let (bonus, matches) = structural_bonus(&entity, &tokens, file_hint);
                hits.push(SemanticHit {
                    entity,
                    score: hit.score + bonus,
                    structural_matches: if matches.is_empty() {
                        vec!["vector".to_string()]
                    } else {
                        let mut m = vec!["vector".to_string()];
                        m.extend(matches);
                        m
                    },
                });
            }
        }

        if hits.is_empty() && !tokens.is_empty() {
            // No embeddings yet: structural fallback over entity names.
            let pattern = format!(
                "(?i)({})",
                tokens
                    .iter()
                    .map(|t| regex::escape(t))
                    .collect::<Vec<_>>()
                    .join("|")
            );
            let graph = self.graph.lock().expect("graph lock");
            let candidates = graph
                .find_entities_by_name(
                    &pattern,
                    &NameQuery {
                        limit: Some((k * 4).max(16)),
                        ..NameQuery::default()
                    },
                )?
                .entities;
            for entity in candidates {
                if Some(entity.id.as_str()) == exclude {
                    continue;
                }
                let (bonus, mut matches) = structural_bonus(&entity, &tokens, file_hint);
                matches.insert(0, "structural_fallback".to_string());
                hits.push(SemanticHit {
                    entity,
                    score: bonus.max(0.05),
                    structural_matches: matches,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

fn kind_priority(kind: EntityKind) -> f64 {
    match kind {
        EntityKind::Class | EntityKind::Function | EntityKind::Method => 0.2,
        EntityKind::Interface | EntityKind::Enum | EntityKind::Module | EntityKind::Typedef => 0.1,
        _ => 0.0,
    }
}

/// Minimal union-find with path compression, used to merge clone pairs into
/// connected components.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`; returns the surviving root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        self.parent[root_b] = root_a;
        root_a
    }
}

/// Count matching trailing path components.
fn suffix_overlap(path: &str, hint: &str) -> usize {
    let a: Vec<&str> = path.rsplit('/').collect();
    let b: Vec<&str> = hint.rsplit('/').collect();
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn structural_bonus(
    entity: &Entity,
    tokens: &[String],
    file_hint: Option<&str>,
) -> (f32, Vec<String>) {
    let mut bonus = 0.0;
    let mut matches = Vec::new();
    let name_lower = entity.name.to_lowercase();
    if tokens.iter().any(|t| name_lower.contains(t.as_str())) {
        bonus += 0.25;
        matches.push("name".to_string());
    }
    if let Some(hint) = file_hint {
        if suffix_overlap(&entity.file_path, hint) > 0 {
            bonus += 0.15;
            matches.push("file_hint".to_string());
        }
    }
    (bonus, matches)
}

/// Opaque cursor: page offset plus a fingerprint of the ranked id list.
/// Cursors stay valid for identical query inputs until the ranking changes.
fn paginate(
    ranked: Vec<SemanticHit>,
    query: &str,
    k: usize,
    page_size: Option<usize>,
    cursor: Option<&str>,
) -> Result<SemanticPage, EngineError> {
    let k_tag = k.to_string();
    let fingerprint = atlas_core::cursor::fingerprint(
        [query, k_tag.as_str()]
            .into_iter()
            .chain(ranked.iter().map(|hit| hit.entity.id.as_str())),
    );

    let offset = match cursor {
        None => 0,
        Some(token) => atlas_core::cursor::decode(token, fingerprint)?,
    };

    let page_size = page_size.unwrap_or(ranked.len().max(1));
    let end = offset.saturating_add(page_size).min(ranked.len());
    let results: Vec<SemanticHit> = ranked
        .get(offset..end)
        .map(|s| s.to_vec())
        .unwrap_or_default();
    let next_cursor = if end < ranked.len() {
        Some(atlas_core::cursor::encode(end, fingerprint))
    } else {
        None
    };
    Ok(SemanticPage {
        results,
        next_cursor,
    })
}
