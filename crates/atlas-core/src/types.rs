use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity kinds in the code graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Class,
    Interface,
    Enum,
    Typedef,
    Function,
    Method,
    Property,
    Constant,
    Variable,
    Document,
    Heading,
}

impl EntityKind {
    /// Returns the lowercase string representation of this entity kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Enum => "enum",
            EntityKind::Typedef => "typedef",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Property => "property",
            EntityKind::Constant => "constant",
            EntityKind::Variable => "variable",
            EntityKind::Document => "document",
            EntityKind::Heading => "heading",
        }
    }

    /// Parses the lowercase representation back into a kind.
    pub fn parse(s: &str) -> Option<EntityKind> {
        match s {
            "module" => Some(EntityKind::Module),
            "class" => Some(EntityKind::Class),
            "interface" => Some(EntityKind::Interface),
            "enum" => Some(EntityKind::Enum),
            "typedef" => Some(EntityKind::Typedef),
            "function" => Some(EntityKind::Function),
            "method" => Some(EntityKind::Method),
            "property" => Some(EntityKind::Property),
            "constant" => Some(EntityKind::Constant),
            "variable" => Some(EntityKind::Variable),
            "document" => Some(EntityKind::Document),
            "heading" => Some(EntityKind::Heading),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship kinds between graph entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    Calls,
    Imports,
    Inherits,
    Implements,
    Embeds,
    MemberOf,
    FriendOf,
    Uses,
    Contains,
    Decorates,
}

impl RelKind {
    /// Returns the lowercase string representation of this relationship kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelKind::Calls => "calls",
            RelKind::Imports => "imports",
            RelKind::Inherits => "inherits",
            RelKind::Implements => "implements",
            RelKind::Embeds => "embeds",
            RelKind::MemberOf => "member_of",
            RelKind::FriendOf => "friend_of",
            RelKind::Uses => "uses",
            RelKind::Contains => "contains",
            RelKind::Decorates => "decorates",
        }
    }

    /// Parses the lowercase representation back into a kind.
    pub fn parse(s: &str) -> Option<RelKind> {
        match s {
            "calls" => Some(RelKind::Calls),
            "imports" => Some(RelKind::Imports),
            "inherits" => Some(RelKind::Inherits),
            "implements" => Some(RelKind::Implements),
            "embeds" => Some(RelKind::Embeds),
            "member_of" => Some(RelKind::MemberOf),
            "friend_of" => Some(RelKind::FriendOf),
            "uses" => Some(RelKind::Uses),
            "contains" => Some(RelKind::Contains),
            "decorates" => Some(RelKind::Decorates),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in a source file. Lines are 1-based, columns and byte indices 0-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub line: u32,
    pub column: u32,
    pub index: u32,
}

/// A source span covering an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: Point,
    pub end: Point,
}

/// A named program construct with a stable id and source location.
///
/// The canonical id form is `"<filePath>:<kind>:<qualifiedName>"`; qualifier
/// rules are language-specific and owned by the analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub file_path: String,
    pub location: Location,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Entity {
    /// Composes the canonical entity id `"<filePath>:<kind>:<qualifiedName>"`.
    pub fn make_id(file_path: &str, kind: EntityKind, qualified_name: &str) -> String {
        format!("{}:{}:{}", file_path, kind.as_str(), qualified_name)
    }
}

/// A directed, typed edge between two entity ids.
///
/// `to` may name an external symbol with no backing [`Entity`]; such edges
/// are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelKind,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Relationship {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: RelKind) -> Self {
        Relationship {
            from: from.into(),
            to: to.into(),
            kind,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Bookkeeping row for one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    pub content_hash: String,
    pub language: String,
    /// RFC 3339 wall-clock timestamp of the last parse commit.
    pub last_parsed_at: String,
    pub parse_time_ms: u64,
    pub error_count: u32,
}

/// A per-file parse diagnostic. Not a Rust error: analyzers report these
/// inside results instead of propagating failures across their boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub file_path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ParseDiagnostic {
    pub fn new(file_path: impl Into<String>, message: impl Into<String>) -> Self {
        ParseDiagnostic {
            file_path: file_path.into(),
            message: message.into(),
            location: None,
        }
    }
}

/// Direction for relationship traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelDirection {
    Outgoing,
    Incoming,
    Both,
}

/// An edge returned from BFS expansion, annotated with the depth at which it
/// was reached (1 = directly adjacent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversedEdge {
    #[serde(flatten)]
    pub relationship: Relationship,
    pub depth: u32,
}

/// Aggregate counts over the stored graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: u64,
    pub total_relationships: u64,
    pub files_indexed: u64,
    pub by_kind: std::collections::HashMap<String, u64>,
    pub by_language: std::collections::HashMap<String, u64>,
}

/// Everything produced by one parse of one file, ready to commit.
#[derive(Debug, Clone)]
pub struct FileCommit {
    pub file_path: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub record: FileRecord,
}
