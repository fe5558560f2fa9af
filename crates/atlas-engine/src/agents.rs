//! The engine's agent set.
//!
//! Each agent owns its queue inside the resource manager and talks to the
//! rest of the system only through the graph store, the vector store, or the
//! knowledge bus. The orchestrator fans work out to the others.

use crate::scheduler::{AgentCaps, Pool, ResourceManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Parser,
    Indexer,
    Query,
    Semantic,
    Orchestrator,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Parser,
        AgentKind::Indexer,
        AgentKind::Query,
        AgentKind::Semantic,
        AgentKind::Orchestrator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Parser => "parser",
            AgentKind::Indexer => "indexer",
            AgentKind::Query => "query",
            AgentKind::Semantic => "semantic",
            AgentKind::Orchestrator => "orchestrator",
        }
    }

    /// Parsing and embedding are CPU-bound; indexing and queries spend most
    /// of their time in storage.
    pub fn pool(&self) -> Pool {
        match self {
            AgentKind::Parser | AgentKind::Semantic => Pool::Cpu,
            AgentKind::Indexer | AgentKind::Query | AgentKind::Orchestrator => Pool::Io,
        }
    }

    pub fn caps(&self) -> AgentCaps {
        match self {
            AgentKind::Parser => AgentCaps {
                max_concurrent: 2,
                max_backlog: 32,
            },
            AgentKind::Indexer => AgentCaps {
                max_concurrent: 1,
                max_backlog: 8,
            },
            AgentKind::Query => AgentCaps {
                max_concurrent: 4,
                max_backlog: 32,
            },
            AgentKind::Semantic => AgentCaps {
                max_concurrent: 1,
                max_backlog: 16,
            },
            AgentKind::Orchestrator => AgentCaps {
                max_concurrent: 1,
                max_backlog: 4,
            },
        }
    }
}

/// Register the full agent set with its default caps.
pub fn register_all(manager: &ResourceManager) {
    for kind in AgentKind::ALL {
        manager.register_agent(kind.name(), kind.caps());
    }
}
