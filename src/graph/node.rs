//! Closed sets of graph nodes and routing decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A routing decision produced by the supervisor.
///
/// Workers are addressed by their index in the crew roster, so a route can
/// only ever name a worker that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Worker(usize),
    Finish,
}

/// A node of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    PreProcess,
    Supervisor,
    Worker(usize),
    Tools,
    End,
}

impl NodeId {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeId::End)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::PreProcess => write!(f, "pre_process"),
            NodeId::Supervisor => write!(f, "supervisor"),
            NodeId::Worker(i) => write!(f, "worker[{i}]"),
            NodeId::Tools => write!(f, "tools"),
            NodeId::End => write!(f, "end"),
        }
    }
}

impl From<Route> for NodeId {
    fn from(route: Route) -> Self {
        match route {
            Route::Worker(i) => NodeId::Worker(i),
            Route::Finish => NodeId::End,
        }
    }
}
