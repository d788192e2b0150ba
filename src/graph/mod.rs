//! Supervisor-directed orchestration graph.
//!
//! [`run`] executes one prompt against a crew: the supervisor picks a worker
//! or finishes, workers answer and may call tools, and visit, message and
//! step limits guarantee that every run ends.

pub mod config;
pub mod context;
pub mod engine;
pub mod node;
pub mod tool_node;
pub mod visits;

pub use config::GraphConfig;
pub use context::{ContextStrategy, WindowSummarizer};
pub use engine::{finalize_transcript, run, CrewGraph, CrewMember};
pub use node::{NodeId, Route};
pub use visits::{RunContext, VisitLedger};
