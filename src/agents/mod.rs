//! Agents of a crew.
//!
//! One [`Supervisor`] decides who acts next; any number of [`WorkerAgent`]s
//! do the work. Prompt assembly and output parsing are shared between them.

pub mod parser;
pub mod prompts;
pub mod supervisor;
pub mod worker;

pub use parser::{OutputParserError, RouteDecision, FINISH};
pub use supervisor::{Supervisor, SUPERVISOR_NAME};
pub use worker::WorkerAgent;
