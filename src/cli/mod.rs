//! Command-line runner.
//!
//! `crew-run <crew.yaml> <prompt...>` loads a crew definition, runs the
//! prompt and prints the output as JSON.

use std::path::PathBuf;

use crate::crew::{Crew, CrewSpec};
use crate::crews::crew_output::CrewOutput;
use crate::utilities::errors::CrewError;

pub const USAGE: &str = "usage: crew-run <crew.yaml|crew.json> <prompt...>";

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Run a prompt against the crew in `crew_file`.
    Run { crew_file: PathBuf, prompt: String },
    Help,
    Version,
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I, S>(args: I) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match args.first().map(String::as_str) {
        None | Some("-h") | Some("--help") | Some("help") => Ok(CliCommand::Help),
        Some("-V") | Some("--version") | Some("version") => Ok(CliCommand::Version),
        Some(file) => {
            let prompt = args[1..].join(" ");
            if prompt.trim().is_empty() {
                return Err(format!("missing prompt\n{USAGE}"));
            }
            Ok(CliCommand::Run {
                crew_file: PathBuf::from(file),
                prompt,
            })
        }
    }
}

/// Load the crew file and run the prompt with settings from the environment.
pub async fn run_crew(crew_file: &std::path::Path, prompt: &str) -> Result<CrewOutput, CrewError> {
    let spec = CrewSpec::from_file(crew_file)?;
    log::info!(
        "Loaded crew '{}' from {} ({} agents, {} tool providers)",
        spec.name,
        crew_file.display(),
        spec.agents.len(),
        spec.tool_providers.len()
    );
    Crew::new(spec).execute_prompt(prompt).await
}
