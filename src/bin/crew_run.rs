//! crew-run: execute one prompt against a crew definition file.
//!
//! # Environment Variables
//!
//! - `OPENROUTER_API_KEY` / `OPENAI_API_KEY`: gateway credentials
//! - `CREW_DEFAULT_MODEL`, `CREW_LLM_BASE_URL`: model routing
//! - `RUST_LOG`: log filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! crew-run crew.yaml "Research decision trees and summarize them"
//! ```

use anyhow::Context;

use crew_graph::cli::{parse_args, run_crew, CliCommand, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)? {
        CliCommand::Help => println!("{USAGE}"),
        CliCommand::Version => println!("crew-run {}", crew_graph::VERSION),
        CliCommand::Run { crew_file, prompt } => {
            let output = run_crew(&crew_file, &prompt)
                .await
                .with_context(|| format!("running crew from {}", crew_file.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("serializing output")?
            );
            if !output.is_success() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
