//! Crew definitions.
//!
//! A [`CrewSpec`] is the roster handed in by the caller: agent records and
//! tool provider records, usually read from YAML. [`Crew`] pairs a spec with
//! the connection settings needed to run it and is the convenience front
//! door to [`crate::graph::run`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agents::parser::FINISH;
use crate::crews::crew_output::CrewOutput;
use crate::graph::config::GraphConfig;
use crate::graph::engine::{CrewGraph, CrewMember};
use crate::llm::LLMConfig;
use crate::mcp::config::MCPServerHTTP;
use crate::tools::tool_set::{ToolConfig, ToolSet};
use crate::utilities::errors::CrewError;

/// Role value that marks the supervisor of a crew.
pub const SUPERVISOR_ROLE: &str = "supervisor";

/// One agent of a crew.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: String,
    /// Model id used instead of the crew default.
    #[serde(
        default,
        alias = "model",
        alias = "modelOverride",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_override: Option<String>,
}

impl AgentRecord {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            system_prompt: system_prompt.into(),
            model_override: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn is_supervisor(&self) -> bool {
        self.role.trim().eq_ignore_ascii_case(SUPERVISOR_ROLE)
    }
}

/// Check a roster and return the position of its supervisor.
///
/// Names must be non-empty, unique ignoring case, and may not collide with
/// the `FINISH` routing keyword.
pub fn validate_roster(agents: &[AgentRecord]) -> Result<usize, CrewError> {
    if agents.is_empty() {
        return Err(CrewError::EmptyCrew);
    }

    let mut seen = HashSet::new();
    for agent in agents {
        let name = agent.name.trim();
        if name.is_empty() {
            return Err(CrewError::InvalidDefinition {
                message: "agent name must not be empty".to_string(),
            });
        }
        if name.eq_ignore_ascii_case(FINISH) {
            return Err(CrewError::InvalidDefinition {
                message: format!("agent name '{name}' is reserved"),
            });
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(CrewError::DuplicateAgent {
                name: name.to_string(),
            });
        }
    }

    let supervisors: Vec<usize> = agents
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_supervisor())
        .map(|(i, _)| i)
        .collect();

    match supervisors.as_slice() {
        [] => Err(CrewError::NoSupervisor),
        [index] => Ok(*index),
        many => Err(CrewError::MultipleSupervisors {
            names: many
                .iter()
                .map(|i| agents[*i].name.clone())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Roster and tool providers of a crew.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
    #[serde(default, alias = "tools")]
    pub tool_providers: Vec<MCPServerHTTP>,
}

impl CrewSpec {
    pub fn from_yaml(text: &str) -> Result<Self, CrewError> {
        serde_yaml::from_str(text).map_err(|e| CrewError::InvalidDefinition {
            message: e.to_string(),
        })
    }

    pub fn from_json(text: &str) -> Result<Self, CrewError> {
        serde_json::from_str(text).map_err(|e| CrewError::InvalidDefinition {
            message: e.to_string(),
        })
    }

    /// Load a definition file; `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn from_file(path: &Path) -> Result<Self, CrewError> {
        let text = std::fs::read_to_string(path).map_err(|e| CrewError::InvalidDefinition {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    pub fn validate(&self) -> Result<(), CrewError> {
        validate_roster(&self.agents).map(|_| ())
    }

    pub fn supervisor(&self) -> Option<&AgentRecord> {
        self.agents.iter().find(|a| a.is_supervisor())
    }

    pub fn workers(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.iter().filter(|a| !a.is_supervisor())
    }
}

/// A crew ready to execute prompts.
#[derive(Debug, Clone)]
pub struct Crew {
    pub spec: CrewSpec,
    pub llm_config: LLMConfig,
    pub tool_config: ToolConfig,
    pub graph_config: GraphConfig,
}

impl Crew {
    /// A crew configured from the environment.
    pub fn new(spec: CrewSpec) -> Self {
        Self {
            spec,
            llm_config: LLMConfig::from_env(),
            tool_config: ToolConfig::from_env(),
            graph_config: GraphConfig::from_env(),
        }
    }

    pub fn with_llm_config(mut self, config: LLMConfig) -> Self {
        self.llm_config = config;
        self
    }

    pub fn with_tool_config(mut self, config: ToolConfig) -> Self {
        self.tool_config = config;
        self
    }

    pub fn with_graph_config(mut self, config: GraphConfig) -> Self {
        self.graph_config = config;
        self
    }

    /// Validate the roster, build one model client per agent and discover
    /// the tools of every provider.
    pub async fn prepare(&self) -> Result<(Vec<CrewMember>, ToolSet), CrewError> {
        self.spec.validate()?;

        let members = self
            .spec
            .agents
            .iter()
            .map(|agent| {
                CrewMember::new(
                    agent.clone(),
                    self.llm_config.build(agent.model_override.as_deref()),
                )
            })
            .collect();
        let tools = ToolSet::discover(&self.spec.tool_providers, &self.tool_config).await;
        Ok((members, tools))
    }

    /// Run `prompt` through the crew.
    ///
    /// Configuration problems are returned as errors before anything runs;
    /// failures during the run are reported through the output.
    pub async fn execute_prompt(&self, prompt: &str) -> Result<CrewOutput, CrewError> {
        let (members, tools) = self.prepare().await?;
        let graph = CrewGraph::from_members(members, tools, self.graph_config.clone())?;
        log::info!(
            "Executing prompt on crew '{}' ({} agents)",
            self.spec.name,
            self.spec.agents.len()
        );
        Ok(graph.invoke(prompt).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREW_YAML: &str = r#"
name: research
agents:
  - name: boss
    role: Supervisor
    systemPrompt: "You coordinate {members}."
  - name: researcher
    role: researcher
    system_prompt: You find facts.
    model: openai/gpt-4o-mini
tools:
  - name: search
    url: http://127.0.0.1:9/mcp
"#;

    #[test]
    fn test_from_yaml_accepts_aliases() {
        let spec = CrewSpec::from_yaml(CREW_YAML).unwrap();
        assert_eq!(spec.name, "research");
        assert_eq!(spec.supervisor().unwrap().name, "boss");
        assert_eq!(spec.agents[0].system_prompt, "You coordinate {members}.");
        assert_eq!(
            spec.agents[1].model_override.as_deref(),
            Some("openai/gpt-4o-mini")
        );
        assert_eq!(spec.workers().count(), 1);
        assert_eq!(spec.tool_providers[0].name, "search");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_roster_errors() {
        assert!(matches!(validate_roster(&[]), Err(CrewError::EmptyCrew)));

        let no_supervisor = [AgentRecord::new("a", "worker", "")];
        assert!(matches!(
            validate_roster(&no_supervisor),
            Err(CrewError::NoSupervisor)
        ));

        let two = [
            AgentRecord::new("a", "supervisor", ""),
            AgentRecord::new("b", "SUPERVISOR", ""),
        ];
        match validate_roster(&two) {
            Err(CrewError::MultipleSupervisors { names }) => assert_eq!(names, "a, b"),
            other => panic!("unexpected: {other:?}"),
        }

        let duplicate = [
            AgentRecord::new("boss", "supervisor", ""),
            AgentRecord::new("Writer", "worker", ""),
            AgentRecord::new("writer", "worker", ""),
        ];
        assert!(matches!(
            validate_roster(&duplicate),
            Err(CrewError::DuplicateAgent { .. })
        ));

        let reserved = [
            AgentRecord::new("boss", "supervisor", ""),
            AgentRecord::new("finish", "worker", ""),
        ];
        assert!(matches!(
            validate_roster(&reserved),
            Err(CrewError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_validate_roster_returns_supervisor_position() {
        let agents = [
            AgentRecord::new("researcher", "worker", ""),
            AgentRecord::new("boss", "supervisor", ""),
        ];
        assert_eq!(validate_roster(&agents).unwrap(), 1);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = CrewSpec::from_yaml("agents: {not: [a list").unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_execute_prompt_fails_fast_without_supervisor() {
        let spec = CrewSpec {
            agents: vec![AgentRecord::new("writer", "worker", "")],
            ..Default::default()
        };
        let crew = Crew::new(spec);
        assert!(matches!(
            crew.execute_prompt("hello").await,
            Err(CrewError::NoSupervisor)
        ));
    }

    #[tokio::test]
    async fn test_prepare_applies_model_override() {
        let mut spec = CrewSpec::from_yaml(CREW_YAML).unwrap();
        spec.tool_providers.clear();
        let crew = Crew::new(spec).with_llm_config(LLMConfig::default());

        let (members, tools) = crew.prepare().await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].llm.model(), crate::llm::DEFAULT_MODEL);
        assert_eq!(members[1].llm.model(), "openai/gpt-4o-mini");
        assert!(tools.is_empty());
    }
}
