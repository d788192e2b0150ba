//! The orchestration state machine.
//!
//! A run starts at [`NodeId::PreProcess`] and moves through the graph until
//! it reaches [`NodeId::End`]:
//!
//! ```text
//! pre_process -> supervisor -> worker[i] -> pre_process -> supervisor ...
//!                    |             |
//!                    v             +-> tools -> pre_process
//!                   end            +-> end (visit limit)
//! ```
//!
//! Every node runs as its own tokio task. The state moves into the task and
//! comes back with the next node; counters are reconciled against the run's
//! [`VisitLedger`](crate::graph::visits::VisitLedger) on the way in and
//! recorded on the way out.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinHandle};

use crate::agents::supervisor::{Supervisor, SUPERVISOR_NAME};
use crate::agents::worker::WorkerAgent;
use crate::crew::{validate_roster, AgentRecord};
use crate::crews::crew_output::CrewOutput;
use crate::graph::config::GraphConfig;
use crate::graph::context::{ContextStrategy, WindowSummarizer};
use crate::graph::node::{NodeId, Route};
use crate::graph::tool_node::run_tools;
use crate::graph::visits::RunContext;
use crate::llms::base_llm::BaseLLM;
use crate::tools::tool_set::ToolSet;
use crate::types::message::Message;
use crate::types::state::ConversationState;
use crate::utilities::errors::CrewError;
use crate::utilities::string_utils::contains_marker;

/// An agent record together with the model client that plays it.
#[derive(Debug, Clone)]
pub struct CrewMember {
    pub record: AgentRecord,
    pub llm: Arc<dyn BaseLLM>,
}

impl CrewMember {
    pub fn new(record: AgentRecord, llm: Arc<dyn BaseLLM>) -> Self {
        Self { record, llm }
    }
}

#[derive(Debug, Clone)]
struct GraphInner {
    supervisor: Supervisor,
    workers: Vec<WorkerAgent>,
    tools: Arc<ToolSet>,
    context: Arc<dyn ContextStrategy>,
    config: GraphConfig,
}

/// A validated crew wired into the orchestration graph.
///
/// Cheap to clone; every [`CrewGraph::invoke`] is an independent run.
#[derive(Clone)]
pub struct CrewGraph {
    inner: Arc<GraphInner>,
}

impl fmt::Debug for CrewGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrewGraph")
            .field("workers", &self.inner.supervisor.workers())
            .field("tools", &self.inner.tools.names())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CrewGraph {
    /// Validate the roster and build the graph. Fails without running
    /// anything when the roster is unusable.
    pub fn from_members(
        mut members: Vec<CrewMember>,
        tools: ToolSet,
        config: GraphConfig,
    ) -> Result<Self, CrewError> {
        let records: Vec<AgentRecord> = members.iter().map(|m| m.record.clone()).collect();
        let supervisor_index = validate_roster(&records)?;
        let head = members.remove(supervisor_index);

        let tools = Arc::new(tools);
        let workers: Vec<WorkerAgent> = members
            .into_iter()
            .map(|m| WorkerAgent::new(m.record.name, m.record.system_prompt, m.llm, Arc::clone(&tools)))
            .collect();
        let worker_names = workers.iter().map(|w| w.name().to_string()).collect();
        let supervisor = Supervisor::new(head.llm, worker_names, &head.record.system_prompt);

        Ok(Self {
            inner: Arc::new(GraphInner {
                supervisor,
                workers,
                tools,
                context: Arc::new(WindowSummarizer::from_config(&config)),
                config,
            }),
        })
    }

    /// Replace the context manager.
    pub fn with_context_strategy(mut self, strategy: Arc<dyn ContextStrategy>) -> Self {
        Arc::make_mut(&mut self.inner).context = strategy;
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Run `prompt` to completion.
    pub async fn invoke(&self, prompt: &str) -> CrewOutput {
        self.execute(prompt).await.0
    }

    /// Run `prompt`, also returning the final state when the run did not fail.
    pub(crate) async fn execute(&self, prompt: &str) -> (CrewOutput, Option<ConversationState>) {
        let started = Instant::now();
        let ctx = Arc::new(RunContext::new());
        let state = ConversationState::new(ctx.run_id.clone(), prompt);
        ctx.record_message(Message::user(prompt));

        log::info!(
            "[{}] run started: {} workers, {} tools",
            ctx.run_id,
            self.inner.workers.len(),
            self.inner.tools.len()
        );

        let budget = self.inner.config.run_timeout_secs;
        let result = match tokio::time::timeout(
            Duration::from_secs(budget),
            drive(Arc::clone(&self.inner), Arc::clone(&ctx), state),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CrewError::Timeout { seconds: budget }),
        };

        let exec_time_seconds = started.elapsed().as_secs_f64();
        let messages = finalize_transcript(ctx.transcript());

        match result {
            Ok(state) => {
                log::info!(
                    "[{}] run finished in {:.2}s with {} messages",
                    ctx.run_id,
                    exec_time_seconds,
                    messages.len()
                );
                let output = CrewOutput {
                    run_id: ctx.run_id.clone(),
                    messages,
                    termination_reason: state.termination_reason.clone(),
                    error: None,
                    exec_time_seconds,
                };
                (output, Some(state))
            }
            Err(e) => {
                log::error!("[{}] run failed after {:.2}s: {}", ctx.run_id, exec_time_seconds, e);
                let output = CrewOutput {
                    run_id: ctx.run_id.clone(),
                    messages,
                    termination_reason: None,
                    error: Some(e.to_string()),
                    exec_time_seconds,
                };
                (output, None)
            }
        }
    }
}

/// Validate `members`, run `prompt` and report the outcome.
///
/// Never fails: configuration problems and run failures alike come back in
/// [`CrewOutput::error`].
pub async fn run(
    members: Vec<CrewMember>,
    tools: ToolSet,
    prompt: &str,
    config: GraphConfig,
) -> CrewOutput {
    let started = Instant::now();
    match CrewGraph::from_members(members, tools, config) {
        Ok(graph) => graph.invoke(prompt).await,
        Err(e) => {
            log::error!("Crew rejected before running: {}", e);
            CrewOutput::from_error(&e, started.elapsed().as_secs_f64())
        }
    }
}

/// Aborts the node task when the run is abandoned mid-step.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn drive(
    inner: Arc<GraphInner>,
    ctx: Arc<RunContext>,
    mut state: ConversationState,
) -> Result<ConversationState, CrewError> {
    let mut node = NodeId::PreProcess;
    let mut steps = 0usize;

    while !node.is_terminal() {
        if steps >= inner.config.max_steps {
            let reason = format!("Step limit reached after {steps} steps");
            log::info!("[{}] {}", ctx.run_id, reason);
            state.termination_reason = Some(reason);
            break;
        }
        steps += 1;
        log::debug!("[{}] step {}: {}", ctx.run_id, steps, node);

        let mut task = AbortOnDrop(tokio::spawn(Arc::clone(&inner).execute(
            node,
            state,
            Arc::clone(&ctx),
        )));
        let (next_state, next_node) = match (&mut task.0).await {
            Ok(result) => result?,
            Err(e) => return Err(node_failure(node, e)),
        };
        state = next_state;
        node = next_node;
    }
    Ok(state)
}

fn node_failure(node: NodeId, error: JoinError) -> CrewError {
    let message = if error.is_panic() {
        let payload = error.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("node '{node}' panicked: {detail}")
    } else {
        format!("node '{node}' was cancelled")
    };
    CrewError::Internal { message }
}

impl GraphInner {
    async fn execute(
        self: Arc<Self>,
        node: NodeId,
        mut state: ConversationState,
        ctx: Arc<RunContext>,
    ) -> Result<(ConversationState, NodeId), CrewError> {
        ctx.ledger.reconcile(&mut state);
        let (state, next) = match node {
            NodeId::PreProcess => (self.context.compact(state), NodeId::Supervisor),
            NodeId::Supervisor => self.supervisor_step(state, &ctx).await?,
            NodeId::Worker(index) => self.worker_step(index, state, &ctx).await,
            NodeId::Tools => self.tools_step(state, &ctx).await,
            NodeId::End => (state, NodeId::End),
        };
        ctx.ledger.record(&state);
        Ok((state, next))
    }

    async fn supervisor_step(
        &self,
        mut state: ConversationState,
        ctx: &RunContext,
    ) -> Result<(ConversationState, NodeId), CrewError> {
        let config = &self.config;
        state.supervisor_visits += 1;

        if state.supervisor_visits > config.max_supervisor_visits {
            let reason = format!(
                "Supervisor reached its visit limit ({}/{})",
                state.supervisor_visits, config.max_supervisor_visits
            );
            return Ok(self.finish(state, ctx, Some(reason)).await);
        }
        if state.total_messages > config.max_messages {
            let reason = format!(
                "Message limit exceeded ({} messages, limit {})",
                state.total_messages, config.max_messages
            );
            return Ok(self.finish(state, ctx, Some(reason)).await);
        }

        let decision = self.supervisor.decide(&state).await?;
        if !decision.response.is_empty() {
            ctx.append(&mut state, Message::assistant(SUPERVISOR_NAME, &decision.response));
        }
        state.next = decision.route;

        match decision.route {
            None => {
                let reason = "Supervisor returned no valid routing decision".to_string();
                log::info!("[{}] {} (next={:?})", ctx.run_id, reason, decision.raw_next);
                state.termination_reason = Some(reason);
                Ok((state, NodeId::End))
            }
            Some(Route::Finish) => {
                log::debug!("[{}] supervisor chose FINISH", ctx.run_id);
                Ok(self.finish(state, ctx, None).await)
            }
            Some(Route::Worker(_))
                if contains_marker(&decision.response, &config.completion_markers) =>
            {
                let reason = "Supervisor marked the task as complete".to_string();
                Ok(self.finish(state, ctx, Some(reason)).await)
            }
            Some(Route::Worker(index)) => {
                log::debug!(
                    "[{}] supervisor routed to '{}'",
                    ctx.run_id,
                    self.supervisor.workers()[index]
                );
                Ok((state, NodeId::Worker(index)))
            }
        }
    }

    /// End the run from the supervisor, closing with a synthesized answer
    /// when any worker contributed.
    async fn finish(
        &self,
        mut state: ConversationState,
        ctx: &RunContext,
        reason: Option<String>,
    ) -> (ConversationState, NodeId) {
        if let Some(reason) = &reason {
            log::info!("[{}] {}", ctx.run_id, reason);
        }
        state.termination_reason = reason;
        state.next = Some(Route::Finish);

        if state.any_worker_visited() {
            let original = state.original_request().unwrap_or_default().to_string();
            match self.supervisor.synthesize(&ctx.transcript(), &original).await {
                Ok(answer) => ctx.append(&mut state, answer),
                Err(e) => log::warn!("[{}] final answer synthesis failed: {}", ctx.run_id, e),
            }
        }
        (state, NodeId::End)
    }

    async fn worker_step(
        &self,
        index: usize,
        mut state: ConversationState,
        ctx: &RunContext,
    ) -> (ConversationState, NodeId) {
        let Some(worker) = self.workers.get(index) else {
            state.termination_reason = Some(format!("No worker at position {index}"));
            return (state, NodeId::End);
        };
        let name = worker.name().to_string();
        let visits = {
            let visits = state.agent_visits.entry(name.clone()).or_insert(0);
            *visits += 1;
            *visits
        };

        let mut reply = worker.invoke(&state).await;
        let cap = self.config.max_agent_visits;
        if visits >= cap {
            log::info!(
                "[{}] agent '{}' reached its visit limit ({}/{})",
                ctx.run_id,
                name,
                visits,
                cap
            );
            // Calls requested on the final turn never run.
            let skipped = reply.drop_tool_calls();
            ctx.append(&mut state, reply);
            let mut notice = format!(
                "Forced termination: agent '{name}' reached its visit limit ({visits}/{cap})"
            );
            if !skipped.is_empty() {
                let names: Vec<&str> = skipped.iter().map(|c| c.name.as_str()).collect();
                notice.push_str(&format!("; tool calls not executed: {}", names.join(", ")));
            }
            ctx.append(&mut state, Message::system(notice));
            state.termination_reason = Some(format!(
                "Agent '{name}' reached its visit limit ({visits}/{cap})"
            ));
            return (state, NodeId::End);
        }

        let wants_tools = reply.has_tool_calls();
        ctx.append(&mut state, reply);
        if wants_tools {
            (state, NodeId::Tools)
        } else {
            (state, NodeId::PreProcess)
        }
    }

    async fn tools_step(
        &self,
        mut state: ConversationState,
        ctx: &RunContext,
    ) -> (ConversationState, NodeId) {
        for result in run_tools(&self.tools, &state).await {
            ctx.append(&mut state, result);
        }
        (state, NodeId::PreProcess)
    }
}

/// Deduplicate a finished transcript.
///
/// Leading user messages collapse into one; after that only the first
/// message per [`Message::dedup_key`] is kept.
pub fn finalize_transcript(messages: Vec<Message>) -> Vec<Message> {
    let leading = messages.iter().take_while(|m| m.is_user()).count();
    let mut rest = messages.into_iter();
    let mut out = Vec::new();

    if leading > 0 {
        let mut contents: Vec<String> = Vec::new();
        for message in rest.by_ref().take(leading) {
            let content = message.content().to_string();
            if !contents.contains(&content) {
                contents.push(content);
            }
        }
        out.push(Message::user(contents.join("\n\n")));
    }

    let mut seen: HashSet<(String, String)> = out.iter().map(Message::dedup_key).collect();
    for message in rest {
        if seen.insert(message.dedup_key()) {
            out.push(message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::base_llm::{LLMError, LLMMessage, LLMResponse, StructuredOutput};
    use crate::llms::testing::ScriptedLLM;
    use crate::mcp::config::MCPServerHTTP;
    use crate::tools::base_tool::Tool;
    use crate::tools::tool_set::{ToolConfig, LOCAL_PROVIDER};
    use crate::types::message::ToolCall;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn member(name: &str, role: &str, llm: &Arc<ScriptedLLM>) -> CrewMember {
        CrewMember::new(
            AgentRecord::new(name, role, format!("You are the {name}.")),
            Arc::clone(llm) as Arc<dyn BaseLLM>,
        )
    }

    fn crew(supervisor: &Arc<ScriptedLLM>, researcher: &Arc<ScriptedLLM>) -> Vec<CrewMember> {
        vec![
            member("boss", "supervisor", supervisor),
            member("researcher", "researcher", researcher),
        ]
    }

    fn unbounded() -> GraphConfig {
        GraphConfig {
            max_supervisor_visits: 100,
            max_agent_visits: 100,
            ..Default::default()
        }
    }

    fn graph(members: Vec<CrewMember>, tools: ToolSet, config: GraphConfig) -> CrewGraph {
        CrewGraph::from_members(members, tools, config).unwrap()
    }

    fn position(messages: &[Message], pred: impl Fn(&Message) -> bool) -> usize {
        messages.iter().position(pred).unwrap()
    }

    #[tokio::test]
    async fn test_supervisor_answers_directly_without_workers() {
        let sup = Arc::new(ScriptedLLM::new().decide("FINISH", "Hello! How can I help?"));
        let graph = graph(vec![member("boss", "supervisor", &sup)], ToolSet::new(), GraphConfig::default());

        let (output, state) = graph.execute("hello").await;

        assert!(output.is_success());
        assert_eq!(
            output.messages,
            vec![
                Message::user("hello"),
                Message::assistant(SUPERVISOR_NAME, "Hello! How can I help?"),
            ]
        );
        assert_eq!(output.termination_reason, None);
        assert_eq!(state.unwrap().next, Some(Route::Finish));
        assert_eq!(sup.call_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_turn_then_synthesized_answer() {
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "Asking the researcher")
                .decide("FINISH", "We have what we need")
                .reply_text("Decision trees split data on the most informative feature."),
        );
        let researcher = Arc::new(ScriptedLLM::new().reply_text("Trees split on features."));

        let output = run(crew(&sup, &researcher), ToolSet::new(), "explain trees", GraphConfig::default()).await;

        assert!(output.is_success());
        let messages = &output.messages;
        let user = position(messages, |m| m.is_user());
        let worker = position(messages, |m| m.author() == Some("researcher"));
        let last = messages.last().unwrap();
        assert!(user < worker);
        assert_eq!(
            last,
            &Message::assistant(
                SUPERVISOR_NAME,
                "Decision trees split data on the most informative feature."
            )
        );
        assert_eq!(sup.call_count(), 1);
        assert_eq!(researcher.call_count(), 1);

        // The synthesis prompt re-reads the worker's contribution.
        let synthesis_prompt = &sup.calls.lock()[0];
        assert!(synthesis_prompt
            .iter()
            .any(|m| m["content"] == "Trees split on features."));
    }

    #[tokio::test]
    async fn test_unreachable_tool_provider_still_yields_answer() {
        let providers = vec![MCPServerHTTP::new("search", "http://127.0.0.1:9/mcp")];
        let tools = ToolSet::discover(
            &providers,
            &ToolConfig {
                connect_timeout_secs: 2,
                ..Default::default()
            },
        )
        .await;
        assert!(tools.is_empty());

        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "Look it up")
                .decide("FINISH", "Done"),
        );
        let researcher = Arc::new(ScriptedLLM::new().reply_text("Without tools: Oslo is the capital."));

        let output = run(crew(&sup, &researcher), tools, "capital of Norway?", GraphConfig::default()).await;

        assert!(output.is_success());
        assert!(output
            .messages
            .contains(&Message::assistant("researcher", "Without tools: Oslo is the capital.")));
        let worker_prompt = &researcher.calls.lock()[0];
        assert!(worker_prompt[0]["content"]
            .as_str()
            .unwrap()
            .contains("No tools are available"));
    }

    #[tokio::test]
    async fn test_worker_visit_cap_forces_termination() {
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "round 1")
                .decide("researcher", "round 2")
                .decide("researcher", "round 3")
                .decide("researcher", "round 4"),
        );
        let researcher = Arc::new(
            ScriptedLLM::new()
                .reply_text("finding 1")
                .reply_text("finding 2")
                .reply_text("finding 3"),
        );

        let (output, state) = graph(crew(&sup, &researcher), ToolSet::new(), GraphConfig::default())
            .execute("dig deep")
            .await;

        let reason = output.termination_reason.as_deref().unwrap();
        assert!(reason.contains("researcher"));
        assert!(reason.contains("3/3"));
        assert_eq!(
            output.messages.last().unwrap(),
            &Message::system("Forced termination: agent 'researcher' reached its visit limit (3/3)")
        );
        assert_eq!(researcher.call_count(), 3);
        assert_eq!(state.unwrap().visits_for("researcher"), 3);
        assert_eq!(sup.call_count(), 0);
    }

    #[tokio::test]
    async fn test_message_cap_forces_termination() {
        let mut sup = ScriptedLLM::new();
        let mut researcher = ScriptedLLM::new();
        for i in 0..10 {
            sup = sup.decide("researcher", &format!("go {i}"));
            researcher = researcher.reply_text(&format!("result {i}"));
        }
        let sup = Arc::new(sup.reply_text("Summary of all results."));
        let researcher = Arc::new(researcher);

        let (output, state) = graph(crew(&sup, &researcher), ToolSet::new(), unbounded())
            .execute("keep going")
            .await;

        let state = state.unwrap();
        assert!(output
            .termination_reason
            .as_deref()
            .unwrap()
            .starts_with("Message limit exceeded"));
        assert_eq!(sup.structured_call_count(), 6);
        assert_eq!(state.total_messages, 14);
        assert_eq!(output.final_answer(), Some("Summary of all results."));
    }

    #[tokio::test]
    async fn test_supervisor_visit_cap_overshoots_by_at_most_one() {
        let mut sup = ScriptedLLM::new();
        for i in 0..5 {
            sup = sup.decide("researcher", &format!("again {i}"));
        }
        let sup = Arc::new(sup);
        let researcher = Arc::new(ScriptedLLM::new());
        let config = GraphConfig {
            max_supervisor_visits: 2,
            ..unbounded()
        };

        let (output, state) = graph(crew(&sup, &researcher), ToolSet::new(), config)
            .execute("loop")
            .await;

        assert_eq!(state.unwrap().supervisor_visits, 3);
        assert_eq!(sup.structured_call_count(), 2);
        assert_eq!(
            output.termination_reason.as_deref(),
            Some("Supervisor reached its visit limit (3/2)")
        );
    }

    #[tokio::test]
    async fn test_invalid_decision_ends_without_synthesis() {
        let sup = Arc::new(ScriptedLLM::new().decide_raw(json!({"next": "nobody", "response": "hmm"})));
        let researcher = Arc::new(ScriptedLLM::new());

        let (output, state) = graph(crew(&sup, &researcher), ToolSet::new(), GraphConfig::default())
            .execute("q")
            .await;

        assert_eq!(
            output.termination_reason.as_deref(),
            Some("Supervisor returned no valid routing decision")
        );
        assert_eq!(output.messages.len(), 2);
        assert_eq!(state.unwrap().next, None);
        assert_eq!(sup.call_count(), 0);
        assert_eq!(researcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_marker_ends_run() {
        let sup = Arc::new(ScriptedLLM::new().decide("researcher", "final answer: 42"));
        let researcher = Arc::new(ScriptedLLM::new());

        let output = run(crew(&sup, &researcher), ToolSet::new(), "q", GraphConfig::default()).await;

        assert_eq!(
            output.termination_reason.as_deref(),
            Some("Supervisor marked the task as complete")
        );
        assert_eq!(researcher.call_count(), 0);
        assert_eq!(output.final_answer(), Some("final answer: 42"));
    }

    #[tokio::test]
    async fn test_tool_calls_route_through_tool_node() {
        let mut tools = ToolSet::new();
        tools.add_provider(
            LOCAL_PROVIDER,
            vec![Arc::new(Tool::new("add", "Add two numbers", |args| {
                Ok((args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0)).to_string())
            }))],
            &ToolConfig::default(),
        );
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "Compute it")
                .decide("researcher", "Report back")
                .decide("FINISH", "Done")
                .reply_text("2 + 3 = 5."),
        );
        let researcher = Arc::new(
            ScriptedLLM::new()
                .reply(LLMResponse::with_tool_calls(
                    "",
                    vec![ToolCall::new("c1", "add", json!({"a": 2, "b": 3}))],
                ))
                .reply_text("The sum is 5."),
        );

        let output = run(crew(&sup, &researcher), tools, "2+3?", GraphConfig::default()).await;

        assert!(output.is_success());
        let messages = &output.messages;
        let call = position(messages, |m| m.has_tool_calls());
        let result = position(messages, |m| matches!(m, Message::Tool { .. }));
        let report = position(messages, |m| m.content() == "The sum is 5.");
        assert!(call < result && result < report);
        assert_eq!(messages[result], Message::tool_result("c1", "add", "5"));

        let second_prompt = &researcher.calls.lock()[1];
        assert!(second_prompt
            .iter()
            .any(|m| m["role"] == "tool" && m["content"] == "5"));
    }

    #[tokio::test]
    async fn test_worker_step_appends_exactly_one_message() {
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "")
                .decide("FINISH", ""),
        );
        let researcher = Arc::new(ScriptedLLM::new().reply_text("only reply"));

        let (output, state) = graph(crew(&sup, &researcher), ToolSet::new(), GraphConfig::default())
            .execute("q")
            .await;

        // Empty supervisor responses are not recorded; synthesis adds "done".
        let state = state.unwrap();
        assert_eq!(state.total_messages, 3);
        assert_eq!(output.messages[1], Message::assistant("researcher", "only reply"));
    }

    #[tokio::test]
    async fn test_supervisor_transport_failure_is_reported() {
        let sup = Arc::new(ScriptedLLM::new().fail_decision(LLMError::Request {
            model: "scripted".into(),
            message: "503 Service Unavailable".into(),
        }));
        let researcher = Arc::new(ScriptedLLM::new());

        let output = run(crew(&sup, &researcher), ToolSet::new(), "q", GraphConfig::default()).await;

        assert!(output.error.as_deref().unwrap().contains("503"));
        assert_eq!(output.messages, vec![Message::user("q")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_returns_partial_transcript() {
        let sup = Arc::new(ScriptedLLM::new().decide("researcher", "Take your time"));
        let researcher = Arc::new(ScriptedLLM::new().with_delay(Duration::from_secs(600)));
        let config = GraphConfig {
            run_timeout_secs: 1,
            ..Default::default()
        };

        let output = run(crew(&sup, &researcher), ToolSet::new(), "slow", config).await;

        assert_eq!(output.error.as_deref(), Some("Run timed out after 1s"));
        assert_eq!(
            output.messages,
            vec![
                Message::user("slow"),
                Message::assistant(SUPERVISOR_NAME, "Take your time"),
            ]
        );
    }

    #[derive(Debug)]
    struct PanickingLLM;

    #[async_trait]
    impl BaseLLM for PanickingLLM {
        fn model(&self) -> &str {
            "panicking"
        }

        async fn acall(
            &self,
            _messages: Vec<LLMMessage>,
            _tools: Option<Vec<Value>>,
        ) -> Result<LLMResponse, LLMError> {
            panic!("model exploded")
        }

        async fn acall_structured(
            &self,
            _messages: Vec<LLMMessage>,
            _schema: &StructuredOutput,
        ) -> Result<Value, LLMError> {
            panic!("model exploded")
        }
    }

    #[tokio::test]
    async fn test_node_panic_becomes_error() {
        let members = vec![CrewMember::new(
            AgentRecord::new("boss", "supervisor", ""),
            Arc::new(PanickingLLM),
        )];

        let output = run(members, ToolSet::new(), "q", GraphConfig::default()).await;

        assert_eq!(
            output.error.as_deref(),
            Some("Internal error: node 'supervisor' panicked: model exploded")
        );
        assert_eq!(output.messages, vec![Message::user("q")]);
    }

    #[tokio::test]
    async fn test_step_cap_forces_termination() {
        let sup = Arc::new(ScriptedLLM::new().decide("researcher", "go"));
        let researcher = Arc::new(ScriptedLLM::new());
        let config = GraphConfig {
            max_steps: 3,
            ..unbounded()
        };

        let output = run(crew(&sup, &researcher), ToolSet::new(), "q", config).await;

        assert_eq!(
            output.termination_reason.as_deref(),
            Some("Step limit reached after 3 steps")
        );
        assert_eq!(researcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_configuration_error_fails_fast() {
        let researcher = Arc::new(ScriptedLLM::new());
        let output = run(
            vec![member("researcher", "researcher", &researcher)],
            ToolSet::new(),
            "q",
            GraphConfig::default(),
        )
        .await;

        assert_eq!(output.error.as_deref(), Some("No supervisor agent found in crew"));
        assert!(output.messages.is_empty());
        assert_eq!(researcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_long_runs_show_models_a_compacted_window() {
        let mut sup = ScriptedLLM::new();
        let mut researcher = ScriptedLLM::new();
        for i in 0..4 {
            sup = sup.decide("researcher", &format!("step {i}"));
            researcher = researcher.reply_text(&format!("note {i}"));
        }
        let sup = Arc::new(sup);
        let researcher = Arc::new(researcher);

        let output = run(crew(&sup, &researcher), ToolSet::new(), "q", unbounded()).await;

        // user + 4 * (supervisor, worker) + synthesis, never compacted.
        assert_eq!(output.messages.len(), 10);
        // Fourth decision: window of 7 compacted to 5, plus system prompt
        // and routing instruction.
        let fourth = &sup.structured_calls.lock()[3];
        assert_eq!(fourth.len(), 7);
        assert!(fourth[2]["content"]
            .as_str()
            .unwrap()
            .starts_with("[Summary of 3 earlier messages"));
    }

    #[derive(Debug, Default)]
    struct CountingStrategy {
        passes: AtomicUsize,
    }

    impl ContextStrategy for CountingStrategy {
        fn compact(&self, mut state: ConversationState) -> ConversationState {
            self.passes.fetch_add(1, Ordering::SeqCst);
            state.message_count = state.messages.len();
            state
        }
    }

    #[tokio::test]
    async fn test_custom_context_strategy_runs_before_each_decision() {
        let strategy = Arc::new(CountingStrategy::default());
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "go")
                .decide("FINISH", "done"),
        );
        let researcher = Arc::new(ScriptedLLM::new());

        let graph = graph(crew(&sup, &researcher), ToolSet::new(), GraphConfig::default())
            .with_context_strategy(Arc::clone(&strategy) as Arc<dyn ContextStrategy>);
        graph.invoke("q").await;

        assert_eq!(strategy.passes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finalize_drops_repeated_messages() {
        let messages = vec![
            Message::user("q"),
            Message::assistant("writer", "draft"),
            Message::assistant("writer", "draft"),
            Message::assistant("editor", "draft"),
            Message::tool_result("c1", "search", "same"),
            Message::tool_result("c2", "search", "same"),
        ];
        let out = finalize_transcript(messages);
        assert_eq!(out.len(), 5);
        assert_eq!(out[1], Message::assistant("writer", "draft"));
        assert_eq!(out[2], Message::assistant("editor", "draft"));
    }

    #[test]
    fn test_finalize_keeps_distinct_tool_call_requests() {
        let messages = vec![
            Message::user("q"),
            Message::assistant_with_tools(
                "researcher",
                "",
                vec![ToolCall::new("c1", "echo", json!({"text": "1"}))],
            ),
            Message::tool_result("c1", "echo", "1"),
            Message::assistant_with_tools(
                "researcher",
                "",
                vec![ToolCall::new("c2", "echo", json!({"text": "2"}))],
            ),
            Message::tool_result("c2", "echo", "2"),
        ];
        let out = finalize_transcript(messages.clone());
        assert_eq!(out, messages);
    }

    #[tokio::test]
    async fn test_repeated_tool_turns_keep_every_request() {
        let mut tools = ToolSet::new();
        tools.add_provider(
            LOCAL_PROVIDER,
            vec![Arc::new(Tool::new("echo", "Echo the text back", |args| {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            }))],
            &ToolConfig::default(),
        );
        let sup = Arc::new(
            ScriptedLLM::new()
                .decide("researcher", "go 1")
                .decide("researcher", "go 2")
                .decide("FINISH", "done")
                .reply_text("final"),
        );
        let researcher = Arc::new(
            ScriptedLLM::new()
                .reply(LLMResponse::with_tool_calls(
                    "",
                    vec![ToolCall::new("c1", "echo", json!({"text": "1"}))],
                ))
                .reply(LLMResponse::with_tool_calls(
                    "",
                    vec![ToolCall::new("c2", "echo", json!({"text": "2"}))],
                )),
        );
        let config = GraphConfig {
            max_agent_visits: 10,
            ..Default::default()
        };

        let output = run(crew(&sup, &researcher), tools, "q", config).await;

        assert!(output.is_success());
        let requested: Vec<&str> = output
            .messages
            .iter()
            .flat_map(|m| m.tool_calls().iter().map(|c| c.id.as_str()))
            .collect();
        assert_eq!(requested, vec!["c1", "c2"]);
        for message in &output.messages {
            if let Message::Tool { tool_call_id, .. } = message {
                assert!(requested.contains(&tool_call_id.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_capped_worker_tool_calls_are_not_left_unanswered() {
        let mut tools = ToolSet::new();
        tools.add_provider(
            LOCAL_PROVIDER,
            vec![Arc::new(Tool::new("echo", "Echo the text back", |args| {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            }))],
            &ToolConfig::default(),
        );
        let sup = Arc::new(ScriptedLLM::new().decide("researcher", "go"));
        let researcher = Arc::new(ScriptedLLM::new().reply(LLMResponse::with_tool_calls(
            "",
            vec![ToolCall::new("c1", "echo", json!({"text": "1"}))],
        )));
        let config = GraphConfig {
            max_agent_visits: 1,
            ..Default::default()
        };

        let output = run(crew(&sup, &researcher), tools, "q", config).await;

        assert!(output.messages.iter().all(|m| !m.has_tool_calls()));
        assert!(output
            .messages
            .iter()
            .all(|m| !matches!(m, Message::Tool { .. })));
        assert!(output
            .messages
            .contains(&Message::assistant("researcher", "(requested tools: echo)")));
        let last = output.messages.last().unwrap();
        assert_eq!(
            last,
            &Message::system(
                "Forced termination: agent 'researcher' reached its visit limit (1/1); \
                 tool calls not executed: echo"
            )
        );
        assert_eq!(
            output.termination_reason.as_deref(),
            Some("Agent 'researcher' reached its visit limit (1/1)")
        );
    }

    #[test]
    fn test_finalize_collapses_leading_user_messages() {
        let messages = vec![
            Message::user("part one"),
            Message::user("part one"),
            Message::user("part two"),
            Message::assistant("supervisor", "ok"),
            Message::user("later"),
        ];
        let out = finalize_transcript(messages);
        assert_eq!(
            out,
            vec![
                Message::user("part one\n\npart two"),
                Message::assistant("supervisor", "ok"),
                Message::user("later"),
            ]
        );
    }
}
