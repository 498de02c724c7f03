//! Stage-driven loop: analyze, plan, then generate.

use std::sync::Arc;

use super::actions::{
    Action, ActionContext, ActionOutput, AnalyzeRequirement, CreateTodo, GenerateCode,
};
use super::state::{AgentState, Stage};
use crate::config::Config;

/// Runs the actions in stage order until the state is terminal.
pub struct AgenticLoop {
    analyze: Arc<dyn Action>,
    plan: Arc<dyn Action>,
    generate: Arc<dyn Action>,
}

impl AgenticLoop {
    /// Loop with the default actions over a shared context.
    pub fn new(ctx: ActionContext) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            analyze: Arc::new(AnalyzeRequirement::new(ctx.clone())),
            plan: Arc::new(CreateTodo::new(ctx.clone())),
            generate: Arc::new(GenerateCode::new(ctx)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ActionContext::from_config(config))
    }

    /// Loop with custom actions for each stage.
    pub fn with_actions(
        analyze: Arc<dyn Action>,
        plan: Arc<dyn Action>,
        generate: Arc<dyn Action>,
    ) -> Self {
        Self {
            analyze,
            plan,
            generate,
        }
    }

    fn next_action(&self, stage: Stage) -> Option<&dyn Action> {
        match stage {
            Stage::Start => Some(self.analyze.as_ref()),
            Stage::Analyzed => Some(self.plan.as_ref()),
            Stage::Planned => Some(self.generate.as_ref()),
            Stage::Completed => None,
        }
    }

    /// Process one request. Action failures are recorded on the returned
    /// state rather than raised.
    pub async fn run(&self, request: &str) -> AgentState {
        let mut state = AgentState::new(request);
        tracing::info!("Starting agent loop for request: {}", request);

        while !state.is_terminal() {
            let Some(action) = self.next_action(state.stage) else {
                break;
            };
            tracing::info!("Stage {}: running {}", state.stage, action.name());

            match action.execute(&state).await {
                Ok(output) => {
                    if let Err(note) = apply(&mut state, output) {
                        tracing::error!("{}: {}", action.name(), note);
                        state.fail(format!("{}: {}", action.name(), note));
                    }
                }
                Err(e) => {
                    tracing::error!("{} failed: {:#}", action.name(), e);
                    state.fail(format!("{}: {:#}", action.name(), e));
                }
            }
        }

        match &state.failure {
            Some(failure) => tracing::warn!("Agent loop stopped at {}: {}", state.stage, failure),
            None => tracing::info!(
                "Agent loop completed with {} tasks",
                state.todo_list.len()
            ),
        }
        state
    }
}

fn apply(state: &mut AgentState, output: ActionOutput) -> Result<(), String> {
    match (state.stage, output) {
        (Stage::Start, ActionOutput::Analysis { text, research }) => {
            state.analysis = Some(text);
            state.research = research;
            state.advance(Stage::Analyzed);
        }
        (Stage::Analyzed, ActionOutput::Plan(items)) => {
            state.todo_list = items;
            state.advance(Stage::Planned);
        }
        (Stage::Planned, ActionOutput::Code(code)) => {
            state.generated_code = Some(code);
            state.complete_all_tasks();
            state.advance(Stage::Completed);
        }
        (stage, other) => {
            return Err(format!("unexpected output at stage {}: {:?}", stage, other));
        }
    }
    Ok(())
}
