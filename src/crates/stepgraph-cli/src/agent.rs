//! The demo agent graph
//!
//! ```text
//! START → router ─┬─▶ confirm ─┬─▶ answer → END
//!                 └─▶ END      └─▶ END
//! ```

use stepgraph_core::{
    CompiledGraph, GraphSpec, Message, NodeContext, ResumeInput, Result, State, StepResult, END,
    START,
};

pub const CONFIRM_PROMPT: &str = "answer now? yes/no";
pub const DECLINE_REPLY: &str = "OK, I won't answer for now.";
pub const EMPTY_QUESTION_REPLY: &str = "Please enter a question first.";
pub const SYSTEM_PROMPT: &str =
    "You are a conversational assistant. Answer the user's current question using the whole conversation so far.";

/// True for `y` / `yes` in any case, surrounding whitespace ignored
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

async fn router(state: State, _ctx: NodeContext) -> Result<StepResult> {
    let asked = state
        .last_message()
        .map_or(false, |m| m.is_human() && !m.text().trim().is_empty());

    Ok(if asked {
        StepResult::route("confirm")
    } else {
        StepResult::route(END).with_update(Message::assistant(EMPTY_QUESTION_REPLY))
    })
}

async fn ask_confirmation(_state: State, _ctx: NodeContext) -> Result<StepResult> {
    Ok(StepResult::interrupt(CONFIRM_PROMPT))
}

async fn apply_confirmation(
    _state: State,
    input: ResumeInput,
    _ctx: NodeContext,
) -> Result<StepResult> {
    let accepted = input.as_str().map_or(false, is_affirmative);
    tracing::debug!(accepted, "Confirmation received");

    Ok(if accepted {
        StepResult::route("answer")
    } else {
        StepResult::route(END).with_update(Message::assistant(DECLINE_REPLY))
    })
}

async fn answer(state: State, ctx: NodeContext) -> Result<StepResult> {
    let reply = ctx.complete(Some(SYSTEM_PROMPT), &state.messages).await?;
    Ok(StepResult::update(reply))
}

/// Build and compile the `router → confirm → answer` graph
pub fn build_agent() -> Result<CompiledGraph> {
    let mut spec = GraphSpec::new();

    spec.add_node("router", router)?
        .add_routes("router", ["confirm", END])?
        .add_interruptible_node("confirm", ask_confirmation, apply_confirmation)?
        .add_routes("confirm", ["answer", END])?
        .add_node("answer", answer)?
        .add_edge(START, "router")?
        .add_edge("answer", END)?;

    spec.compile()
}
