//! The step loop

use super::{ExecutionEngine, RunOutcome};
use crate::config::RunConfig;
use crate::context::{NodeContext, ResumeInput};
use crate::error::{GraphError, Result};
use crate::graph::{NodeId, END};
use crate::state::State;
use crate::step_result::StepResult;
use crate::stream::{StreamEvent, StreamMode, StreamMultiplexer};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use stepgraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, PendingInterrupt};

/// How a call enters the loop
pub(crate) enum Start {
    Input(State),
    Resume(Value),
}

/// Mutable bookkeeping of one call
struct Run<'a> {
    thread_id: &'a str,
    config: Arc<RunConfig>,
    mux: &'a StreamMultiplexer,
    state: State,
    frontier: VecDeque<NodeId>,
    last: Option<Checkpoint>,
    step: usize,
}

impl<'a> Run<'a> {
    fn context(&self, engine: &ExecutionEngine, node: &str) -> NodeContext {
        NodeContext::new(
            self.thread_id,
            node,
            self.step,
            self.config.clone(),
            engine.completion.clone(),
        )
    }

    /// Checkpoint that follows the last one appended (or the first of the thread)
    fn next_checkpoint(&self) -> Result<Checkpoint> {
        let values = self.state.to_values()?;
        Ok(match &self.last {
            Some(last) => last.successor(values),
            None => Checkpoint::first(self.thread_id, values),
        })
    }
}

impl ExecutionEngine {
    /// Drive one call to completion or suspension
    ///
    /// The caller must hold the thread's lock.
    pub(crate) async fn execute(
        &self,
        thread_id: &str,
        start: Start,
        config: Arc<RunConfig>,
        mux: &StreamMultiplexer,
    ) -> Result<RunOutcome> {
        let latest = self.store.get_latest(thread_id).await?;

        let mut run = Run {
            thread_id,
            config,
            mux,
            state: State::new(),
            frontier: VecDeque::new(),
            last: None,
            step: 0,
        };

        match start {
            Start::Input(input) => self.begin(&mut run, latest, input).await?,
            Start::Resume(value) => {
                if let Some(outcome) = self.begin_resume(&mut run, latest, value).await? {
                    mux.emit(outcome.to_event()).await;
                    return Ok(outcome);
                }
            }
        }

        let outcome = self.step_loop(&mut run).await?;
        mux.emit(outcome.to_event()).await;
        Ok(outcome)
    }

    /// Prepare a run for new input
    async fn begin(&self, run: &mut Run<'_>, latest: Option<Checkpoint>, input: State) -> Result<()> {
        if let Some(interrupt) = latest.as_ref().and_then(|c| c.pending_interrupt.as_ref()) {
            return Err(GraphError::PendingInterrupt {
                thread_id: run.thread_id.to_string(),
                node: interrupt.node_id.clone(),
            });
        }

        if let Some(latest) = &latest {
            run.state = State::from_values(latest.values.clone())?;
        }

        match latest {
            Some(latest) if input.is_empty() && !latest.next.is_empty() => {
                tracing::info!(
                    thread_id = %run.thread_id,
                    sequence = latest.sequence,
                    next = ?latest.next,
                    "Continuing unfinished frontier"
                );
                run.frontier = latest.next.iter().cloned().collect();
                self.emit_values(run, latest.sequence).await;
                run.last = Some(latest);
                return Ok(());
            }
            latest => run.last = latest,
        }

        run.state.merge(input);
        run.frontier.push_back(self.graph.entry().to_string());

        let checkpoint = run
            .next_checkpoint()?
            .with_next(vec![self.graph.entry().to_string()])
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Input)
                    .with_step(-1),
            );
        self.persist(run, checkpoint).await?;

        Ok(())
    }

    /// Run the post-interrupt half of the suspended node
    ///
    /// Returns an outcome if that half interrupted again.
    async fn begin_resume(
        &self,
        run: &mut Run<'_>,
        latest: Option<Checkpoint>,
        value: Value,
    ) -> Result<Option<RunOutcome>> {
        let latest = latest.ok_or_else(|| {
            GraphError::resume_mismatch(run.thread_id, "thread has no checkpoints")
        })?;
        let interrupt = latest.pending_interrupt.clone().ok_or_else(|| {
            GraphError::resume_mismatch(run.thread_id, "no pending interrupt to resume")
        })?;

        let node = interrupt.node_id.clone();
        let resume = self
            .graph
            .node(&node)
            .and_then(|spec| spec.resume.clone())
            .ok_or_else(|| {
                GraphError::resume_mismatch(
                    run.thread_id,
                    format!("node '{}' has no post-interrupt handler in this graph", node),
                )
            })?;

        run.state = State::from_values(latest.values.clone())?;
        run.frontier = interrupt.deferred.iter().cloned().collect();
        self.emit_values(run, latest.sequence).await;
        run.last = Some(latest);

        tracing::info!(thread_id = %run.thread_id, node = %node, "Resuming interrupted node");
        run.mux
            .emit(StreamEvent::TaskStart {
                node: node.clone(),
                step: run.step,
                resumed: true,
            })
            .await;

        let input = ResumeInput {
            payload: interrupt.payload,
            value,
        };
        let ctx = run.context(self, &node);
        let result = resume(run.state.clone(), input, ctx)
            .await
            .map_err(|e| self.handler_failed(run, &node, e))?;

        self.complete_step(run, &node, result, CheckpointSource::Resume)
            .await
    }

    /// Execute queued nodes one per step
    async fn step_loop(&self, run: &mut Run<'_>) -> Result<RunOutcome> {
        while let Some(node) = run.frontier.pop_front() {
            if run.step >= self.options.recursion_limit {
                tracing::error!(
                    thread_id = %run.thread_id,
                    limit = self.options.recursion_limit,
                    "Recursion limit reached"
                );
                return Err(GraphError::RecursionLimit {
                    limit: self.options.recursion_limit,
                });
            }

            let handler = self
                .graph
                .node(&node)
                .map(|spec| spec.handler.clone())
                .ok_or_else(|| GraphError::handler(&node, "node is not part of this graph"))?;

            tracing::debug!(thread_id = %run.thread_id, node = %node, step = run.step, "Executing node");
            run.mux
                .emit(StreamEvent::TaskStart {
                    node: node.clone(),
                    step: run.step,
                    resumed: false,
                })
                .await;

            let ctx = run.context(self, &node);
            let result = handler(run.state.clone(), ctx)
                .await
                .map_err(|e| self.handler_failed(run, &node, e))?;

            if let Some(outcome) = self
                .complete_step(run, &node, result, CheckpointSource::Loop)
                .await?
            {
                return Ok(outcome);
            }
        }

        tracing::info!(thread_id = %run.thread_id, steps = run.step, "Run complete");
        Ok(RunOutcome::Complete(run.state.clone()))
    }

    /// Validate a handler's result, merge it, and persist the step
    ///
    /// Returns an outcome when the node interrupted.
    async fn complete_step(
        &self,
        run: &mut Run<'_>,
        node: &str,
        result: StepResult,
        source: CheckpointSource,
    ) -> Result<Option<RunOutcome>> {
        let kind = result.kind();
        let next = self.successors(node, &result)?;

        let (update, payload) = match result {
            StepResult::Update(update) | StepResult::Route { update, .. } => (update, None),
            StepResult::Interrupt { update, payload } => (update, Some(payload)),
        };

        run.mux
            .emit(StreamEvent::TaskEnd {
                node: node.to_string(),
                step: run.step,
                result: kind.to_string(),
            })
            .await;

        let mut state = run.state.clone();
        state.merge(update.clone());

        let mut frontier = run.frontier.clone();
        for target in next {
            if !frontier.contains(&target) {
                frontier.push_back(target);
            }
        }

        let metadata = CheckpointMetadata::new()
            .with_source(source)
            .with_step(run.step as i64)
            .with_node(node);

        let previous = std::mem::replace(&mut run.state, state);
        let checkpoint = match run.next_checkpoint() {
            Ok(checkpoint) => checkpoint.with_metadata(metadata),
            Err(e) => {
                run.state = previous;
                return Err(e);
            }
        };

        let checkpoint = match &payload {
            Some(payload) => checkpoint
                .with_next(vec![node.to_string()])
                .with_interrupt(
                    PendingInterrupt::new(node, payload.clone())
                        .with_deferred(frontier.iter().cloned().collect()),
                ),
            None => checkpoint.with_next(frontier.iter().cloned().collect()),
        };

        if let Err(e) = self.persist(run, checkpoint).await {
            run.state = previous;
            return Err(e);
        }
        run.frontier = frontier;
        run.step += 1;

        if run.mux.has_mode(StreamMode::Updates) {
            run.mux
                .emit(StreamEvent::Updates {
                    node: node.to_string(),
                    update,
                })
                .await;
        }

        match payload {
            Some(payload) => {
                tracing::info!(thread_id = %run.thread_id, node = %node, "Run suspended by interrupt");
                Ok(Some(RunOutcome::Interrupted {
                    node: node.to_string(),
                    payload,
                    state: run.state.clone(),
                }))
            }
            None => Ok(None),
        }
    }

    /// Nodes a result schedules next, `END` dropped
    fn successors(&self, node: &str, result: &StepResult) -> Result<Vec<NodeId>> {
        match result {
            StepResult::Update(_) => match self.graph.successors(node) {
                [] => Err(GraphError::handler(
                    node,
                    "returned an update but has no static edge to follow; return a route",
                )),
                [next] => Ok(if next == END { vec![] } else { vec![next.clone()] }),
                many => Err(GraphError::handler(
                    node,
                    format!(
                        "returned an update but has {} static edges ({}); return a route",
                        many.len(),
                        many.join(", ")
                    ),
                )),
            },
            StepResult::Route { goto, .. } => {
                if goto.is_empty() {
                    return Err(GraphError::handler(node, "returned a route with no targets"));
                }
                let declared = self.graph.routes(node);
                for target in goto {
                    if target == END {
                        continue;
                    }
                    if !self.graph.contains(target) {
                        return Err(GraphError::handler(
                            node,
                            format!("routed to unknown node '{}'", target),
                        ));
                    }
                    if let Some(declared) = declared {
                        if !declared.contains(target) {
                            return Err(GraphError::handler(
                                node,
                                format!("routed to '{}', which is not a declared route", target),
                            ));
                        }
                    }
                }
                Ok(goto.iter().filter(|t| *t != END).cloned().collect())
            }
            StepResult::Interrupt { .. } => {
                if self.graph.is_interruptible(node) {
                    Ok(Vec::new())
                } else {
                    Err(GraphError::handler(
                        node,
                        "returned an interrupt but has no post-interrupt handler",
                    ))
                }
            }
        }
    }

    /// Append a checkpoint and report it to the stream
    async fn persist(&self, run: &mut Run<'_>, checkpoint: Checkpoint) -> Result<()> {
        let sequence = checkpoint.sequence;
        let source = checkpoint.metadata.source.unwrap_or(CheckpointSource::Loop);
        let next = checkpoint.next.clone();
        let interrupted = checkpoint.is_interrupted();

        self.store
            .append(run.thread_id, checkpoint.clone())
            .await
            .map_err(|e| {
                tracing::error!(
                    thread_id = %run.thread_id,
                    sequence,
                    error = %e,
                    "Failed to append checkpoint"
                );
                GraphError::from(e)
            })?;

        tracing::debug!(thread_id = %run.thread_id, sequence, source = %source, "Checkpoint appended");
        run.last = Some(checkpoint);

        run.mux
            .emit(StreamEvent::Checkpoint {
                sequence,
                source,
                next,
                interrupted,
            })
            .await;
        self.emit_values(run, sequence).await;

        Ok(())
    }

    async fn emit_values(&self, run: &Run<'_>, sequence: u64) {
        if run.mux.has_mode(StreamMode::Values) {
            run.mux
                .emit(StreamEvent::Values {
                    sequence,
                    state: run.state.clone(),
                })
                .await;
        }
    }

    fn handler_failed(&self, run: &Run<'_>, node: &str, error: GraphError) -> GraphError {
        let error = error.in_node(node);
        tracing::error!(
            thread_id = %run.thread_id,
            node = %node,
            step = run.step,
            error = %error,
            "Node execution failed; step discarded"
        );
        error
    }
}
