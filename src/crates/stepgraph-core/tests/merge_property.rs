use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use stepgraph_checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use stepgraph_core::{
    ExecutionEngine, GraphSpec, Message, RunConfig, State, StepResult, END, START,
};

/// Linear chain where node `i` appends `outputs[i]` and records its index
fn chain(outputs: &[Vec<String>]) -> ExecutionEngine {
    let mut spec = GraphSpec::new();
    let mut previous = START.to_string();

    for (i, texts) in outputs.iter().enumerate() {
        let id = format!("n{}", i);
        let texts = texts.clone();
        spec.add_node(id.clone(), move |_state, _ctx| {
            let update = State::new()
                .with_messages(texts.iter().map(|t| Message::assistant(t.as_str())))
                .with_value("last", json!(i));
            async move { Ok(StepResult::update(update)) }
        })
        .unwrap();
        spec.add_edge(previous, id.clone()).unwrap();
        previous = id;
    }
    spec.add_edge(previous, END).unwrap();

    ExecutionEngine::new(spec.compile().unwrap(), Arc::new(InMemoryCheckpointStore::new()))
}

fn run_chain(input: &str, outputs: &[Vec<String>]) -> (State, usize) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let engine = chain(outputs);
        let outcome = engine
            .run("t", State::from_message(Message::human(input)), RunConfig::new())
            .await
            .unwrap();
        let logged = engine.store().get_all("t").await.unwrap().len();
        (outcome.into_state(), logged)
    })
}

proptest! {
    /// Invariant: history is the input followed by every node's output, in step order
    #[test]
    fn messages_are_concatenated_in_step_order(
        input in "[a-z]{1,8}",
        outputs in prop::collection::vec(prop::collection::vec("[a-z ]{0,6}", 0..3), 1..6),
    ) {
        let (state, logged) = run_chain(&input, &outputs);

        let mut expected = vec![input.clone()];
        expected.extend(outputs.iter().flatten().cloned());
        let actual: Vec<String> = state.messages.iter().map(|m| m.content.clone()).collect();

        prop_assert_eq!(actual, expected);
        // the last writer of a plain field wins
        prop_assert_eq!(state.get("last"), Some(&json!(outputs.len() - 1)));
        // one checkpoint for the input and one per node
        prop_assert_eq!(logged, outputs.len() + 1);
    }
}
