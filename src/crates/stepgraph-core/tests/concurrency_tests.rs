//! One writer per thread, any number of threads at once

mod common;

use common::{agent_engine, human, texts, RecordingCompletion};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use stepgraph_checkpoint::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
use stepgraph_core::{
    ConcurrencyPolicy, EngineOptions, ExecutionEngine, GraphError, GraphSpec, Message, RunConfig,
    State, StepResult, StreamEvent, StreamMode, END, START,
};
use tokio::sync::{Barrier, Notify};

/// Node that announces itself, then blocks until released
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

fn gated_engine(policy: ConcurrencyPolicy) -> (ExecutionEngine, Arc<InMemoryCheckpointStore>, Gate) {
    let gate = Gate {
        entered: Arc::new(Notify::new()),
        release: Arc::new(Notify::new()),
    };
    let (entered, release) = (gate.entered.clone(), gate.release.clone());

    let mut spec = GraphSpec::new();
    spec.add_node("gate", move |_state, _ctx| {
        let entered = entered.clone();
        let release = release.clone();
        async move {
            entered.notify_one();
            release.notified().await;
            Ok(StepResult::update(Message::assistant("passed")))
        }
    })
    .unwrap();
    spec.add_edge(START, "gate").unwrap();
    spec.add_edge("gate", END).unwrap();

    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = ExecutionEngine::new(spec.compile().unwrap(), store.clone())
        .with_options(EngineOptions::default().with_concurrency(policy));
    (engine, store, gate)
}

#[tokio::test]
async fn test_second_call_on_busy_thread_is_rejected() {
    let (engine, store, gate) = gated_engine(ConcurrencyPolicy::Reject);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("t", human("one"), RunConfig::new()).await })
    };
    gate.entered.notified().await;

    let err = engine.run("t", human("two"), RunConfig::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::ThreadBusy { ref thread_id } if thread_id == "t"));

    let err = engine.resume("t", "yes", RunConfig::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::ThreadBusy { .. }));

    let err = engine
        .update_state("t", State::new().with_value("k", serde_json::json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ThreadBusy { .. }));

    // reads never wait for the writer
    let snapshot = engine.get_state("t").await.unwrap().unwrap();
    assert_eq!(snapshot.sequence, 0);

    gate.release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(texts(outcome.state()), vec!["one", "passed"]);

    // the rejected calls left no trace
    assert_eq!(store.get_all("t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_queue_policy_serializes_calls() {
    let (engine, store, gate) = gated_engine(ConcurrencyPolicy::Queue);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("t", human("one"), RunConfig::new()).await })
    };
    gate.entered.notified().await;

    let second = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("t", human("two"), RunConfig::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());
    assert_eq!(store.get_all("t").await.unwrap().len(), 1);

    gate.release.notify_one();
    first.await.unwrap().unwrap();

    gate.entered.notified().await;
    gate.release.notify_one();
    let outcome = second.await.unwrap().unwrap();

    assert_eq!(texts(outcome.state()), vec!["one", "passed", "two", "passed"]);
    let sequences: Vec<_> = store
        .get_all("t")
        .await
        .unwrap()
        .iter()
        .map(|c| c.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_different_threads_run_concurrently() {
    let barrier = Arc::new(Barrier::new(2));
    let meeting = barrier.clone();

    let mut spec = GraphSpec::new();
    spec.add_node("meet", move |_state, ctx| {
        let meeting = meeting.clone();
        async move {
            // both threads must be inside this node at the same time
            meeting.wait().await;
            Ok(StepResult::update(Message::assistant(format!("met on {}", ctx.thread_id()))))
        }
    })
    .unwrap();
    spec.add_edge(START, "meet").unwrap();
    spec.add_edge("meet", END).unwrap();

    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = ExecutionEngine::new(spec.compile().unwrap(), store.clone());

    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(
            engine.run("a", human("hi"), RunConfig::new()),
            engine.run("b", human("hi"), RunConfig::new()),
        )
    })
    .await
    .expect("threads blocked each other");

    assert_eq!(texts(a.unwrap().state()), vec!["hi", "met on a"]);
    assert_eq!(texts(b.unwrap().state()), vec!["hi", "met on b"]);
    assert_eq!(store.thread_count().await, 2);
}

#[tokio::test]
async fn test_dropped_stream_leaves_thread_resumable() {
    let (engine, store, gate) = gated_engine(ConcurrencyPolicy::Queue);

    let mut stream = engine
        .stream("t", human("hi"), RunConfig::new(), &[StreamMode::Checkpoints])
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, StreamEvent::Checkpoint { sequence: 0, .. }));
    gate.entered.notified().await;

    // cancel while the node is in flight
    drop(stream);

    // the queued call gets the lock once the aborted task is gone
    let continued = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run("t", State::new(), RunConfig::new()).await })
    };
    gate.entered.notified().await;

    let log = store.get_all("t").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].next, vec!["gate".to_string()]);

    gate.release.notify_one();
    let outcome = continued.await.unwrap().unwrap();
    assert_eq!(texts(outcome.state()), vec!["hi", "passed"]);
    assert_eq!(store.get_all("t").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_busy_thread_is_reported_before_streaming() {
    let (engine, _store, gate) = gated_engine(ConcurrencyPolicy::Reject);

    let stream = engine
        .stream("t", human("hi"), RunConfig::new(), &[])
        .await
        .unwrap();
    gate.entered.notified().await;

    let err = engine
        .stream("t", human("again"), RunConfig::new(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ThreadBusy { .. }));

    gate.release.notify_one();
    let last = stream.finish().await.unwrap();
    assert!(matches!(last, StreamEvent::Complete { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_threads_share_one_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteCheckpointStore::open(dir.path().join("agents.sqlite"))
            .await
            .unwrap(),
    );
    let completion = RecordingCompletion::new();
    let engine = agent_engine(store.clone(), completion.clone());

    let conversations: Vec<_> = (0..12)
        .map(|n| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let thread_id = format!("user-{}", n);
                let asked = engine
                    .run(&thread_id, human(&format!("question {}", n)), RunConfig::new())
                    .await?;
                assert!(asked.is_interrupted());
                engine.resume(&thread_id, "yes", RunConfig::new()).await
            })
        })
        .collect();

    for conversation in conversations {
        let outcome = conversation.await.unwrap().unwrap();
        assert!(!outcome.is_interrupted());
        assert_eq!(outcome.state().messages.len(), 2);
    }

    assert_eq!(completion.call_count(), 12);
    for n in 0..12 {
        let log = store.get_all(&format!("user-{}", n)).await.unwrap();
        let sequences: Vec<u64> = log.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }
}
