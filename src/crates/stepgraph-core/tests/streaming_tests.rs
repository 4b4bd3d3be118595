//! Stream modes and terminal events

mod common;

use common::{human, memory_engine, CONFIRM_PROMPT, DECLINE};
use futures::StreamExt;
use serde_json::json;
use stepgraph_checkpoint::CheckpointSource;
use stepgraph_core::{
    EngineOptions, GraphError, RunConfig, RunOutcome, StreamEvent, StreamMode,
};

/// Compact label per event, enough to check ordering
fn label(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Values { sequence, .. } => format!("values:{}", sequence),
        StreamEvent::Updates { node, .. } => format!("updates:{}", node),
        StreamEvent::Checkpoint { sequence, .. } => format!("checkpoint:{}", sequence),
        StreamEvent::TaskStart { node, resumed, .. } => {
            format!("start:{}{}", node, if *resumed { "(resumed)" } else { "" })
        }
        StreamEvent::TaskEnd { node, result, .. } => format!("end:{}:{}", node, result),
        StreamEvent::Interrupt { node, .. } => format!("interrupt:{}", node),
        StreamEvent::Complete { .. } => "complete".to_string(),
    }
}

async fn collect(stream: stepgraph_core::RunStream) -> Vec<StreamEvent> {
    stream
        .map(|item| item.expect("stream item"))
        .collect()
        .await
}

#[tokio::test]
async fn test_all_modes_in_step_order() {
    let (engine, _store, _completion) = memory_engine();
    let modes = [
        StreamMode::Values,
        StreamMode::Updates,
        StreamMode::Checkpoints,
        StreamMode::Tasks,
    ];

    let stream = engine
        .stream("t", human("hi"), RunConfig::new(), &modes)
        .await
        .unwrap();
    let events = collect(stream).await;
    let labels: Vec<_> = events.iter().map(label).collect();

    assert_eq!(
        labels,
        vec![
            "checkpoint:0",
            "values:0",
            "start:router",
            "end:router:route",
            "checkpoint:1",
            "values:1",
            "updates:router",
            "start:confirm",
            "end:confirm:interrupt",
            "checkpoint:2",
            "values:2",
            "updates:confirm",
            "interrupt:confirm",
        ]
    );

    match events.last() {
        Some(StreamEvent::Interrupt { payload, state, .. }) => {
            assert_eq!(payload, &json!(CONFIRM_PROMPT));
            assert_eq!(state.messages.len(), 1);
        }
        other => panic!("unexpected terminal event: {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_stream_marks_resumed_task() {
    let (engine, _store, _completion) = memory_engine();
    engine.run("t", human("hi"), RunConfig::new()).await.unwrap();

    let stream = engine
        .stream_resume("t", "no", RunConfig::new(), &[StreamMode::Values, StreamMode::Tasks])
        .await
        .unwrap();
    let labels: Vec<_> = collect(stream).await.iter().map(label).collect();

    assert_eq!(
        labels,
        vec![
            "values:2",
            "start:confirm(resumed)",
            "end:confirm:route",
            "values:3",
            "complete",
        ]
    );
}

#[tokio::test]
async fn test_no_modes_still_ends_with_terminal_event() {
    let (engine, _store, _completion) = memory_engine();

    let events = collect(
        engine
            .stream("t", human("hi"), RunConfig::new(), &[])
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 1);
    assert!(events[0].is_terminal());
}

#[tokio::test]
async fn test_debug_mode_covers_tasks_and_checkpoints() {
    let (engine, _store, _completion) = memory_engine();

    let events = collect(
        engine
            .stream("t", human("hi"), RunConfig::new(), &[StreamMode::Debug])
            .await
            .unwrap(),
    )
    .await;

    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::TaskStart { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Checkpoint {
            source: CheckpointSource::Input,
            ..
        }
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::Values { .. } | StreamEvent::Updates { .. })));
}

#[tokio::test]
async fn test_checkpoint_events_report_interrupt() {
    let (engine, _store, _completion) = memory_engine();

    let events = collect(
        engine
            .stream("t", human("hi"), RunConfig::new(), &[StreamMode::Checkpoints])
            .await
            .unwrap(),
    )
    .await;

    let interrupted: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Checkpoint {
                sequence,
                interrupted,
                ..
            } => Some((*sequence, *interrupted)),
            _ => None,
        })
        .collect();
    assert_eq!(interrupted, vec![(0, false), (1, false), (2, true)]);
}

#[tokio::test]
async fn test_finish_returns_outcome_of_streamed_run() {
    let (engine, _store, _completion) = memory_engine();
    engine.run("t", human("hi"), RunConfig::new()).await.unwrap();

    let last = engine
        .stream_resume("t", "no", RunConfig::new(), &[StreamMode::Updates])
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    match RunOutcome::from_event(last) {
        Some(RunOutcome::Complete(state)) => {
            assert_eq!(state.last_message().unwrap().content, DECLINE);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_run_ends_stream_with_error() {
    let (engine, _store, _completion) = memory_engine();

    let mut stream = engine
        .stream_resume("never-ran", "yes", RunConfig::new(), &[StreamMode::Values])
        .await
        .unwrap();

    let item = stream.next().await.unwrap();
    assert!(matches!(item, Err(GraphError::ResumeMismatch { .. })));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_zero_stream_buffer_still_streams() {
    let (engine, _store, _completion) = memory_engine();
    let mut options = EngineOptions::default();
    options.stream_buffer = 0;
    let engine = engine.with_options(options);

    let stream = engine
        .stream("t", human("hi"), RunConfig::new(), &[StreamMode::Values])
        .await
        .unwrap();
    let labels: Vec<_> = collect(stream).await.iter().map(label).collect();

    assert_eq!(labels, vec!["values:0", "values:1", "values:2", "interrupt:confirm"]);
}

#[test]
fn test_events_serialize_with_tag() {
    let event = StreamEvent::TaskEnd {
        node: "router".into(),
        step: 0,
        result: "route".into(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({"event": "task_end", "data": {"node": "router", "step": 0, "result": "route"}})
    );
}
