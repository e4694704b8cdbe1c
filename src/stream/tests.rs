// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Tests for the stream emitter
//
// Covers event ordering under both policies, ordering when later calls
// finish first, consumer disconnection, task failure and SSE framing.

use super::*;
use crate::cache::ResultCache;
use crate::executor::ToolExecutor;
use crate::format::OutputFormat;
use crate::message::{ToolCall, ToolCallRequest};
use crate::session::Session;
use crate::tool::{Arguments, Tool, ToolError, ToolParameter, ToolRegistry, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Sink that records every event and can simulate the consumer leaving.
struct RecordingSink {
    events: Vec<StreamEvent>,
    disconnect_after: Option<usize>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            disconnect_after: None,
        }
    }

    fn disconnecting_after(n: usize) -> Self {
        Self {
            events: Vec::new(),
            disconnect_after: Some(n),
        }
    }

    fn names(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .map(|e| match e {
                StreamEvent::ToolCallStarted(_) => "started",
                StreamEvent::ToolResult(_) => "result",
                StreamEvent::Message(_) => "message",
                StreamEvent::Done => "done",
                StreamEvent::Error(_) => "error",
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn is_connected(&self) -> bool {
        self.disconnect_after.map_or(true, |n| self.events.len() < n)
    }

    async fn send(&mut self, event: StreamEvent) -> Result<(), EmitError> {
        self.events.push(event);
        Ok(())
    }
}

/// Sleeps for `delay_ms` then echoes its name.
struct SleepyTool {
    name: &'static str,
    delay_ms: u64,
}

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "sleeps then answers"
    }
    fn parameters(&self) -> &[ToolParameter] {
        &[]
    }
    async fn execute(&self, _arguments: &Arguments) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(ToolResult::ok(json!({"tool": self.name})))
    }
}

/// Panics while its parameters are read, which happens outside the
/// executor's panic guard and takes the whole execution task down.
struct BrokenSchema;

#[async_trait]
impl Tool for BrokenSchema {
    fn name(&self) -> &str {
        "broken"
    }
    fn description(&self) -> &str {
        "schema lookup panics"
    }
    fn parameters(&self) -> &[ToolParameter] {
        panic!("schema unavailable")
    }
    async fn execute(&self, _arguments: &Arguments) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::empty())
    }
}

fn executor() -> Arc<ToolExecutor> {
    let registry = ToolRegistry::with_builtin()
        .register(SleepyTool {
            name: "slow",
            delay_ms: 300,
        })
        .register(SleepyTool {
            name: "fast",
            delay_ms: 10,
        })
        .register(BrokenSchema);
    Arc::new(ToolExecutor::new(
        Arc::new(registry),
        Arc::new(ResultCache::new(100, Duration::from_secs(60))),
        Duration::from_secs(5),
    ))
}

fn emitter() -> StreamEmitter {
    StreamEmitter::new(executor(), "gpt-test")
}

fn call(id: &str, name: &str, args: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args)
}

fn delta(event: &StreamEvent) -> Value {
    event.data()["choices"][0]["delta"].clone()
}

fn finish_reason(event: &StreamEvent) -> Value {
    event.data()["choices"][0]["finish_reason"].clone()
}

// ---------------------------------------------------------------------------
// Standard policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn standard_announces_then_streams_results() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    let calls = vec![
        call("call_1", "echo", r#"{"message": "hi"}"#),
        call("call_2", "weather", r#"{"city": "上海"}"#),
    ];

    emitter
        .run_tool_calls(&mut sink, calls, StreamPolicy::Standard)
        .await
        .unwrap();

    assert_eq!(
        sink.names(),
        vec!["started", "started", "result", "result", "message", "done"]
    );
    assert_eq!(emitter.state(), EmitterState::Done);

    let first = delta(&sink.events[0]);
    assert_eq!(first["role"], "assistant");
    assert_eq!(first["tool_calls"][0]["index"], 0);
    assert_eq!(first["tool_calls"][0]["id"], "call_1");
    assert_eq!(first["tool_calls"][0]["type"], "function");
    assert_eq!(first["tool_calls"][0]["function"]["name"], "echo");
    assert_eq!(delta(&sink.events[1])["tool_calls"][0]["index"], 1);

    let result = delta(&sink.events[3]);
    assert_eq!(result["role"], "tool");
    assert_eq!(result["tool_call_id"], "call_2");
    let content: Value = serde_json::from_str(result["content"].as_str().unwrap()).unwrap();
    assert_eq!(content["success"], true);
    assert_eq!(content["data"]["city"], "上海");

    assert_eq!(finish_reason(&sink.events[4]), "tool_calls");
    assert!(finish_reason(&sink.events[0]).is_null());
}

#[tokio::test]
async fn every_chunk_shares_one_id_and_model() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    emitter
        .run_tool_calls(
            &mut sink,
            vec![call("c1", "echo", r#"{"message": "a"}"#)],
            StreamPolicy::Standard,
        )
        .await
        .unwrap();

    let chunks: Vec<Value> = sink
        .events
        .iter()
        .filter(|e| !e.is_terminal())
        .map(StreamEvent::data)
        .collect();
    let id = chunks[0]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("chatcmpl-"));
    for chunk in &chunks {
        assert_eq!(chunk["id"], id.as_str());
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "gpt-test");
    }
}

#[tokio::test(start_paused = true)]
async fn results_follow_submission_order_not_completion_order() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    let calls = vec![call("first", "slow", ""), call("second", "fast", "")];

    emitter
        .run_tool_calls(&mut sink, calls, StreamPolicy::Standard)
        .await
        .unwrap();

    let ids: Vec<Value> = sink
        .events
        .iter()
        .filter(|e| matches!(e, StreamEvent::ToolResult(_)))
        .map(|e| delta(e)["tool_call_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn failing_call_still_streams_a_result() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    emitter
        .run_tool_calls(
            &mut sink,
            vec![call("c1", "missing", "{}")],
            StreamPolicy::Standard,
        )
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["started", "result", "message", "done"]);
    let content = delta(&sink.events[1])["content"].as_str().unwrap().to_string();
    assert!(content.contains("does not exist"));
}

#[tokio::test]
async fn empty_batch_finalizes_immediately() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    emitter
        .run_tool_calls(&mut sink, Vec::new(), StreamPolicy::Standard)
        .await
        .unwrap();
    assert_eq!(sink.names(), vec!["message", "done"]);
}

// ---------------------------------------------------------------------------
// Auto policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_combines_outputs_into_one_message() {
    let mut emitter = emitter().with_format(OutputFormat::Text);
    let mut sink = RecordingSink::new();
    let calls = vec![
        call("c1", "echo", r#"{"message": "one"}"#),
        call("c2", "echo", r#"{"message": "two"}"#),
    ];

    emitter
        .run_tool_calls(&mut sink, calls, StreamPolicy::Auto)
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["message", "message", "done"]);
    let content = delta(&sink.events[0])["content"].as_str().unwrap().to_string();
    let parts: Vec<&str> = content.split("\n\n").collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].contains("processed_message: one"));
    assert!(parts[1].contains("processed_message: two"));
    assert_eq!(finish_reason(&sink.events[1]), "stop");
}

// ---------------------------------------------------------------------------
// Disconnection and failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_stops_without_terminal_event() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::disconnecting_after(1);
    let calls = vec![
        call("c1", "echo", r#"{"message": "a"}"#),
        call("c2", "echo", r#"{"message": "b"}"#),
    ];

    let err = emitter
        .run_tool_calls(&mut sink, calls, StreamPolicy::Standard)
        .await
        .unwrap_err();

    assert_eq!(err, EmitError::Disconnected);
    assert_eq!(sink.names(), vec!["started"]);
    assert_eq!(emitter.state(), EmitterState::AnnouncingCalls);
}

#[tokio::test]
async fn disconnect_before_execution_skips_tools() {
    let session = Arc::new(Session::new(None, None));
    let mut emitter = emitter().with_session(Some(Arc::clone(&session)));
    let mut sink = RecordingSink::disconnecting_after(0);

    let err = emitter
        .run_tool_calls(
            &mut sink,
            vec![call("c1", "echo", r#"{"message": "a"}"#)],
            StreamPolicy::Auto,
        )
        .await
        .unwrap_err();

    assert_eq!(err, EmitError::Disconnected);
    assert!(sink.events.is_empty());
    assert_eq!(session.message_count(), 0);
}

#[tokio::test]
async fn task_failure_moves_to_erred_with_one_error_event() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    let calls = vec![call("c1", "broken", "{}"), call("c2", "echo", r#"{"message": "a"}"#)];

    let err = emitter
        .run_tool_calls(&mut sink, calls, StreamPolicy::Standard)
        .await
        .unwrap_err();

    assert!(matches!(err, EmitError::TaskFailed(_)));
    assert_eq!(emitter.state(), EmitterState::Erred);
    assert_eq!(sink.names(), vec!["started", "started", "error"]);
    match sink.events.last() {
        Some(StreamEvent::Error(message)) => assert!(message.contains("c1")),
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn session_records_every_streamed_call() {
    let session = Arc::new(Session::new(None, None));
    let mut emitter = emitter().with_session(Some(Arc::clone(&session)));
    let mut sink = RecordingSink::new();
    emitter
        .run_tool_calls(
            &mut sink,
            vec![
                call("c1", "echo", r#"{"message": "a"}"#),
                call("c2", "weather", r#"{"city": "广州"}"#),
            ],
            StreamPolicy::Standard,
        )
        .await
        .unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["tool_call_id"], "c1");
    assert_eq!(messages[1]["name"], "weather");
}

// ---------------------------------------------------------------------------
// Replies and channel-backed streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_streams_content_then_stop() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    emitter
        .run_reply(&mut sink, "你好".to_string(), Vec::new())
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["message", "message", "done"]);
    assert_eq!(delta(&sink.events[0])["content"], "你好");
    assert_eq!(finish_reason(&sink.events[1]), "stop");
    assert_eq!(emitter.state(), EmitterState::Done);
}

#[tokio::test]
async fn reply_with_tool_calls_finishes_as_tool_calls() {
    let mut emitter = emitter();
    let mut sink = RecordingSink::new();
    let attached = ToolCall::function("call_h1", "weather", r#"{"city":"上海"}"#);
    emitter
        .run_reply(&mut sink, "查一下上海的天气".to_string(), vec![attached])
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["message", "started", "message", "done"]);
    let announced = &delta(&sink.events[1])["tool_calls"][0];
    assert_eq!(announced["index"], 0);
    assert_eq!(announced["id"], "call_h1");
    assert_eq!(announced["type"], "function");
    assert_eq!(announced["function"]["arguments"], r#"{"city":"上海"}"#);
    assert_eq!(finish_reason(&sink.events[2]), "tool_calls");
    assert_eq!(emitter.state(), EmitterState::Done);
}

#[tokio::test]
async fn spawned_stream_produces_sse_frames() {
    let stream = emitter().spawn_tool_calls(
        vec![call("c1", "echo", r#"{"message": "hi"}"#)],
        StreamPolicy::Standard,
    );
    let frames: Vec<String> = stream
        .map(|b| String::from_utf8(b.to_vec()).unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 4);
    for frame in &frames {
        assert!(frame.ends_with("\n\n"));
    }
    assert!(frames[0].starts_with("event: message\ndata: {"));
    assert_eq!(frames[3], "event: done\ndata: {}\n\n");
}

#[tokio::test]
async fn spawned_error_stream_is_single_frame() {
    let stream = emitter().spawn_error("upstream unavailable".to_string());
    let frames: Vec<_> = stream.collect().await;
    assert_eq!(frames.len(), 1);
    assert_eq!(
        String::from_utf8(frames[0].to_vec()).unwrap(),
        "event: error\ndata: {\"error\":\"upstream unavailable\"}\n\n"
    );
}

#[tokio::test]
async fn dropped_receiver_does_not_panic_emitter() {
    let stream = emitter().spawn_tool_calls(
        vec![call("c1", "echo", r#"{"message": "hi"}"#)],
        StreamPolicy::Standard,
    );
    drop(stream);
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[test]
fn policy_header_parsing() {
    assert_eq!(StreamPolicy::parse("auto"), StreamPolicy::Auto);
    assert_eq!(StreamPolicy::parse(" AUTO "), StreamPolicy::Auto);
    assert_eq!(StreamPolicy::parse("standard"), StreamPolicy::Standard);
    assert_eq!(StreamPolicy::parse("weird"), StreamPolicy::Standard);
}
