// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Events, emitter states, policies and the sink abstraction the emitter
// writes to.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One event in a tool-call stream. Order is significant.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A tool call is announced before anything executes.
    ToolCallStarted(Value),
    /// A tool call finished; carries its formatted output.
    ToolResult(Value),
    /// Content or finalization chunk.
    Message(Value),
    Done,
    Error(String),
}

impl StreamEvent {
    /// SSE `event:` name. Every chunk-carrying event is sent as `message`.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::ToolCallStarted(_) | StreamEvent::ToolResult(_) | StreamEvent::Message(_) => {
                "message"
            }
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> Value {
        match self {
            StreamEvent::ToolCallStarted(chunk)
            | StreamEvent::ToolResult(chunk)
            | StreamEvent::Message(chunk) => chunk.clone(),
            StreamEvent::Done => json!({}),
            StreamEvent::Error(message) => json!({ "error": message }),
        }
    }

    /// Encode as a complete SSE frame: `event: <name>\ndata: <json>\n\n`.
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event_name(), self.data()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Emitter lifecycle. `Erred` can be entered from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Idle,
    AnnouncingCalls,
    ExecutingCalls,
    Finalizing,
    Done,
    Erred,
}

/// How tool calls are streamed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamPolicy {
    /// Announce every call, then stream each result in submission order.
    #[default]
    Standard,
    /// Execute silently and stream one combined message.
    Auto,
}

impl StreamPolicy {
    /// Parse an `X-Stream-Policy` header value. Anything but `auto` is standard.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("auto") {
            StreamPolicy::Auto
        } else {
            StreamPolicy::Standard
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmitError {
    /// The consumer went away. Emission stops without a terminal event.
    #[error("stream consumer disconnected")]
    Disconnected,

    #[error("tool execution task failed: {0}")]
    TaskFailed(String),
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination of stream events.
#[async_trait]
pub trait EventSink: Send {
    /// False once the consumer has gone away.
    fn is_connected(&self) -> bool;

    async fn send(&mut self, event: StreamEvent) -> Result<(), EmitError>;
}

/// Sink writing SSE frames into a bounded channel feeding the response body.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&mut self, event: StreamEvent) -> Result<(), EmitError> {
        self.tx
            .send(event.to_frame())
            .await
            .map_err(|_| EmitError::Disconnected)
    }
}
