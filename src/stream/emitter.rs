// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Stream emitter
//
// Turns a batch of tool calls (or a finished conversational reply) into an
// ordered sequence of OpenAI-style `chat.completion.chunk` events. The sink
// is checked before every chunk; once the consumer is gone the emitter stops
// without a terminal event. Each call executes in its own task and calls are
// awaited in submission order, so results are emitted in that order no matter
// which call would finish first.

use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::types::{ChannelSink, EmitError, EmitterState, EventSink, StreamEvent, StreamPolicy};
use crate::executor::{ToolCallOutcome, ToolExecutor};
use crate::format::OutputFormat;
use crate::message::{ToolCall, ToolCallRequest};
use crate::provider::{completion_id, unix_now};
use crate::session::Session;

pub struct StreamEmitter {
    executor: Arc<ToolExecutor>,
    session: Option<Arc<Session>>,
    format: OutputFormat,
    model: String,
    chunk_id: String,
    state: EmitterState,
}

impl StreamEmitter {
    pub fn new(executor: Arc<ToolExecutor>, model: impl Into<String>) -> Self {
        Self {
            executor,
            session: None,
            format: OutputFormat::Json,
            model: model.into(),
            chunk_id: completion_id(),
            state: EmitterState::Idle,
        }
    }

    pub fn with_session(mut self, session: Option<Arc<Session>>) -> Self {
        self.session = session;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Tool calls
    // -----------------------------------------------------------------------

    /// Execute `calls` and stream them under `policy`.
    pub async fn run_tool_calls<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        calls: Vec<ToolCallRequest>,
        policy: StreamPolicy,
    ) -> Result<(), EmitError> {
        match policy {
            StreamPolicy::Standard => self.run_standard(sink, calls).await,
            StreamPolicy::Auto => self.run_auto(sink, calls).await,
        }
    }

    async fn run_standard<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        calls: Vec<ToolCallRequest>,
    ) -> Result<(), EmitError> {
        self.state = EmitterState::AnnouncingCalls;
        for (index, call) in calls.iter().enumerate() {
            let delta = json!({
                "role": "assistant",
                "tool_calls": [{
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments},
                }],
            });
            let chunk = self.chunk(delta, None);
            self.emit(sink, StreamEvent::ToolCallStarted(chunk)).await?;
        }

        self.state = EmitterState::ExecutingCalls;
        for call in calls {
            let outcome = self.dispatch(sink, call).await?;
            let delta = json!({
                "role": "tool",
                "tool_call_id": outcome.tool_call_id,
                "content": outcome.output,
            });
            let chunk = self.chunk(delta, None);
            self.emit(sink, StreamEvent::ToolResult(chunk)).await?;
        }

        self.state = EmitterState::Finalizing;
        let chunk = self.chunk(json!({"role": "assistant"}), Some("tool_calls"));
        self.emit(sink, StreamEvent::Message(chunk)).await?;
        self.finish(sink).await
    }

    async fn run_auto<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        calls: Vec<ToolCallRequest>,
    ) -> Result<(), EmitError> {
        self.state = EmitterState::ExecutingCalls;
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            if !sink.is_connected() {
                return Err(EmitError::Disconnected);
            }
            outputs.push(self.dispatch(sink, call).await?.output);
        }

        self.state = EmitterState::Finalizing;
        let content = outputs.join("\n\n");
        let chunk = self.chunk(json!({"role": "assistant", "content": content}), None);
        self.emit(sink, StreamEvent::Message(chunk)).await?;
        let chunk = self.chunk(json!({"role": "assistant"}), Some("stop"));
        self.emit(sink, StreamEvent::Message(chunk)).await?;
        self.finish(sink).await
    }

    /// Run one call in its own task. A task that dies (panic or
    /// cancellation) moves the emitter to `Erred` and emits one error event.
    async fn dispatch<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        call: ToolCallRequest,
    ) -> Result<ToolCallOutcome, EmitError> {
        let executor = Arc::clone(&self.executor);
        let session = self.session.clone();
        let format = self.format;
        let call_id = call.id.clone();

        let handle = tokio::spawn(async move {
            executor
                .execute_one(&call, session.as_deref(), format)
                .await
        });

        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("tool call {call_id} panicked")
                } else {
                    format!("tool call {call_id} was cancelled")
                };
                tracing::error!(call_id = %call_id, error = %message, "tool execution task failed");
                self.fail(sink, message).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Conversation reply
    // -----------------------------------------------------------------------

    /// Stream an already obtained assistant reply as one content chunk.
    ///
    /// Tool calls attached to the reply follow the content as one
    /// `tool_calls` delta each, and the stream then finishes with
    /// `tool_calls` instead of `stop`. They are announced, not executed.
    pub async fn run_reply<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        content: String,
        tool_calls: Vec<ToolCall>,
    ) -> Result<(), EmitError> {
        self.state = EmitterState::Finalizing;
        let chunk = self.chunk(json!({"role": "assistant", "content": content}), None);
        self.emit(sink, StreamEvent::Message(chunk)).await?;

        for (index, call) in tool_calls.iter().enumerate() {
            let delta = json!({
                "role": "assistant",
                "tool_calls": [{
                    "index": index,
                    "id": call.id,
                    "type": call.kind,
                    "function": {"name": call.function.name, "arguments": call.function.arguments},
                }],
            });
            let chunk = self.chunk(delta, None);
            self.emit(sink, StreamEvent::ToolCallStarted(chunk)).await?;
        }

        let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };
        let chunk = self.chunk(json!({"role": "assistant"}), Some(finish_reason));
        self.emit(sink, StreamEvent::Message(chunk)).await?;
        self.finish(sink).await
    }

    /// Emit a single error event and stop.
    pub async fn run_error<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        message: String,
    ) -> Result<(), EmitError> {
        self.state = EmitterState::Erred;
        self.emit(sink, StreamEvent::Error(message)).await
    }

    // -----------------------------------------------------------------------
    // Channel-backed entry points
    // -----------------------------------------------------------------------

    /// Run tool calls on a background task, returning the SSE byte stream.
    pub fn spawn_tool_calls(
        mut self,
        calls: Vec<ToolCallRequest>,
        policy: StreamPolicy,
    ) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let result = self.run_tool_calls(&mut sink, calls, policy).await;
            self.log_completion(result);
        });
        ReceiverStream::new(rx)
    }

    /// Stream a reply on a background task, returning the SSE byte stream.
    pub fn spawn_reply(mut self, content: String, tool_calls: Vec<ToolCall>) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let result = self.run_reply(&mut sink, content, tool_calls).await;
            self.log_completion(result);
        });
        ReceiverStream::new(rx)
    }

    /// Stream a single error event, returning the SSE byte stream.
    pub fn spawn_error(mut self, message: String) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let result = self.run_error(&mut sink, message).await;
            self.log_completion(result);
        });
        ReceiverStream::new(rx)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.chunk_id,
            "object": "chat.completion.chunk",
            "created": unix_now(),
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }

    async fn emit<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
        event: StreamEvent,
    ) -> Result<(), EmitError> {
        if !sink.is_connected() {
            return Err(EmitError::Disconnected);
        }
        sink.send(event).await
    }

    async fn finish<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), EmitError> {
        self.emit(sink, StreamEvent::Done).await?;
        self.state = EmitterState::Done;
        Ok(())
    }

    async fn fail<S: EventSink + ?Sized, T>(
        &mut self,
        sink: &mut S,
        message: String,
    ) -> Result<T, EmitError> {
        self.state = EmitterState::Erred;
        self.emit(sink, StreamEvent::Error(message.clone())).await?;
        Err(EmitError::TaskFailed(message))
    }

    fn log_completion(&self, result: Result<(), EmitError>) {
        match result {
            Ok(()) => tracing::debug!(chunk_id = %self.chunk_id, "stream completed"),
            Err(EmitError::Disconnected) => {
                tracing::info!(chunk_id = %self.chunk_id, state = ?self.state, "client disconnected, stream stopped")
            }
            Err(e) => tracing::warn!(chunk_id = %self.chunk_id, error = %e, "stream ended with error"),
        }
    }
}
