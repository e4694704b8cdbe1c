// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Server-sent event streaming for tool calls and replies
//
// The emitter drives a small state machine
//   Idle -> AnnouncingCalls -> ExecutingCalls -> Finalizing -> Done
// with Erred reachable from any state. Frames are written to an EventSink;
// the HTTP layer uses a ChannelSink feeding a bounded mpsc channel.

mod emitter;
mod types;

pub use emitter::StreamEmitter;
pub use types::{ChannelSink, EmitError, EmitterState, EventSink, StreamEvent, StreamPolicy};

#[cfg(test)]
mod tests;
