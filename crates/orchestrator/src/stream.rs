//! The streaming path of the message-processing engine.
//!
//! Rounds execute exactly as in the synchronous path; what changes is how a
//! model round arrives. The provider pushes chunks over a channel: content
//! deltas forward to the caller as they land, tool-call slices accumulate
//! per call id until upstream completes, usage forwards as metadata. If the
//! completed round carried tool calls, they execute with the same fan-out
//! semantics and the next round's deltas flow onto the *same* outward
//! stream. The conversation persists exactly once, as the outward stream is
//! about to complete — success or error.
//!
//! Dropping the returned receiver cancels the request: the upstream
//! provider channel is dropped in turn, and tool tasks already in flight
//! run to completion with their results discarded instead of forwarded.

use std::collections::HashMap;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use palaver_core::error::{Error, Result, StreamError};
use palaver_core::message::{Message, MessageToolCall};
use palaver_core::provider::{GenerateRequest, ToolCallDelta, Usage};

use crate::event::StreamEvent;
use crate::processor::{MessageProcessor, PreparedRequest, ProcessRequest, parse_arguments};

/// Accumulates incremental tool-call slices, keyed by call id, preserving
/// first-seen order.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    order: Vec<String>,
    calls: HashMap<String, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    fn absorb(&mut self, delta: ToolCallDelta) {
        if !self.calls.contains_key(&delta.id) {
            self.order.push(delta.id.clone());
        }
        let entry = self.calls.entry(delta.id).or_default();
        if let Some(name) = delta.name {
            entry.name = Some(name);
        }
        entry.arguments.push_str(&delta.arguments);
    }

    fn into_calls(mut self) -> Vec<MessageToolCall> {
        self.order
            .iter()
            .filter_map(|id| {
                self.calls.remove(id).map(|partial| MessageToolCall {
                    id: id.clone(),
                    // A call that never received a name slice fails tool
                    // lookup later, contained like any other bad call.
                    name: partial.name.unwrap_or_default(),
                    arguments: partial.arguments,
                })
            })
            .collect()
    }
}

impl MessageProcessor {
    /// Process a user message as a live stream of [`StreamEvent`]s.
    ///
    /// Setup errors (unknown agent, unknown conversation, malformed window)
    /// are returned directly — the stream never starts. Once the receiver
    /// is handed back, every further failure arrives as one terminal
    /// `Error` event instead.
    pub async fn process_stream(
        &self,
        request: ProcessRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let prepared = self.prepare(request).await?;
        let (tx, rx) = mpsc::channel(64);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.stream_loop(prepared, tx).await;
        });
        Ok(rx)
    }

    async fn stream_loop(self, prepared: PreparedRequest, tx: mpsc::Sender<StreamEvent>) {
        let PreparedRequest {
            profile,
            mut state,
            guard: _guard,
            mut window,
            catalog,
            options,
            memory_size,
        } = prepared;

        let environment = json!({
            "agent_id": profile.id,
            "conversation_id": state.id.to_string(),
        });

        let mut rounds = 0u32;
        let mut tool_calls_made = 0usize;
        let mut last_usage: Option<Usage> = None;
        let mut final_message_id = String::new();
        let mut cancelled = false;

        let outcome: Result<()> = loop {
            rounds += 1;
            if rounds > self.config().max_rounds {
                break Err(Error::RecursionLimit {
                    rounds: self.config().max_rounds,
                });
            }
            debug!(conversation_id = %state.id, round = rounds, "Streaming model round");

            let mut upstream = match self
                .provider()
                .generate_stream(GenerateRequest {
                    messages: window,
                    system_prompt: profile.system_prompt.clone(),
                    tools: catalog.clone(),
                    options: options.clone(),
                })
                .await
            {
                Ok(upstream) => upstream,
                Err(e) => break Err(e.into()),
            };

            // Placeholder assistant message, assembled from fragments.
            let mut assistant = Message::assistant("");
            assistant.is_streaming = true;
            let mut accumulator = ToolCallAccumulator::default();
            let mut upstream_error = None;

            while let Some(item) = upstream.recv().await {
                match item {
                    Ok(chunk) => {
                        if let Some(delta) = chunk.content {
                            assistant.content.push_str(&delta);
                            if tx.send(StreamEvent::Content { delta }).await.is_err() {
                                cancelled = true;
                            }
                        }
                        for delta in chunk.tool_calls {
                            accumulator.absorb(delta);
                        }
                        if let Some(usage) = chunk.usage {
                            last_usage = Some(usage.clone());
                            if tx.send(StreamEvent::Usage { usage }).await.is_err() {
                                cancelled = true;
                            }
                        }
                    }
                    Err(e) => {
                        upstream_error = Some(e);
                        break;
                    }
                }
                if cancelled {
                    break;
                }
            }
            // Dropping the upstream receiver propagates cancellation to the
            // provider.
            drop(upstream);

            if let Some(e) = upstream_error {
                break Err(e.into());
            }
            if cancelled {
                // Partial round: the placeholder was never completed, so it
                // does not enter history.
                break Err(StreamError::ConsumerGone.into());
            }

            let calls = accumulator.into_calls();
            assistant.is_streaming = false;
            assistant.tool_calls = calls.clone();
            final_message_id = assistant.id.clone();
            state.append(assistant);

            if calls.is_empty() {
                break Ok(());
            }

            tool_calls_made += calls.len();
            for call in &calls {
                let event = StreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: parse_arguments(&call.arguments),
                };
                if tx.send(event).await.is_err() {
                    cancelled = true;
                }
            }
            if cancelled {
                break Err(StreamError::ConsumerGone.into());
            }

            for outcome in self.execute_tool_calls(&calls, &environment).await {
                let event = StreamEvent::ToolResult {
                    id: outcome.call_id.clone(),
                    name: outcome.tool_name.clone(),
                    output: outcome.output.clone(),
                    is_error: outcome.is_error,
                };
                // Completed results still enter history after cancellation;
                // they are just no longer forwarded.
                if !cancelled && tx.send(event).await.is_err() {
                    cancelled = true;
                }
                state.append(outcome.into_message());
            }
            if cancelled {
                break Err(StreamError::ConsumerGone.into());
            }

            window = match self.build_window(&state, memory_size) {
                Ok(window) => window,
                Err(e) => break Err(e),
            };
        };

        // Persist exactly once, covering every round, right before the
        // outward stream completes.
        let outcome = match self.store().save(&state).await {
            Ok(()) => outcome,
            Err(e) => {
                warn!(conversation_id = %state.id, error = %e, "Failed to save conversation");
                outcome.and(Err(e.into()))
            }
        };

        match outcome {
            Ok(()) => {
                let _ = tx
                    .send(StreamEvent::Done {
                        conversation_id: state.id.to_string(),
                        message_id: final_message_id,
                        usage: last_usage,
                        rounds,
                        tool_calls_made,
                    })
                    .await;
            }
            Err(Error::Stream(StreamError::ConsumerGone)) => {
                debug!(conversation_id = %state.id, "Stream consumer went away");
            }
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_concatenates_argument_slices_per_id() {
        let mut acc = ToolCallAccumulator::default();
        acc.absorb(ToolCallDelta {
            id: "call_1".into(),
            name: Some("get_price".into()),
            arguments: r#"{"sym"#.into(),
        });
        acc.absorb(ToolCallDelta {
            id: "call_2".into(),
            name: Some("get_news".into()),
            arguments: "{}".into(),
        });
        acc.absorb(ToolCallDelta {
            id: "call_1".into(),
            name: None,
            arguments: r#"bol":"AAPL"}"#.into(),
        });

        let calls = acc.into_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "get_price");
        assert_eq!(calls[0].arguments, r#"{"symbol":"AAPL"}"#);
        assert_eq!(calls[1].name, "get_news");
    }

    #[test]
    fn accumulator_preserves_first_seen_order() {
        let mut acc = ToolCallAccumulator::default();
        for id in ["b", "a", "c", "a", "b"] {
            acc.absorb(ToolCallDelta {
                id: id.into(),
                name: None,
                arguments: "x".into(),
            });
        }
        let ids: Vec<String> = acc.into_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        // Repeated slices concatenated, not duplicated.
    }

    #[test]
    fn accumulator_unnamed_call_keeps_empty_name() {
        let mut acc = ToolCallAccumulator::default();
        acc.absorb(ToolCallDelta {
            id: "call_1".into(),
            name: None,
            arguments: "{}".into(),
        });
        let calls = acc.into_calls();
        assert_eq!(calls[0].name, "");
    }
}
