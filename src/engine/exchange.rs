use super::state::{emit_update, ChatEngine, EngineUpdate, ExchangeCancel, ExchangeOutcome};
use crate::backend::BackendEvent;
use crate::protocol;
use crate::trim::trim_capped_reply;
use crate::types::{GenerateRequest, Message, StreamPhase};
use anyhow::{bail, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

const EMPTY_PROMPT_NOTICE: &str = "Type a message before sending.";

enum Settled {
    Completed(String),
    Cancelled,
    Error(String),
}

impl ChatEngine {
    /// Handle for cancelling the exchange in flight. Grab it before
    /// dispatching `send_message`; it stays valid for the whole exchange.
    pub fn cancel_handle(&self) -> ExchangeCancel {
        ExchangeCancel {
            cancel_tx: Arc::clone(&self.cancel_tx),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Run one full exchange: append the user message optimistically,
    /// stream the reply, and settle by exactly one of completion,
    /// cancellation, or failure. Backend trouble never surfaces as `Err`;
    /// only the single-flight invariant does.
    pub async fn send_message(
        &mut self,
        input: String,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) -> Result<ExchangeOutcome> {
        if self.phase != StreamPhase::Idle {
            bail!("an exchange is already in flight; single-flight guard rejected the send");
        }

        if input.trim().is_empty() {
            let notice = Message::assistant(EMPTY_PROMPT_NOTICE.to_string());
            self.draft.push(notice.clone());
            emit_update(updates, EngineUpdate::AssistantMessage(notice.clone()));
            return Ok(ExchangeOutcome::Rejected(notice));
        }

        // Optimistic append before any await.
        let user_message = Message::user(input, self.pending_attachment.clone());
        self.draft.push(user_message.clone());
        emit_update(updates, EngineUpdate::UserMessage(user_message.clone()));
        self.set_phase(StreamPhase::Sending, updates);

        // Subscribe before invoking the remote call so neither a
        // cancellation nor the first pushed token can slip past.
        let mut cancel_rx = self.cancel_tx.subscribe();
        let request = self.build_request(&user_message);

        let opened = tokio::select! {
            biased;
            _ = cancel_rx.changed() => None,
            opened = self.backend.open_stream(request) => Some(opened),
        };

        let mut stream = match opened {
            None => return Ok(self.settle_cancelled(updates)),
            Some(Err(error)) => return Ok(self.settle_error(format!("{error:#}"), updates)),
            Some(Ok(stream)) => stream,
        };

        self.live_buffer.clear();
        self.set_phase(StreamPhase::Streaming, updates);

        let settled = loop {
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => break Settled::Cancelled,
                event = stream.next() => match event {
                    Some(BackendEvent::Token(token)) => {
                        self.live_buffer.push_str(&token);
                        emit_update(updates, EngineUpdate::StreamDelta(token));
                    }
                    Some(BackendEvent::Done { cancelled: true, .. }) => break Settled::Cancelled,
                    Some(BackendEvent::Done { text, .. }) => {
                        break Settled::Completed(
                            text.unwrap_or_else(|| self.live_buffer.clone()),
                        );
                    }
                    Some(BackendEvent::Error(message)) => break Settled::Error(message),
                    // Stream closed without a terminal frame; the buffer is
                    // the reply.
                    None => break Settled::Completed(self.live_buffer.clone()),
                },
            }
        };

        // Listener teardown on every settlement path: the winning branch
        // drops both the event stream and the cancel subscription, so a
        // late signal from this exchange can never reach a later one.
        drop(stream);
        drop(cancel_rx);

        match settled {
            Settled::Cancelled => Ok(self.settle_cancelled(updates)),
            Settled::Error(message) => Ok(self.settle_error(message, updates)),
            Settled::Completed(text) => Ok(self.settle_completed(text, updates).await),
        }
    }

    fn build_request(&self, user_message: &Message) -> GenerateRequest {
        GenerateRequest {
            prompt: user_message.text.clone(),
            system_prompt: self.system_prompt.clone(),
            image: self.pending_attachment.clone(),
            context_files: self.context_files.clone(),
            max_tokens: self.max_output_tokens,
        }
    }

    fn settle_cancelled(
        &mut self,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) -> ExchangeOutcome {
        self.live_buffer.clear();
        // The optimistic user message must survive a restart too.
        self.persist();
        self.settle_phase(StreamPhase::Cancelled, updates);
        ExchangeOutcome::Cancelled
    }

    fn settle_error(
        &mut self,
        message: String,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) -> ExchangeOutcome {
        self.live_buffer.clear();
        let notice = Message::assistant(format!(
            "Something went wrong while generating a reply: {message}"
        ));
        self.draft.push(notice.clone());
        emit_update(updates, EngineUpdate::AssistantMessage(notice.clone()));
        self.persist();
        self.settle_phase(StreamPhase::Error, updates);
        ExchangeOutcome::Failed(notice)
    }

    async fn settle_completed(
        &mut self,
        text: String,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) -> ExchangeOutcome {
        let text = match self.max_output_tokens {
            Some(cap) => trim_capped_reply(&text, cap),
            None => text,
        };

        let assistant_message = Message::assistant(text);
        self.draft.push(assistant_message.clone());
        emit_update(
            updates,
            EngineUpdate::AssistantMessage(assistant_message.clone()),
        );
        self.live_buffer.clear();
        // The captured image rode along once; a successful exchange
        // consumes it.
        self.pending_attachment = None;

        let segments = protocol::parse(&assistant_message.text);
        self.last_edits = self
            .applier
            .apply(&segments, |report| {
                emit_update(updates, EngineUpdate::Edit(report.clone()));
            })
            .await;

        self.persist();
        self.settle_phase(StreamPhase::Done, updates);
        ExchangeOutcome::Completed(assistant_message)
    }
}
