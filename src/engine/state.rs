use crate::backend::ModelBackend;
use crate::config::Config;
use crate::edits::{EditApplier, EditReport, FileBridge, ProjectIndex};
use crate::persist::{EngineSnapshot, StateStore};
use crate::types::{ImagePayload, Message, Session, StreamPhase};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Push updates emitted while the engine mutates state, mirroring every
/// transition the client shell needs to render.
#[derive(Debug, Clone)]
pub enum EngineUpdate {
    UserMessage(Message),
    Phase(StreamPhase),
    StreamDelta(String),
    AssistantMessage(Message),
    Edit(EditReport),
}

/// How one exchange settled. Exactly one of these per dispatched send.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// Assistant reply appended (edits, if any, already dispatched).
    Completed(Message),
    /// Buffer discarded, nothing appended.
    Cancelled,
    /// Synthetic assistant message describing the failure appended.
    Failed(Message),
    /// Rejected before any remote call; inline notice appended.
    Rejected(Message),
}

/// Cancellation handle for the exchange in flight. Clone it out of the
/// engine before dispatching a send; `cancel` settles the local exchange
/// immediately and notifies the backend without being waited on.
#[derive(Clone)]
pub struct ExchangeCancel {
    pub(super) cancel_tx: Arc<watch::Sender<u64>>,
    pub(super) backend: Arc<dyn ModelBackend>,
}

impl ExchangeCancel {
    pub fn cancel(&self) {
        // Bumping the generation is what unblocks the in-flight select;
        // the backend abort is best-effort and never awaited locally.
        self.cancel_tx.send_modify(|generation| *generation += 1);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            backend.abort().await;
        });
    }
}

/// The conversational session engine: one cancellable streaming exchange
/// at a time, a draft message list, and the archive of named sessions.
/// All mutation goes through `&mut self` operations, so the single-flight
/// and no-interleaving guarantees hold by construction.
pub struct ChatEngine {
    pub(super) backend: Arc<dyn ModelBackend>,
    pub(super) applier: EditApplier,
    pub(super) store: StateStore,
    pub(super) system_prompt: Option<String>,
    pub(super) max_output_tokens: Option<u32>,

    pub(super) draft: Vec<Message>,
    pub(super) archived: Vec<Session>,
    pub(super) active_session_id: Option<String>,

    pub(super) phase: StreamPhase,
    pub(super) live_buffer: String,
    pub(super) pending_attachment: Option<ImagePayload>,
    pub(super) context_files: Option<Vec<String>>,
    pub(super) last_edits: Vec<EditReport>,

    pub(super) cancel_tx: Arc<watch::Sender<u64>>,
}

impl ChatEngine {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        files: Arc<dyn FileBridge>,
        index: Arc<dyn ProjectIndex>,
        config: &Config,
    ) -> Self {
        let store = StateStore::new(config.state_path.clone());
        let snapshot = store.load().unwrap_or_default();

        Self {
            backend: Arc::clone(&backend),
            applier: EditApplier::new(files, index),
            store,
            system_prompt: config.system_prompt.clone(),
            max_output_tokens: config.max_output_tokens,
            draft: snapshot.messages,
            archived: snapshot.archived_sessions,
            active_session_id: snapshot.active_session_id,
            phase: StreamPhase::Idle,
            live_buffer: String::new(),
            pending_attachment: None,
            context_files: None,
            last_edits: Vec::new(),
            cancel_tx: Arc::new(watch::channel(0u64).0),
        }
    }

    pub fn draft(&self) -> &[Message] {
        &self.draft
    }

    pub fn archived_sessions(&self) -> &[Session] {
        &self.archived
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Text accumulated so far for the exchange in flight.
    pub fn live_buffer(&self) -> &str {
        &self.live_buffer
    }

    /// Edit statuses for the most recent completed assistant message.
    /// Transient; never persisted.
    pub fn last_edits(&self) -> &[EditReport] {
        &self.last_edits
    }

    /// Attach a captured image to the next exchange. Cleared automatically
    /// on success; retained across cancel/error so a retry keeps it.
    pub fn set_attachment(&mut self, image: ImagePayload) {
        self.pending_attachment = Some(image);
    }

    pub fn clear_attachment(&mut self) {
        self.pending_attachment = None;
    }

    pub fn pending_attachment(&self) -> Option<&ImagePayload> {
        self.pending_attachment.as_ref()
    }

    /// Pre-formatted RAG context blocks included with every exchange until
    /// replaced.
    pub fn set_context_files(&mut self, context_files: Option<Vec<String>>) {
        self.context_files = context_files;
    }

    pub fn edit_target_path(&self, path: &str) -> PathBuf {
        self.applier.resolve_path(path)
    }

    pub(super) fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            messages: self.draft.clone(),
            archived_sessions: self.archived.clone(),
            active_session_id: self.active_session_id.clone(),
        }
    }

    pub(super) fn persist(&mut self) {
        let snapshot = self.snapshot();
        self.store.save(&snapshot);
    }

    pub(super) fn set_phase(
        &mut self,
        phase: StreamPhase,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) {
        self.phase = phase;
        emit_update(updates, EngineUpdate::Phase(phase));
    }

    /// Emit the terminal phase, then discard the stream state back to idle.
    pub(super) fn settle_phase(
        &mut self,
        terminal: StreamPhase,
        updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    ) {
        self.set_phase(terminal, updates);
        self.set_phase(StreamPhase::Idle, updates);
    }
}

pub(super) fn emit_update(
    updates: Option<&mpsc::UnboundedSender<EngineUpdate>>,
    update: EngineUpdate,
) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}
