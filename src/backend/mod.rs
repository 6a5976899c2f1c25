pub mod http;
pub mod sse;

pub use http::HttpBackend;

use crate::types::GenerateRequest;
use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = BackendEvent> + Send>>;

/// Push events from one in-flight generation, delivered in backend-send
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Token(String),
    /// Terminal event. `text` carries the final reply when the backend
    /// re-sends it whole; otherwise the accumulated tokens are the reply.
    Done {
        text: Option<String>,
        cancelled: bool,
    },
    Error(String),
}

/// The generative backend collaborator. The engine subscribes before the
/// remote call is issued: `open_stream` returns only once the transport is
/// registered, so no token pushed afterwards can be lost.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn open_stream(&self, request: GenerateRequest) -> Result<EventStream>;

    /// Best-effort abort of the in-flight request; fire-and-forget. Local
    /// settlement never waits on this.
    async fn abort(&self) {}
}
