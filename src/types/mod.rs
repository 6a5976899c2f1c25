mod request;

pub use request::{GenerateRequest, ProviderConfig};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Screenshot (or other image) attachment captured by the client shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub base64: String,
    pub media_type: String,
}

/// One entry in the draft or in an archived session. Immutable once
/// appended; exactly one owner at a time (draft or a single session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    pub ts: String,
}

impl Message {
    pub fn user(text: String, image: Option<ImagePayload>) -> Self {
        Self {
            id: new_id(),
            role: Role::User,
            text,
            image,
            ts: now_rfc3339(),
        }
    }

    pub fn assistant(text: String) -> Self {
        Self {
            id: new_id(),
            role: Role::Assistant,
            text,
            image: None,
            ts: now_rfc3339(),
        }
    }
}

/// A named, archived snapshot of a past draft. `id` is stable across
/// renames and in-place updates; `updated_at >= created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub fn new(title: String, messages: Vec<Message>) -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            title,
            messages,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Lifecycle of the single in-flight exchange. Terminal phases are
/// emitted as updates; the stored phase resets to `Idle` on settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    Idle,
    Sending,
    Streaming,
    Done,
    Cancelled,
    Error,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip_serialization() {
        let message = Message::user("hello".to_string(), None);
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_session_timestamps_start_equal() {
        let session = Session::new("title".to_string(), Vec::new());
        assert_eq!(session.created_at, session.updated_at);
        assert!(!session.id.is_empty());
    }

    #[test]
    fn test_image_payload_survives_message_serialization() {
        let message = Message::user(
            "look".to_string(),
            Some(ImagePayload {
                base64: "aGVsbG8=".to_string(),
                media_type: "image/png".to_string(),
            }),
        );
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.image, message.image);
    }
}
