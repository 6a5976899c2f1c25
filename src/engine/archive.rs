use super::state::ChatEngine;
use crate::types::{now_rfc3339, Role, Session};
use crate::util::truncate_chars;
use anyhow::{bail, Result};
use std::mem;

const TITLE_MAX_CHARS: usize = 48;
const FALLBACK_TITLE: &str = "New session";

impl ChatEngine {
    /// Move the draft into the archive. An empty draft is a complete no-op,
    /// so double-archiving cannot mint empty sessions. When a session is
    /// active the archive updates it in place; otherwise a new session is
    /// prepended so the newest entry lists first.
    pub fn archive(&mut self, title: Option<&str>) {
        if self.draft.is_empty() {
            return;
        }

        if let Some(active_id) = self.active_session_id.clone() {
            if let Some(session) = self.archived.iter_mut().find(|s| s.id == active_id) {
                if let Some(title) = title {
                    session.title = title.to_string();
                }
                session.messages = mem::take(&mut self.draft);
                session.updated_at = now_rfc3339();
                self.persist();
                return;
            }
            // The active pointer referenced a deleted session; fall through
            // and archive as new.
            self.active_session_id = None;
        }

        let title = match title {
            Some(title) => title.to_string(),
            None => self.derive_title(),
        };
        let session = Session::new(title, mem::take(&mut self.draft));
        self.archived.insert(0, session);
        self.persist();
    }

    /// Bring an archived session back as the draft. A non-empty draft is
    /// archived first, so no message is ever dropped on the floor. The id
    /// is validated up front; a failed load mutates nothing.
    pub fn load_session(&mut self, id: &str) -> Result<()> {
        if !self.archived.iter().any(|s| s.id == id) {
            bail!("no archived session with id '{id}'");
        }
        if !self.draft.is_empty() {
            self.archive(None);
        }

        if let Some(session) = self.archived.iter().find(|s| s.id == id) {
            self.draft = session.messages.clone();
            self.active_session_id = Some(session.id.clone());
        }
        self.persist();
        Ok(())
    }

    pub fn delete_session(&mut self, id: &str) {
        let before = self.archived.len();
        self.archived.retain(|s| s.id != id);
        if self.archived.len() == before {
            return;
        }
        if self.active_session_id.as_deref() == Some(id) {
            self.active_session_id = None;
        }
        self.persist();
    }

    pub fn rename_session(&mut self, id: &str, title: &str) -> Result<()> {
        let Some(session) = self.archived.iter_mut().find(|s| s.id == id) else {
            bail!("no archived session with id '{id}'");
        };
        session.title = title.to_string();
        session.updated_at = now_rfc3339();
        self.persist();
        Ok(())
    }

    /// First line of the first user message, capped, or a fixed fallback.
    fn derive_title(&self) -> String {
        self.draft
            .iter()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.text.lines().next())
            .map(|line| truncate_chars(line.trim(), TITLE_MAX_CHARS))
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}
