//! Caller-owned chat sessions.
//!
//! The orchestrator never holds conversation state; callers create a
//! [`Session`] and pass it to [`Orchestrator::ask`](crate::orchestrator::Orchestrator::ask),
//! which appends the exchange. Sessions serialize to JSON so the CLI can
//! keep a transcript between runs.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Chat";

/// Longest title derived from a first question, in characters.
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_title(DEFAULT_TITLE)
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Append a message. The first user message names an untitled session.
    pub fn push(&mut self, role: Role, content: &str) {
        if role == Role::User && self.title == DEFAULT_TITLE && !self.has_user_messages() {
            let title: String = content.trim().chars().take(MAX_TITLE_CHARS).collect();
            if !title.is_empty() {
                self.title = title;
            }
        }
        self.history.push(Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn has_user_messages(&self) -> bool {
        self.history.iter().any(|m| m.role == Role::User)
    }

    /// Load a transcript, or start a fresh session if the file does not exist.
    pub fn load_or_new(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_question_becomes_title() {
        let mut session = Session::new();
        session.push(Role::User, "  What raises LDL?  ");
        session.push(Role::Assistant, "Diet and genetics.");
        session.push(Role::User, "And HDL?");
        assert_eq!(session.title, "What raises LDL?");
        assert_eq!(session.history.len(), 3);
        assert_eq!(session.history[1].role, Role::Assistant);
    }

    #[test]
    fn explicit_title_is_kept() {
        let mut session = Session::with_title("Cardiology notes");
        session.push(Role::User, "hello");
        assert_eq!(session.title, "Cardiology notes");
    }

    #[test]
    fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.json");
        let mut session = Session::load_or_new(&path).unwrap();
        assert!(session.history.is_empty());
        session.push(Role::User, "q");
        session.save(&path).unwrap();

        let reloaded = Session::load_or_new(&path).unwrap();
        assert_eq!(reloaded, session);
    }
}
