use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Builds a turn stamped with the current time.
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Process-lifetime, append-only chat transcript.
///
/// Appends serialise on a single lock, so the turns of one request keep their
/// relative order even when other requests append concurrently.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, turn: ConversationTurn) {
        // A panic elsewhere can't leave a half-pushed Vec, so a poisoned lock is still usable.
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turn);
    }

    pub fn record(&self, role: Role, text: impl Into<String>) {
        self.append(ConversationTurn::now(role, text));
    }

    pub fn all(&self) -> Vec<ConversationTurn> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
