//! Bounded per-session conversation history plus a key→value context store.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::models::role::Role;

pub const DEFAULT_MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: i64,
}

/// FIFO of role-tagged turns, oldest evicted first once `max_history` is
/// reached. One manager per session; dropped on session teardown.
pub struct ConversationManager {
    history: VecDeque<Turn>,
    max_history: usize,
    context: HashMap<String, Value>,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(max_history),
            max_history,
            context: HashMap::new(),
        }
    }

    pub fn add_turn(&mut self, role: Role, content: impl Into<String>) {
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(Turn {
            role,
            content: content.into(),
            at: Utc::now().timestamp(),
        });
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Render the most recent `window_size` turns as "Role: content" lines
    pub fn context_window(&self, window_size: usize) -> String {
        let skip = self.history.len().saturating_sub(window_size);
        self.history
            .iter()
            .skip(skip)
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
