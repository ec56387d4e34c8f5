// src/conversation.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Role token used on the wire.
    pub fn as_provider_role(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_provider_role())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Chronological log of completed exchanges. Turns only ever arrive in user/model pairs.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn append_exchange(&mut self, user_text: &str, model_text: &str) {
        self.turns.reserve(2);
        self.turns.push(Turn {
            role: Role::User,
            text: user_text.to_string(),
        });
        self.turns.push(Turn {
            role: Role::Model,
            text: model_text.to_string(),
        });
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_tail_oldest_first() {
        let mut conv = Conversation::new();
        conv.append_exchange("q1", "a1");
        conv.append_exchange("q2", "a2");
        let tail = conv.recent(3);
        let texts: Vec<&str> = tail.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "q2", "a2"]);
        assert_eq!(conv.recent(100).len(), 4);
        assert!(conv.recent(0).is_empty());
    }

    #[test]
    fn exchanges_keep_role_alternation() {
        let mut conv = Conversation::new();
        for i in 0..5 {
            conv.append_exchange(&format!("q{}", i), &format!("a{}", i));
            assert_eq!(conv.len() % 2, 0);
        }
        for pair in conv.recent(conv.len()).chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Model);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut conv = Conversation::new();
        conv.append_exchange("q", "a");
        conv.reset();
        conv.reset();
        assert!(conv.is_empty());
    }
}
