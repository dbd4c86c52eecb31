use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One conversation. Grows without bound for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub history: Vec<Message>,
}

impl Session {
    pub fn new(id: String) -> Self {
        Self {
            id,
            history: Vec::new(),
        }
    }

    pub fn add_message(&mut self, role: Role, content: &str) {
        self.history.push(Message::new(role, content));
    }

    /// Record a completed question/answer exchange.
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.add_message(Role::User, question);
        self.add_message(Role::Assistant, answer);
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
