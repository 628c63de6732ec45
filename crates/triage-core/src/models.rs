//! Domain models for customers, agents, conversations, and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::urgency::UrgencyLevel;

/// A person contacting support. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub account_status: String,
    pub total_conversations: i64,
    pub created_at: DateTime<Utc>,
}

/// Contact details supplied with an inbound message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CustomerIdentity {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }
}

/// Presence of a support agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Online,
    Away,
    Busy,
    #[default]
    Offline,
}

named_enum!(AgentStatus, "agent status", {
    Online => "ONLINE",
    Away => "AWAY",
    Busy => "BUSY",
    Offline => "OFFLINE",
});

/// A support agent with load and resolution counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub status: AgentStatus,
    /// Assigned conversations not yet resolved.
    pub active_conversations: i64,
    pub total_resolved: i64,
    pub last_active: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Administrative agent registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default = "default_agent_status")]
    pub status: AgentStatus,
}

fn default_agent_status() -> AgentStatus {
    AgentStatus::Online
}

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    #[default]
    Open,
    InProgress,
    Waiting,
    Resolved,
    Closed,
}

named_enum!(ConversationStatus, "conversation status", {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Waiting => "WAITING",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

impl ConversationStatus {
    /// Statuses shown in the working queue.
    pub const ACTIVE: [ConversationStatus; 3] = [
        ConversationStatus::Open,
        ConversationStatus::InProgress,
        ConversationStatus::Waiting,
    ];

    /// RESOLVED or CLOSED; a new customer message reopens these.
    pub fn is_finished(self) -> bool {
        matches!(self, ConversationStatus::Resolved | ConversationStatus::Closed)
    }
}

/// A threaded exchange between one customer and support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub subject: String,
    pub status: ConversationStatus,
    pub urgency_score: u8,
    pub urgency_level: UrgencyLevel,
    pub urgency_reason: Option<String>,
    /// Unread customer-authored messages.
    pub unread_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author kind of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Customer,
    Agent,
    System,
}

named_enum!(SenderType, "sender type", {
    Customer => "CUSTOMER",
    Agent => "AGENT",
    System => "SYSTEM",
});

/// A stored message. Only `is_read` ever changes, and only to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub content: String,
    pub is_read: bool,
    pub is_canned_response: bool,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub content: String,
    pub is_read: bool,
    pub is_canned_response: bool,
}

/// Reply template with a usage counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannedMessage {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub content: String,
    pub shortcut: Option<String>,
    pub usage_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Conversation with its full message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Queue-level counters for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageStats {
    pub total_conversations: i64,
    /// OPEN or IN_PROGRESS.
    pub active_conversations: i64,
    /// HIGH or CRITICAL.
    pub urgent_conversations: i64,
    pub unassigned_conversations: i64,
    pub online_agents: i64,
    pub total_messages: i64,
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
