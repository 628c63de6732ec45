//! Conversation state machine.
//!
//! [`Conversation::apply`] is the one place transition rules live. It only
//! touches the in-memory conversation and reports what else has to change:
//! agent counter effects and whether customer messages become read. The
//! coordinator persists the conversation and carries out those effects in
//! the same transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Conversation, ConversationStatus};
use crate::text;
use crate::urgency::Classification;

/// Counter change on an agent, produced by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEffect {
    IncrementActive(Uuid),
    DecrementActive(Uuid),
    IncrementResolved(Uuid),
}

/// Something that happened to a conversation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A follow-up message from the customer.
    CustomerMessage {
        classification: Classification,
        preview: String,
        at: DateTime<Utc>,
    },
    /// Explicit assignment.
    AssignAgent { agent_id: Uuid },
    /// An agent answered; assigns the agent if nobody is assigned yet.
    AgentReply {
        agent_id: Uuid,
        preview: String,
        at: DateTime<Utc>,
    },
    SetStatus(ConversationStatus),
    MarkRead,
}

/// Outcome of applying an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ConversationStatus,
    pub to: ConversationStatus,
    pub effects: Vec<AgentEffect>,
    /// Unread customer messages of the conversation must be flagged read.
    pub mark_customer_read: bool,
}

impl Transition {
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

impl Conversation {
    /// A new OPEN conversation for the first message of a customer.
    pub fn open(
        customer_id: Uuid,
        subject: Option<&str>,
        content: &str,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            assigned_agent_id: None,
            subject: text::derive_subject(subject, content),
            status: ConversationStatus::Open,
            urgency_score: classification.score,
            urgency_level: classification.level,
            urgency_reason: Some(classification.reason.clone()),
            unread_count: 1,
            last_message_at: Some(now),
            last_message_preview: Some(text::preview(content)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `event`, returning the side effects the caller must commit
    /// together with the updated conversation. On error the conversation is
    /// left untouched.
    pub fn apply(&mut self, event: Event) -> Result<Transition> {
        let from = self.status;
        let mut effects = Vec::new();
        let mut mark_customer_read = false;

        match event {
            Event::CustomerMessage {
                classification,
                preview,
                at,
            } => {
                self.unread_count += 1;
                self.last_message_at = Some(at);
                self.last_message_preview = Some(preview);
                if classification.score > self.urgency_score {
                    self.urgency_score = classification.score;
                    self.urgency_level = classification.level;
                    self.urgency_reason = Some(classification.reason);
                }
                if self.status.is_finished() {
                    self.status = ConversationStatus::Open;
                }
            }
            Event::AssignAgent { agent_id } => {
                match self.assigned_agent_id {
                    Some(current) if current == agent_id => {}
                    Some(previous) => {
                        effects.push(AgentEffect::DecrementActive(previous));
                        effects.push(AgentEffect::IncrementActive(agent_id));
                    }
                    None => effects.push(AgentEffect::IncrementActive(agent_id)),
                }
                self.assigned_agent_id = Some(agent_id);
                self.status = ConversationStatus::InProgress;
            }
            Event::AgentReply {
                agent_id,
                preview,
                at,
            } => {
                if self.assigned_agent_id.is_none() {
                    self.assigned_agent_id = Some(agent_id);
                    effects.push(AgentEffect::IncrementActive(agent_id));
                }
                self.status = ConversationStatus::InProgress;
                self.unread_count = 0;
                self.last_message_at = Some(at);
                self.last_message_preview = Some(preview);
                mark_customer_read = true;
            }
            Event::SetStatus(status) => {
                if status == ConversationStatus::InProgress && self.assigned_agent_id.is_none() {
                    return Err(Error::InvalidInput(format!(
                        "conversation '{}' has no assigned agent",
                        self.id
                    )));
                }
                let entering_resolved =
                    status == ConversationStatus::Resolved && from != ConversationStatus::Resolved;
                if let (true, Some(agent_id)) = (entering_resolved, self.assigned_agent_id) {
                    effects.push(AgentEffect::DecrementActive(agent_id));
                    effects.push(AgentEffect::IncrementResolved(agent_id));
                }
                self.status = status;
            }
            Event::MarkRead => {
                self.unread_count = 0;
                mark_customer_read = true;
            }
        }

        self.updated_at = Utc::now();
        Ok(Transition {
            from,
            to: self.status,
            effects,
            mark_customer_read,
        })
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
