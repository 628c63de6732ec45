//! Triage coordinator: the only component that mutates more than one
//! entity in a single operation.
//!
//! Every mutating call opens one write transaction, loads the conversation,
//! runs it through [`Conversation::apply`], writes the conversation back,
//! carries out the agent counter effects and message-ledger writes, and
//! commits. Nothing is visible until the commit, and a failure anywhere
//! rolls everything back.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::{self, Database, ListConversationsOptions};
use crate::error::{Error, Result};
use crate::lifecycle::{Event, Transition};
use crate::models::{
    Conversation, ConversationStatus, ConversationWithMessages, CustomerIdentity, Message,
    NewMessage, SenderType, TriageStats,
};
use crate::urgency::{self, Classification};
use crate::{agents, canned, customers, messages, text};

/// An inbound customer message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerSubmission {
    #[serde(default)]
    pub identity: CustomerIdentity,
    pub content: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Continue this conversation instead of opening a new one.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// What an agent sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyBody {
    Text(String),
    /// Content of a canned template, counted as one use.
    Canned(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub agent_id: Uuid,
    pub body: ReplyBody,
}

impl AgentReply {
    pub fn text(agent_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            agent_id,
            body: ReplyBody::Text(content.into()),
        }
    }

    pub fn canned(agent_id: Uuid, canned_id: Uuid) -> Self {
        Self {
            agent_id,
            body: ReplyBody::Canned(canned_id),
        }
    }
}

/// Orchestrates classification, the conversation state machine, and the
/// ledgers.
#[derive(Clone)]
pub struct TriageCoordinator {
    db: Arc<Database>,
    engine: EngineConfig,
}

impl TriageCoordinator {
    pub fn new(db: Arc<Database>, engine: EngineConfig) -> Self {
        Self { db, engine }
    }

    /// Underlying store, for administrative and read-only access.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Record a customer message, opening a conversation or extending the
    /// one named in the submission.
    ///
    /// Not deduplicated: submitting the same content twice stores it twice.
    pub async fn submit_customer_message(&self, submission: CustomerSubmission) -> Result<Message> {
        require_text(&submission.content, "message content")?;
        if submission.conversation_id.is_none() {
            customers::normalize(&submission.identity)?;
        }
        let classification = urgency::classify(&submission.content);

        self.run("submit_customer_message", || {
            self.customer_message_once(&submission, &classification)
        })
        .await
    }

    /// Record an agent reply. Assigns the agent when the conversation has
    /// nobody assigned.
    pub async fn submit_agent_reply(
        &self,
        conversation_id: Uuid,
        reply: AgentReply,
    ) -> Result<Message> {
        if let ReplyBody::Text(content) = &reply.body {
            require_text(content, "reply content")?;
        }

        self.run("submit_agent_reply", || {
            self.agent_reply_once(conversation_id, &reply)
        })
        .await
    }

    pub async fn assign_agent(&self, conversation_id: Uuid, agent_id: Uuid) -> Result<Conversation> {
        self.run("assign_agent", || async move {
            let mut tx = self.db.begin_write().await?;
            agents::require(tx.conn(), agent_id).await?;
            let (conversation, _) =
                apply_event(tx.conn(), conversation_id, Event::AssignAgent { agent_id }).await?;
            tx.commit().await?;
            info!(%conversation_id, %agent_id, "agent assigned");
            Ok::<_, Error>(conversation)
        })
        .await
    }

    pub async fn update_status(
        &self,
        conversation_id: Uuid,
        status: ConversationStatus,
    ) -> Result<Conversation> {
        self.run("update_status", || async move {
            let mut tx = self.db.begin_write().await?;
            let (conversation, transition) =
                apply_event(tx.conn(), conversation_id, Event::SetStatus(status)).await?;
            tx.commit().await?;
            if transition.status_changed() {
                info!(%conversation_id, from = %transition.from, to = %transition.to, "status changed");
            }
            Ok::<_, Error>(conversation)
        })
        .await
    }

    /// Zero the unread count and flag every customer message read.
    pub async fn mark_read(&self, conversation_id: Uuid) -> Result<()> {
        self.run("mark_read", || async move {
            let mut tx = self.db.begin_write().await?;
            apply_event(tx.conn(), conversation_id, Event::MarkRead).await?;
            tx.commit().await?;
            Ok::<_, Error>(())
        })
        .await
    }

    async fn customer_message_once(
        &self,
        submission: &CustomerSubmission,
        classification: &Classification,
    ) -> Result<Message> {
        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        let (conversation, customer) = match submission.conversation_id {
            None => {
                let customer = customers::find_or_create(tx.conn(), &submission.identity).await?;
                let conversation = Conversation::open(
                    customer.id,
                    submission.subject.as_deref(),
                    &submission.content,
                    classification,
                    now,
                );
                db::insert_conversation(tx.conn(), &conversation).await?;
                customers::increment_conversations(tx.conn(), customer.id).await?;
                info!(
                    conversation_id = %conversation.id,
                    customer_id = %customer.id,
                    level = %conversation.urgency_level,
                    score = conversation.urgency_score,
                    "conversation opened"
                );
                (conversation, customer)
            }
            Some(conversation_id) => {
                let event = Event::CustomerMessage {
                    classification: classification.clone(),
                    preview: text::preview(&submission.content),
                    at: now,
                };
                let (conversation, transition) =
                    apply_event(tx.conn(), conversation_id, event).await?;
                if transition.status_changed() {
                    info!(%conversation_id, from = %transition.from, "conversation reopened");
                }
                let customer = customers::get(tx.conn(), conversation.customer_id)
                    .await?
                    .ok_or_else(|| Error::not_found("customer", conversation.customer_id))?;
                (conversation, customer)
            }
        };

        let message = messages::append(
            tx.conn(),
            NewMessage {
                conversation_id: conversation.id,
                sender_id: Some(customer.id),
                sender_type: SenderType::Customer,
                sender_name: customer.name,
                content: submission.content.clone(),
                is_read: false,
                is_canned_response: false,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn agent_reply_once(&self, conversation_id: Uuid, reply: &AgentReply) -> Result<Message> {
        let mut tx = self.db.begin_write().await?;
        let agent = agents::require(tx.conn(), reply.agent_id).await?;
        // Existence first so a missing conversation never burns a canned use.
        db::require_conversation(tx.conn(), conversation_id).await?;

        let (content, is_canned_response) = match &reply.body {
            ReplyBody::Text(content) => (content.clone(), false),
            ReplyBody::Canned(canned_id) => {
                (canned::take_for_reply(tx.conn(), *canned_id).await?, true)
            }
        };

        let event = Event::AgentReply {
            agent_id: agent.id,
            preview: text::preview(&content),
            at: Utc::now(),
        };
        let (_, transition) = apply_event(tx.conn(), conversation_id, event).await?;

        let message = messages::append(
            tx.conn(),
            NewMessage {
                conversation_id,
                sender_id: Some(agent.id),
                sender_type: SenderType::Agent,
                sender_name: agent.name,
                content,
                is_read: true,
                is_canned_response,
            },
        )
        .await?;

        tx.commit().await?;
        info!(
            %conversation_id,
            agent_id = %reply.agent_id,
            canned = is_canned_response,
            assigned = !transition.effects.is_empty(),
            "agent replied"
        );
        Ok(message)
    }

    /// Bound `attempt` by the operation timeout and retry it while it fails
    /// with a write conflict.
    async fn run<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limit = self.engine.operation_timeout();
        if let Ok(result) = tokio::time::timeout(limit, self.retry(operation, attempt)).await {
            result
        } else {
            warn!(operation, ?limit, "operation timed out");
            Err(Error::Timeout(limit))
        }
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_conflict() => {
                    if retries >= self.engine.max_conflict_retries {
                        warn!(operation, retries, error = %err, "giving up after write conflicts");
                        return Err(Error::Conflict(format!("{operation}: {err}")));
                    }
                    retries += 1;
                    warn!(operation, retry = retries, error = %err, "write conflict, retrying");
                    tokio::time::sleep(self.engine.backoff(retries)).await;
                }
                result => return result,
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Classify text without storing anything.
    pub fn classify(&self, text: &str) -> Classification {
        urgency::classify(text)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        db::require_conversation(self.db.pool(), id).await
    }

    pub async fn list_conversations(
        &self,
        opts: &ListConversationsOptions,
    ) -> Result<Vec<Conversation>> {
        self.db.list_conversations(opts).await
    }

    /// OPEN, IN_PROGRESS, and WAITING conversations, most urgent first.
    pub async fn open_queue(&self) -> Result<Vec<Conversation>> {
        self.db
            .list_conversations(&ListConversationsOptions {
                statuses: ConversationStatus::ACTIVE.to_vec(),
                ..Default::default()
            })
            .await
    }

    /// OPEN conversations nobody has picked up, most urgent first.
    pub async fn unassigned_queue(&self) -> Result<Vec<Conversation>> {
        self.db
            .list_conversations(&ListConversationsOptions {
                statuses: vec![ConversationStatus::Open],
                unassigned_only: true,
                ..Default::default()
            })
            .await
    }

    /// Working conversations assigned to one agent.
    pub async fn agent_queue(&self, agent_id: Uuid) -> Result<Vec<Conversation>> {
        agents::require(self.db.pool(), agent_id).await?;
        self.db
            .list_conversations(&ListConversationsOptions {
                statuses: ConversationStatus::ACTIVE.to_vec(),
                agent_id: Some(agent_id),
                ..Default::default()
            })
            .await
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        db::require_conversation(self.db.pool(), conversation_id).await?;
        messages::list_by_conversation(self.db.pool(), conversation_id).await
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Message> {
        self.db
            .get_message(id)
            .await?
            .ok_or_else(|| Error::not_found("message", id))
    }

    pub async fn conversation_with_messages(&self, id: Uuid) -> Result<ConversationWithMessages> {
        let conversation = self.get_conversation(id).await?;
        let messages = messages::list_by_conversation(self.db.pool(), id).await?;
        Ok(ConversationWithMessages {
            conversation,
            messages,
        })
    }

    pub async fn stats(&self) -> Result<TriageStats> {
        self.db.stats().await
    }
}

/// Load a conversation, apply `event`, and write back the conversation
/// together with every side effect of the transition.
async fn apply_event(
    conn: &mut SqliteConnection,
    conversation_id: Uuid,
    event: Event,
) -> Result<(Conversation, Transition)> {
    let mut conversation = db::require_conversation(&mut *conn, conversation_id).await?;
    let transition = conversation.apply(event)?;
    db::save_conversation(&mut *conn, &conversation).await?;

    for effect in &transition.effects {
        agents::apply(&mut *conn, effect).await?;
    }
    if transition.mark_customer_read {
        let flipped = messages::mark_all_customer_messages_read(&mut *conn, conversation_id).await?;
        debug!(%conversation_id, flipped, "customer messages marked read");
    }

    Ok((conversation, transition))
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{what} is blank")));
    }
    Ok(())
}
