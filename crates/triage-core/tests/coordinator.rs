//! End-to-end tests for the triage coordinator.

use std::sync::Arc;

use triage_core::config::EngineConfig;
use triage_core::coordinator::{AgentReply, CustomerSubmission};
use triage_core::models::{
    Agent, AgentStatus, ConversationStatus, CustomerIdentity, Message, NewAgent, SenderType,
};
use triage_core::urgency::UrgencyLevel;
use triage_core::{Database, Error, TriageCoordinator, messages};
use uuid::Uuid;

fn temp_db_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    let filename = format!("triage-coordinator-test-{}.db", Uuid::new_v4());
    path.push(filename);
    path
}

async fn coordinator() -> TriageCoordinator {
    let db = Database::open(&temp_db_path()).await.expect("open db");
    TriageCoordinator::new(Arc::new(db), EngineConfig::default())
}

async fn agent(coord: &TriageCoordinator, name: &str) -> Agent {
    coord
        .database()
        .create_agent(&NewAgent {
            name: name.to_string(),
            email: Some(format!("{}@support.test", name.to_lowercase())),
            avatar_url: None,
            status: AgentStatus::Online,
        })
        .await
        .expect("create agent")
}

async fn reload_agent(coord: &TriageCoordinator, id: Uuid) -> Agent {
    coord
        .database()
        .get_agent(id)
        .await
        .expect("get agent")
        .expect("agent exists")
}

fn submission(email: &str, content: &str) -> CustomerSubmission {
    CustomerSubmission {
        identity: CustomerIdentity::email(email),
        content: content.to_string(),
        ..CustomerSubmission::default()
    }
}

fn follow_up(conversation_id: Uuid, content: &str) -> CustomerSubmission {
    CustomerSubmission {
        content: content.to_string(),
        conversation_id: Some(conversation_id),
        ..CustomerSubmission::default()
    }
}

async fn unread_in_ledger(coord: &TriageCoordinator, id: Uuid) -> i64 {
    messages::count_unread_customer_messages(coord.database().pool(), id)
        .await
        .expect("count unread")
}

async fn open(coord: &TriageCoordinator, content: &str) -> Message {
    coord
        .submit_customer_message(submission("alice@example.com", content))
        .await
        .expect("submit")
}

// ============================================================================
// Full lifecycle
// ============================================================================

#[tokio::test]
async fn hacked_message_reply_and_resolve() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;

    // New critical conversation
    let first = open(&coord, "I've been hacked!").await;
    let conv = coord
        .get_conversation(first.conversation_id)
        .await
        .expect("get");
    assert_eq!(conv.urgency_level, UrgencyLevel::Critical);
    assert_eq!(conv.urgency_score, 95);
    assert_eq!(conv.urgency_reason.as_deref(), Some("Critical: hacked"));
    assert_eq!(conv.status, ConversationStatus::Open);
    assert_eq!(conv.unread_count, 1);
    assert_eq!(conv.unread_count, unread_in_ledger(&coord, conv.id).await);
    assert!(conv.assigned_agent_id.is_none());

    // Reply assigns and clears unread
    let reply = coord
        .submit_agent_reply(conv.id, AgentReply::text(sneha.id, "Locking your account now."))
        .await
        .expect("reply");
    assert_eq!(reply.sender_type, SenderType::Agent);
    assert_eq!(reply.sender_name, "Sneha");
    assert!(reply.is_read);
    assert!(!reply.is_canned_response);

    let conv = coord.get_conversation(conv.id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::InProgress);
    assert_eq!(conv.assigned_agent_id, Some(sneha.id));
    assert_eq!(conv.unread_count, 0);
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 1);

    let log = coord.list_messages(conv.id).await.expect("messages");
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|m| m.is_read));

    // Resolve twice; counters move once
    coord
        .update_status(conv.id, ConversationStatus::Resolved)
        .await
        .expect("resolve");
    let after_first = reload_agent(&coord, sneha.id).await;
    assert_eq!(after_first.active_conversations, 0);
    assert_eq!(after_first.total_resolved, 1);

    coord
        .update_status(conv.id, ConversationStatus::Resolved)
        .await
        .expect("resolve again");
    let after_second = reload_agent(&coord, sneha.id).await;
    assert_eq!(after_second.active_conversations, 0);
    assert_eq!(after_second.total_resolved, 1);
}

#[tokio::test]
async fn follow_up_on_resolved_reopens() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let first = open(&coord, "Where is my card?").await;
    let id = first.conversation_id;

    coord
        .submit_agent_reply(id, AgentReply::text(sneha.id, "Shipped yesterday."))
        .await
        .expect("reply");
    coord
        .update_status(id, ConversationStatus::Resolved)
        .await
        .expect("resolve");

    let message = coord
        .submit_customer_message(follow_up(id, "It never arrived"))
        .await
        .expect("follow up");
    assert_eq!(message.conversation_id, id);
    assert_eq!(message.sender_type, SenderType::Customer);
    assert!(!message.is_read);

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::Open);
    assert_eq!(conv.unread_count, 1);
    assert_eq!(conv.unread_count, unread_in_ledger(&coord, id).await);
    assert_eq!(conv.last_message_preview.as_deref(), Some("It never arrived"));
}

#[tokio::test]
async fn calmer_follow_up_keeps_urgency() {
    let coord = coordinator().await;
    let first = open(&coord, "My payment failed again").await;
    let id = first.conversation_id;

    coord
        .submit_customer_message(follow_up(id, "thanks for reading"))
        .await
        .expect("follow up");

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.urgency_score, 80);
    assert_eq!(conv.urgency_level, UrgencyLevel::High);
    assert_eq!(conv.urgency_reason.as_deref(), Some("High priority: payment failed"));
    assert_eq!(conv.unread_count, 2);
}

#[tokio::test]
async fn follow_up_is_attributed_to_owner() {
    let coord = coordinator().await;
    let first = coord
        .submit_customer_message(CustomerSubmission {
            identity: CustomerIdentity {
                name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
                phone: None,
            },
            content: "hello".to_string(),
            ..CustomerSubmission::default()
        })
        .await
        .expect("submit");

    let second = coord
        .submit_customer_message(follow_up(first.conversation_id, "still there?"))
        .await
        .expect("follow up");
    assert_eq!(second.sender_id, first.sender_id);
    assert_eq!(second.sender_name, "Alice");

    let customers = coord.database().list_customers().await.expect("list");
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].total_conversations, 1);
}

#[tokio::test]
async fn follow_up_ignores_malformed_identity() {
    let coord = coordinator().await;
    let first = open(&coord, "hello").await;

    let reply = coord
        .submit_customer_message(CustomerSubmission {
            identity: CustomerIdentity::email("not-an-email"),
            content: "any update?".to_string(),
            conversation_id: Some(first.conversation_id),
            ..CustomerSubmission::default()
        })
        .await
        .expect("follow up");
    assert_eq!(reply.sender_id, first.sender_id);

    let err = coord
        .submit_customer_message(submission("not-an-email", "new question"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

// ============================================================================
// Assignment and status
// ============================================================================

#[tokio::test]
async fn reassignment_moves_active_load() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let rajesh = agent(&coord, "Rajesh").await;
    let id = open(&coord, "hello").await.conversation_id;

    let conv = coord.assign_agent(id, sneha.id).await.expect("assign");
    assert_eq!(conv.status, ConversationStatus::InProgress);
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 1);

    coord.assign_agent(id, rajesh.id).await.expect("reassign");
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 0);
    assert_eq!(reload_agent(&coord, rajesh.id).await.active_conversations, 1);

    // Same agent again: no drift
    coord.assign_agent(id, rajesh.id).await.expect("assign same");
    assert_eq!(reload_agent(&coord, rajesh.id).await.active_conversations, 1);

    let queue = coord.agent_queue(rajesh.id).await.expect("queue");
    assert_eq!(queue.len(), 1);
    assert!(coord.agent_queue(sneha.id).await.expect("queue").is_empty());
}

#[tokio::test]
async fn reply_from_second_agent_keeps_owner() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let rajesh = agent(&coord, "Rajesh").await;
    let id = open(&coord, "hello").await.conversation_id;

    coord.assign_agent(id, sneha.id).await.expect("assign");
    coord
        .submit_agent_reply(id, AgentReply::text(rajesh.id, "Covering for Sneha"))
        .await
        .expect("reply");

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.assigned_agent_id, Some(sneha.id));
    assert_eq!(reload_agent(&coord, rajesh.id).await.active_conversations, 0);
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 1);
}

#[tokio::test]
async fn active_load_never_goes_negative() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;

    for content in ["one", "two", "three"] {
        let id = open(&coord, content).await.conversation_id;
        coord.assign_agent(id, sneha.id).await.expect("assign");
        coord
            .update_status(id, ConversationStatus::Resolved)
            .await
            .expect("resolve");
        // Reopen and resolve again without a new assignment
        coord
            .submit_customer_message(follow_up(id, "one more"))
            .await
            .expect("follow up");
        coord
            .update_status(id, ConversationStatus::Resolved)
            .await
            .expect("resolve again");

        let current = reload_agent(&coord, sneha.id).await;
        assert!(current.active_conversations >= 0);
    }

    let current = reload_agent(&coord, sneha.id).await;
    assert_eq!(current.active_conversations, 0);
    assert_eq!(current.total_resolved, 6);
}

#[tokio::test]
async fn in_progress_without_agent_is_rejected() {
    let coord = coordinator().await;
    let id = open(&coord, "hello").await.conversation_id;

    let err = coord
        .update_status(id, ConversationStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::Open);
}

#[tokio::test]
async fn waiting_and_closed_change_no_counters() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let id = open(&coord, "hello").await.conversation_id;
    coord.assign_agent(id, sneha.id).await.expect("assign");

    for status in [ConversationStatus::Waiting, ConversationStatus::Closed] {
        let conv = coord.update_status(id, status).await.expect("status");
        assert_eq!(conv.status, status);
        let current = reload_agent(&coord, sneha.id).await;
        assert_eq!(current.active_conversations, 1);
        assert_eq!(current.total_resolved, 0);
    }
}

// ============================================================================
// Read tracking
// ============================================================================

#[tokio::test]
async fn mark_read_is_idempotent() {
    let coord = coordinator().await;
    let id = open(&coord, "hello").await.conversation_id;
    coord
        .submit_customer_message(follow_up(id, "hello?"))
        .await
        .expect("follow up");

    for _ in 0..2 {
        coord.mark_read(id).await.expect("mark read");
        let conv = coord.get_conversation(id).await.expect("get");
        assert_eq!(conv.unread_count, 0);
        assert_eq!(conv.status, ConversationStatus::Open);
        assert_eq!(unread_in_ledger(&coord, id).await, 0);
        let log = coord.list_messages(id).await.expect("messages");
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|m| m.is_read));
    }
}

// ============================================================================
// Canned replies
// ============================================================================

#[tokio::test]
async fn canned_reply_substitutes_content_and_counts_use() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let template = coord
        .database()
        .create_canned_message("Greeting", "Greetings", "Hello! How can I help?", Some("/greet"))
        .await
        .expect("create canned");
    let id = open(&coord, "hi").await.conversation_id;

    let reply = coord
        .submit_agent_reply(id, AgentReply::canned(sneha.id, template.id))
        .await
        .expect("reply");
    assert_eq!(reply.content, "Hello! How can I help?");
    assert!(reply.is_canned_response);

    let template = coord
        .database()
        .get_canned_message(template.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(template.usage_count, 1);

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(
        conv.last_message_preview.as_deref(),
        Some("Hello! How can I help?")
    );
}

// ============================================================================
// Failures leave no partial state
// ============================================================================

#[tokio::test]
async fn missing_entities_are_not_found() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let id = open(&coord, "hello").await.conversation_id;
    let missing = Uuid::new_v4();

    let err = coord.assign_agent(missing, sneha.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = coord.assign_agent(id, missing).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = coord
        .submit_agent_reply(missing, AgentReply::text(sneha.id, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = coord
        .submit_customer_message(follow_up(missing, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = coord.mark_read(missing).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = coord.list_messages(missing).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Nothing moved
    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::Open);
    assert!(conv.assigned_agent_id.is_none());
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 0);
    assert_eq!(coord.database().count_messages().await.expect("count"), 1);
}

#[tokio::test]
async fn missing_canned_message_rolls_back_reply() {
    let coord = coordinator().await;
    let sneha = agent(&coord, "Sneha").await;
    let id = open(&coord, "hello").await.conversation_id;

    let err = coord
        .submit_agent_reply(id, AgentReply::canned(sneha.id, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::Open);
    assert_eq!(conv.unread_count, 1);
    assert!(conv.assigned_agent_id.is_none());
    assert_eq!(reload_agent(&coord, sneha.id).await.active_conversations, 0);
    assert_eq!(coord.list_messages(id).await.expect("messages").len(), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_mutation() {
    let coord = coordinator().await;

    let err = coord
        .submit_customer_message(submission("alice@example.com", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = coord
        .submit_customer_message(submission("not-an-email", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    assert_eq!(coord.database().count_conversations().await.expect("count"), 0);
    assert!(coord.database().list_customers().await.expect("list").is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_follow_ups_lose_no_updates() {
    let coord = coordinator().await;
    let id = open(&coord, "hello").await.conversation_id;

    let tasks = (0..20).map(|i| {
        let coord = coord.clone();
        tokio::spawn(async move {
            coord
                .submit_customer_message(follow_up(id, &format!("ping {i}")))
                .await
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.expect("join").expect("follow up");
    }

    let conv = coord.get_conversation(id).await.expect("get");
    assert_eq!(conv.unread_count, 21);
    assert_eq!(unread_in_ledger(&coord, id).await, 21);
    assert_eq!(coord.list_messages(id).await.expect("messages").len(), 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_keep_counters_consistent() {
    let coord = coordinator().await;
    let agents = [
        agent(&coord, "Sneha").await,
        agent(&coord, "Rajesh").await,
        agent(&coord, "Prashant").await,
    ];
    let mut ids = Vec::new();
    for n in 0..6 {
        ids.push(open(&coord, &format!("question {n}")).await.conversation_id);
    }

    let mut tasks = Vec::new();
    for (n, id) in ids.iter().copied().enumerate() {
        for a in agents.iter().cycle().skip(n).take(3) {
            let coord = coord.clone();
            let agent_id = a.id;
            tasks.push(tokio::spawn(async move { coord.assign_agent(id, agent_id).await }));
        }
    }
    for result in futures::future::join_all(tasks).await {
        result.expect("join").expect("assign");
    }

    let mut total = 0;
    for a in &agents {
        let current = reload_agent(&coord, a.id).await;
        assert!(current.active_conversations >= 0);
        total += current.active_conversations;
        let queue = coord.agent_queue(a.id).await.expect("queue");
        assert_eq!(queue.len() as i64, current.active_conversations);
    }
    assert_eq!(total, 6);
}

// ============================================================================
// Write contention across handles
// ============================================================================

/// Opens a second handle on the same file with its own engine tuning.
async fn second_handle(path: &std::path::Path, engine: EngineConfig) -> TriageCoordinator {
    let db = Database::open_with(path, &engine).await.expect("open second handle");
    TriageCoordinator::new(Arc::new(db), engine)
}

async fn contended_pair(engine: EngineConfig) -> (TriageCoordinator, TriageCoordinator, Uuid) {
    let path = temp_db_path();
    let db = Database::open(&path).await.expect("open db");
    let first = TriageCoordinator::new(Arc::new(db), EngineConfig::default());
    let id = open(&first, "hello").await.conversation_id;
    let second = second_handle(&path, engine).await;
    (first, second, id)
}

async fn touch_conversation(tx: &mut triage_core::db::WriteTx<'_>, id: Uuid) {
    sqlx::query("UPDATE conversations SET unread_count = unread_count WHERE id = ?")
        .bind(id.to_string())
        .execute(tx.conn())
        .await
        .expect("hold write lock");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_write_exhausts_conflict_retries() {
    let (first, second, id) = contended_pair(EngineConfig {
        max_conflict_retries: 2,
        retry_backoff_ms: 5,
        busy_timeout_ms: 10,
        ..EngineConfig::default()
    })
    .await;

    let mut held = first.database().begin_write().await.expect("begin");
    touch_conversation(&mut held, id).await;

    let err = second
        .update_status(id, ConversationStatus::Waiting)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    drop(held);

    let conv = first.get_conversation(id).await.expect("get");
    assert_eq!(conv.status, ConversationStatus::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_succeeds_once_holder_commits() {
    let (first, second, id) = contended_pair(EngineConfig {
        max_conflict_retries: 20,
        retry_backoff_ms: 10,
        busy_timeout_ms: 10,
        ..EngineConfig::default()
    })
    .await;

    let mut held = first.database().begin_write().await.expect("begin");
    touch_conversation(&mut held, id).await;

    let (committed, updated) = tokio::join!(
        async {
            tokio::time::sleep(std::time::Duration::from_millis(60)).await;
            held.commit().await
        },
        second.update_status(id, ConversationStatus::Waiting),
    );
    committed.expect("commit");
    let conv = updated.expect("update after commit");
    assert_eq!(conv.status, ConversationStatus::Waiting);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operation_timeout_bounds_retries() {
    let (first, second, id) = contended_pair(EngineConfig {
        max_conflict_retries: u32::MAX,
        retry_backoff_ms: 20,
        busy_timeout_ms: 10,
        operation_timeout_secs: 1,
    })
    .await;

    let mut held = first.database().begin_write().await.expect("begin");
    touch_conversation(&mut held, id).await;

    let err = second
        .update_status(id, ConversationStatus::Waiting)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    drop(held);
}
