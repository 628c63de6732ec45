//! HTTP routes over the triage coordinator.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use triage_core::TriageCoordinator;
use triage_core::coordinator::{AgentReply, CustomerSubmission, ReplyBody};
use triage_core::db::ListConversationsOptions;
use triage_core::models::{
    Agent, AgentStatus, CannedMessage, Conversation, ConversationStatus,
    ConversationWithMessages, Customer, CustomerIdentity, Message, NewAgent, TriageStats,
};
use triage_core::urgency::{Classification, UrgencyLevel};

use crate::error::{ApiError, ApiResult};

const DEFAULT_SEARCH_LIMIT: i64 = 20;
const TOP_AGENTS_LIMIT: i64 = 5;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: TriageCoordinator,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/messages", post(create_message))
        .route("/messages/{id}", get(get_message))
        .route("/conversations", get(list_conversations))
        .route("/conversations/open", get(open_queue))
        .route("/conversations/unassigned", get(unassigned_queue))
        .route("/conversations/stats", get(stats))
        .route("/conversations/{id}", get(get_conversation))
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(add_customer_message),
        )
        .route("/conversations/{id}/reply", post(reply))
        .route("/conversations/{id}/assign", put(assign))
        .route("/conversations/{id}/status", put(update_status))
        .route("/conversations/{id}/read", post(mark_read))
        .route("/agents", get(list_agents).post(create_agent))
        .route("/agents/online", get(online_agents))
        .route("/agents/stats", get(agent_stats))
        .route("/agents/{id}", get(get_agent))
        .route("/agents/{id}/status", put(set_agent_status))
        .route("/agents/{id}/conversations", get(agent_conversations))
        .route("/customers/search", get(search_customers))
        .route("/customers/{id}", get(get_customer))
        .route("/canned-messages", get(list_canned))
        .route("/canned-messages/categories", get(canned_categories))
        .route("/search/messages", get(search_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Service
// ============================================================================

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    text: String,
}

async fn classify(
    State(state): State<AppState>,
    Json(req): Json<ClassifyRequest>,
) -> Json<Classification> {
    Json(state.coordinator.classify(&req.text))
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateMessageRequest {
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    content: String,
    subject: Option<String>,
}

async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .coordinator
        .submit_customer_message(CustomerSubmission {
            identity: CustomerIdentity {
                name: req.customer_name,
                email: req.customer_email,
                phone: req.customer_phone,
            },
            content: req.content,
            subject: req.subject,
            conversation_id: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct FollowUpRequest {
    content: String,
}

async fn add_customer_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FollowUpRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = state
        .coordinator
        .submit_customer_message(CustomerSubmission {
            content: req.content,
            conversation_id: Some(id),
            ..CustomerSubmission::default()
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    agent_id: Uuid,
    content: Option<String>,
    canned_message_id: Option<Uuid>,
}

async fn reply(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let body = match (req.canned_message_id, req.content) {
        (Some(canned_id), _) => ReplyBody::Canned(canned_id),
        (None, Some(content)) => ReplyBody::Text(content),
        (None, None) => {
            return Err(ApiError::bad_request(
                "reply needs content or canned_message_id",
            ));
        }
    };
    let message = state
        .coordinator
        .submit_agent_reply(
            id,
            AgentReply {
                agent_id: req.agent_id,
                body,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn search_messages(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .coordinator
        .database()
        .search_messages(
            &params.q,
            params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(messages))
}

// ============================================================================
// Conversations
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ConversationQuery {
    status: Option<String>,
    urgency: Option<String>,
    agent_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    #[serde(default)]
    unassigned: bool,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ConversationQuery {
    fn into_options(self) -> Result<ListConversationsOptions, ApiError> {
        let statuses = self
            .status
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::parse::<ConversationStatus>)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let urgency_level = self
            .urgency
            .as_deref()
            .map(str::parse::<UrgencyLevel>)
            .transpose()?;

        Ok(ListConversationsOptions {
            statuses,
            urgency_level,
            agent_id: self.agent_id,
            customer_id: self.customer_id,
            unassigned_only: self.unassigned,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let opts = params.into_options()?;
    Ok(Json(state.coordinator.list_conversations(&opts).await?))
}

async fn open_queue(State(state): State<AppState>) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.coordinator.open_queue().await?))
}

async fn unassigned_queue(State(state): State<AppState>) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.coordinator.unassigned_queue().await?))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<TriageStats>> {
    Ok(Json(state.coordinator.stats().await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConversationWithMessages>> {
    Ok(Json(state.coordinator.conversation_with_messages(id).await?))
}

async fn get_message(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Message>> {
    Ok(Json(state.coordinator.get_message(id).await?))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    Ok(Json(state.coordinator.list_messages(id).await?))
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    agent_id: Uuid,
}

async fn assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.coordinator.assign_agent(id, req.agent_id).await?))
}

#[derive(Debug, Deserialize)]
struct StatusRequest<S> {
    status: S,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest<ConversationStatus>>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.coordinator.update_status(id, req.status).await?))
}

async fn mark_read(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.coordinator.mark_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Agents
// ============================================================================

#[derive(Debug, Deserialize)]
struct AgentQuery {
    status: Option<AgentStatus>,
}

async fn list_agents(
    State(state): State<AppState>,
    Query(params): Query<AgentQuery>,
) -> ApiResult<Json<Vec<Agent>>> {
    let db = state.coordinator.database();
    let agents = match params.status {
        Some(status) => db.list_agents_by_status(status).await?,
        None => db.list_agents().await?,
    };
    Ok(Json(agents))
}

async fn online_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.coordinator.database().available_agents().await?))
}

#[derive(Debug, Serialize)]
struct AgentStats {
    online_agents: i64,
    top_performers: Vec<Agent>,
}

async fn agent_stats(State(state): State<AppState>) -> ApiResult<Json<AgentStats>> {
    let db = state.coordinator.database();
    Ok(Json(AgentStats {
        online_agents: db.count_online_agents().await?,
        top_performers: db.top_agents(TOP_AGENTS_LIMIT).await?,
    }))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<NewAgent>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let agent = state.coordinator.database().create_agent(&req).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn get_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Agent>> {
    state
        .coordinator
        .database()
        .get_agent(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(triage_core::Error::NotFound(format!("agent '{id}'"))))
}

async fn set_agent_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest<AgentStatus>>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(
        state
            .coordinator
            .database()
            .set_agent_status(id, req.status)
            .await?,
    ))
}

async fn agent_conversations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.coordinator.agent_queue(id).await?))
}

// ============================================================================
// Customers and canned messages
// ============================================================================

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Customer>> {
    state
        .coordinator
        .database()
        .get_customer(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(triage_core::Error::NotFound(format!("customer '{id}'"))))
}

#[derive(Debug, Deserialize)]
struct CustomerSearchQuery {
    q: String,
}

async fn search_customers(
    State(state): State<AppState>,
    Query(params): Query<CustomerSearchQuery>,
) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(
        state
            .coordinator
            .database()
            .search_customers(&params.q)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct CannedQuery {
    category: Option<String>,
    q: Option<String>,
}

async fn list_canned(
    State(state): State<AppState>,
    Query(params): Query<CannedQuery>,
) -> ApiResult<Json<Vec<CannedMessage>>> {
    let db = state.coordinator.database();
    let canned = match (params.q, params.category) {
        (Some(q), _) => db.search_canned_messages(&q).await?,
        (None, category) => db.list_canned_messages(category.as_deref()).await?,
    };
    Ok(Json(canned))
}

async fn canned_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.coordinator.database().canned_categories().await?))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
