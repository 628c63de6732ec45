//! Demo data for an empty store.

use serde::Serialize;
use tracing::info;

use crate::config::SeedConfig;
use crate::coordinator::{CustomerSubmission, TriageCoordinator};
use crate::error::Result;
use crate::models::{AgentStatus, CustomerIdentity, NewAgent};

const DEFAULT_AGENTS: &[(&str, &str, AgentStatus)] = &[
    ("Prashant Baghel", "prashant@support.com", AgentStatus::Online),
    ("Sneha Singh", "sneha@support.com", AgentStatus::Online),
    ("Rajesh Kumar", "rajesh@support.com", AgentStatus::Away),
];

/// (title, category, content, shortcut)
const CANNED_TEMPLATES: &[(&str, &str, &str, &str)] = &[
    (
        "Greeting",
        "Greetings",
        "Hello! Thank you for contacting us. How can I assist you today?",
        "/greet",
    ),
    (
        "Loan Status",
        "Loan",
        "Your loan application is being processed. You should receive an update within 2-3 business days.",
        "/loanstatus",
    ),
    (
        "Payment Help",
        "Payment",
        "I apologize for the payment issue. Can you confirm the date and amount?",
        "/payment",
    ),
    (
        "Profile Update",
        "Account",
        "To update your profile, go to Settings > Profile in the app.",
        "/profile",
    ),
    (
        "Thank You",
        "Closing",
        "I'm glad I could help! Is there anything else you need?",
        "/thanks",
    ),
    (
        "Follow Up",
        "Closing",
        "I've noted this and will follow up within 24 hours.",
        "/followup",
    ),
];

const SAMPLE_MESSAGES: &[&str] = &[
    "When will my loan be approved? I've been waiting for 5 days!",
    "Hello, what is the status of my loan disbursement?",
    "How do I update my phone number in my profile?",
    "My payment failed. Please help urgently!",
    "I noticed an unauthorized transaction! This looks like fraud!",
    "Can you explain how the loan approval process works?",
    "Is there a way to extend my loan repayment period?",
    "Thank you for approving my loan! When will I receive the money?",
];

/// What [`seed`] created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// The store already had conversations; nothing was created.
    pub skipped: bool,
    pub agents: usize,
    pub canned_messages: usize,
    pub conversations: usize,
}

/// Populate an empty store with agents, reply templates, and sample
/// conversations. Sample messages go through the coordinator, so they are
/// classified like live traffic.
pub async fn seed(coordinator: &TriageCoordinator, config: &SeedConfig) -> Result<SeedReport> {
    let db = coordinator.database();
    if db.count_conversations().await? > 0 {
        info!("store already has conversations, skipping seed");
        return Ok(SeedReport {
            skipped: true,
            ..SeedReport::default()
        });
    }

    let mut report = SeedReport::default();

    if config.default_agents {
        for (name, email, status) in DEFAULT_AGENTS {
            db.create_agent(&NewAgent {
                name: (*name).to_string(),
                email: Some((*email).to_string()),
                avatar_url: None,
                status: *status,
            })
            .await?;
            report.agents += 1;
        }
    }

    if config.canned_templates && db.list_canned_messages(None).await?.is_empty() {
        for (title, category, content, shortcut) in CANNED_TEMPLATES {
            db.create_canned_message(title, category, content, Some(*shortcut))
                .await?;
            report.canned_messages += 1;
        }
    }

    if config.sample_conversations {
        for (i, content) in SAMPLE_MESSAGES.iter().enumerate() {
            let n = i + 1;
            coordinator
                .submit_customer_message(CustomerSubmission {
                    identity: CustomerIdentity {
                        name: Some(format!("Customer {n}")),
                        email: Some(format!("customer{n}@email.com")),
                        phone: None,
                    },
                    content: (*content).to_string(),
                    subject: None,
                    conversation_id: None,
                })
                .await?;
            report.conversations += 1;
        }
    }

    info!(
        agents = report.agents,
        canned_messages = report.canned_messages,
        conversations = report.conversations,
        "seeded demo data"
    );
    Ok(report)
}
