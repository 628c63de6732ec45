//! triage CLI - support conversation triage and assignment

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use triage_core::coordinator::{AgentReply, CustomerSubmission};
use triage_core::db::ListConversationsOptions;
use triage_core::models::{
    AgentStatus, Conversation, ConversationStatus, CustomerIdentity, NewAgent,
};
use triage_core::text::truncate;
use triage_core::urgency::UrgencyLevel;
use triage_core::{Config, Database, TriageCoordinator};

#[derive(Debug, Parser)]
#[command(
    name = "triage",
    author,
    version,
    about = "Support conversation triage and assignment",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify text without storing it
    Classify {
        /// Message text
        text: String,
    },

    /// Load demo agents, templates, and conversations into an empty database
    Seed,

    /// Show the working queue, most urgent first
    Queue {
        /// Only unassigned OPEN conversations
        #[arg(long)]
        unassigned: bool,
    },

    /// List conversations
    List {
        /// Filter by status (repeatable)
        #[arg(long)]
        status: Vec<ConversationStatus>,

        /// Filter by urgency level
        #[arg(long)]
        urgency: Option<UrgencyLevel>,

        /// Filter by assigned agent
        #[arg(long)]
        agent: Option<Uuid>,

        /// Maximum results
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Show a conversation with its messages
    Show {
        /// Conversation ID
        id: Uuid,
    },

    /// Submit a customer message
    Submit {
        /// Message text
        content: String,

        /// Continue this conversation
        #[arg(long)]
        conversation: Option<Uuid>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        subject: Option<String>,
    },

    /// Reply to a conversation as an agent
    Reply {
        /// Conversation ID
        conversation: Uuid,

        /// Replying agent
        #[arg(long)]
        agent: Uuid,

        /// Reply text
        #[arg(required_unless_present = "canned")]
        content: Option<String>,

        /// Send a canned message instead of text
        #[arg(long, conflicts_with = "content")]
        canned: Option<Uuid>,
    },

    /// Assign an agent to a conversation
    Assign { conversation: Uuid, agent: Uuid },

    /// Change conversation status
    Status {
        conversation: Uuid,
        status: ConversationStatus,
    },

    /// Mark a conversation read
    Read { conversation: Uuid },

    /// Manage agents
    Agents {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// List canned messages
    Canned {
        /// Only this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Search message content
    Search {
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show queue statistics
    Stats,
}

#[derive(Debug, Subcommand)]
enum AgentCommand {
    /// List agents
    List {
        /// Only agents with this presence
        #[arg(long)]
        status: Option<AgentStatus>,
    },

    /// Register an agent
    Add {
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, default_value = "ONLINE")]
        status: AgentStatus,
    },

    /// Update agent presence
    Status { agent: Uuid, status: AgentStatus },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    // Open database
    let db = Database::open_with(&config.database, &config.engine).await?;
    let coord = TriageCoordinator::new(Arc::new(db), config.engine.clone());
    let out = Output { json: cli.json };

    match cli.command {
        Command::Classify { text } => out.emit(&coord.classify(&text), |c| {
            println!("{} ({}) - {}", c.level, c.score, c.reason);
        }),
        Command::Seed => {
            let report = triage_core::seed::seed(&coord, &config.seed).await?;
            out.emit(&report, |r| {
                if r.skipped {
                    println!("Database already has conversations; nothing seeded.");
                } else {
                    println!(
                        "Seeded {} agents, {} canned messages, {} conversations.",
                        r.agents, r.canned_messages, r.conversations
                    );
                }
            })
        }
        Command::Queue { unassigned } => {
            let convs = if unassigned {
                coord.unassigned_queue().await?
            } else {
                coord.open_queue().await?
            };
            out.emit(&convs, |c| print_conversations(c))
        }
        Command::List {
            status,
            urgency,
            agent,
            limit,
        } => {
            let opts = ListConversationsOptions {
                statuses: status,
                urgency_level: urgency,
                agent_id: agent,
                limit: Some(limit),
                ..Default::default()
            };
            let convs = coord.list_conversations(&opts).await?;
            out.emit(&convs, |c| print_conversations(c))
        }
        Command::Show { id } => cmd_show(&coord, out, id).await,
        Command::Submit {
            content,
            conversation,
            name,
            email,
            phone,
            subject,
        } => {
            let message = coord
                .submit_customer_message(CustomerSubmission {
                    identity: CustomerIdentity { name, email, phone },
                    content,
                    subject,
                    conversation_id: conversation,
                })
                .await?;
            out.emit(&message, |m| {
                println!("{} -> conversation {}", m.id, m.conversation_id);
            })
        }
        Command::Reply {
            conversation,
            agent,
            content,
            canned,
        } => {
            let reply = match (canned, content) {
                (Some(canned_id), _) => AgentReply::canned(agent, canned_id),
                (None, Some(content)) => AgentReply::text(agent, content),
                (None, None) => anyhow::bail!("reply needs text or --canned"),
            };
            let message = coord.submit_agent_reply(conversation, reply).await?;
            out.emit(&message, |m| println!("{} {}", m.id, m.content))
        }
        Command::Assign {
            conversation,
            agent,
        } => {
            let conv = coord.assign_agent(conversation, agent).await?;
            out.emit(&conv, |c| println!("{} assigned, {}", c.id, c.status))
        }
        Command::Status {
            conversation,
            status,
        } => {
            let conv = coord.update_status(conversation, status).await?;
            out.emit(&conv, |c| println!("{} {}", c.id, c.status))
        }
        Command::Read { conversation } => {
            coord.mark_read(conversation).await?;
            if !out.json {
                println!("{conversation} marked read");
            }
            Ok(())
        }
        Command::Agents { command } => cmd_agents(&coord, out, command).await,
        Command::Canned { category } => {
            let canned = coord
                .database()
                .list_canned_messages(category.as_deref())
                .await?;
            out.emit(&canned, |items| {
                if items.is_empty() {
                    println!("No canned messages.");
                }
                for c in items {
                    let shortcut = c.shortcut.as_deref().unwrap_or("-");
                    println!(
                        "{} | {:<10} | {:<12} | {:>3} uses | {}",
                        c.id, shortcut, c.category, c.usage_count, c.title
                    );
                }
            })
        }
        Command::Search { query, limit } => {
            let messages = coord.database().search_messages(&query, limit, 0).await?;
            out.emit(&messages, |items| {
                if items.is_empty() {
                    println!("No results found.");
                }
                for m in items {
                    println!(
                        "[{} {}] {}",
                        m.conversation_id,
                        m.sender_type,
                        truncate(&m.content, 120)
                    );
                }
            })
        }
        Command::Stats => {
            let stats = coord.stats().await?;
            out.emit(&stats, |s| {
                println!("Conversations: {}", s.total_conversations);
                println!("  active:      {}", s.active_conversations);
                println!("  urgent:      {}", s.urgent_conversations);
                println!("  unassigned:  {}", s.unassigned_conversations);
                println!("Online agents: {}", s.online_agents);
                println!("Messages:      {}", s.total_messages);
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

fn print_conversations(convs: &[Conversation]) {
    if convs.is_empty() {
        println!("No conversations found.");
        return;
    }

    for conv in convs {
        let agent = conv
            .assigned_agent_id
            .map_or_else(|| "unassigned".to_string(), |id| id.to_string());
        println!(
            "{} | {:<8} {:>3} | {:<11} | {:>2} unread | {} | {}",
            conv.id,
            conv.urgency_level,
            conv.urgency_score,
            conv.status,
            conv.unread_count,
            agent,
            conv.subject
        );
    }
}

async fn cmd_show(coord: &TriageCoordinator, out: Output, id: Uuid) -> Result<()> {
    let full = coord.conversation_with_messages(id).await?;
    out.emit(&full, |full| {
        let conv = &full.conversation;
        println!("Subject: {}", conv.subject);
        println!("Status: {}", conv.status);
        println!(
            "Urgency: {} ({}) {}",
            conv.urgency_level,
            conv.urgency_score,
            conv.urgency_reason.as_deref().unwrap_or("")
        );
        if let Some(agent) = conv.assigned_agent_id {
            println!("Agent: {agent}");
        }
        println!("Created: {}", conv.created_at.format("%Y-%m-%d %H:%M"));
        println!();

        for msg in &full.messages {
            let marker = if msg.is_canned_response { " (canned)" } else { "" };
            println!("--- {} {}{} ---", msg.sender_type, msg.sender_name, marker);
            println!("{}", msg.content);
            println!();
        }
    })
}

async fn cmd_agents(coord: &TriageCoordinator, out: Output, command: AgentCommand) -> Result<()> {
    let db = coord.database();
    match command {
        AgentCommand::List { status } => {
            let agents = match status {
                Some(status) => db.list_agents_by_status(status).await?,
                None => db.list_agents().await?,
            };
            out.emit(&agents, |items| {
                if items.is_empty() {
                    println!("No agents registered.");
                }
                for a in items {
                    println!(
                        "{} | {:<7} | {:>2} active | {:>3} resolved | {}",
                        a.id, a.status, a.active_conversations, a.total_resolved, a.name
                    );
                }
            })
        }
        AgentCommand::Add {
            name,
            email,
            status,
        } => {
            let agent = db
                .create_agent(&NewAgent {
                    name,
                    email,
                    avatar_url: None,
                    status,
                })
                .await?;
            out.emit(&agent, |a| println!("{} {}", a.id, a.name))
        }
        AgentCommand::Status { agent, status } => {
            let agent = db.set_agent_status(agent, status).await?;
            out.emit(&agent, |a| println!("{} {}", a.name, a.status))
        }
    }
}
