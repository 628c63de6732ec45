//! Keyword-based urgency classification.
//!
//! Tiers are checked in fixed order (critical, high, medium) and the first
//! keyword of the first matching tier wins. Within a tier the keyword list
//! order decides, not the position of the match in the text. There is no
//! partial scoring and no negation handling: "not urgent" is still urgent.

use serde::{Deserialize, Serialize};

/// Urgency bucket of a message or conversation.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

named_enum!(UrgencyLevel, "urgency level", {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Critical => "CRITICAL",
});

impl UrgencyLevel {
    /// HIGH and CRITICAL count as urgent in queue statistics.
    pub fn is_urgent(self) -> bool {
        matches!(self, UrgencyLevel::High | UrgencyLevel::Critical)
    }
}

/// One row of the keyword table.
#[derive(Debug)]
pub struct Tier {
    pub level: UrgencyLevel,
    pub score: u8,
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

/// Keyword tiers in evaluation order.
pub const TIERS: &[Tier] = &[
    Tier {
        level: UrgencyLevel::Critical,
        score: 95,
        label: "Critical",
        keywords: &["fraud", "unauthorized", "stolen", "hacked", "emergency"],
    },
    Tier {
        level: UrgencyLevel::High,
        score: 80,
        label: "High priority",
        keywords: &[
            "urgent",
            "immediately",
            "asap",
            "loan approval",
            "loan rejected",
            "payment failed",
            "disbursement",
            "blocked",
            "suspended",
        ],
    },
    Tier {
        level: UrgencyLevel::Medium,
        score: 50,
        label: "Medium priority",
        keywords: &[
            "waiting",
            "pending",
            "delay",
            "not received",
            "when will",
            "how long",
            "status",
            "issue",
            "problem",
            "help",
        ],
    },
];

pub const DEFAULT_SCORE: u8 = 20;
pub const DEFAULT_REASON: &str = "General inquiry";
pub const EMPTY_REASON: &str = "No content";

/// Result of classifying a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub score: u8,
    pub level: UrgencyLevel,
    pub reason: String,
}

impl Classification {
    fn empty() -> Self {
        Self {
            score: 0,
            level: UrgencyLevel::Low,
            reason: EMPTY_REASON.to_string(),
        }
    }

    fn general() -> Self {
        Self {
            score: DEFAULT_SCORE,
            level: UrgencyLevel::Low,
            reason: DEFAULT_REASON.to_string(),
        }
    }
}

/// Classify message text into a score, level, and human-readable reason.
pub fn classify(text: &str) -> Classification {
    if text.trim().is_empty() {
        return Classification::empty();
    }

    let haystack = text.to_lowercase();
    TIERS
        .iter()
        .find_map(|tier| {
            tier.keywords
                .iter()
                .find(|keyword| haystack.contains(*keyword))
                .map(|keyword| Classification {
                    score: tier.score,
                    level: tier.level,
                    reason: format!("{}: {keyword}", tier.label),
                })
        })
        .unwrap_or_else(Classification::general)
}
