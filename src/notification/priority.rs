//! Priority levels for ntfy notifications
//!
//! ntfy accepts five levels, either by name or by number:
//! - URGENT (5): long vibration bursts, pop-over
//! - HIGH (4): long vibration
//! - DEFAULT (3)
//! - LOW (2): no vibration or sound
//! - MIN (1): hidden under other notifications

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "PriorityRepr")]
pub enum Priority {
    Min,
    Low,
    #[default]
    Default,
    High,
    Urgent,
}

/// Accepts both `"high"` and `4` in config and history files
#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityRepr {
    Name(String),
    Level(u8),
}

impl TryFrom<PriorityRepr> for Priority {
    type Error = String;

    fn try_from(value: PriorityRepr) -> Result<Self, Self::Error> {
        match value {
            PriorityRepr::Name(name) => name.parse(),
            PriorityRepr::Level(level) => Priority::from_level(level)
                .ok_or_else(|| format!("priority level out of range: {}", level)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if let Ok(level) = normalized.parse::<u8>() {
            return Priority::from_level(level)
                .ok_or_else(|| format!("priority level out of range: {}", level));
        }
        match normalized.as_str() {
            "min" => Ok(Priority::Min),
            "low" => Ok(Priority::Low),
            "default" => Ok(Priority::Default),
            "high" => Ok(Priority::High),
            "urgent" | "max" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// ntfy numeric level (1-5)
    pub fn level(&self) -> u8 {
        match self {
            Priority::Min => 1,
            Priority::Low => 2,
            Priority::Default => 3,
            Priority::High => 4,
            Priority::Urgent => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::Min),
            2 => Some(Priority::Low),
            3 => Some(Priority::Default),
            4 => Some(Priority::High),
            5 => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Guess priority from keywords in the title
///
/// Heuristic only. Callers that need an exact level pass it explicitly.
pub fn classify_priority(title: &str) -> Priority {
    let upper = title.to_uppercase();
    let has = |words: &[&str]| words.iter().any(|w| upper.contains(w));

    if has(&["ACTION REQUIRED", "URGENT"]) {
        Priority::Urgent
    } else if has(&["BLOCKED", "ERROR", "FAILED"]) {
        Priority::High
    } else if has(&["COMPLETE", "SUCCESS"]) {
        Priority::High
    } else {
        Priority::Default
    }
}

/// Guess emoji tags from keywords in the title
pub fn classify_tags(title: &str) -> Vec<String> {
    let upper = title.to_uppercase();
    let has = |words: &[&str]| words.iter().any(|w| upper.contains(w));

    let tags: &[&str] = if has(&["COMPLETE", "SUCCESS"]) {
        &["white_check_mark", "computer"]
    } else if has(&["ACTION", "REQUIRED"]) {
        &["warning", "bell"]
    } else if has(&["BLOCKED"]) {
        &["x", "stop_sign"]
    } else if has(&["ERROR", "FAILED"]) {
        &["rotating_light", "skull"]
    } else {
        &["computer"]
    };

    tags.iter().map(|t| t.to_string()).collect()
}
