use serde::{Deserialize, Serialize};

use super::npc::{NpcKind, NpcState};

/// Presentation hint attached to every narrated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTag {
    System,
    Positive,
    Negative,
    Hero,
    Agent,
    Guide,
    FaithLow,
    FaithMid,
    FaithHigh,
}

impl LogTag {
    /// Tag for a line spoken by `npc`. Convertible characters are tinted by
    /// how strong their faith currently is.
    pub fn for_npc(npc: &NpcState) -> Self {
        match npc.kind {
            NpcKind::Agent => Self::Agent,
            NpcKind::Guide | NpcKind::Sage => Self::Guide,
            NpcKind::Leader => Self::Positive,
            NpcKind::Neutral => Self::faith_tier(npc.faith),
        }
    }

    pub fn faith_tier(faith: f64) -> Self {
        if faith <= 20.0 {
            Self::FaithLow
        } else if faith <= 80.0 {
            Self::FaithMid
        } else {
            Self::FaithHigh
        }
    }

    /// Class name used by terminal front-ends for styling.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::System => "log-system",
            Self::Positive => "log-positive",
            Self::Negative => "log-negative",
            Self::Hero => "log-hero",
            Self::Agent => "log-agent",
            Self::Guide => "log-guide",
            Self::FaithLow => "npc-low-faith",
            Self::FaithMid => "npc-mid-faith",
            Self::FaithHigh => "npc-high-faith",
        }
    }
}

/// One narrated line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub text: String,
    pub tag: LogTag,
}

impl LogLine {
    pub fn new(text: impl Into<String>, tag: LogTag) -> Self {
        Self {
            text: text.into(),
            tag,
        }
    }
}
