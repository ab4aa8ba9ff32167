use serde::{Deserialize, Serialize};

/// The role a character plays in the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NpcKind {
    /// The fixed narrator who gates phase progress.
    Guide,
    /// Adversary that erodes the faith of convertible characters.
    Agent,
    /// Convertible character whose faith moves through conversation.
    Neutral,
    /// Phase gatekeeper, unlocked once the conversion objective is met.
    Leader,
    /// Final-phase character who only receives a harmonious network.
    Sage,
}

impl NpcKind {
    /// Only neutral characters have their own faith changed by dialogue.
    pub fn is_convertible(&self) -> bool {
        matches!(self, Self::Neutral)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Guide => "guide",
            Self::Agent => "agent",
            Self::Neutral => "neutral",
            Self::Leader => "leader",
            Self::Sage => "sage",
        }
    }
}

/// Runtime state of one character on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    pub kind: NpcKind,
    pub faith: f64,
    /// Key of the template whose dialogue this character speaks.
    pub dialogue: String,
}

impl NpcState {
    pub fn is_convertible(&self) -> bool {
        self.kind.is_convertible()
    }
}

/// How a character id is shown in narration: `maria` → `MARIA`.
pub fn display_name(id: &str) -> String {
    id.to_uppercase()
}
