use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::npc::{NpcKind, NpcState};
use crate::core::template::{Template, TemplateError};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("template error in {location}: {source}")]
    Template {
        location: String,
        source: TemplateError,
    },
    #[error("guide character '{0}' is not defined")]
    MissingGuide(String),
    #[error("phase key '{0}' is not of the form phase_N")]
    BadPhaseKey(String),
    #[error("{phase} references unknown character '{npc}'")]
    UnknownNpc { phase: String, npc: String },
}

/// Indices into `ContentBundle::objectives` for each situation of a phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRefs {
    #[serde(default)]
    pub pre_conversion: Option<usize>,
    #[serde(default)]
    pub post_conversion: Option<usize>,
    #[serde(default)]
    pub final_waiting: Option<usize>,
    #[serde(default)]
    pub final_ready: Option<usize>,
}

/// One chapter of the story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Number of neutral characters that must be converted. Zero means the
    /// phase is driven by dialogue alone.
    #[serde(default)]
    pub required_conversions: u32,
    #[serde(default)]
    pub initial_active: Vec<String>,
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub objectives: ObjectiveRefs,
}

/// A selectable reply inside a dialogue node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueOption {
    pub text: String,
    #[serde(default)]
    pub requires_clue: Option<String>,
    #[serde(default)]
    pub grants_item: Option<String>,
    #[serde(default)]
    pub grants_clue: Option<String>,
    #[serde(default)]
    pub hero_effect: f64,
    #[serde(default)]
    pub npc_effect: f64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub victory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<DialogueOption>,
    #[serde(default)]
    pub victory: bool,
}

/// A line the hero may say during small talk, with its pull on the listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroLine {
    pub text: String,
    #[serde(default)]
    pub effect: f64,
}

/// How a character talks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dialogue {
    /// Keyed nodes forming a branching conversation.
    Tree(FxHashMap<String, DialogueNode>),
    /// Randomly drawn exchanges used by convertible characters.
    SmallTalk {
        openings: Vec<String>,
        hero_lines: Vec<HeroLine>,
        farewells: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcTemplate {
    pub kind: NpcKind,
    pub faith: f64,
    pub dialogue: Dialogue,
}

impl NpcTemplate {
    /// Fresh, independent runtime copy of this template.
    pub fn instantiate(&self, id: &str) -> NpcState {
        NpcState {
            kind: self.kind,
            faith: self.faith,
            dialogue: id.to_string(),
        }
    }
}

/// What happens when an item is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ItemEffect {
    #[default]
    Passive,
    /// Raises the hero's faith once per phase.
    Prayer { bonus: f64 },
    /// Restores a neutral character's faith; needs a target.
    Scripture,
    /// Toggle that lowers the agents' attack chance.
    Crucifix,
    /// Toggle that blocks agent attacks entirely.
    Rosary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub effect: ItemEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endings {
    pub victory: String,
    pub defeat: String,
}

fn default_threat_line() -> String {
    "[{agent}]: Doubt is a variable... and yours is growing, {target}.".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    /// Probability of an attack per player turn.
    pub attack_chance: f64,
    #[serde(default = "default_threat_line")]
    pub threat_line: String,
}

fn default_starting_faith() -> f64 {
    70.0
}

fn default_threshold() -> f64 {
    80.0
}

fn default_final_phase() -> u32 {
    6
}

fn default_crucifix_factor() -> f64 {
    0.9
}

fn default_auto_advance_ms() -> u64 {
    750
}

fn default_recent_log_len() -> usize {
    10
}

/// Gameplay knobs. Every field has a default so bundles only override what
/// they need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    #[serde(default)]
    pub agents: Option<AgentConfig>,
    #[serde(default = "default_starting_faith")]
    pub starting_faith: f64,
    /// Faith at which a neutral character counts as converted.
    #[serde(default = "default_threshold")]
    pub conversion_threshold: f64,
    /// Average faith the final phase must exceed.
    #[serde(default = "default_threshold")]
    pub harmony_threshold: f64,
    #[serde(default = "default_final_phase")]
    pub final_phase: u32,
    #[serde(default = "default_crucifix_factor")]
    pub crucifix_factor: f64,
    #[serde(default = "default_auto_advance_ms")]
    pub auto_advance_ms: u64,
    /// Narrated lines carried inside an exported save.
    #[serde(default = "default_recent_log_len")]
    pub recent_log_len: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            agents: None,
            starting_faith: default_starting_faith(),
            conversion_threshold: default_threshold(),
            harmony_threshold: default_threshold(),
            final_phase: default_final_phase(),
            crucifix_factor: default_crucifix_factor(),
            auto_advance_ms: default_auto_advance_ms(),
            recent_log_len: default_recent_log_len(),
        }
    }
}

/// Everything the engine reads but never writes: story, characters, items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    #[serde(default)]
    pub title: String,
    /// Id of the guide whose dialogue gates phase progress.
    pub guide: String,
    /// Guide's greeting once the player is named; `{player}` is substituted.
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub orientation: Vec<String>,
    pub phases: FxHashMap<String, Phase>,
    pub npcs: FxHashMap<String, NpcTemplate>,
    #[serde(default)]
    pub items: FxHashMap<String, Item>,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub endings: Endings,
    #[serde(default)]
    pub tuning: Tuning,
}

/// Key under which phase `number` is stored.
pub fn phase_key(number: u32) -> String {
    format!("phase_{}", number)
}

impl ContentBundle {
    /// Load and validate a content bundle from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<ContentBundle, ContentError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a content bundle from a RON string.
    pub fn parse_ron(input: &str) -> Result<ContentBundle, ContentError> {
        let bundle: ContentBundle = ron::from_str(input)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Structural checks the engine relies on. Softer issues (dangling
    /// follow-up nodes, unreachable clues) are left to the linter.
    pub fn validate(&self) -> Result<(), ContentError> {
        if !self.npcs.contains_key(&self.guide) {
            return Err(ContentError::MissingGuide(self.guide.clone()));
        }

        for (key, phase) in &self.phases {
            if parse_phase_key(key).is_none() {
                return Err(ContentError::BadPhaseKey(key.clone()));
            }
            for npc in phase.initial_active.iter().chain(phase.leader.iter()) {
                if !self.npcs.contains_key(npc) {
                    return Err(ContentError::UnknownNpc {
                        phase: key.clone(),
                        npc: npc.clone(),
                    });
                }
            }
        }

        check_template("greeting", &self.greeting)?;
        if let Some(agents) = &self.tuning.agents {
            check_template("tuning.agents.threat_line", &agents.threat_line)?;
        }
        Ok(())
    }

    pub fn phase(&self, number: u32) -> Option<&Phase> {
        self.phases.get(&phase_key(number))
    }

    /// Highest phase number defined in the bundle.
    pub fn last_phase(&self) -> u32 {
        self.phases
            .keys()
            .filter_map(|key| parse_phase_key(key))
            .max()
            .unwrap_or(0)
    }

    pub fn is_final_phase(&self, number: u32) -> bool {
        number >= self.tuning.final_phase
    }

    pub fn npc(&self, id: &str) -> Option<&NpcTemplate> {
        self.npcs.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Display name of an item, falling back to its id.
    pub fn item_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.items.get(id).map(|item| item.name.as_str()).unwrap_or(id)
    }

    /// Find an item by exact id or by a case-insensitive prefix of its name.
    /// Ties resolve to the alphabetically first id.
    pub fn find_item(&self, query: &str) -> Option<(&str, &Item)> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some((id, item)) = self.items.get_key_value(needle.as_str()) {
            return Some((id.as_str(), item));
        }

        let mut ids: Vec<&String> = self.items.keys().collect();
        ids.sort();
        ids.into_iter().find_map(|id| {
            let item = &self.items[id];
            item.name
                .to_lowercase()
                .starts_with(&needle)
                .then_some((id.as_str(), item))
        })
    }

    pub fn objective(&self, index: usize) -> Option<&str> {
        self.objectives.get(index).map(String::as_str)
    }

    /// Node `key` of the dialogue tree belonging to template `template_id`.
    pub fn dialogue_node(&self, template_id: &str, key: &str) -> Option<&DialogueNode> {
        match &self.npcs.get(template_id)?.dialogue {
            Dialogue::Tree(nodes) => nodes.get(key),
            Dialogue::SmallTalk { .. } => None,
        }
    }

    /// A fresh roster with every template instantiated.
    pub fn fresh_pool(&self) -> BTreeMap<String, NpcState> {
        self.npcs
            .iter()
            .map(|(id, template)| (id.clone(), template.instantiate(id)))
            .collect()
    }
}

/// Phase number encoded in a `phase_N` key.
pub fn parse_phase_key(key: &str) -> Option<u32> {
    key.strip_prefix("phase_")?
        .parse()
        .ok()
        .filter(|number| *number > 0)
}

fn check_template(location: &str, text: &str) -> Result<(), ContentError> {
    Template::parse(text)
        .map(|_| ())
        .map_err(|source| ContentError::Template {
            location: location.to_string(),
            source,
        })
}
