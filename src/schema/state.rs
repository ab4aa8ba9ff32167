use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content::DialogueOption;
use super::npc::NpcState;

/// Player name while the game waits for the player to type one.
pub const PENDING_NAME: &str = "PENDING";

pub const MIN_FAITH: f64 = 0.0;
pub const MAX_FAITH: f64 = 100.0;

pub const DEFAULT_STARTING_FAITH: f64 = 70.0;

pub fn clamp_faith(value: f64) -> f64 {
    value.clamp(MIN_FAITH, MAX_FAITH)
}

/// Which screen the front-end should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    #[default]
    Loading,
    Title,
    Menu,
    Opening,
    Gameplay,
    Settings,
    Ending,
}

/// A conversation waiting for the player to pick an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveDialogue {
    pub npc_id: String,
    pub node: String,
    pub options: Vec<DialogueOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingStage {
    AwaitingTarget,
}

/// Two-step command waiting for its follow-up argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub item_id: String,
    pub stage: PendingStage,
}

fn first_phase() -> u32 {
    1
}

/// The single authoritative record of a run.
///
/// Every field except `hero_faith` has a serde default so that snapshots
/// written before a field existed still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub current_view: View,
    #[serde(default)]
    pub previous_view: Option<View>,
    #[serde(default = "first_phase")]
    pub current_phase: u32,
    pub hero_faith: f64,
    #[serde(default)]
    pub clues: Vec<String>,
    #[serde(default)]
    pub active_characters: BTreeMap<String, NpcState>,
    #[serde(default)]
    pub character_pool: BTreeMap<String, NpcState>,
    #[serde(default)]
    pub game_over: bool,
    #[serde(default)]
    pub active_dialogue: Option<ActiveDialogue>,
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    #[serde(default)]
    pub phase_objective_complete: bool,
    #[serde(default)]
    pub final_phase_started: bool,
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
    #[serde(default)]
    pub prayer_used_this_phase: bool,
    #[serde(default)]
    pub crucifix_active: bool,
    #[serde(default)]
    pub rosary_active: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(DEFAULT_STARTING_FAITH)
    }
}

impl GameState {
    pub fn new(starting_faith: f64) -> Self {
        Self {
            current_view: View::Loading,
            previous_view: None,
            current_phase: 1,
            hero_faith: clamp_faith(starting_faith),
            clues: Vec::new(),
            active_characters: BTreeMap::new(),
            character_pool: BTreeMap::new(),
            game_over: false,
            active_dialogue: None,
            player_name: String::new(),
            inventory: BTreeMap::new(),
            phase_objective_complete: false,
            final_phase_started: false,
            pending_action: None,
            prayer_used_this_phase: false,
            crucifix_active: false,
            rosary_active: false,
        }
    }

    pub fn is_awaiting_name(&self) -> bool {
        self.player_name == PENDING_NAME
    }

    pub fn has_clue(&self, clue: &str) -> bool {
        self.clues.iter().any(|c| c == clue)
    }

    pub fn item_count(&self, item_id: &str) -> u32 {
        self.inventory.get(item_id).copied().unwrap_or(0)
    }

    pub fn holds(&self, item_id: &str) -> bool {
        self.item_count(item_id) > 0
    }

    pub fn npc(&self, id: &str) -> Option<&NpcState> {
        self.active_characters.get(id)
    }

    /// Merge a partial update into this state. No invariants are checked
    /// here; that is the store's job.
    pub fn merge(&mut self, update: StateUpdate) {
        let StateUpdate {
            view,
            previous_view,
            current_phase,
            hero_faith,
            add_clues,
            active_characters,
            activate,
            npc_faith,
            character_pool,
            game_over,
            active_dialogue,
            player_name,
            inventory,
            phase_objective_complete,
            final_phase_started,
            pending_action,
            prayer_used_this_phase,
            crucifix_active,
            rosary_active,
        } = update;

        if let Some(view) = view {
            self.current_view = view;
        }
        if let Some(previous_view) = previous_view {
            self.previous_view = previous_view;
        }
        if let Some(phase) = current_phase {
            self.current_phase = phase;
        }
        if let Some(faith) = hero_faith {
            self.hero_faith = faith;
        }
        for clue in add_clues {
            if !self.has_clue(&clue) {
                self.clues.push(clue);
            }
        }
        if let Some(roster) = active_characters {
            self.active_characters = roster;
        }
        for (id, npc) in activate {
            self.active_characters.entry(id).or_insert(npc);
        }
        for (id, faith) in npc_faith {
            if let Some(npc) = self.active_characters.get_mut(&id) {
                npc.faith = faith;
            }
        }
        if let Some(pool) = character_pool {
            self.character_pool = pool;
        }
        if let Some(over) = game_over {
            self.game_over = over;
        }
        if let Some(dialogue) = active_dialogue {
            self.active_dialogue = dialogue;
        }
        if let Some(name) = player_name {
            self.player_name = name;
        }
        for (item, count) in inventory {
            self.inventory.insert(item, count);
        }
        if let Some(complete) = phase_objective_complete {
            self.phase_objective_complete = complete;
        }
        if let Some(started) = final_phase_started {
            self.final_phase_started = started;
        }
        if let Some(pending) = pending_action {
            self.pending_action = pending;
        }
        if let Some(used) = prayer_used_this_phase {
            self.prayer_used_this_phase = used;
        }
        if let Some(active) = crucifix_active {
            self.crucifix_active = active;
        }
        if let Some(active) = rosary_active {
            self.rosary_active = active;
        }
    }
}

/// A partial change to `GameState`. Unset fields are left untouched.
///
/// Nullable fields use `Option<Option<_>>`: `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub view: Option<View>,
    pub previous_view: Option<Option<View>>,
    pub current_phase: Option<u32>,
    pub hero_faith: Option<f64>,
    pub add_clues: Vec<String>,
    /// Replaces the whole active roster.
    pub active_characters: Option<BTreeMap<String, NpcState>>,
    /// Brings characters online; already-active ids are left alone.
    pub activate: Vec<(String, NpcState)>,
    /// New faith for characters already online.
    pub npc_faith: Vec<(String, f64)>,
    pub character_pool: Option<BTreeMap<String, NpcState>>,
    pub game_over: Option<bool>,
    pub active_dialogue: Option<Option<ActiveDialogue>>,
    pub player_name: Option<String>,
    /// Absolute quantities per item id.
    pub inventory: Vec<(String, u32)>,
    pub phase_objective_complete: Option<bool>,
    pub final_phase_started: Option<bool>,
    pub pending_action: Option<Option<PendingAction>>,
    pub prayer_used_this_phase: Option<bool>,
    pub crucifix_active: Option<bool>,
    pub rosary_active: Option<bool>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn previous_view(mut self, view: Option<View>) -> Self {
        self.previous_view = Some(view);
        self
    }

    pub fn current_phase(mut self, phase: u32) -> Self {
        self.current_phase = Some(phase);
        self
    }

    pub fn hero_faith(mut self, faith: f64) -> Self {
        self.hero_faith = Some(faith);
        self
    }

    pub fn add_clue(mut self, clue: impl Into<String>) -> Self {
        self.add_clues.push(clue.into());
        self
    }

    pub fn active_characters(mut self, roster: BTreeMap<String, NpcState>) -> Self {
        self.active_characters = Some(roster);
        self
    }

    pub fn activate(mut self, id: impl Into<String>, npc: NpcState) -> Self {
        self.activate.push((id.into(), npc));
        self
    }

    pub fn npc_faith(mut self, id: impl Into<String>, faith: f64) -> Self {
        self.npc_faith.push((id.into(), faith));
        self
    }

    pub fn character_pool(mut self, pool: BTreeMap<String, NpcState>) -> Self {
        self.character_pool = Some(pool);
        self
    }

    pub fn open_dialogue(mut self, dialogue: ActiveDialogue) -> Self {
        self.active_dialogue = Some(Some(dialogue));
        self
    }

    pub fn close_dialogue(mut self) -> Self {
        self.active_dialogue = Some(None);
        self
    }

    pub fn player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = Some(name.into());
        self
    }

    pub fn item_count(mut self, item_id: impl Into<String>, count: u32) -> Self {
        self.inventory.push((item_id.into(), count));
        self
    }

    pub fn phase_objective_complete(mut self, complete: bool) -> Self {
        self.phase_objective_complete = Some(complete);
        self
    }

    pub fn final_phase_started(mut self, started: bool) -> Self {
        self.final_phase_started = Some(started);
        self
    }

    pub fn pending_action(mut self, pending: Option<PendingAction>) -> Self {
        self.pending_action = Some(pending);
        self
    }

    pub fn prayer_used(mut self, used: bool) -> Self {
        self.prayer_used_this_phase = Some(used);
        self
    }

    pub fn crucifix_active(mut self, active: bool) -> Self {
        self.crucifix_active = Some(active);
        self
    }

    pub fn rosary_active(mut self, active: bool) -> Self {
        self.rosary_active = Some(active);
        self
    }
}
