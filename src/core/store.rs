/// The state store: sole owner of `GameState` and the narration log.
///
/// All mutation goes through `apply` (partial updates) or `replace`
/// (wholesale reset). After every change the cross-field invariants are
/// re-established, subscribers are notified and the autosave slot is
/// refreshed.

use crate::core::persistence::SaveStore;
use crate::schema::content::Endings;
use crate::schema::log::{LogLine, LogTag};
use crate::schema::state::{clamp_faith, GameState, StateUpdate, View, MIN_FAITH};

const SEPARATOR: &str = "--------------------------------------------------";
const RESTART_HINT: &str = "Thank you for playing. Type 'new' to start again.";
const PRAYER_RENEWED: &str = "[SYSTEM]: You feel your Prayer renewed for this new phase.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Victory,
    Defeat,
}

type Subscriber = Box<dyn FnMut(&GameState)>;

pub struct StateStore {
    state: GameState,
    log: Vec<LogLine>,
    endings: Endings,
    saves: Box<dyn SaveStore>,
    subscribers: Vec<Subscriber>,
    log_epoch: u64,
}

impl StateStore {
    pub fn new(state: GameState, endings: Endings, saves: Box<dyn SaveStore>) -> Self {
        let mut store = Self {
            state,
            log: Vec::new(),
            endings,
            saves,
            subscribers: Vec::new(),
            log_epoch: 0,
        };
        store.enforce_invariants();
        store
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    /// Register a callback run after every state change.
    pub fn subscribe(&mut self, callback: impl FnMut(&GameState) + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Merge `update` into the state and re-establish every invariant.
    ///
    /// Ignored entirely once the game is over. A lowered phase, or an
    /// objective flag cleared without a phase advance, is reverted.
    pub fn apply(&mut self, update: StateUpdate) {
        if self.state.game_over {
            tracing::debug!("game over, ignoring update");
            return;
        }
        if update.is_empty() {
            return;
        }

        let phase_before = self.state.current_phase;
        let objective_before = self.state.phase_objective_complete;
        self.state.merge(update);

        if self.state.current_phase < phase_before {
            tracing::warn!(
                "ignoring phase decrease from {} to {}",
                phase_before,
                self.state.current_phase
            );
            self.state.current_phase = phase_before;
        }
        let advanced = self.state.current_phase > phase_before;
        if objective_before && !self.state.phase_objective_complete && !advanced {
            tracing::warn!("ignoring objective reset without a phase advance");
            self.state.phase_objective_complete = true;
        }
        if advanced {
            tracing::info!("entered phase {}", self.state.current_phase);
            self.state.prayer_used_this_phase = false;
            self.append_log(PRAYER_RENEWED, LogTag::Positive);
        }

        self.enforce_invariants();

        if self.state.hero_faith <= MIN_FAITH {
            self.end_game(Ending::Defeat);
            return;
        }

        self.notify();
        self.autosave();
    }

    /// Swap in a whole new state. Used by new game, quit and load.
    pub fn replace(&mut self, state: GameState) {
        self.state = state;
        self.enforce_invariants();
        self.notify();
        if !self.state.game_over {
            self.autosave();
        }
    }

    /// Run an ending: narrate it, freeze the state and drop the autosave.
    pub fn end_game(&mut self, ending: Ending) {
        if self.state.game_over {
            return;
        }
        tracing::info!("game over: {:?}", ending);

        let (text, tag) = match ending {
            Ending::Victory => (self.endings.victory.clone(), LogTag::Positive),
            Ending::Defeat => (self.endings.defeat.clone(), LogTag::Negative),
        };
        self.append_log(SEPARATOR, LogTag::System);
        self.append_log(text, tag);
        self.append_log(RESTART_HINT, LogTag::System);

        self.state.game_over = true;
        self.state.active_dialogue = None;
        self.state.pending_action = None;
        self.state.current_view = View::Ending;
        self.notify();

        if let Err(e) = self.saves.clear_autosave() {
            tracing::warn!("failed to clear autosave: {}", e);
        }
    }

    pub fn append_log(&mut self, text: impl Into<String>, tag: LogTag) {
        self.log.push(LogLine::new(text, tag));
    }

    pub fn append_log_block(&mut self, lines: impl IntoIterator<Item = LogLine>) {
        self.log.extend(lines);
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.log_epoch += 1;
    }

    /// Bumped on every `clear_log`, so readers can tell a cleared log from
    /// one that merely grew.
    pub fn log_epoch(&self) -> u64 {
        self.log_epoch
    }

    /// The last `count` narrated lines, oldest first.
    pub fn recent_log(&self, count: usize) -> &[LogLine] {
        &self.log[self.log.len().saturating_sub(count)..]
    }

    pub fn saves(&self) -> &dyn SaveStore {
        self.saves.as_ref()
    }

    pub fn saves_mut(&mut self) -> &mut dyn SaveStore {
        self.saves.as_mut()
    }

    fn enforce_invariants(&mut self) {
        let state = &mut self.state;
        state.hero_faith = clamp_faith(state.hero_faith);
        for npc in state.active_characters.values_mut() {
            npc.faith = clamp_faith(npc.faith);
        }
        state.inventory.retain(|_, count| *count > 0);

        let conversation_allowed = state.current_view == View::Gameplay
            && !state.game_over
            && state.pending_action.is_none();
        if !conversation_allowed && state.active_dialogue.take().is_some() {
            tracing::debug!("closed conversation");
        }
    }

    fn notify(&mut self) {
        for subscriber in &mut self.subscribers {
            subscriber(&self.state);
        }
    }

    /// Menu and title states never overwrite the autosave of a real run.
    fn autosave(&mut self) {
        if self.state.player_name.is_empty() {
            return;
        }
        let data = match serde_json::to_string(&self.state) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("failed to serialize autosave: {}", e);
                return;
            }
        };
        if let Err(e) = self.saves.write_autosave(&data) {
            tracing::warn!("failed to write autosave: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::Harness;
    use crate::schema::state::{ActiveDialogue, PendingAction, PendingStage};
    use std::cell::Cell;
    use std::rc::Rc;

    fn conversation() -> ActiveDialogue {
        ActiveDialogue {
            npc_id: "gabriel".to_string(),
            node: "phase_1_end".to_string(),
            options: Vec::new(),
        }
    }

    #[test]
    fn faith_is_clamped() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().hero_faith(140.0).npc_faith("maria", -20.0));
        assert_eq!(h.state().hero_faith, 100.0);
        assert_eq!(h.state().active_characters["maria"].faith, 0.0);
        assert!(!h.state().game_over);
    }

    #[test]
    fn zero_faith_ends_the_game_in_the_same_update() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().hero_faith(-5.0));
        assert!(h.state().game_over);
        assert_eq!(h.state().hero_faith, 0.0);
        assert_eq!(h.state().current_view, View::Ending);
        assert!(h.logged("You have lost your way."));
        assert!(h.logged(RESTART_HINT));
    }

    #[test]
    fn updates_after_game_over_are_ignored() {
        let mut h = Harness::new();
        h.store.end_game(Ending::Victory);
        let lines = h.store.log().len();
        h.store.apply(StateUpdate::new().hero_faith(10.0).current_phase(4));
        h.store.end_game(Ending::Defeat);
        assert_eq!(h.state().hero_faith, 70.0);
        assert_eq!(h.state().current_phase, 1);
        assert_eq!(h.store.log().len(), lines);
    }

    #[test]
    fn phase_never_decreases() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().current_phase(3));
        h.store.apply(StateUpdate::new().current_phase(2));
        assert_eq!(h.state().current_phase, 3);
    }

    #[test]
    fn objective_flag_only_resets_on_advance() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        h.store.apply(StateUpdate::new().phase_objective_complete(false));
        assert!(h.state().phase_objective_complete);

        h.store.apply(
            StateUpdate::new()
                .current_phase(2)
                .phase_objective_complete(false),
        );
        assert!(!h.state().phase_objective_complete);
    }

    #[test]
    fn phase_advance_renews_prayer() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().prayer_used(true));
        h.store.apply(StateUpdate::new().current_phase(2));
        assert!(!h.state().prayer_used_this_phase);
        assert!(h.logged(PRAYER_RENEWED));
    }

    #[test]
    fn pending_action_closes_conversation() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().open_dialogue(conversation()));
        assert!(h.state().active_dialogue.is_some());

        h.store.apply(StateUpdate::new().pending_action(Some(PendingAction {
            item_id: "scripture".to_string(),
            stage: PendingStage::AwaitingTarget,
        })));
        assert!(h.state().active_dialogue.is_none());
    }

    #[test]
    fn conversation_requires_gameplay_view() {
        let mut h = Harness::new();
        h.store.apply(
            StateUpdate::new()
                .view(View::Settings)
                .open_dialogue(conversation()),
        );
        assert!(h.state().active_dialogue.is_none());
    }

    #[test]
    fn empty_stacks_leave_the_inventory() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().item_count("prayer", 1));
        assert!(h.state().holds("prayer"));
        h.store.apply(StateUpdate::new().item_count("prayer", 0));
        assert!(!h.state().inventory.contains_key("prayer"));
    }

    #[test]
    fn subscribers_and_autosave_follow_every_change() {
        let mut h = Harness::new();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        h.store.subscribe(move |_| seen.set(seen.get() + 1));

        h.store.apply(StateUpdate::new().hero_faith(50.0));
        assert_eq!(calls.get(), 1);
        let saved: GameState = serde_json::from_str(&h.saves.autosave().unwrap()).unwrap();
        assert_eq!(saved.hero_faith, 50.0);

        h.store.end_game(Ending::Defeat);
        assert_eq!(calls.get(), 2);
        assert!(h.saves.autosave().is_none());
    }

    #[test]
    fn menu_states_leave_the_autosave_alone() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().hero_faith(60.0));
        let saved = h.saves.autosave();
        assert!(saved.is_some());

        h.store.replace(GameState::default());
        h.store.apply(StateUpdate::new().view(View::Menu));
        assert_eq!(h.saves.autosave(), saved);
    }

    #[test]
    fn recent_log_returns_the_tail() {
        let mut h = Harness::new();
        h.store.clear_log();
        for i in 0..5 {
            h.store.append_log(format!("line {}", i), LogTag::System);
        }
        let tail: Vec<&str> = h.store.recent_log(2).iter().map(|l| l.text.as_str()).collect();
        assert_eq!(tail, vec!["line 3", "line 4"]);
        assert_eq!(h.store.recent_log(50).len(), 5);
        assert_eq!(h.store.log_epoch(), 1);
    }
}
