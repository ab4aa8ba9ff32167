/// Shared test scaffolding over `tests/fixtures/test_content.ron`.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::context::TurnContext;
use crate::core::persistence::MemorySaveStore;
use crate::core::scheduler::Scheduler;
use crate::core::store::StateStore;
use crate::schema::content::ContentBundle;
use crate::schema::state::{GameState, View};

pub(crate) const TEST_CONTENT: &str = include_str!("../../tests/fixtures/test_content.ron");

pub(crate) fn content() -> ContentBundle {
    ContentBundle::parse_ron(TEST_CONTENT).expect("test content should parse")
}

/// A named player in phase 1 with the phase's characters online.
pub(crate) fn gameplay_state(content: &ContentBundle) -> GameState {
    let mut state = GameState::new(content.tuning.starting_faith);
    state.current_view = View::Gameplay;
    state.player_name = "ANA".to_string();
    state.character_pool = content.fresh_pool();
    if let Some(phase) = content.phase(1) {
        for id in &phase.initial_active {
            let npc = state.character_pool[id].clone();
            state.active_characters.insert(id.clone(), npc);
        }
    }
    state
}

/// Everything a turn needs, owned in one place.
pub(crate) struct Harness {
    pub content: ContentBundle,
    pub store: StateStore,
    pub rng: StdRng,
    pub scheduler: Scheduler,
    pub saves: MemorySaveStore,
}

impl Harness {
    pub fn new() -> Self {
        let content = content();
        let saves = MemorySaveStore::new();
        let store = StateStore::new(
            gameplay_state(&content),
            content.endings.clone(),
            Box::new(saves.clone()),
        );
        Self {
            content,
            store,
            rng: StdRng::seed_from_u64(7),
            scheduler: Scheduler::new(),
            saves,
        }
    }

    pub fn ctx(&mut self) -> TurnContext<'_> {
        TurnContext {
            content: &self.content,
            store: &mut self.store,
            rng: &mut self.rng,
            scheduler: &mut self.scheduler,
            now_ms: 0,
        }
    }

    pub fn state(&self) -> &GameState {
        self.store.state()
    }

    pub fn log_text(&self) -> Vec<&str> {
        self.store.log().iter().map(|line| line.text.as_str()).collect()
    }

    pub fn logged(&self, text: &str) -> bool {
        self.store.log().iter().any(|line| line.text == text)
    }
}

#[test]
fn test_content_is_valid() {
    let content = content();
    assert_eq!(content.last_phase(), 4);
    assert!(content.is_final_phase(4));
    assert_eq!(gameplay_state(&content).active_characters.len(), 3);
}
