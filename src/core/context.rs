/// Borrowed view of everything one turn may touch.

use rand::rngs::StdRng;

use crate::core::scheduler::Scheduler;
use crate::core::store::StateStore;
use crate::schema::content::ContentBundle;
use crate::schema::state::GameState;

/// Passed down from the engine into dialogue and item handling so those
/// modules never need the engine itself.
pub struct TurnContext<'a> {
    pub content: &'a ContentBundle,
    pub store: &'a mut StateStore,
    pub rng: &'a mut StdRng,
    pub scheduler: &'a mut Scheduler,
    /// Host time at which the turn runs; deferred work is scheduled from it.
    pub now_ms: u64,
}

impl TurnContext<'_> {
    pub fn state(&self) -> &GameState {
        self.store.state()
    }
}
