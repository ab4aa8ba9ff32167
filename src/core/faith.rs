/// Faith exchange between the hero and the character they talk to.

use crate::core::engine::EngineError;
use crate::core::phase;
use crate::core::store::StateStore;
use crate::schema::content::ContentBundle;
use crate::schema::log::LogTag;
use crate::schema::npc::display_name;
use crate::schema::state::{clamp_faith, StateUpdate};

/// Result of one convergence step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    pub hero: f64,
    pub npc: f64,
}

/// Apply `effect` to the character, then move both parties halfway towards
/// each other. The intermediate value is not clamped; the results are.
pub fn converge(hero: f64, npc: f64, effect: f64) -> Convergence {
    let moved = npc + effect;
    let shift = (hero - moved) / 2.0;
    Convergence {
        hero: clamp_faith(hero - shift),
        npc: clamp_faith(moved + shift),
    }
}

/// Exchange faith with the online character `npc_id`.
///
/// Only neutral characters change their own faith. Everyone else can only
/// lift the hero by `hero_effect`. Returns whether the character's faith rose.
pub fn interact(
    content: &ContentBundle,
    store: &mut StateStore,
    npc_id: &str,
    dialogue_effect: f64,
    hero_effect: f64,
) -> Result<bool, EngineError> {
    let npc = store
        .state()
        .npc(npc_id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(npc_id.to_string()))?;
    let name = display_name(npc_id);

    if !npc.is_convertible() {
        if hero_effect != 0.0 {
            let hero = clamp_faith(store.state().hero_faith + hero_effect);
            let (verb, tag) = if hero_effect > 0.0 {
                ("strengthened", LogTag::Positive)
            } else {
                ("shook", LogTag::Negative)
            };
            store.append_log(
                format!(
                    "[FAITH]: Your conversation with {} {} your faith to {:.0}%.",
                    name, verb, hero
                ),
                tag,
            );
            store.apply(StateUpdate::new().hero_faith(hero));
        }
        return Ok(false);
    }

    let result = converge(store.state().hero_faith, npc.faith, dialogue_effect);
    tracing::debug!(
        "{} faith {} -> {}, hero -> {}",
        npc_id,
        npc.faith,
        result.npc,
        result.hero
    );
    store.append_log(
        format!(
            "[FAITH]: Your faith: {:.0}% | {}'s faith: {:.0}%",
            result.hero, name, result.npc
        ),
        LogTag::System,
    );
    store.apply(
        StateUpdate::new()
            .hero_faith(result.hero)
            .npc_faith(npc_id, result.npc),
    );

    phase::check_objective_completion(content, store);
    Ok(result.npc > npc.faith)
}
