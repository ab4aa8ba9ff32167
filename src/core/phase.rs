/// Phase progression: conversion objectives, roster activation and the
/// objective text shown to the player.

use crate::core::store::StateStore;
use crate::schema::content::ContentBundle;
use crate::schema::log::LogTag;
use crate::schema::npc::{display_name, NpcKind};
use crate::schema::state::{GameState, StateUpdate};

const OBJECTIVE_FALLBACK: &str = "Redemption achieved.";

/// Mean of the hero's faith and every online character's faith.
pub fn average_faith(state: &GameState) -> f64 {
    let total: f64 = state
        .active_characters
        .values()
        .map(|npc| npc.faith)
        .sum::<f64>()
        + state.hero_faith;
    total / (state.active_characters.len() + 1) as f64
}

/// Online neutral characters at or above the conversion threshold.
pub fn converted_count(content: &ContentBundle, state: &GameState) -> usize {
    state
        .active_characters
        .values()
        .filter(|npc| {
            npc.kind == NpcKind::Neutral && npc.faith >= content.tuning.conversion_threshold
        })
        .count()
}

/// Mark the current phase's objective complete once enough characters have
/// converted. Returns true only on the transition.
pub fn check_objective_completion(content: &ContentBundle, store: &mut StateStore) -> bool {
    let state = store.state();
    if state.game_over || state.phase_objective_complete {
        return false;
    }
    let Some(phase) = content.phase(state.current_phase) else {
        return false;
    };
    if phase.required_conversions == 0 {
        return false;
    }
    let converted = converted_count(content, state);
    if converted < phase.required_conversions as usize {
        return false;
    }

    tracing::info!(
        "phase {} objective complete ({} converted)",
        state.current_phase,
        converted
    );
    store.apply(StateUpdate::new().phase_objective_complete(true));
    store.append_log(
        format!(
            "[SYSTEM]: Conversion objective complete! Speak with {} for the next step.",
            display_name(&content.guide)
        ),
        LogTag::Positive,
    );
    true
}

/// Bring the current phase's initial characters online from the pool.
/// Returns the ids that were activated; calling again activates nobody.
pub fn activate_by_phase(content: &ContentBundle, store: &mut StateStore) -> Vec<String> {
    let state = store.state();
    let Some(phase) = content.phase(state.current_phase) else {
        return Vec::new();
    };

    let mut update = StateUpdate::new();
    let mut activated = Vec::new();
    for id in &phase.initial_active {
        if state.active_characters.contains_key(id) || activated.contains(id) {
            continue;
        }
        if let Some(npc) = state.character_pool.get(id) {
            update = update.activate(id.clone(), npc.clone());
            activated.push(id.clone());
        }
    }
    if activated.is_empty() {
        return activated;
    }

    store.apply(update);
    for id in &activated {
        store.append_log(format!("{} appeared online.", display_name(id)), LogTag::System);
    }
    activated
}

/// Bring the current phase's leader online. Returns the leader's id if they
/// were activated by this call.
pub fn activate_leader(content: &ContentBundle, store: &mut StateStore) -> Option<String> {
    let state = store.state();
    if state.game_over {
        return None;
    }
    let leader = content.phase(state.current_phase)?.leader.as_ref()?;
    if state.active_characters.contains_key(leader) {
        return None;
    }
    let npc = state.character_pool.get(leader)?.clone();

    store.apply(StateUpdate::new().activate(leader.clone(), npc));
    store.append_log(
        format!(
            "[SYSTEM]: {} is now online and reachable.",
            display_name(leader)
        ),
        LogTag::Positive,
    );
    Some(leader.clone())
}

/// Move to the next phase and bring its characters online.
pub fn advance_phase(content: &ContentBundle, store: &mut StateStore) -> u32 {
    let next = store.state().current_phase + 1;
    store.apply(
        StateUpdate::new()
            .current_phase(next)
            .phase_objective_complete(false),
    );
    activate_by_phase(content, store);
    store.state().current_phase
}

/// Objective text for the player's current situation.
pub fn current_objective(content: &ContentBundle, state: &GameState) -> String {
    if state.game_over {
        return OBJECTIVE_FALLBACK.to_string();
    }
    let Some(phase) = content.phase(state.current_phase) else {
        return OBJECTIVE_FALLBACK.to_string();
    };

    let index = if content.is_final_phase(state.current_phase) {
        if average_faith(state) > content.tuning.harmony_threshold {
            phase.objectives.final_ready
        } else {
            phase.objectives.final_waiting
        }
    } else if state.phase_objective_complete {
        phase.objectives.post_conversion
    } else {
        phase.objectives.pre_conversion
    };

    index
        .and_then(|index| content.objective(index))
        .unwrap_or(OBJECTIVE_FALLBACK)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::Harness;

    #[test]
    fn average_includes_the_hero() {
        let mut state = GameState::new(60.0);
        assert_eq!(average_faith(&state), 60.0);

        let h = Harness::new();
        state = h.state().clone();
        // hero 70, gabriel 100, maria 50, judas 0
        assert_eq!(average_faith(&state), 55.0);
    }

    #[test]
    fn objective_fires_exactly_once() {
        let mut h = Harness::new();
        assert!(!check_objective_completion(&h.content, &mut h.store));

        h.store.apply(StateUpdate::new().npc_faith("maria", 80.0));
        assert!(check_objective_completion(&h.content, &mut h.store));
        assert!(h.state().phase_objective_complete);

        let lines = h.store.log().len();
        assert!(!check_objective_completion(&h.content, &mut h.store));
        assert_eq!(h.store.log().len(), lines);
    }

    #[test]
    fn objective_needs_every_required_conversion() {
        let mut h = Harness::new();
        advance_phase(&h.content, &mut h.store);
        h.store.apply(StateUpdate::new().npc_faith("joao", 85.0));
        assert_eq!(converted_count(&h.content, h.state()), 1);
        assert!(!check_objective_completion(&h.content, &mut h.store));

        h.store.apply(StateUpdate::new().npc_faith("maria", 90.0));
        assert!(check_objective_completion(&h.content, &mut h.store));
    }

    #[test]
    fn activation_is_idempotent() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().current_phase(2));
        assert_eq!(activate_by_phase(&h.content, &mut h.store), vec!["joao", "tome"]);
        assert!(h.state().active_characters.contains_key("joao"));
        assert!(h.logged("JOAO appeared online."));
        assert!(activate_by_phase(&h.content, &mut h.store).is_empty());
    }

    #[test]
    fn leader_comes_online_once() {
        let mut h = Harness::new();
        assert_eq!(
            activate_leader(&h.content, &mut h.store).as_deref(),
            Some("pedro")
        );
        assert!(h.logged("[SYSTEM]: PEDRO is now online and reachable."));
        assert!(activate_leader(&h.content, &mut h.store).is_none());
    }

    #[test]
    fn advance_resets_objective_and_activates_next_phase() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        assert_eq!(advance_phase(&h.content, &mut h.store), 2);
        assert!(!h.state().phase_objective_complete);
        assert!(h.state().active_characters.contains_key("tome"));
    }

    #[test]
    fn objective_text_follows_progress() {
        let mut h = Harness::new();
        assert_eq!(
            current_objective(&h.content, h.state()),
            "Convert one soul in the village."
        );
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        assert_eq!(
            current_objective(&h.content, h.state()),
            "Seek out Pedro."
        );
    }

    #[test]
    fn final_phase_objective_depends_on_harmony() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().current_phase(4));
        assert_eq!(
            current_objective(&h.content, h.state()),
            "Raise the faith of your network."
        );

        let mut update = StateUpdate::new().hero_faith(100.0);
        for id in h.state().active_characters.keys() {
            update = update.npc_faith(id.clone(), 100.0);
        }
        h.store.apply(update);
        assert_eq!(
            current_objective(&h.content, h.state()),
            "Speak with the Sage."
        );
    }

    #[test]
    fn objective_falls_back_when_over_or_undefined() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().current_phase(9));
        assert_eq!(current_objective(&h.content, h.state()), OBJECTIVE_FALLBACK);
    }
}
