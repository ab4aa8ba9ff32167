/// Agents: adversaries that halve a convertible character's faith at random.

use rand::rngs::StdRng;
use rand::Rng;

use crate::core::store::StateStore;
use crate::core::template;
use crate::schema::content::ContentBundle;
use crate::schema::log::LogTag;
use crate::schema::npc::{display_name, NpcKind};
use crate::schema::state::StateUpdate;

/// One successful attack.
#[derive(Debug, Clone, PartialEq)]
pub struct Attack {
    pub agent: String,
    pub target: String,
    /// Target's faith after the attack.
    pub faith: f64,
}

/// Run one agent turn. Returns the attack if one happened.
///
/// Nothing happens once the game is over, after the final phase started or
/// while the rosary is held. The crucifix scales the attack chance down.
pub fn tick(content: &ContentBundle, store: &mut StateStore, rng: &mut StdRng) -> Option<Attack> {
    let state = store.state();
    if state.game_over || state.final_phase_started || state.rosary_active {
        return None;
    }
    let config = content.tuning.agents.as_ref().filter(|config| config.enabled)?;

    let ids_of = |kind: NpcKind| -> Vec<&String> {
        state
            .active_characters
            .iter()
            .filter(|(_, npc)| npc.kind == kind)
            .map(|(id, _)| id)
            .collect()
    };
    let agents = ids_of(NpcKind::Agent);
    let targets = ids_of(NpcKind::Neutral);
    if agents.is_empty() || targets.is_empty() {
        return None;
    }

    let mut chance = config.attack_chance;
    if state.crucifix_active {
        chance *= content.tuning.crucifix_factor;
    }
    if rng.gen::<f64>() >= chance {
        return None;
    }

    let agent = agents[rng.gen_range(0..agents.len())].clone();
    let target = targets[rng.gen_range(0..targets.len())].clone();
    let faith = state.active_characters.get(&target)?.faith / 2.0;
    tracing::debug!("{} attacks {}, faith -> {}", agent, target, faith);

    let threat = template::render(
        &config.threat_line,
        &[
            ("agent", &display_name(&agent)),
            ("target", &display_name(&target)),
        ],
    );
    store.append_log(threat, LogTag::Agent);
    store.append_log(
        format!(
            "[SYSTEM]: {}'s faith dropped to {:.0}%.",
            display_name(&target),
            faith
        ),
        LogTag::Negative,
    );
    store.apply(StateUpdate::new().npc_faith(target.clone(), faith));

    Some(Attack {
        agent,
        target,
        faith,
    })
}
