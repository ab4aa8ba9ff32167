/// Dialogue resolution: picking the node a character opens with, rendering
/// nodes and applying the option the player picks.

use rand::seq::SliceRandom;

use crate::core::agents;
use crate::core::context::TurnContext;
use crate::core::engine::EngineError;
use crate::core::faith;
use crate::core::phase;
use crate::core::scheduler::Continuation;
use crate::core::store::Ending;
use crate::schema::content::{ContentBundle, Dialogue, DialogueOption};
use crate::schema::log::LogTag;
use crate::schema::npc::{display_name, NpcKind, NpcState};
use crate::schema::state::{ActiveDialogue, GameState, StateUpdate};

const INITIAL_NODE: &str = "initial";

/// Start talking to the online character `npc_id`.
pub fn begin(ctx: &mut TurnContext<'_>, npc_id: &str) -> Result<(), EngineError> {
    let content = ctx.content;
    let id = npc_id.trim().to_lowercase();
    let Some(npc) = ctx.state().npc(&id).cloned() else {
        ctx.store.append_log("[SYSTEM]: Character not found.", LogTag::Negative);
        return Err(EngineError::NotFound(id));
    };

    if npc.kind == NpcKind::Neutral {
        if let Some(Dialogue::SmallTalk {
            openings,
            hero_lines,
            farewells,
        }) = content.npc(&npc.dialogue).map(|template| &template.dialogue)
        {
            tracing::debug!("small talk with {}", id);
            let name = display_name(&id);
            if let Some(opening) = openings.choose(ctx.rng) {
                ctx.store.append_log(format!("[{}]: {}", name, opening), LogTag::for_npc(&npc));
            }
            if let Some(line) = hero_lines.choose(ctx.rng) {
                ctx.store.append_log(format!("> {}", line.text), LogTag::Hero);
                faith::interact(content, ctx.store, &id, line.effect, 0.0)?;
                if ctx.state().game_over {
                    return Ok(());
                }
            }
            if let Some(farewell) = farewells.choose(ctx.rng) {
                let tag = ctx
                    .state()
                    .npc(&id)
                    .map(LogTag::for_npc)
                    .unwrap_or(LogTag::System);
                ctx.store.append_log(format!("[{}]: {}", name, farewell), tag);
            }
            agents::tick(content, ctx.store, ctx.rng);
            return Ok(());
        }
    }

    let node = if id == content.guide {
        match guide_node(content, ctx.state()) {
            Some(node) => node,
            None => {
                tracing::debug!("no phase {} for the guide", ctx.state().current_phase);
                return Ok(());
            }
        }
    } else {
        INITIAL_NODE.to_string()
    };

    if npc.kind == NpcKind::Sage {
        if phase::average_faith(ctx.state()) <= content.tuning.harmony_threshold {
            ctx.store.append_log(
                format!(
                    "[SYSTEM]: {} is deep in meditation and does not answer...",
                    display_name(&id)
                ),
                LogTag::Negative,
            );
            return Ok(());
        }
        tracing::info!("final phase started");
        ctx.store.apply(StateUpdate::new().final_phase_started(true));
    }

    render_node(ctx, &id, &node)
}

/// Node the guide opens with for the current phase.
fn guide_node(content: &ContentBundle, state: &GameState) -> Option<String> {
    let number = state.current_phase;
    content.phase(number)?;
    let key = if content.is_final_phase(number) {
        if phase::average_faith(state) > content.tuning.harmony_threshold {
            "final_ready".to_string()
        } else {
            "final_waiting".to_string()
        }
    } else if state.phase_objective_complete {
        format!("phase_{}_end", number)
    } else {
        format!("phase_{}_start", number)
    };
    Some(key)
}

/// Narrate node `key` of `npc_id`'s dialogue and set up what follows it.
///
/// A single option is resolved automatically after the configured delay;
/// several options open a conversation the player answers with `reply`.
pub fn render_node(ctx: &mut TurnContext<'_>, npc_id: &str, key: &str) -> Result<(), EngineError> {
    let content = ctx.content;
    let npc = online(ctx, npc_id)?;
    let name = display_name(npc_id);

    let node = content
        .dialogue_node(&npc.dialogue, key)
        .filter(|node| !node.text.is_empty());
    let Some(node) = node else {
        ctx.store.append_log(
            format!("[SYSTEM]: {} has nothing more to say.", name),
            LogTag::System,
        );
        ctx.store.apply(StateUpdate::new().close_dialogue());
        return Ok(());
    };

    ctx.store.append_log(format!("[{}]: {}", name, node.text), LogTag::for_npc(&npc));

    match node.options.len() {
        0 => ctx.store.apply(StateUpdate::new().close_dialogue()),
        1 => {
            ctx.store.apply(StateUpdate::new().close_dialogue());
            ctx.scheduler.schedule(
                Continuation::AutoResolve {
                    npc_id: npc_id.to_string(),
                    node: key.to_string(),
                },
                ctx.now_ms,
                content.tuning.auto_advance_ms,
            );
        }
        _ => {
            ctx.store.apply(StateUpdate::new().open_dialogue(ActiveDialogue {
                npc_id: npc_id.to_string(),
                node: key.to_string(),
                options: node.options.clone(),
            }));
            for (i, option) in node.options.iter().enumerate() {
                let locked = option
                    .requires_clue
                    .as_ref()
                    .is_some_and(|clue| !ctx.state().has_clue(clue));
                if locked {
                    ctx.store.append_log(format!("  {}. [Clue required]", i + 1), LogTag::System);
                } else {
                    ctx.store.append_log(format!("  {}. {}", i + 1, option.text), LogTag::Hero);
                }
            }
        }
    }
    Ok(())
}

/// Handle `reply <n>` against the open conversation. `n` is 1-based.
pub fn reply(ctx: &mut TurnContext<'_>, argument: &str) -> Result<(), EngineError> {
    let Some(npc_id) = ctx
        .state()
        .active_dialogue
        .as_ref()
        .map(|dialogue| dialogue.npc_id.clone())
    else {
        return invalid_reply(ctx, "no open conversation".to_string());
    };
    match argument.trim().parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
        Some(index) => resolve(ctx, &npc_id, index),
        None => invalid_reply(ctx, format!("'{}' is not an option number", argument.trim())),
    }
}

/// Pick option `index` (0-based) of the open conversation with `npc_id`.
pub fn resolve(ctx: &mut TurnContext<'_>, npc_id: &str, index: usize) -> Result<(), EngineError> {
    let option = match &ctx.state().active_dialogue {
        Some(dialogue) if dialogue.npc_id == npc_id => dialogue.options.get(index).cloned(),
        _ => None,
    };
    let Some(option) = option else {
        return invalid_reply(ctx, format!("no option {} for {}", index + 1, npc_id));
    };

    if let Some(clue) = &option.requires_clue {
        if !ctx.state().has_clue(clue) {
            ctx.store.append_log(
                "[SYSTEM]: You do not have the required clue.",
                LogTag::Negative,
            );
            return Err(EngineError::ClueRequired(clue.clone()));
        }
    }

    apply_option(ctx, npc_id, &option)
}

/// Resume deferred work. Does nothing if the game ended or the character
/// went offline in the meantime.
pub fn run_continuation(ctx: &mut TurnContext<'_>, task: Continuation) -> Result<(), EngineError> {
    match task {
        Continuation::AutoResolve { npc_id, node } => {
            if ctx.state().game_over {
                return Ok(());
            }
            let Some(npc) = ctx.state().npc(&npc_id).cloned() else {
                tracing::debug!("{} went offline before auto-resolve", npc_id);
                return Ok(());
            };
            let option = ctx
                .content
                .dialogue_node(&npc.dialogue, &node)
                .and_then(|node| node.options.first())
                .cloned();
            match option {
                Some(option) => apply_option(ctx, &npc_id, &option),
                None => Ok(()),
            }
        }
    }
}

fn apply_option(
    ctx: &mut TurnContext<'_>,
    npc_id: &str,
    option: &DialogueOption,
) -> Result<(), EngineError> {
    let content = ctx.content;
    let npc = online(ctx, npc_id)?;

    ctx.store.append_log(format!("> {}", option.text), LogTag::Hero);
    if option.hero_effect != 0.0 {
        faith::interact(content, ctx.store, npc_id, 0.0, option.hero_effect)?;
    } else {
        faith::interact(content, ctx.store, npc_id, option.npc_effect, 0.0)?;
    }
    if ctx.state().game_over {
        return Ok(());
    }

    if let Some(item_id) = &option.grants_item {
        if !ctx.state().holds(item_id) {
            ctx.store.apply(StateUpdate::new().item_count(item_id.clone(), 1));
            ctx.store.append_log(
                format!("[SYSTEM]: You received '{}'!", content.item_name(item_id)),
                LogTag::Positive,
            );
        }
    }

    if let Some(clue) = &option.grants_clue {
        if !ctx.state().has_clue(clue) {
            ctx.store.apply(StateUpdate::new().add_clue(clue.clone()));
            ctx.store.append_log(
                format!("[SYSTEM]: New clue acquired: '{}'", clue),
                LogTag::Positive,
            );
            phase::check_objective_completion(content, ctx.store);
        }
    }

    if npc_id == content.guide && ctx.state().phase_objective_complete {
        phase::activate_leader(content, ctx.store);
    }

    if npc.kind == NpcKind::Leader && option.grants_clue.is_some() {
        phase::advance_phase(content, ctx.store);
    }

    if option.victory {
        ctx.store.end_game(Ending::Victory);
        return Ok(());
    }

    let follow_up = option
        .next
        .as_deref()
        .and_then(|key| Some((key, content.dialogue_node(&npc.dialogue, key)?)));
    match follow_up {
        Some((key, node)) => {
            render_node(ctx, npc_id, key)?;
            if node.victory {
                ctx.store.end_game(Ending::Victory);
            }
        }
        None => {
            ctx.store.apply(StateUpdate::new().close_dialogue());
            if npc.kind != NpcKind::Leader && npc_id != content.guide {
                agents::tick(content, ctx.store, ctx.rng);
            }
        }
    }
    Ok(())
}

fn online(ctx: &TurnContext<'_>, npc_id: &str) -> Result<NpcState, EngineError> {
    ctx.state()
        .npc(npc_id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(npc_id.to_string()))
}

fn invalid_reply(ctx: &mut TurnContext<'_>, reason: String) -> Result<(), EngineError> {
    ctx.store.append_log("[SYSTEM]: Invalid reply.", LogTag::Negative);
    Err(EngineError::InvalidReply(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::Harness;
    use crate::schema::content::AgentConfig;
    use crate::schema::state::View;

    fn talk(h: &mut Harness, npc: &str) -> Result<(), EngineError> {
        begin(&mut h.ctx(), npc)
    }

    fn answer(h: &mut Harness, choice: &str) -> Result<(), EngineError> {
        reply(&mut h.ctx(), choice)
    }

    fn settle(h: &mut Harness) {
        while let Some(task) = h.scheduler.take_now() {
            run_continuation(&mut h.ctx(), task).unwrap();
        }
    }

    #[test]
    fn unknown_character_is_narrated() {
        let mut h = Harness::new();
        assert!(matches!(talk(&mut h, "nero"), Err(EngineError::NotFound(_))));
        assert!(h.logged("[SYSTEM]: Character not found."));
    }

    #[test]
    fn small_talk_converges_faith() {
        let mut h = Harness::new();
        talk(&mut h, "Maria").unwrap();
        assert!(h.logged("[MARIA]: Peace be with you."));
        assert!(h.logged("> Faith can move mountains."));
        assert!(h.logged("[MARIA]: Thank you, friend."));
        assert_eq!(h.state().active_characters["maria"].faith, 70.0);
        assert_eq!(h.state().hero_faith, 70.0);
        assert!(h.state().active_dialogue.is_none());
    }

    #[test]
    fn small_talk_stops_at_defeat() {
        let mut h = Harness::new();
        if let Some(Dialogue::SmallTalk { hero_lines, .. }) =
            h.content.npcs.get_mut("maria").map(|npc| &mut npc.dialogue)
        {
            for line in hero_lines.iter_mut() {
                line.effect = -100.0;
            }
        }
        h.store.apply(StateUpdate::new().hero_faith(2.0));

        talk(&mut h, "maria").unwrap();
        assert!(h.state().game_over);
        assert!(!h.logged("[MARIA]: Thank you, friend."));
        assert!(h.logged("You have lost your way."));
        assert_eq!(
            h.log_text().last().copied(),
            Some("Thank you for playing. Type 'new' to start again.")
        );
    }

    #[test]
    fn small_talk_runs_one_agent_tick() {
        let mut h = Harness::new();
        h.content.tuning.agents = Some(AgentConfig {
            enabled: true,
            attack_chance: 1.0,
            threat_line: "[{agent}]: Doubt.".to_string(),
        });
        talk(&mut h, "maria").unwrap();
        assert_eq!(h.state().active_characters["maria"].faith, 35.0);
        assert_eq!(h.log_text().iter().filter(|l| **l == "[JUDAS]: Doubt.").count(), 1);
    }

    #[test]
    fn guide_single_option_auto_resolves() {
        let mut h = Harness::new();
        talk(&mut h, "gabriel").unwrap();
        assert!(h.logged("[GABRIEL]: Go and speak with the villagers."));
        assert!(h.state().active_dialogue.is_none());
        assert!(h.scheduler.is_pending());
        assert_eq!(h.scheduler.due_at(), Some(750));

        settle(&mut h);
        assert!(h.logged("> I will go."));
    }

    #[test]
    fn guide_opens_conversation_once_objective_met() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        talk(&mut h, "gabriel").unwrap();

        let dialogue = h.state().active_dialogue.clone().unwrap();
        assert_eq!(dialogue.node, "phase_1_end");
        assert_eq!(dialogue.options.len(), 2);
        assert!(h.logged("  1. Thank you, I feel stronger."));

        answer(&mut h, "1").unwrap();
        assert_eq!(h.state().hero_faith, 75.0);
        assert!(h.state().active_characters.contains_key("pedro"));
        assert!(h.state().active_dialogue.is_none());
    }

    #[test]
    fn invalid_replies_keep_the_conversation_open() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        talk(&mut h, "gabriel").unwrap();

        for bad in ["0", "3", "two", ""] {
            assert!(matches!(answer(&mut h, bad), Err(EngineError::InvalidReply(_))));
        }
        assert!(h.state().active_dialogue.is_some());
        assert!(h.logged("[SYSTEM]: Invalid reply."));
        assert!(matches!(
            resolve(&mut h.ctx(), "maria", 0),
            Err(EngineError::InvalidReply(_))
        ));
    }

    #[test]
    fn reply_without_conversation_is_invalid() {
        let mut h = Harness::new();
        assert!(matches!(answer(&mut h, "1"), Err(EngineError::InvalidReply(_))));
    }

    #[test]
    fn gated_option_requires_its_clue() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        phase::activate_leader(&h.content, &mut h.store);
        talk(&mut h, "pedro").unwrap();
        assert!(h.logged("  2. [Clue required]"));

        assert!(matches!(
            answer(&mut h, "2"),
            Err(EngineError::ClueRequired(clue)) if clue == "gate_code"
        ));
        assert!(h.logged("[SYSTEM]: You do not have the required clue."));
        assert!(h.state().active_dialogue.is_some());

        h.store.apply(StateUpdate::new().add_clue("gate_code"));
        answer(&mut h, "2").unwrap();
        assert!(h.state().holds("rosary"));
        assert!(h.logged("[SYSTEM]: You received 'Rosary'!"));
    }

    #[test]
    fn leader_clue_advances_the_phase() {
        let mut h = Harness::new();
        h.store.apply(StateUpdate::new().phase_objective_complete(true));
        phase::activate_leader(&h.content, &mut h.store);
        talk(&mut h, "pedro").unwrap();
        answer(&mut h, "1").unwrap();

        assert!(h.state().has_clue("key_of_peter"));
        assert!(h.logged("[SYSTEM]: New clue acquired: 'key_of_peter'"));
        assert_eq!(h.state().current_phase, 2);
        assert!(!h.state().phase_objective_complete);
        assert!(h.state().active_characters.contains_key("joao"));
        assert!(h.state().active_dialogue.is_none());
    }

    #[test]
    fn sage_refuses_until_network_is_harmonious() {
        let mut h = Harness::new();
        let bento = h.state().character_pool["bento"].clone();
        h.store.apply(StateUpdate::new().activate("bento", bento));
        talk(&mut h, "bento").unwrap();
        assert!(h.logged("[SYSTEM]: BENTO is deep in meditation and does not answer..."));
        assert!(!h.state().final_phase_started);
    }

    #[test]
    fn sage_follow_up_node_wins_the_game() {
        let mut h = Harness::new();
        let bento = h.state().character_pool["bento"].clone();
        let mut update = StateUpdate::new().hero_faith(100.0).activate("bento", bento);
        for id in h.state().active_characters.keys() {
            update = update.npc_faith(id.clone(), 100.0);
        }
        h.store.apply(update);

        talk(&mut h, "bento").unwrap();
        assert!(h.state().final_phase_started);
        settle(&mut h);

        assert!(h.logged("[BENTO]: Then the circle is whole."));
        assert!(h.state().game_over);
        assert!(h.logged("The light returns."));
    }

    #[test]
    fn victory_option_ends_the_game_without_a_follow_up() {
        let mut h = Harness::new();
        let sage = h.content.npcs.get_mut("bento").map(|npc| &mut npc.dialogue);
        if let Some(Dialogue::Tree(nodes)) = sage {
            let option = &mut nodes.get_mut("initial").unwrap().options[0];
            option.next = None;
            option.victory = true;
        }
        let bento = h.state().character_pool["bento"].clone();
        let mut update = StateUpdate::new().hero_faith(100.0).activate("bento", bento);
        for id in h.state().active_characters.keys() {
            update = update.npc_faith(id.clone(), 100.0);
        }
        h.store.apply(update);

        talk(&mut h, "bento").unwrap();
        settle(&mut h);

        assert!(h.state().game_over);
        assert_eq!(h.state().current_view, View::Ending);
        assert!(h.logged("> We are ready."));
        assert!(h.logged("The light returns."));
        assert!(!h.logged("[BENTO]: Then the circle is whole."));
        assert!(h.saves.autosave().is_none());
    }

    #[test]
    fn continuation_is_dropped_when_character_goes_offline() {
        let mut h = Harness::new();
        talk(&mut h, "gabriel").unwrap();
        let mut roster = h.state().active_characters.clone();
        roster.remove("gabriel");
        h.store.apply(StateUpdate::new().active_characters(roster));

        let lines = h.store.log().len();
        settle(&mut h);
        assert_eq!(h.store.log().len(), lines);
    }

    #[test]
    fn missing_node_has_nothing_more_to_say() {
        let mut h = Harness::new();
        render_node(&mut h.ctx(), "gabriel", "phase_9_start").unwrap();
        assert!(h.logged("[SYSTEM]: GABRIEL has nothing more to say."));
    }
}
