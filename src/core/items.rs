/// Item use: prayer, scripture (with its two-step target prompt) and the
/// crucifix and rosary toggles.

use crate::core::context::TurnContext;
use crate::core::engine::EngineError;
use crate::core::phase;
use crate::schema::content::{Item, ItemEffect};
use crate::schema::log::LogTag;
use crate::schema::npc::display_name;
use crate::schema::state::{PendingAction, PendingStage, StateUpdate, MAX_FAITH};

/// Use the item named by `query`. A trailing word that is not part of the
/// item name is taken as its target: `use scripture maria`.
pub fn use_item(ctx: &mut TurnContext<'_>, query: &str) -> Result<(), EngineError> {
    let content = ctx.content;
    let query = query.trim();
    if query.is_empty() {
        ctx.store.append_log(
            "Name an item to use. Example: use prayer",
            LogTag::Negative,
        );
        return Err(EngineError::NotFound(String::new()));
    }

    let (found, target) = match content.find_item(query) {
        Some(found) => (Some(found), None),
        None => match query.rsplit_once(char::is_whitespace) {
            Some((item, target)) => (content.find_item(item), Some(target)),
            None => (None, None),
        },
    };
    let Some((item_id, item)) = found.filter(|(id, _)| ctx.state().holds(id)) else {
        ctx.store.append_log(
            format!("You do not have the item '{}'.", query),
            LogTag::Negative,
        );
        return Err(EngineError::NotFound(query.to_string()));
    };
    tracing::debug!("using {}", item_id);

    match &item.effect {
        ItemEffect::Prayer { bonus } => {
            pray(ctx, *bonus);
            Ok(())
        }
        ItemEffect::Scripture => match target {
            Some(target) => read_scripture(ctx, item_id, target),
            None => {
                ctx.store.apply(StateUpdate::new().pending_action(Some(PendingAction {
                    item_id: item_id.to_string(),
                    stage: PendingStage::AwaitingTarget,
                })));
                ctx.store.append_log(
                    format!("On whom do you wish to use the {}? (type the name)", item.name),
                    LogTag::System,
                );
                Ok(())
            }
        },
        ItemEffect::Crucifix => {
            let active = !ctx.state().crucifix_active;
            ctx.store.apply(StateUpdate::new().crucifix_active(active));
            let message = if active {
                format!("You now hold the {}. Its presence unsettles the shadows.", item.name)
            } else {
                format!("You put away the {}.", item.name)
            };
            ctx.store.append_log(format!("[ITEM]: {}", message), LogTag::Positive);
            Ok(())
        }
        ItemEffect::Rosary => {
            let active = !ctx.state().rosary_active;
            ctx.store.apply(StateUpdate::new().rosary_active(active));
            let message = if active {
                format!(
                    "You hold the {}. An aura of divine protection surrounds you and turns away every attack of the Agents.",
                    item.name
                )
            } else {
                format!("You put away the {}.", item.name)
            };
            ctx.store.append_log(format!("[ITEM]: {}", message), LogTag::Positive);
            Ok(())
        }
        ItemEffect::Passive => {
            describe(ctx, item);
            Ok(())
        }
    }
}

/// Complete a pending two-step action with the player's `input`.
pub fn resolve_pending(ctx: &mut TurnContext<'_>, input: &str) -> Result<(), EngineError> {
    let Some(pending) = ctx.state().pending_action.clone() else {
        return Ok(());
    };
    match ctx.content.item(&pending.item_id).map(|item| &item.effect) {
        Some(ItemEffect::Scripture) => read_scripture(ctx, &pending.item_id, input),
        _ => {
            tracing::warn!("dropping pending action for item '{}'", pending.item_id);
            ctx.store.apply(StateUpdate::new().pending_action(None));
            Ok(())
        }
    }
}

/// Restore a neutral character's faith to full, consuming one scripture.
/// Any other target cancels the action.
pub fn read_scripture(
    ctx: &mut TurnContext<'_>,
    item_id: &str,
    target: &str,
) -> Result<(), EngineError> {
    let content = ctx.content;
    let item_name = content.item_name(item_id);
    let id = target.trim().to_lowercase();

    let convertible = ctx.state().npc(&id).is_some_and(|npc| npc.is_convertible());
    if !convertible {
        ctx.store.append_log(
            format!(
                "Invalid target. The {} can only be used on neutral characters. The action was cancelled.",
                item_name
            ),
            LogTag::Negative,
        );
        ctx.store.apply(StateUpdate::new().pending_action(None));
        return Err(EngineError::NotFound(id));
    }

    let remaining = ctx.state().item_count(item_id).saturating_sub(1);
    ctx.store.apply(
        StateUpdate::new()
            .npc_faith(id.clone(), MAX_FAITH)
            .pending_action(None)
            .item_count(item_id, remaining),
    );
    ctx.store.append_log(
        format!(
            "You read the {} to {}. Their faith is restored to 100%!",
            item_name,
            display_name(&id)
        ),
        LogTag::Positive,
    );
    phase::check_objective_completion(content, ctx.store);
    Ok(())
}

fn pray(ctx: &mut TurnContext<'_>, bonus: f64) {
    if ctx.state().prayer_used_this_phase {
        ctx.store.append_log(
            "Your Prayer has already been used in this phase. It will be renewed in the next.",
            LogTag::Negative,
        );
        return;
    }
    let faith = (ctx.state().hero_faith + bonus).min(MAX_FAITH);
    ctx.store.apply(StateUpdate::new().hero_faith(faith).prayer_used(true));
    ctx.store.append_log(
        format!("You offer the Prayer and feel your faith rise to {:.0}%.", faith),
        LogTag::Positive,
    );
}

fn describe(ctx: &mut TurnContext<'_>, item: &Item) {
    ctx.store.append_log(
        format!("{}: {}", item.name, item.description),
        LogTag::System,
    );
}
