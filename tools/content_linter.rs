/// Content Linter: checks a content bundle for broken references and dead ends.
///
/// Usage: content_linter <content.ron>

use redemption_engine::schema::content::{ContentBundle, Dialogue};
use redemption_engine::schema::npc::NpcKind;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: content_linter <content.ron>");
        process::exit(0);
    }

    let path = Path::new(&args[1]);
    let content = match ContentBundle::load_from_ron(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("ERROR: Failed to load content bundle: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded {} phases, {} characters, {} items",
        content.last_phase(),
        content.npcs.len(),
        content.items.len()
    );

    let (errors, warnings) = lint_content(&content);

    println!("\n=== Content Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_content(content: &ContentBundle) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut granted_clues: FxHashSet<&str> = FxHashSet::default();
    let mut required_clues: Vec<(String, &str)> = Vec::new();

    let mut npc_ids: Vec<&String> = content.npcs.keys().collect();
    npc_ids.sort();

    // Dialogue references
    for id in npc_ids {
        let npc = &content.npcs[id];
        match &npc.dialogue {
            Dialogue::Tree(nodes) => {
                if npc.kind == NpcKind::Neutral {
                    warnings.push(format!(
                        "'{}' is neutral but has a dialogue tree; faith only moves through small talk",
                        id
                    ));
                }
                let mut keys: Vec<&String> = nodes.keys().collect();
                keys.sort();
                for key in keys {
                    let node = &nodes[key];
                    if node.text.is_empty() {
                        warnings.push(format!("{}/{} has no text", id, key));
                    }
                    for (i, option) in node.options.iter().enumerate() {
                        let location = format!("{}/{} option {}", id, key, i + 1);
                        if let Some(next) = &option.next {
                            if !nodes.contains_key(next) {
                                errors.push(format!(
                                    "{} leads to missing node '{}'",
                                    location, next
                                ));
                            }
                        }
                        if let Some(item) = &option.grants_item {
                            if content.item(item).is_none() {
                                errors.push(format!(
                                    "{} grants unknown item '{}'",
                                    location, item
                                ));
                            }
                        }
                        if let Some(clue) = &option.grants_clue {
                            granted_clues.insert(clue.as_str());
                        }
                        if let Some(clue) = &option.requires_clue {
                            required_clues.push((location, clue.as_str()));
                        }
                    }
                }
            }
            Dialogue::SmallTalk {
                openings,
                hero_lines,
                farewells,
            } => {
                if npc.kind != NpcKind::Neutral {
                    warnings.push(format!(
                        "'{}' uses small talk but is not neutral; it will have nothing to say",
                        id
                    ));
                }
                if hero_lines.is_empty() {
                    errors.push(format!("'{}' has no hero lines; talking changes nothing", id));
                }
                if openings.is_empty() || farewells.is_empty() {
                    warnings.push(format!("'{}' is missing openings or farewells", id));
                }
            }
        }
    }

    for (location, clue) in &required_clues {
        if !granted_clues.contains(clue) {
            errors.push(format!(
                "{} requires clue '{}', which no option grants",
                location, clue
            ));
        }
    }

    // Phases
    let last = content.last_phase();
    let final_phase = content.tuning.final_phase;
    if last < final_phase {
        errors.push(format!(
            "final phase is {} but only {} phases are defined",
            final_phase, last
        ));
    }

    let guide_nodes = match content.npc(&content.guide).map(|npc| &npc.dialogue) {
        Some(Dialogue::Tree(nodes)) => Some(nodes),
        _ => {
            errors.push(format!("guide '{}' has no dialogue tree", content.guide));
            None
        }
    };

    for number in 1..=last {
        let Some(phase) = content.phase(number) else {
            warnings.push(format!("phase_{} is missing; the run stops there", number));
            continue;
        };

        let mut expected = Vec::new();
        if content.is_final_phase(number) {
            if content.npcs.values().all(|npc| npc.kind != NpcKind::Sage) {
                errors.push(format!("phase_{} is final but no sage exists", number));
            }
            expected.push("final_waiting".to_string());
            expected.push("final_ready".to_string());
        } else {
            match &phase.leader {
                None => errors.push(format!(
                    "phase_{} has no leader; the run cannot advance",
                    number
                )),
                Some(leader) => {
                    let grants = match content.npc(leader).map(|npc| &npc.dialogue) {
                        Some(Dialogue::Tree(nodes)) => nodes
                            .values()
                            .flat_map(|node| &node.options)
                            .any(|option| option.grants_clue.is_some()),
                        _ => false,
                    };
                    if !grants {
                        errors.push(format!(
                            "leader '{}' of phase_{} never grants a clue",
                            leader, number
                        ));
                    }
                }
            }
            if phase.required_conversions == 0 {
                warnings.push(format!("phase_{} requires no conversions", number));
            }
            expected.push(format!("phase_{}_start", number));
            expected.push(format!("phase_{}_end", number));
        }

        if let Some(nodes) = guide_nodes {
            for key in expected {
                if !nodes.contains_key(&key) {
                    errors.push(format!("guide '{}' is missing node '{}'", content.guide, key));
                }
            }
        }

        let refs = &phase.objectives;
        for index in [
            refs.pre_conversion,
            refs.post_conversion,
            refs.final_waiting,
            refs.final_ready,
        ]
        .into_iter()
        .flatten()
        {
            if index >= content.objectives.len() {
                errors.push(format!(
                    "phase_{} points at objective {} but only {} exist",
                    number,
                    index,
                    content.objectives.len()
                ));
            }
        }
    }

    (errors, warnings)
}
