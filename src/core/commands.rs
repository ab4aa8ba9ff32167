/// Command parsing and the read-only listings.

use crate::core::store::StateStore;
use crate::schema::content::ContentBundle;
use crate::schema::log::LogTag;
use crate::schema::npc::display_name;

/// One line of player input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewGame,
    Talk(String),
    Use(String),
    Reply(String),
    Online,
    Clues,
    Inventory,
    Save,
    /// Request to load a save; carries an optional path for hosts with files.
    Load(String),
    Continue,
    Settings,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    pub fn parse(input: &str) -> Command {
        let input = input.trim();
        let (verb, argument) = match input.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (input, ""),
        };

        match verb.to_lowercase().as_str() {
            "new" => Command::NewGame,
            "talk" | "speak" => Command::Talk(argument.to_lowercase()),
            "use" => Command::Use(argument.to_string()),
            "reply" => Command::Reply(argument.to_string()),
            "online" => Command::Online,
            "clues" => Command::Clues,
            "inventory" | "inv" => Command::Inventory,
            "save" => Command::Save,
            "load" => Command::Load(argument.to_string()),
            "continue" => Command::Continue,
            "settings" | "config" => Command::Settings,
            "quit" | "exit" => Command::Quit,
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Whether the agents get their turn after this command. Conversations
    /// run their own agent turn, and menu commands never give one.
    pub fn consumes_turn(&self) -> bool {
        matches!(
            self,
            Command::Use(_)
                | Command::Online
                | Command::Clues
                | Command::Inventory
                | Command::Help
                | Command::Unknown(_)
        )
    }
}

pub fn list_online(store: &mut StateStore) {
    let lines: Vec<(String, LogTag)> = store
        .state()
        .active_characters
        .iter()
        .map(|(id, npc)| {
            (
                format!("- {} (Faith: {:.0}%)", display_name(id), npc.faith),
                LogTag::for_npc(npc),
            )
        })
        .collect();

    store.append_log("Characters online:", LogTag::System);
    for (text, tag) in lines {
        store.append_log(text, tag);
    }
}

pub fn list_clues(store: &mut StateStore) {
    let clues = store.state().clues.clone();
    store.append_log("Clues collected:", LogTag::System);
    if clues.is_empty() {
        store.append_log("None.", LogTag::System);
    }
    for clue in clues {
        store.append_log(format!("- {}", clue), LogTag::Positive);
    }
}

pub fn list_inventory(content: &ContentBundle, store: &mut StateStore) {
    let lines: Vec<String> = store
        .state()
        .inventory
        .iter()
        .filter_map(|(id, count)| {
            let item = content.item(id)?;
            Some(match count {
                1 => format!("- {}: {}", item.name, item.description),
                n => format!("- {} (x{}): {}", item.name, n, item.description),
            })
        })
        .collect();

    store.append_log("Inventory:", LogTag::System);
    if lines.is_empty() {
        store.append_log("Empty.", LogTag::System);
    }
    for line in lines {
        store.append_log(line, LogTag::Positive);
    }
}

pub fn help(store: &mut StateStore) {
    store.append_log(
        "Commands: talk, reply, use, online, clues, inventory, save, load, continue, settings, new, quit",
        LogTag::Positive,
    );
}
