/// The game engine: owns content, state, randomness and the scheduler, and
/// turns one line of player input into state changes and narration.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::agents;
use crate::core::commands::{self, Command};
use crate::core::context::TurnContext;
use crate::core::dialogue;
use crate::core::items;
use crate::core::persistence::{self, MemorySaveStore, PersistenceError, SaveSnapshot, SaveStore};
use crate::core::phase;
use crate::core::scheduler::{Continuation, Scheduler};
use crate::core::store::StateStore;
use crate::core::template;
use crate::schema::content::{ContentBundle, ContentError};
use crate::schema::log::{LogLine, LogTag};
use crate::schema::npc::display_name;
use crate::schema::state::{GameState, StateUpdate, View, PENDING_NAME};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid reply: {0}")]
    InvalidReply(String),
    #[error("clue required: {0}")]
    ClueRequired(String),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    #[error("no content bundle was configured")]
    MissingContent,
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

const CONTINUE_HINT: &str = "Use 'reply [number]' to continue the conversation.";
const CORRUPT_SAVE: &str =
    "Error: the save file seems to be corrupted or has an invalid format.";

/// The top-level engine. Built via `GameEngine::builder()`.
pub struct GameEngine {
    content: ContentBundle,
    store: StateStore,
    rng: StdRng,
    scheduler: Scheduler,
    clock_ms: u64,
    load_request: Option<String>,
}

/// Builder for constructing a `GameEngine`.
pub struct GameEngineBuilder {
    seed: u64,
    content_path: Option<PathBuf>,
    /// Directly provided content (for hosts that embed their bundle).
    content: Option<ContentBundle>,
    saves: Option<Box<dyn SaveStore>>,
}

impl GameEngine {
    pub fn builder() -> GameEngineBuilder {
        GameEngineBuilder {
            seed: 0,
            content_path: None,
            content: None,
            saves: None,
        }
    }

    fn turn(&mut self) -> TurnContext<'_> {
        TurnContext {
            content: &self.content,
            store: &mut self.store,
            rng: &mut self.rng,
            scheduler: &mut self.scheduler,
            now_ms: self.clock_ms,
        }
    }

    /// Process one line of player input.
    ///
    /// Gameplay errors are narrated where they happen and also returned;
    /// the engine stays ready for the next line either way.
    pub fn submit(&mut self, input: &str) -> Result<(), EngineError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }
        self.flush()?;

        let state = self.store.state();
        let (game_over, awaiting_name, pending) = (
            state.game_over,
            state.is_awaiting_name(),
            state.pending_action.is_some(),
        );
        if game_over {
            return match Command::parse(input) {
                command @ (Command::NewGame | Command::Quit) => {
                    self.echo(input);
                    self.dispatch(command)
                }
                _ => {
                    tracing::debug!("game over, ignoring '{}'", input);
                    Ok(())
                }
            };
        }
        if awaiting_name {
            self.set_player_name(input);
            return Ok(());
        }
        if pending {
            return items::resolve_pending(&mut self.turn(), input);
        }

        self.echo(input);
        let command = Command::parse(input);
        if self.store.state().active_dialogue.is_some() && !matches!(command, Command::Reply(_)) {
            self.store.append_log(CONTINUE_HINT, LogTag::System);
            return Ok(());
        }

        let consumes_turn = command.consumes_turn();
        let result = self.dispatch(command);
        if consumes_turn && self.store.state().active_dialogue.is_none() {
            agents::tick(&self.content, &mut self.store, &mut self.rng);
        }
        result
    }

    fn echo(&mut self, input: &str) {
        self.store.append_log(format!("> {}", input), LogTag::Hero);
    }

    fn dispatch(&mut self, command: Command) -> Result<(), EngineError> {
        tracing::debug!("dispatching {:?}", command);
        match command {
            Command::NewGame => {
                self.start_new_game();
                Ok(())
            }
            Command::Talk(npc) => dialogue::begin(&mut self.turn(), &npc),
            Command::Use(query) => items::use_item(&mut self.turn(), &query),
            Command::Reply(argument) => dialogue::reply(&mut self.turn(), &argument),
            Command::Online => {
                commands::list_online(&mut self.store);
                Ok(())
            }
            Command::Clues => {
                commands::list_clues(&mut self.store);
                Ok(())
            }
            Command::Inventory => {
                commands::list_inventory(&self.content, &mut self.store);
                Ok(())
            }
            Command::Save => self.export_save().map(|_| ()),
            Command::Load(path) => {
                self.request_load(path);
                Ok(())
            }
            Command::Continue => self.continue_from_autosave(),
            Command::Settings => {
                self.open_settings();
                Ok(())
            }
            Command::Quit => {
                self.quit_to_menu();
                Ok(())
            }
            Command::Help => {
                commands::help(&mut self.store);
                Ok(())
            }
            Command::Unknown(verb) => {
                self.store.append_log(format!("Unrecognized command: {}", verb), LogTag::Negative);
                Ok(())
            }
        }
    }

    // --- view flow ---

    /// Leave the loading screen for the title screen.
    pub fn boot(&mut self) {
        self.store.apply(StateUpdate::new().view(View::Title));
        self.store.clear_log();
        let title = self.title().to_string();
        self.store.append_log(title, LogTag::Positive);
        self.store.append_log("Press Enter to continue.", LogTag::System);
    }

    pub fn advance_from_title(&mut self) {
        self.store.apply(StateUpdate::new().view(View::Menu));
        self.show_menu();
    }

    /// Reset to a fresh run and show the opening sequence.
    pub fn start_opening(&mut self) {
        self.scheduler.cancel_all();
        let mut state = self.fresh_state();
        state.current_view = View::Opening;
        self.store.replace(state);
    }

    /// End the opening and ask for the player's name.
    pub fn begin_gameplay(&mut self) {
        self.store.apply(
            StateUpdate::new()
                .view(View::Gameplay)
                .player_name(PENDING_NAME),
        );
        self.store.clear_log();
        self.store.append_log("Starting new game...", LogTag::System);
    }

    /// Throw away the current run and start over at the name prompt.
    pub fn start_new_game(&mut self) {
        tracing::info!("starting new game");
        self.scheduler.cancel_all();
        let mut state = self.fresh_state();
        state.current_view = View::Gameplay;
        state.player_name = PENDING_NAME.to_string();
        self.store.replace(state);
        self.store.clear_log();
        self.store.append_log("Starting new game...", LogTag::System);
    }

    /// Name the player and bring the first phase online.
    pub fn set_player_name(&mut self, name: &str) {
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            return;
        }
        tracing::info!("player named {}", name);

        self.store.append_log(format!("> {}", name), LogTag::Hero);
        self.store.apply(
            StateUpdate::new()
                .player_name(name.clone())
                .character_pool(self.content.fresh_pool()),
        );
        phase::activate_by_phase(&self.content, &mut self.store);

        for line in &self.content.orientation {
            self.store.append_log(line.clone(), LogTag::System);
        }
        let greeting = template::render(&self.content.greeting, &[("player", &name)]);
        if !greeting.is_empty() {
            let guide = &self.content.guide;
            let tag = self
                .store
                .state()
                .character_pool
                .get(guide)
                .map(LogTag::for_npc)
                .unwrap_or(LogTag::Guide);
            self.store.append_log(format!("[{}]: {}", display_name(guide), greeting), tag);
        }
    }

    pub fn open_settings(&mut self) {
        let current = self.store.state().current_view;
        if current == View::Settings {
            return;
        }
        self.store.apply(
            StateUpdate::new()
                .view(View::Settings)
                .previous_view(Some(current)),
        );
    }

    /// Return to whichever view settings were opened from.
    pub fn close_settings(&mut self) {
        let target = self.store.state().previous_view.unwrap_or(View::Menu);
        self.store.apply(StateUpdate::new().view(target).previous_view(None));
        if target == View::Menu {
            self.show_menu();
        }
    }

    /// Abandon the run and go back to the main menu.
    pub fn quit_to_menu(&mut self) {
        self.scheduler.cancel_all();
        let mut state = self.fresh_state();
        state.current_view = View::Menu;
        self.store.replace(state);
        self.show_menu();
    }

    fn fresh_state(&self) -> GameState {
        GameState::new(self.content.tuning.starting_faith)
    }

    fn title(&self) -> &str {
        if self.content.title.is_empty() {
            "Redemption Terminal"
        } else {
            &self.content.title
        }
    }

    fn show_menu(&mut self) {
        let border = format!("+{}+", "-".repeat(48));
        let title = format!("|{:^48}|", self.title());
        let entries = format!("|{:^48}|", "[new] [continue] [load] [settings] [quit]");
        let version = format!("Version {}", env!("CARGO_PKG_VERSION"));

        self.store.clear_log();
        self.store.append_log_block([
            LogLine::new(border.clone(), LogTag::System),
            LogLine::new(title, LogTag::Positive),
            LogLine::new(entries, LogTag::System),
            LogLine::new(border, LogTag::System),
            LogLine::new(version, LogTag::System),
            LogLine::new("Type a command to continue.", LogTag::System),
        ]);
    }

    // --- persistence ---

    /// Export the current run. The snapshot is written through the save
    /// store and also returned so hosts can offer it as a download.
    pub fn export_save(&mut self) -> Result<String, EngineError> {
        let snapshot = SaveSnapshot::capture(
            self.store.state(),
            self.store.log(),
            self.content.tuning.recent_log_len,
        );
        let json = snapshot.to_json()?;
        match self.store.saves_mut().write_export(&json) {
            Ok(location) => self.store.append_log(
                format!("Save file written to {}.", location),
                LogTag::Positive,
            ),
            Err(e) => {
                tracing::warn!("failed to write save file: {}", e);
                self.store.append_log("Could not write the save file.", LogTag::Negative);
            }
        }
        Ok(json)
    }

    /// Note that the player asked to load a file. The host picks it up with
    /// `take_load_request` and calls `import_save` with its contents.
    pub fn request_load(&mut self, path: String) {
        self.load_request = Some(path);
        self.store.append_log("Choose a save file to load.", LogTag::System);
    }

    pub fn take_load_request(&mut self) -> Option<String> {
        self.load_request.take()
    }

    /// Replace the current run with an exported snapshot.
    pub fn import_save(&mut self, json: &str) -> Result<(), EngineError> {
        self.restore_snapshot(json, "Game loaded successfully from file!")
    }

    pub fn continue_from_autosave(&mut self) -> Result<(), EngineError> {
        let saved = match self.store.saves().read_autosave() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("failed to read autosave: {}", e);
                None
            }
        };
        match saved {
            Some(json) => self.restore_snapshot(&json, "Game continued from the last autosave."),
            None => {
                self.store.append_log(
                    "No saved game found to continue. Start a 'new' game.",
                    LogTag::Negative,
                );
                Err(EngineError::NotFound("autosave".to_string()))
            }
        }
    }

    fn restore_snapshot(&mut self, json: &str, success: &str) -> Result<(), EngineError> {
        let snapshot = match SaveSnapshot::from_json(json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("rejected save: {}", e);
                self.store.append_log(CORRUPT_SAVE, LogTag::Negative);
                return Err(EngineError::CorruptSnapshot(e.to_string()));
            }
        };

        let (state, recent) = persistence::restore(&self.content, snapshot);
        tracing::info!("restored save at phase {}", state.current_phase);
        self.scheduler.cancel_all();
        self.store.replace(state);
        self.store.clear_log();
        self.store.append_log_block(recent);
        self.store.append_log(success, LogTag::Positive);
        Ok(())
    }

    // --- time ---

    /// Advance the host clock and run the pending continuation if it is due.
    /// Returns whether anything ran.
    pub fn poll(&mut self, now_ms: u64) -> Result<bool, EngineError> {
        self.clock_ms = self.clock_ms.max(now_ms);
        match self.scheduler.take_due(self.clock_ms) {
            Some(task) => self.run(task).map(|()| true),
            None => Ok(false),
        }
    }

    /// Run the pending continuation now, whatever its due time.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        match self.scheduler.take_now() {
            Some(task) => self.run(task),
            None => Ok(()),
        }
    }

    fn run(&mut self, task: Continuation) -> Result<(), EngineError> {
        dialogue::run_continuation(&mut self.turn(), task)
    }

    pub fn has_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.scheduler.due_at()
    }

    // --- presentation ---

    pub fn objective(&self) -> String {
        phase::current_objective(&self.content, self.store.state())
    }

    pub fn prompt(&self) -> &'static str {
        let state = self.store.state();
        if state.pending_action.is_some() {
            "Target:"
        } else if state.is_awaiting_name() {
            "Name:"
        } else {
            ">"
        }
    }

    pub fn player_display_name(&self) -> String {
        let state = self.store.state();
        if state.crucifix_active {
            format!("[+] {}", state.player_name)
        } else {
            state.player_name.clone()
        }
    }

    pub fn average_faith(&self) -> f64 {
        phase::average_faith(self.store.state())
    }

    pub fn state(&self) -> &GameState {
        self.store.state()
    }

    pub fn log(&self) -> &[LogLine] {
        self.store.log()
    }

    pub fn log_epoch(&self) -> u64 {
        self.store.log_epoch()
    }

    pub fn content(&self) -> &ContentBundle {
        &self.content
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&GameState) + 'static) {
        self.store.subscribe(callback);
    }
}

impl GameEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn content_path(mut self, path: impl AsRef<Path>) -> Self {
        self.content_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Provide the content bundle directly.
    pub fn with_content(mut self, content: ContentBundle) -> Self {
        self.content = Some(content);
        self
    }

    /// Where saves go. Defaults to an in-memory store.
    pub fn save_store(mut self, saves: impl SaveStore + 'static) -> Self {
        self.saves = Some(Box::new(saves));
        self
    }

    pub fn build(self) -> Result<GameEngine, EngineError> {
        let content = match (self.content, self.content_path) {
            (Some(content), _) => {
                content.validate()?;
                content
            }
            (None, Some(path)) => ContentBundle::load_from_ron(&path)?,
            (None, None) => return Err(EngineError::MissingContent),
        };
        let saves = self
            .saves
            .unwrap_or_else(|| Box::new(MemorySaveStore::new()));

        let state = GameState::new(content.tuning.starting_faith);
        let store = StateStore::new(state, content.endings.clone(), saves);
        tracing::debug!("engine built with seed {}", self.seed);

        Ok(GameEngine {
            content,
            store,
            rng: StdRng::seed_from_u64(self.seed),
            scheduler: Scheduler::new(),
            clock_ms: 0,
            load_request: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;

    fn named_engine() -> GameEngine {
        let mut engine = GameEngine::builder()
            .seed(7)
            .with_content(fixtures::content())
            .build()
            .unwrap();
        engine.start_new_game();
        engine.submit("ana").unwrap();
        engine
    }

    fn logged(engine: &GameEngine, needle: &str) -> bool {
        engine.log().iter().any(|line| line.text == needle)
    }

    #[test]
    fn build_requires_content() {
        assert!(matches!(
            GameEngine::builder().build(),
            Err(EngineError::MissingContent)
        ));
        assert!(matches!(
            GameEngine::builder().content_path("does/not/exist.ron").build(),
            Err(EngineError::Content(ContentError::Io(_)))
        ));
    }

    #[test]
    fn naming_the_player_starts_phase_one() {
        let engine = named_engine();
        let state = engine.state();
        assert_eq!(state.player_name, "ANA");
        assert_eq!(state.current_view, View::Gameplay);
        assert!(state.active_characters.contains_key("maria"));
        assert!(logged(&engine, "> ANA"));
        assert!(logged(&engine, "MARIA appeared online."));
        assert!(logged(&engine, "[GABRIEL]: Welcome, ANA."));
        assert_eq!(engine.prompt(), ">");
    }

    #[test]
    fn prompt_tracks_input_mode() {
        let mut engine = GameEngine::builder()
            .with_content(fixtures::content())
            .build()
            .unwrap();
        engine.start_new_game();
        assert_eq!(engine.prompt(), "Name:");
        engine.submit("ana").unwrap();

        engine.store.apply(StateUpdate::new().item_count("scripture", 1));
        engine.submit("use scripture").unwrap();
        assert_eq!(engine.prompt(), "Target:");
        engine.submit("maria").unwrap();
        assert_eq!(engine.prompt(), ">");
        assert_eq!(engine.state().active_characters["maria"].faith, 100.0);
    }

    #[test]
    fn open_conversation_only_accepts_replies() {
        let mut engine = named_engine();
        engine.store.apply(StateUpdate::new().phase_objective_complete(true));
        engine.submit("talk gabriel").unwrap();
        assert!(engine.state().active_dialogue.is_some());

        engine.submit("online").unwrap();
        assert!(logged(&engine, CONTINUE_HINT));
        assert!(!logged(&engine, "Characters online:"));

        engine.submit("reply 2").unwrap();
        assert!(engine.state().active_dialogue.is_none());
    }

    #[test]
    fn new_command_flushes_pending_continuation() {
        let mut engine = named_engine();
        engine.submit("talk gabriel").unwrap();
        assert!(engine.has_pending());
        engine.submit("clues").unwrap();
        assert!(!engine.has_pending());
        let texts: Vec<&str> = engine.log().iter().map(|l| l.text.as_str()).collect();
        let resolved = texts.iter().position(|t| *t == "> I will go.").unwrap();
        let echoed = texts.iter().position(|t| *t == "> clues").unwrap();
        assert!(resolved < echoed);
    }

    #[test]
    fn poll_runs_continuation_when_due() {
        let mut engine = named_engine();
        engine.submit("talk gabriel").unwrap();
        assert_eq!(engine.next_due(), Some(750));
        assert!(!engine.poll(749).unwrap());
        assert!(engine.poll(750).unwrap());
        assert!(logged(&engine, "> I will go."));
    }

    #[test]
    fn after_game_over_only_new_and_quit_work() {
        let mut engine = named_engine();
        engine.store.apply(StateUpdate::new().hero_faith(0.0));
        assert!(engine.state().game_over);
        assert_eq!(engine.state().current_view, View::Ending);

        let lines = engine.log().len();
        engine.submit("talk maria").unwrap();
        engine.submit("online").unwrap();
        assert_eq!(engine.log().len(), lines);

        engine.submit("new").unwrap();
        assert!(!engine.state().game_over);
        assert!(engine.state().is_awaiting_name());
    }

    #[test]
    fn settings_return_to_previous_view() {
        let mut engine = named_engine();
        engine.submit("settings").unwrap();
        assert_eq!(engine.state().current_view, View::Settings);
        assert_eq!(engine.state().previous_view, Some(View::Gameplay));
        engine.close_settings();
        assert_eq!(engine.state().current_view, View::Gameplay);
        assert_eq!(engine.state().previous_view, None);
    }

    #[test]
    fn view_flow_from_boot_to_gameplay() {
        let mut engine = GameEngine::builder()
            .with_content(fixtures::content())
            .build()
            .unwrap();
        assert_eq!(engine.state().current_view, View::Loading);
        engine.boot();
        assert_eq!(engine.state().current_view, View::Title);
        engine.advance_from_title();
        assert_eq!(engine.state().current_view, View::Menu);
        assert!(logged(&engine, "Type a command to continue."));
        engine.start_opening();
        assert_eq!(engine.state().current_view, View::Opening);
        engine.begin_gameplay();
        assert_eq!(engine.state().current_view, View::Gameplay);
        assert_eq!(engine.prompt(), "Name:");
    }

    #[test]
    fn crucifix_marks_the_player_name() {
        let mut engine = named_engine();
        assert_eq!(engine.player_display_name(), "ANA");
        engine.store.apply(StateUpdate::new().crucifix_active(true));
        assert_eq!(engine.player_display_name(), "[+] ANA");
    }

    #[test]
    fn unknown_commands_are_narrated() {
        let mut engine = named_engine();
        engine.submit("dance").unwrap();
        assert!(logged(&engine, "Unrecognized command: dance"));
    }

    #[test]
    fn load_request_is_handed_to_the_host() {
        let mut engine = named_engine();
        engine.submit("load saves/run.json").unwrap();
        assert_eq!(engine.take_load_request().as_deref(), Some("saves/run.json"));
        assert!(engine.take_load_request().is_none());
    }

    #[test]
    fn corrupt_import_leaves_state_untouched() {
        let mut engine = named_engine();
        let before = engine.state().clone();
        assert!(matches!(
            engine.import_save("{ nope"),
            Err(EngineError::CorruptSnapshot(_))
        ));
        assert_eq!(engine.state(), &before);
        assert!(logged(&engine, CORRUPT_SAVE));
    }
}
