//! WASM bindings for redemption-engine, powering the browser terminal.

use wasm_bindgen::prelude::*;

use redemption_engine::core::engine::GameEngine;
use redemption_engine::core::persistence::{MemorySaveStore, SaveStore};
use redemption_engine::schema::content::ContentBundle;
use redemption_engine::schema::log::LogLine;

// ---------------------------------------------------------------------------
// Embedded content, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const REDEMPTION: &str = include_str!("../../content/redemption.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct LineOut<'a> {
    text: &'a str,
    class: &'static str,
}

/// Lines narrated since the previous call. `cleared` tells the page to wipe
/// its terminal before appending.
#[derive(serde::Serialize)]
struct LogDelta<'a> {
    cleared: bool,
    lines: Vec<LineOut<'a>>,
}

#[derive(serde::Serialize)]
struct StatusOut<'a> {
    view: String,
    prompt: &'static str,
    player: String,
    objective: String,
    phase: u32,
    hero_faith: f64,
    average_faith: f64,
    game_over: bool,
    next_due: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dialogue_with: Option<&'a str>,
}

fn js_err(context: &str, e: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// Game: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct Game {
    engine: GameEngine,
    saves: MemorySaveStore,
    epoch: u64,
    shown: usize,
}

#[wasm_bindgen]
impl Game {
    /// Create a game over the embedded content and show the title screen.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<Game, JsError> {
        let content = ContentBundle::parse_ron(data::REDEMPTION)
            .map_err(|e| js_err("Content parse error", e))?;
        let saves = MemorySaveStore::new();
        let mut engine = GameEngine::builder()
            .seed(seed)
            .with_content(content)
            .save_store(saves.clone())
            .build()
            .map_err(|e| js_err("Engine build error", e))?;
        engine.boot();

        Ok(Game {
            engine,
            saves,
            epoch: 0,
            shown: 0,
        })
    }

    /// Hand over an autosave kept by the page (e.g. in localStorage) so that
    /// `continue` can find it.
    pub fn seed_autosave(&mut self, json: &str) -> Result<(), JsError> {
        self.saves
            .write_autosave(json)
            .map_err(|e| js_err("Autosave error", e))
    }

    /// Current autosave, for the page to persist. `None` once the run ended.
    pub fn autosave(&self) -> Option<String> {
        self.saves.autosave()
    }

    /// Process one line of input. Returns the new log lines as JSON.
    pub fn submit(&mut self, input: &str) -> Result<String, JsError> {
        // Gameplay errors are narrated into the log already.
        let _ = self.engine.submit(input);
        self.drain()
    }

    /// Advance the clock. Returns the new log lines as JSON.
    pub fn poll(&mut self, now_ms: u64) -> Result<String, JsError> {
        let _ = self.engine.poll(now_ms);
        self.drain()
    }

    pub fn advance_from_title(&mut self) -> Result<String, JsError> {
        self.engine.advance_from_title();
        self.drain()
    }

    pub fn start_opening(&mut self) -> Result<String, JsError> {
        self.engine.start_opening();
        self.drain()
    }

    pub fn begin_gameplay(&mut self) -> Result<String, JsError> {
        self.engine.begin_gameplay();
        self.drain()
    }

    pub fn close_settings(&mut self) -> Result<String, JsError> {
        self.engine.close_settings();
        self.drain()
    }

    /// Export the run as a JSON snapshot for download.
    pub fn export_save(&mut self) -> Result<String, JsError> {
        self.engine
            .export_save()
            .map_err(|e| js_err("Export error", e))
    }

    /// Load a snapshot the player uploaded. Returns the new log lines as JSON;
    /// a corrupt file is reported in the log rather than as an error.
    pub fn import_save(&mut self, json: &str) -> Result<String, JsError> {
        let _ = self.engine.import_save(json);
        self.drain()
    }

    /// Whether the player asked to load a file since the last call.
    pub fn take_load_request(&mut self) -> bool {
        self.engine.take_load_request().is_some()
    }

    /// Summary of what the page needs to draw its status bar, as JSON.
    pub fn status(&self) -> Result<String, JsError> {
        let state = self.engine.state();
        let status = StatusOut {
            view: format!("{:?}", state.current_view),
            prompt: self.engine.prompt(),
            player: self.engine.player_display_name(),
            objective: self.engine.objective(),
            phase: state.current_phase,
            hero_faith: state.hero_faith,
            average_faith: self.engine.average_faith(),
            game_over: state.game_over,
            next_due: self.engine.next_due(),
            dialogue_with: state.active_dialogue.as_ref().map(|d| d.npc_id.as_str()),
        };
        serde_json::to_string(&status).map_err(|e| js_err("Serialization error", e))
    }

    /// The full game state as JSON.
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(self.engine.state()).map_err(|e| js_err("Serialization error", e))
    }

    /// The whole log as JSON, for redrawing the terminal from scratch.
    pub fn log_json(&mut self) -> Result<String, JsError> {
        self.epoch = self.engine.log_epoch();
        self.shown = self.engine.log().len();
        render_lines(true, self.engine.log())
    }
}

// Private helpers
impl Game {
    fn drain(&mut self) -> Result<String, JsError> {
        let cleared = self.engine.log_epoch() != self.epoch;
        if cleared {
            self.epoch = self.engine.log_epoch();
            self.shown = 0;
        }
        let log = self.engine.log();
        let start = self.shown.min(log.len());
        self.shown = log.len();
        render_lines(cleared, &log[start..])
    }
}

fn render_lines(cleared: bool, lines: &[LogLine]) -> Result<String, JsError> {
    let delta = LogDelta {
        cleared,
        lines: lines
            .iter()
            .map(|line| LineOut {
                text: &line.text,
                class: line.tag.class_name(),
            })
            .collect(),
    };
    serde_json::to_string(&delta).map_err(|e| js_err("Serialization error", e))
}
