/// Save snapshots, autosave storage, and roster reconstruction on load.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

use crate::schema::content::ContentBundle;
use crate::schema::log::LogLine;
use crate::schema::npc::NpcState;
use crate::schema::state::{GameState, View, MIN_FAITH, PENDING_NAME};

/// Newest snapshot layout this build understands.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Exportable save: the full state plus the tail of the narration log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSnapshot {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(flatten)]
    pub state: GameState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_log: Vec<LogLine>,
}

impl SaveSnapshot {
    /// Capture `state` with the last `keep` lines of `log`.
    pub fn capture(state: &GameState, log: &[LogLine], keep: usize) -> Self {
        let start = log.len().saturating_sub(keep);
        Self {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
            recent_log: log[start..].to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, PersistenceError> {
        let snapshot: SaveSnapshot = serde_json::from_str(input)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let state = &snapshot.state;
        if state.current_phase == 0 {
            return Err(PersistenceError::Inconsistent(
                "phase numbers start at 1".to_string(),
            ));
        }
        if state.hero_faith <= MIN_FAITH && !state.game_over {
            return Err(PersistenceError::Inconsistent(format!(
                "hero faith {} in a run that has not ended",
                state.hero_faith
            )));
        }
        Ok(snapshot)
    }
}

/// Rebuild the active roster purely from phase progress.
///
/// Phases `1..=current_phase` are replayed: every phase contributes its
/// initially-active characters, and its leader once the phase is behind us
/// (or its objective is already met). A character the snapshot had online
/// keeps its recorded faith; anyone else is copied fresh from the pool.
pub fn reconstruct_roster(
    content: &ContentBundle,
    state: &GameState,
) -> BTreeMap<String, NpcState> {
    let mut roster = BTreeMap::new();
    let current = state.current_phase;

    for number in 1..=current {
        let Some(phase) = content.phase(number) else {
            continue;
        };
        let leader_unlocked = number < current || state.phase_objective_complete;
        let leader = phase.leader.iter().filter(|_| leader_unlocked);

        for id in phase.initial_active.iter().chain(leader) {
            if roster.contains_key(id) {
                continue;
            }
            let npc = state
                .active_characters
                .get(id)
                .or_else(|| state.character_pool.get(id))
                .cloned()
                .or_else(|| pool_fallback(content, state, id));
            if let Some(npc) = npc {
                roster.insert(id.clone(), npc);
            }
        }
    }

    roster
}

/// Add templates the pool is missing, e.g. characters introduced after the
/// snapshot was written. An empty pool means the player was never named and
/// stays empty.
pub fn reconcile_pool(content: &ContentBundle, state: &GameState) -> BTreeMap<String, NpcState> {
    let mut pool = state.character_pool.clone();
    if pool.is_empty() {
        return pool;
    }
    for (id, template) in &content.npcs {
        pool.entry(id.clone())
            .or_insert_with(|| template.instantiate(id));
    }
    pool
}

fn pool_fallback(content: &ContentBundle, state: &GameState, id: &str) -> Option<NpcState> {
    if state.character_pool.is_empty() {
        return None;
    }
    content.npc(id).map(|template| template.instantiate(id))
}

/// Restore a snapshot into a state consistent with `content`.
pub fn restore(content: &ContentBundle, snapshot: SaveSnapshot) -> (GameState, Vec<LogLine>) {
    let SaveSnapshot {
        mut state,
        recent_log,
        ..
    } = snapshot;

    state.active_characters = reconstruct_roster(content, &state);
    state.character_pool = reconcile_pool(content, &state);

    if !state.game_over {
        state.current_view = View::Gameplay;
        state.previous_view = None;
        if state.player_name.is_empty() {
            state.player_name = PENDING_NAME.to_string();
        }
    }

    let dialogue_online = state
        .active_dialogue
        .as_ref()
        .map(|dialogue| state.active_characters.contains_key(&dialogue.npc_id));
    if dialogue_online == Some(false) {
        tracing::debug!("dropping dialogue with a character no longer online");
        state.active_dialogue = None;
    }

    (state, recent_log)
}

/// Where saves live. Writes are fire-and-forget from the engine's point of
/// view: failures are logged, never surfaced to the player.
pub trait SaveStore {
    fn write_autosave(&mut self, data: &str) -> io::Result<()>;
    fn read_autosave(&self) -> io::Result<Option<String>>;
    fn clear_autosave(&mut self) -> io::Result<()>;
    /// Store an exported save and return a label describing where it went.
    fn write_export(&mut self, data: &str) -> io::Result<String>;
}

#[derive(Debug, Default)]
struct MemorySlots {
    autosave: Option<String>,
    exports: Vec<String>,
}

/// In-memory save storage. Clones share the same slots, so a caller can
/// keep a handle after passing one to the engine.
#[derive(Debug, Clone, Default)]
pub struct MemorySaveStore {
    slots: Rc<RefCell<MemorySlots>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn autosave(&self) -> Option<String> {
        self.slots.borrow().autosave.clone()
    }

    pub fn exports(&self) -> Vec<String> {
        self.slots.borrow().exports.clone()
    }

    pub fn last_export(&self) -> Option<String> {
        self.slots.borrow().exports.last().cloned()
    }
}

impl SaveStore for MemorySaveStore {
    fn write_autosave(&mut self, data: &str) -> io::Result<()> {
        self.slots.borrow_mut().autosave = Some(data.to_string());
        Ok(())
    }

    fn read_autosave(&self) -> io::Result<Option<String>> {
        Ok(self.autosave())
    }

    fn clear_autosave(&mut self) -> io::Result<()> {
        self.slots.borrow_mut().autosave = None;
        Ok(())
    }

    fn write_export(&mut self, data: &str) -> io::Result<String> {
        let mut slots = self.slots.borrow_mut();
        slots.exports.push(data.to_string());
        Ok(format!("memory slot {}", slots.exports.len()))
    }
}

const AUTOSAVE_FILE: &str = "autosave.json";
const EXPORT_FILE: &str = "redemption_save.json";

/// Directory-backed save storage.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn autosave_path(&self) -> PathBuf {
        self.dir.join(AUTOSAVE_FILE)
    }

    pub fn export_path(&self) -> PathBuf {
        self.dir.join(EXPORT_FILE)
    }
}

impl SaveStore for FileSaveStore {
    fn write_autosave(&mut self, data: &str) -> io::Result<()> {
        std::fs::write(self.autosave_path(), data)
    }

    fn read_autosave(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.autosave_path()) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn clear_autosave(&mut self) -> io::Result<()> {
        match std::fs::remove_file(self.autosave_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn write_export(&mut self, data: &str) -> io::Result<String> {
        let path = self.export_path();
        std::fs::write(&path, data)?;
        Ok(path.display().to_string())
    }
}
