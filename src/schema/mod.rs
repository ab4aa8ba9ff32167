pub mod content;
pub mod log;
pub mod npc;
pub mod state;
