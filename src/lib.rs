//! Redemption Engine: a narrative state engine for a faith-driven terminal adventure.
//!
//! The player converts characters by talking to them, climbs through story
//! phases, fends off agents that erode faith, and resolves branching
//! dialogue gated by clues and items. Everything funnels through a single
//! state store so every change is checked against the game's invariants.

pub mod core;
pub mod schema;
