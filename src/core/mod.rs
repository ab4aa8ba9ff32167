pub mod agents;
pub mod commands;
pub mod context;
pub mod dialogue;
pub mod engine;
pub mod faith;
pub mod items;
pub mod persistence;
pub mod phase;
pub mod scheduler;
pub mod store;
pub mod template;

#[cfg(test)]
pub(crate) mod fixtures;
