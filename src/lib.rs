//! playtrack: daily per-game playtime from cumulative Steam snapshots

pub mod config;
pub mod services;
pub mod types;
