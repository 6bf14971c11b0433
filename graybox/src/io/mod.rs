//! Side-effecting collaborators of the engine: files, terminal, environment.

pub mod auth;
pub mod config;
pub mod journal;
pub mod rank;
pub mod tree_file;
pub mod ui;
