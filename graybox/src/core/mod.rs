//! Deterministic, pure logic shared by the execution engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod arena;
pub mod convergence;
pub mod description;
pub mod settings;
pub mod types;
