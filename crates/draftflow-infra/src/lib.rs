//! Draftflow infrastructure: SQLite persistence, the HTTP generator and
//! evaluator clients, in-memory stores, and configuration loading.

pub mod config;
pub mod generator;
pub mod memory;
pub mod sqlite;
