//! Shared domain types for Draftflow.
//!
//! This crate contains the core domain types used across the Draftflow
//! engine: Session, checkpoint descriptors, decision payloads, theme
//! configuration, progress events, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod session;
