//! Observability wiring for Draftflow.

pub mod tracing_setup;
