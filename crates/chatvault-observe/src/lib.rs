//! Observability setup for ChatVault: structured logging with optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
