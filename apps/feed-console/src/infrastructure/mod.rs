//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Console output: text conversion, formatting and the printing listener.
pub mod console;

/// Configuration loading.
pub mod config;

/// dxLink WebSocket feed adapter.
pub mod dxlink;

/// OpenTelemetry tracing integration.
pub mod telemetry;
