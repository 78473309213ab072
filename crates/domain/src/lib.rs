//! Domain-level building blocks shared across the cardrail crates.
//!
//! Everything here is deliberately free of I/O: validated identifiers and
//! records (`model`), the storage contracts the SeaORM adapters implement
//! (`storage`), environment-driven configuration (`config`), and the
//! tracing/metrics bootstrap shared by binaries (`telemetry`).

pub mod config;
pub mod model;
pub mod storage;
pub mod telemetry;
