//! Purpose: Runtime binding layer for the nitf-gnr NITF engine shared library.
//! Exports: `core` (handle, registry, marshaling, errors), `config`, `session`, `bridge`, `logging`.
//! Role: Lets native callers and managed-runtime bridges drive the engine without link-time coupling.
//! Invariants: Every required entry point is resolved before any operation runs.
//! Invariants: Library handles and marshaled strings are released by scope, on every exit path.
pub mod bridge;
pub mod config;
pub mod core;
pub mod logging;
pub mod session;

pub use crate::config::EngineConfig;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::handle::EngineHandle;
pub use crate::core::registry::{Operation, SymbolSource, SymbolTable};
pub use crate::session::{DiagnosticReport, SegmentCounts, SegmentKind, Session};
