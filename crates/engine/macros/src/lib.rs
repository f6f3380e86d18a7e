//! Macro scripting system for Helios
//!
//! This crate provides:
//! - **State proxy**: lazy, field-by-field read access to live machine state
//! - **Command composer**: dynamic `cmd.NAME(...)` calls that submit formatted
//!   command lines to the host's command channel
//! - **Macro executor**: loads, compiles, and runs operator-defined Lua macros
//!   with per-invocation namespaces and fault isolation
//! - **KDL config**: parse macro definitions and static state from KDL files
//!
//! # Example
//!
//! ```rust,ignore
//! use macros::{MacroConfig, MacroRunner, Invocation};
//! use std::sync::Arc;
//!
//! // Load macro definitions and static state from KDL
//! let config = MacroConfig::from_file("config/macros.kdl")?;
//! let registry = Arc::new(config.build_registry());
//!
//! // Wire the engine to the host's command channel and display
//! let runner = MacroRunner::new(registry, command_sink);
//! runner.run(&config.macros[0], Invocation::default(), &responder);
//! ```

mod command;
mod config;
mod error;
mod executor;
mod params;
mod proxy;
mod state;
mod value;

pub use command::{compose_line, CommandComposer, CommandSink, MemorySink};
pub use config::MacroConfig;
pub use error::{Error, Result};
pub use executor::{
    escape_html, Fault, Invocation, MacroDef, MacroRunner, MacroSource, Responder, REPORT_PREFIX,
};
pub use params::MacroParams;
pub use proxy::{Resolved, StateProxy};
pub use state::{StateRegistry, StaticStatus, Status, StatusProvider, CURRENT_TICK};
pub use value::Value;

// Re-export mlua for downstream crates
pub use mlua;


