//! Error types for the macro system

use thiserror::Error;

/// Result type for macro operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the macro system
#[derive(Error, Debug)]
pub enum Error {
    /// KDL parsing error
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    /// Lua error
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid macro configuration
    #[error("config error: {0}")]
    Config(String),

    /// Type conversion error
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// No macro registered under the given name
    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    /// The command channel refused a composed command
    #[error("command rejected: {0}")]
    CommandRejected(String),
}
