//! Command composition and submission
//!
//! Macros issue commands as dynamic method-style calls: `cmd.G1{E=50, F=900}`
//! composes `"G1 E50 F900"` and hands it to the host's command channel
//! before the call returns. The composer only formats and forwards; any
//! failure a script sees from a `cmd` call is the channel's own.

use crate::Result;
use mlua::prelude::*;
use mlua::{MetaMethod, UserData, UserDataMethods, Variadic};
use std::sync::{Arc, Mutex};

/// The host's command channel
pub trait CommandSink: Send + Sync {
    /// Accept one fully composed command line
    fn submit(&self, command: &str) -> Result<()>;
}

/// Compose a command line from a name and pre-rendered argument tokens
///
/// Tokens are joined with single spaces; no arguments composes the bare
/// name with no trailing space.
pub fn compose_line(name: &str, parts: &[String]) -> String {
    format!("{} {}", name, parts.join(" ")).trim().to_string()
}

/// Script-facing command composer
///
/// Any field access yields a callable for that command name. Arguments:
/// strings and numbers are positional, rendered verbatim; a table argument
/// contributes its array part as positional tokens and its string keys as
/// named parameters, rendered as key immediately followed by value with no
/// separator. Named parameters render in sorted key order, since Lua table
/// iteration order carries no meaning.
pub struct CommandComposer {
    sink: Arc<dyn CommandSink>,
}

impl CommandComposer {
    /// Wrap a command sink
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }
}

impl UserData for CommandComposer {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, name: String| {
            let sink = this.sink.clone();
            lua.create_function(move |_, args: Variadic<LuaValue>| {
                let parts = expand_args(&args)?;
                let line = compose_line(&name, &parts);
                sink.submit(&line).map_err(LuaError::external)?;
                Ok(())
            })
        });
    }
}

fn expand_args(args: &Variadic<LuaValue>) -> LuaResult<Vec<String>> {
    let mut parts = Vec::new();
    for arg in args.iter() {
        match arg {
            LuaValue::Table(table) => expand_table(table.clone(), &mut parts)?,
            other => parts.push(format_scalar(other)?),
        }
    }
    Ok(parts)
}

fn expand_table(table: LuaTable, parts: &mut Vec<String>) -> LuaResult<()> {
    let mut named: Vec<(String, String)> = Vec::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        match key {
            LuaValue::Integer(_) => parts.push(format_scalar(&value)?),
            LuaValue::String(key) => {
                named.push((key.to_str()?.to_string(), format_scalar(&value)?));
            }
            other => {
                return Err(LuaError::RuntimeError(format!(
                    "invalid command parameter key of type {}",
                    other.type_name()
                )))
            }
        }
    }
    named.sort();
    for (key, value) in named {
        parts.push(format!("{}{}", key, value));
    }
    Ok(())
}

fn format_scalar(value: &LuaValue) -> LuaResult<String> {
    match value {
        LuaValue::String(s) => Ok(s.to_str()?.to_string()),
        LuaValue::Integer(i) => Ok(i.to_string()),
        LuaValue::Number(n) => Ok(n.to_string()),
        LuaValue::Boolean(b) => Ok(b.to_string()),
        other => Err(LuaError::RuntimeError(format!(
            "cannot format {} as a command argument",
            other.type_name()
        ))),
    }
}

/// Capture sink for tests and dry runs
#[derive(Default)]
pub struct MemorySink {
    submitted: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands submitted so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

impl CommandSink for MemorySink {
    fn submit(&self, command: &str) -> Result<()> {
        self.submitted.lock().unwrap().push(command.to_string());
        Ok(())
    }
}
