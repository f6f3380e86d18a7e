//! Macro loading, compilation, and fault-isolated execution
//!
//! A [`MacroRunner`] executes one macro per call: it obtains the script
//! text (inline, or re-read from disk so file-based macros stay
//! live-editable), compiles it with a diagnostic chunk name, and runs it in
//! a fresh Lua state whose globals are exactly `state`, `params`, `cmd`,
//! and `respond`. Nothing persists across invocations.
//!
//! Scripts run with host privilege; this is crash isolation, not a
//! sandbox. Every fault is caught at the runner boundary, rendered as a
//! `!! `-prefixed report on the raw display channel, and the runner
//! returns normally.

use crate::command::{CommandComposer, CommandSink};
use crate::params::MacroParams;
use crate::proxy::StateProxy;
use crate::state::StateRegistry;
use mlua::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Line prefix that marks report lines apart from ordinary output
pub const REPORT_PREFIX: &str = "!! ";

/// Description used when the configuration supplies none
const DEFAULT_DESCRIPTION: &str = "Helios macro";

/// Advisory sent when an inline macro fails to parse. Inline script text
/// travels through config quoting, which is the usual way it gets mangled;
/// the emphasis markup is fixed trusted text and must survive unescaped.
const INLINE_SYNTAX_ADVISORY: &str = "Syntax errors in inline macros are often caused by \
     script text mangled inside the config file. Consider moving this macro to a \
     <b>script file</b>, which is re-read on every invocation.";

/// Where a macro's script text comes from
#[derive(Debug, Clone)]
pub enum MacroSource {
    /// Script text stored in the configuration
    Inline(String),
    /// Script file, re-read on every invocation
    File {
        /// Path as written in the configuration, used in diagnostics
        path: PathBuf,
        /// Absolute path resolved at configuration time
        resolved: PathBuf,
    },
}

impl MacroSource {
    /// True for inline-defined sources
    pub fn is_inline(&self) -> bool {
        matches!(self, MacroSource::Inline(_))
    }
}

/// One operator-defined macro
///
/// Immutable after configuration. The name is uppercased, matching how the
/// host registers commands.
#[derive(Debug, Clone)]
pub struct MacroDef {
    name: String,
    source: MacroSource,
    description: String,
}

impl MacroDef {
    /// Define a macro from inline script text
    pub fn inline(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            source: MacroSource::Inline(script.into()),
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }

    /// Define a macro backed by a script file
    ///
    /// The path is used as given; see [`MacroDef::resolve_against`] for
    /// paths relative to a configuration directory.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: name.into().to_uppercase(),
            source: MacroSource::File {
                resolved: path.clone(),
                path,
            },
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }

    /// Resolve a file-based source against a base directory
    ///
    /// Resolution happens once, at configuration time; only the file
    /// content is re-read per invocation. Inline sources are unchanged.
    pub fn resolve_against(mut self, base: &Path) -> Self {
        if let MacroSource::File { path, resolved } = &mut self.source {
            if !path.is_absolute() {
                *resolved = base.join(&*path);
            }
        }
        self
    }

    /// Attach a human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The macro's (uppercased) command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Where the script text comes from
    pub fn source(&self) -> &MacroSource {
        &self.source
    }
}

/// Inputs of one triggered execution, supplied by the command channel
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Named parameters, case exactly as supplied
    pub params: HashMap<String, String>,
    /// The entire unparsed argument string
    pub raw: String,
}

/// Display channels for one invocation
pub trait Responder: Send + Sync {
    /// Operator-facing info text; the engine escapes it where required
    fn info(&self, text: &str);
    /// Raw internal/error text, sent unescaped
    fn raw(&self, text: &str);
}

/// A failed invocation, classified by phase
#[derive(Debug, Error)]
pub enum Fault {
    /// Script file missing or unreadable
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Script text failed to parse
    #[error("{0}")]
    Compile(mlua::Error),
    /// The script body raised
    #[error("{0}")]
    Runtime(mlua::Error),
}

impl Fault {
    fn is_syntax(&self) -> bool {
        matches!(self, Fault::Compile(mlua::Error::SyntaxError { .. }))
    }
}

/// Executes macros against a provider registry and a command sink
pub struct MacroRunner {
    registry: Arc<StateRegistry>,
    commands: Arc<dyn CommandSink>,
}

impl MacroRunner {
    /// Create a runner over the host's state registry and command channel
    pub fn new(registry: Arc<StateRegistry>, commands: Arc<dyn CommandSink>) -> Self {
        Self { registry, commands }
    }

    /// Run one macro to completion
    ///
    /// Never fails and never panics on script faults: a fault is reported
    /// through `responder` and the call returns normally. Commands already
    /// submitted before a fault point stay delivered.
    pub fn run(&self, def: &MacroDef, invocation: Invocation, responder: &Arc<dyn Responder>) {
        debug!("Running macro {}", def.name());
        if let Err(fault) = self.execute(def, invocation, responder) {
            warn!("Macro {} faulted: {}", def.name(), fault);
            self.report(def, &fault, responder.as_ref());
        }
    }

    fn execute(
        &self,
        def: &MacroDef,
        invocation: Invocation,
        responder: &Arc<dyn Responder>,
    ) -> Result<(), Fault> {
        // Loading
        let (text, chunk_name) = match def.source() {
            MacroSource::Inline(text) => (text.clone(), format!("macro:{}", def.name())),
            MacroSource::File { path, resolved } => {
                let text = fs::read_to_string(resolved).map_err(|source| Fault::Load {
                    path: resolved.clone(),
                    source,
                })?;
                // '@' marks the chunk as file-backed, so Lua reports
                // "path:line:" instead of a quoted source snippet
                (text, format!("@{}", path.display()))
            }
        };

        let lua = Lua::new();
        self.install_namespace(&lua, invocation, responder)
            .map_err(Fault::Runtime)?;

        // Compiling
        let chunk = lua
            .load(&text)
            .set_name(chunk_name)
            .into_function()
            .map_err(Fault::Compile)?;

        // Running
        chunk.call::<()>(()).map_err(Fault::Runtime)?;
        Ok(())
    }

    fn install_namespace(
        &self,
        lua: &Lua,
        invocation: Invocation,
        responder: &Arc<dyn Responder>,
    ) -> LuaResult<()> {
        let globals = lua.globals();
        globals.set("state", StateProxy::root(self.registry.clone()))?;
        globals.set("params", MacroParams::new(invocation.params, invocation.raw))?;
        globals.set("cmd", CommandComposer::new(self.commands.clone()))?;

        let responder = responder.clone();
        let respond = lua.create_function(
            move |lua, (message, unsafe_markup): (LuaValue, Option<bool>)| {
                let text = lua_display(lua, message)?;
                if unsafe_markup.unwrap_or(false) {
                    responder.info(&text);
                } else {
                    responder.info(&escape_html(&text));
                }
                Ok(())
            },
        )?;
        globals.set("respond", respond)?;
        Ok(())
    }

    fn report(&self, def: &MacroDef, fault: &Fault, responder: &dyn Responder) {
        let text = fault.to_string();
        let report: Vec<String> = text
            .lines()
            .map(|line| format!("{}{}", REPORT_PREFIX, line))
            .collect();
        responder.raw(&report.join("\n"));

        if fault.is_syntax() && def.source().is_inline() {
            responder.info(INLINE_SYNTAX_ADVISORY);
        }
    }
}

/// The text form of a script value, as `respond` displays it
///
/// Follows Lua `tostring`: nil renders `nil`, numbers render Lua-style,
/// and a state proxy renders its current snapshot through its own
/// `__tostring`.
fn lua_display(lua: &Lua, value: LuaValue) -> LuaResult<String> {
    let tostring: LuaFunction = lua.globals().get("tostring")?;
    tostring.call(value)
}

/// Escape text for the info display channel
///
/// The info channel renders a small HTML subset, so displayed values have
/// their markup-significant characters replaced unless the macro opted
/// into raw output.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
