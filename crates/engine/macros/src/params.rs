//! Script-visible view over an invocation's parameters

use mlua::prelude::*;
use mlua::{MetaMethod, UserData, UserDataMethods};
use std::collections::HashMap;

/// Read-only, attribute-style view over one invocation's named parameters
///
/// `params.TEMP` yields the parameter's text exactly as the caller supplied
/// it (no case folding) or nil when absent. The reserved field `params.raw`
/// yields the entire unparsed argument string for macros that parse their
/// own arguments; a named parameter literally called `raw` would be
/// shadowed by it.
pub struct MacroParams {
    params: HashMap<String, String>,
    raw: String,
}

impl MacroParams {
    /// Wrap one invocation's parameter set
    pub fn new(params: HashMap<String, String>, raw: impl Into<String>) -> Self {
        Self {
            params,
            raw: raw.into(),
        }
    }

    /// Look up one named parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// The unparsed argument string of the invocation
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl UserData for MacroParams {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |_, this, name: String| {
            if name == "raw" {
                return Ok(Some(this.raw.clone()));
            }
            Ok(this.params.get(&name).cloned())
        });
    }
}
