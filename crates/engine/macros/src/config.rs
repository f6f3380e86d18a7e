//! KDL configuration file reader
//!
//! Parses macro definitions and optional static state out of a KDL file.
//!
//! # Example
//!
//! ```kdl
//! macro "PARK" description="Park the toolhead" {
//!     file "scripts/park.lua"
//! }
//!
//! macro "REPORT_TEMP" {
//!     script "respond(state.extruder.temperature)"
//! }
//!
//! state {
//!     extruder {
//!         temperature 24.6
//!         target 0.0
//!     }
//!     toolhead {
//!         homed_axes "xyz"
//!         position x=107.5 y=80.0 z=2.3
//!     }
//! }
//! ```
//!
//! Each `macro` node carries its name as the first argument, an optional
//! `description` property, and exactly one of a `script` child (inline
//! text) or a `file` child (path, resolved against the config file's
//! directory unless `absolute=#true`). Under `state`, each node becomes a
//! named status provider; node properties and children become its fields,
//! and nested nodes become nested mappings.

use crate::executor::MacroDef;
use crate::state::{StateRegistry, StaticStatus, Status};
use crate::{Error, Result, Value};
use std::path::Path;
use std::sync::Arc;

/// Parsed macro configuration
#[derive(Debug)]
pub struct MacroConfig {
    /// Macro definitions, in file order
    pub macros: Vec<MacroDef>,
    state: Vec<(String, Status)>,
}

impl MacroConfig {
    /// Parse a KDL file; relative script paths resolve against its directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_string_with_base(&content, path.parent())
    }

    /// Parse a KDL string; script paths are used as written
    pub fn from_string(content: &str) -> Result<Self> {
        Self::from_string_with_base(content, None)
    }

    fn from_string_with_base(content: &str, base: Option<&Path>) -> Result<Self> {
        let doc: kdl::KdlDocument = content.parse()?;

        let mut macros = Vec::new();
        let mut state = Vec::new();

        for node in doc.nodes() {
            match node.name().value() {
                "macro" => macros.push(Self::parse_macro(node, base)?),
                "state" => state.extend(Self::parse_state(node)),
                other => {
                    return Err(Error::Config(format!("unknown config node: {}", other)));
                }
            }
        }

        Ok(Self { macros, state })
    }

    /// Find a macro by its command name (match is case-insensitive)
    pub fn find(&self, name: &str) -> Option<&MacroDef> {
        let name = name.to_uppercase();
        self.macros.iter().find(|def| def.name() == name)
    }

    /// Build a registry of static providers from the `state` section
    pub fn build_registry(&self) -> StateRegistry {
        let mut registry = StateRegistry::new();
        for (name, status) in &self.state {
            registry.register(name.clone(), Arc::new(StaticStatus::new(status.clone())));
        }
        registry
    }

    /// Parse one `macro` node into a MacroDef
    fn parse_macro(node: &kdl::KdlNode, base: Option<&Path>) -> Result<MacroDef> {
        let name = node
            .entries()
            .iter()
            .find(|e| e.name().is_none())
            .and_then(|e| e.value().as_string())
            .ok_or_else(|| Error::Config("macro is missing a name".to_string()))?;

        let description = node
            .entries()
            .iter()
            .find(|e| e.name().map(|n| n.value()) == Some("description"))
            .and_then(|e| e.value().as_string());

        let mut script: Option<String> = None;
        let mut file: Option<(String, bool)> = None;

        if let Some(children) = node.children() {
            for child in children.nodes() {
                match child.name().value() {
                    "script" => script = Some(Self::string_arg(child, name, "script")?),
                    "file" => {
                        let path = Self::string_arg(child, name, "file")?;
                        let absolute = child
                            .entries()
                            .iter()
                            .find(|e| e.name().map(|n| n.value()) == Some("absolute"))
                            .and_then(|e| e.value().as_bool())
                            .unwrap_or(false);
                        file = Some((path, absolute));
                    }
                    other => {
                        return Err(Error::Config(format!(
                            "macro {}: unknown node {:?}",
                            name, other
                        )));
                    }
                }
            }
        }

        let mut def = match (script, file) {
            (Some(text), None) => MacroDef::inline(name, text),
            (None, Some((path, absolute))) => {
                let def = MacroDef::from_file(name, path);
                match base {
                    Some(base) if !absolute => def.resolve_against(base),
                    _ => def,
                }
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "macro {}: script and file are mutually exclusive",
                    name
                )));
            }
            (None, None) => {
                return Err(Error::Config(format!(
                    "macro {}: one of script or file is required",
                    name
                )));
            }
        };

        if let Some(description) = description {
            def = def.with_description(description);
        }
        Ok(def)
    }

    /// The single string argument of a child node
    fn string_arg(node: &kdl::KdlNode, macro_name: &str, what: &str) -> Result<String> {
        node.entries()
            .iter()
            .find(|e| e.name().is_none())
            .and_then(|e| e.value().as_string())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::Config(format!(
                    "macro {}: {} needs a string argument",
                    macro_name, what
                ))
            })
    }

    /// Parse the `state` node into named provider field maps
    fn parse_state(node: &kdl::KdlNode) -> Vec<(String, Status)> {
        let mut providers = Vec::new();
        if let Some(children) = node.children() {
            for child in children.nodes() {
                providers.push((child.name().value().to_string(), Self::node_to_status(child)));
            }
        }
        providers
    }

    /// Flatten a node's properties and children into a field map
    fn node_to_status(node: &kdl::KdlNode) -> Status {
        let mut status = Status::new();

        for entry in node.entries() {
            if let Some(name) = entry.name() {
                status.insert(
                    name.value().to_string(),
                    Self::kdl_value_to_value(entry.value()),
                );
            }
        }

        if let Some(children) = node.children() {
            for child in children.nodes() {
                status.insert(child.name().value().to_string(), Self::node_value(child));
            }
        }

        status
    }

    /// Convert one node into a field value
    fn node_value(node: &kdl::KdlNode) -> Value {
        let has_props = node.entries().iter().any(|e| e.name().is_some());
        if node.children().is_some() || has_props {
            return Value::Map(Self::node_to_status(node));
        }

        let args: Vec<Value> = node
            .entries()
            .iter()
            .map(|e| Self::kdl_value_to_value(e.value()))
            .collect();
        match args.len() {
            0 => Value::Null,
            1 => args.into_iter().next().unwrap(),
            _ => Value::Array(args),
        }
    }

    /// Convert a KDL value to our Value type
    fn kdl_value_to_value(kdl_val: &kdl::KdlValue) -> Value {
        match kdl_val {
            kdl::KdlValue::String(s) => Value::String(s.clone()),
            kdl::KdlValue::Integer(i) => {
                // i128 to i64 - may truncate for very large values
                Value::Int(*i as i64)
            }
            kdl::KdlValue::Float(f) => Value::Float(*f),
            kdl::KdlValue::Bool(b) => Value::Bool(*b),
            kdl::KdlValue::Null => Value::Null,
        }
    }
}
