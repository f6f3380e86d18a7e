//! Lazy proxy over the machine state graph
//!
//! A [`StateProxy`] wraps exactly one graph node and resolves fields against
//! that node's *current* snapshot on every access. Nothing is traversed
//! eagerly and nothing is cached: `state.extruder.temperature` read twice in
//! one script asks the extruder provider for a fresh snapshot twice.
//!
//! Field resolution never fails for missing data: absent fields, and
//! unknown provider names at the root, resolve to nil so scripts can probe
//! optional subsystems without pre-checking. Only indexing a value that is
//! not a mapping raises, with Lua's own "attempt to index" diagnostic.

use crate::state::{StateRegistry, Status, StatusProvider, CURRENT_TICK};
use crate::value::{value_to_lua, Value};
use mlua::prelude::*;
use mlua::{MetaMethod, UserData, UserDataMethods};
use std::collections::HashMap;
use std::sync::Arc;

/// One wrapped node of the state graph
#[derive(Clone)]
enum GraphNode {
    /// The graph root: first-level fields are provider names
    Registry(Arc<StateRegistry>),
    /// A snapshot-capable node: fields come from `status(CURRENT_TICK)`
    Provider(Arc<dyn StatusProvider>),
    /// A plain mapping, materialized from an enclosing snapshot
    Map(HashMap<String, Value>),
}

/// Result of resolving one field
pub enum Resolved {
    /// A terminal value, returned unchanged
    Leaf(Value),
    /// A mapping, wrapped in a fresh proxy
    Proxy(StateProxy),
}

/// Lazy read-only view over one state graph node
#[derive(Clone)]
pub struct StateProxy {
    node: GraphNode,
}

impl StateProxy {
    /// Create the root proxy over the whole provider registry
    pub fn root(registry: Arc<StateRegistry>) -> Self {
        Self {
            node: GraphNode::Registry(registry),
        }
    }

    fn for_provider(provider: Arc<dyn StatusProvider>) -> Self {
        Self {
            node: GraphNode::Provider(provider),
        }
    }

    fn for_map(map: HashMap<String, Value>) -> Self {
        Self {
            node: GraphNode::Map(map),
        }
    }

    /// Resolve one field against the node's current snapshot
    ///
    /// Returns `None` for absent fields and for unknown provider names at
    /// the root. A mapping-valued field always comes back as a new proxy,
    /// never as a raw map.
    pub fn resolve_field(&self, name: &str) -> Option<Resolved> {
        match &self.node {
            GraphNode::Registry(registry) => registry
                .lookup(name)
                .map(|provider| Resolved::Proxy(Self::for_provider(provider))),
            GraphNode::Provider(provider) => {
                wrap_value(provider.status(CURRENT_TICK).remove(name)?)
            }
            GraphNode::Map(map) => wrap_value(map.get(name).cloned()?),
        }
    }

    /// Render the wrapped snapshot/mapping as text
    ///
    /// Keys are sorted so the rendering is stable; the root renders every
    /// registered provider's current snapshot.
    pub fn render(&self) -> String {
        match &self.node {
            GraphNode::Registry(registry) => {
                let parts: Vec<String> = registry
                    .names()
                    .into_iter()
                    .map(|name| {
                        // names() only returns registered providers
                        let provider = registry.lookup(name).unwrap();
                        format!("{} = {}", name, render_status(&provider.status(CURRENT_TICK)))
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            GraphNode::Provider(provider) => render_status(&provider.status(CURRENT_TICK)),
            GraphNode::Map(map) => render_status(map),
        }
    }
}

fn wrap_value(value: Value) -> Option<Resolved> {
    Some(match value {
        Value::Map(map) => Resolved::Proxy(StateProxy::for_map(map)),
        other => Resolved::Leaf(other),
    })
}

fn render_status(status: &Status) -> String {
    let mut keys: Vec<&String> = status.keys().collect();
    keys.sort_unstable();
    let parts: Vec<String> = keys
        .into_iter()
        .map(|key| format!("{} = {}", key, render_value(&status[key])))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Array(arr) => {
            let parts: Vec<String> = arr.iter().map(render_value).collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Map(map) => render_status(map),
    }
}

impl UserData for StateProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, name: String| {
            match this.resolve_field(&name) {
                Some(Resolved::Proxy(proxy)) => proxy.into_lua(lua),
                Some(Resolved::Leaf(value)) => value_to_lua(lua, &value),
                None => Ok(LuaValue::Nil),
            }
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.render()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StaticStatus;

    fn registry_with(name: &str, status: Status) -> Arc<StateRegistry> {
        let mut registry = StateRegistry::new();
        registry.register(name, Arc::new(StaticStatus::new(status)));
        Arc::new(registry)
    }

    fn nested_status() -> Status {
        Status::from([
            ("homed_axes".to_string(), Value::from("xyz")),
            (
                "position".to_string(),
                Value::Map(HashMap::from([
                    ("x".to_string(), Value::from(107.5)),
                    ("y".to_string(), Value::from(80.0)),
                ])),
            ),
        ])
    }

    #[test]
    fn test_resolve_nested_path() {
        let root = StateProxy::root(registry_with("toolhead", nested_status()));

        let toolhead = match root.resolve_field("toolhead") {
            Some(Resolved::Proxy(p)) => p,
            _ => panic!("provider lookup must yield a proxy"),
        };
        let position = match toolhead.resolve_field("position") {
            Some(Resolved::Proxy(p)) => p,
            _ => panic!("mapping field must yield a proxy, not a raw map"),
        };
        match position.resolve_field("x") {
            Some(Resolved::Leaf(v)) => assert_eq!(v, Value::from(107.5)),
            _ => panic!("terminal field must yield a leaf"),
        }
    }

    #[test]
    fn test_absent_fields_resolve_to_none() {
        let root = StateProxy::root(registry_with("toolhead", nested_status()));

        // Unknown provider at the root
        assert!(root.resolve_field("chamber").is_none());

        // Known provider, missing field
        let toolhead = match root.resolve_field("toolhead") {
            Some(Resolved::Proxy(p)) => p,
            _ => unreachable!(),
        };
        assert!(toolhead.resolve_field("velocity").is_none());
    }

    #[test]
    fn test_provider_resnapshots_on_every_access() {
        let provider = Arc::new(StaticStatus::new(Status::from([(
            "temperature".to_string(),
            Value::from(24.6),
        )])));
        let mut registry = StateRegistry::new();
        registry.register("extruder", provider.clone());
        let root = StateProxy::root(Arc::new(registry));

        let extruder = match root.resolve_field("extruder") {
            Some(Resolved::Proxy(p)) => p,
            _ => unreachable!(),
        };

        match extruder.resolve_field("temperature") {
            Some(Resolved::Leaf(v)) => assert_eq!(v, Value::from(24.6)),
            _ => panic!("expected leaf"),
        }

        provider.set("temperature", Value::from(210.0));

        // Same proxy instance, fresh snapshot
        match extruder.resolve_field("temperature") {
            Some(Resolved::Leaf(v)) => assert_eq!(v, Value::from(210.0)),
            _ => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_render_is_sorted_and_meaningful() {
        let root = StateProxy::root(registry_with(
            "toolhead",
            Status::from([
                ("z".to_string(), Value::from(2)),
                ("a".to_string(), Value::from("low")),
            ]),
        ));

        assert_eq!(root.render(), r#"{toolhead = {a = "low", z = 2}}"#);
    }

    #[test]
    fn test_lua_index_and_tostring() {
        let lua = Lua::new();
        lua.globals()
            .set("state", StateProxy::root(registry_with("toolhead", nested_status())))
            .unwrap();

        lua.load(
            r#"
                x = state.toolhead.position.x
                missing = state.toolhead.position.q
                unknown = state.probe
                text = tostring(state.toolhead.position)
            "#,
        )
        .exec()
        .unwrap();

        assert_eq!(lua.globals().get::<f64>("x").unwrap(), 107.5);
        assert!(lua.globals().get::<LuaValue>("missing").unwrap().is_nil());
        assert!(lua.globals().get::<LuaValue>("unknown").unwrap().is_nil());
        assert_eq!(
            lua.globals().get::<String>("text").unwrap(),
            "{x = 107.5, y = 80}"
        );
    }

    #[test]
    fn test_indexing_a_leaf_raises() {
        let lua = Lua::new();
        lua.globals()
            .set("state", StateProxy::root(registry_with("toolhead", nested_status())))
            .unwrap();

        let err = lua
            .load("return state.toolhead.homed_axes.x")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("index"));
    }
}
