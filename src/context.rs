//! Evaluation contexts and render scope selection.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Named bindings visible to one template evaluation.
///
/// Built fresh for every render call and handed to the renderer by value.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    bindings: BTreeMap<String, minijinja::Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<S: Into<String>>(&mut self, name: S, value: minijinja::Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn with<S: Into<String>>(mut self, name: S, value: minijinja::Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&minijinja::Value> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn into_value(self) -> minijinja::Value {
        minijinja::Value::from(self.bindings)
    }
}

/// Which namespace a render is performed for. Defaults to the whole cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeOverride {
    #[default]
    Cluster,
    Node(String),
    Group(String),
}

/// Loose node/group selection as it arrives from a caller such as the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeOverrides {
    pub node: Option<String>,
    pub group: Option<String>,
}

impl ScopeOverrides {
    /// # Errors
    /// * `Error::ConflictingScopeError` if both a node and a group are given
    pub fn resolve(self) -> Result<ScopeOverride> {
        match (self.node, self.group) {
            (Some(node), Some(group)) => Err(Error::ConflictingScopeError { node, group }),
            (Some(node), None) => Ok(ScopeOverride::Node(node)),
            (None, Some(group)) => Ok(ScopeOverride::Group(group)),
            (None, None) => Ok(ScopeOverride::Cluster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_resolve() {
        let node = ScopeOverrides { node: Some("n1".into()), group: None };
        assert_eq!(node.resolve().unwrap(), ScopeOverride::Node("n1".into()));
        assert_eq!(ScopeOverrides::default().resolve().unwrap(), ScopeOverride::Cluster);
    }

    #[test]
    fn test_node_and_group_conflict() {
        let both = ScopeOverrides { node: Some("n1".into()), group: Some("compute".into()) };
        assert!(matches!(both.resolve(), Err(Error::ConflictingScopeError { .. })));
    }
}
