//! Lazily rendered value trees.
//!
//! A [`LazyTree`] wraps a merged mapping. Templated string leaves are rendered on first
//! access through the tree's [`LeafRenderer`] and memoized per leaf; nested mappings become
//! child trees sharing the same hooks. Trees loaded from the asset store additionally carry
//! a [`ReferenceResolver`] that turns `^name` strings into other assets.

use crate::constants::ASSET_REFERENCE_MARKER;
use crate::error::Result;
use crate::guard::Unset;
use crate::renderer::{is_template, RenderState};
use indexmap::IndexMap;
use minijinja::value::{Enumerator, Object, ObjectRepr};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Renders one templated leaf. Implementors bind the evaluation context.
pub trait LeafRenderer: Send + Sync {
    fn render_leaf(&self, template: &str, path: &str) -> Result<Value>;
}

/// Resolves a cross-reference marker to the referenced tree.
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, name: &str, field: &str) -> Result<LazyTree>;
}

/// Behaviour shared by a tree and all of its children.
#[derive(Clone)]
pub struct TreeHooks {
    state: Arc<RenderState>,
    renderer: Option<Arc<dyn LeafRenderer>>,
    references: Option<Arc<dyn ReferenceResolver>>,
}

impl TreeHooks {
    pub fn new(state: Arc<RenderState>) -> Self {
        Self { state, renderer: None, references: None }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn LeafRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_references(mut self, references: Arc<dyn ReferenceResolver>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn state(&self) -> &Arc<RenderState> {
        &self.state
    }
}

/// The outcome of looking up one key.
#[derive(Debug, Clone)]
pub enum Field {
    /// The key does not exist
    Absent,
    /// A scalar, or null
    Value(Value),
    Tree(LazyTree),
    List(Vec<Field>),
}

impl Field {
    /// Absent or null.
    pub fn is_nil(&self) -> bool {
        matches!(self, Field::Absent | Field::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&LazyTree> {
        match self {
            Field::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Resolves the field completely into plain data. Absent becomes null.
    pub fn to_json(&self) -> Result<Value> {
        self.to_json_within(&mut Vec::new())
    }

    fn to_json_within(&self, stack: &mut Vec<*const TreeInner>) -> Result<Value> {
        match self {
            Field::Absent => Ok(Value::Null),
            Field::Value(value) => Ok(value.clone()),
            Field::Tree(tree) => tree.to_json_within(stack),
            Field::List(items) => items
                .iter()
                .map(|item| item.to_json_within(stack))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Converts the field for use inside a template.
    pub fn into_template_value(self) -> minijinja::Value {
        match self {
            Field::Absent => minijinja::Value::UNDEFINED,
            Field::Value(value) => minijinja::Value::from_serialize(&value),
            Field::Tree(tree) => minijinja::Value::from_object(tree),
            Field::List(items) => minijinja::Value::from(
                items.into_iter().map(Field::into_template_value).collect::<Vec<_>>(),
            ),
        }
    }
}

struct LazyNode {
    raw: Value,
    resolved: Mutex<Option<Field>>,
}

impl LazyNode {
    fn new(raw: Value) -> Self {
        Self { raw, resolved: Mutex::new(None) }
    }

    fn cached(&self) -> Option<Field> {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store(&self, field: Field) {
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner) = Some(field);
    }
}

struct TreeInner {
    path: String,
    entries: IndexMap<String, LazyNode>,
    hooks: TreeHooks,
}

/// Attribute-addressable view over a merged mapping. Cheap to clone.
#[derive(Clone)]
pub struct LazyTree {
    inner: Arc<TreeInner>,
}

impl fmt::Debug for LazyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTree")
            .field("path", &self.inner.path)
            .field("keys", &self.inner.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LazyTree {
    pub fn new<S: Into<String>>(path: S, data: Map<String, Value>, hooks: TreeHooks) -> Self {
        let entries = data.into_iter().map(|(key, raw)| (key, LazyNode::new(raw))).collect();
        Self { inner: Arc::new(TreeInner { path: path.into(), entries, hooks }) }
    }

    /// Dotted location of this tree, used in messages.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn hooks(&self) -> &TreeHooks {
        &self.inner.hooks
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn child_path(&self, key: &str) -> String {
        if self.inner.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.inner.path)
        }
    }

    /// Looks up one key, rendering and caching it on first access.
    ///
    /// Unknown keys give [`Field::Absent`]. Failed renders are not cached.
    pub fn get(&self, key: &str) -> Result<Field> {
        let Some(node) = self.inner.entries.get(key) else {
            return Ok(Field::Absent);
        };
        if let Some(field) = node.cached() {
            return Ok(field);
        }
        // The lock is not held while building: rendering may come back to this very leaf.
        let field = self.build_field(&self.child_path(key), &node.raw)?;
        node.store(field.clone());
        Ok(field)
    }

    /// Looks up a dotted path such as `networks.pri.ip`.
    pub fn get_path(&self, dotted: &str) -> Result<Field> {
        let mut parts = dotted.split('.');
        let Some(first) = parts.next() else {
            return Ok(Field::Absent);
        };
        let mut field = self.get(first)?;
        for part in parts {
            field = match field {
                Field::Tree(tree) => tree.get(part)?,
                Field::List(items) => match part.parse::<usize>() {
                    Ok(index) => items.into_iter().nth(index).unwrap_or(Field::Absent),
                    Err(_) => Field::Absent,
                },
                _ => Field::Absent,
            };
        }
        Ok(field)
    }

    /// All key/value pairs with every leaf resolved.
    pub fn entries(&self) -> Result<Vec<(String, Field)>> {
        self.keys().map(|key| Ok((key.to_string(), self.get(key)?))).collect()
    }

    /// Resolves the whole tree into plain data.
    pub fn to_json(&self) -> Result<Value> {
        self.to_json_within(&mut Vec::new())
    }

    fn to_json_within(&self, stack: &mut Vec<*const TreeInner>) -> Result<Value> {
        let id = Arc::as_ptr(&self.inner);
        if stack.contains(&id) {
            return Ok(Value::String(format!("{ASSET_REFERENCE_MARKER}{}", self.path())));
        }
        stack.push(id);
        let mut map = Map::new();
        for key in self.keys() {
            let value = self.get(key)?.to_json_within(stack)?;
            map.insert(key.to_string(), value);
        }
        stack.pop();
        Ok(Value::Object(map))
    }

    fn build_field(&self, path: &str, raw: &Value) -> Result<Field> {
        let hooks = &self.inner.hooks;
        match raw {
            Value::Object(map) => Ok(Field::Tree(LazyTree::new(path, map.clone(), hooks.clone()))),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| self.build_field(&format!("{path}.{index}"), item))
                .collect::<Result<Vec<_>>>()
                .map(Field::List),
            Value::String(text) => {
                if let Some(references) = &hooks.references {
                    if let Some(name) = text.strip_prefix(ASSET_REFERENCE_MARKER) {
                        return references.resolve(name, path).map(Field::Tree);
                    }
                }
                match &hooks.renderer {
                    Some(renderer) if is_template(text) => {
                        renderer.render_leaf(text, path).map(Field::Value)
                    }
                    _ => Ok(Field::Value(raw.clone())),
                }
            }
            _ => Ok(Field::Value(raw.clone())),
        }
    }
}

impl Object for LazyTree {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let key = key.as_str()?;
        match self.get(key) {
            Ok(Field::Absent) => {
                Some(Unset::value(self.child_path(key), self.inner.hooks.state.clone()))
            }
            Ok(field) => Some(field.into_template_value()),
            Err(err) => {
                self.inner.hooks.state.defer(err);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.keys().map(minijinja::Value::from).collect())
    }
}
