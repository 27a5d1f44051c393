//! Nil and missing-value guards layered over [`LazyTree`].
//!
//! [`NilWarning`] logs the first nil access per path and otherwise returns nil.
//! [`AnswerGuard`] does the same for answer sets, or raises
//! [`Error::MissingParameterError`] when strict. Both only intercept keyed access.
//! Inside templates a nil value is exposed as [`Unset`], which renders empty and reports
//! any attribute access on it.

use crate::error::{Error, Result};
use crate::lazy::{Field, LazyTree};
use crate::renderer::RenderState;
use log::warn;
use minijinja::value::{Enumerator, Object, ObjectRepr};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Paths that have already produced a nil warning. Shared between a guard and its children.
#[derive(Debug, Clone, Default)]
struct WarnedPaths(Arc<Mutex<HashSet<String>>>);

impl WarnedPaths {
    /// Records the path; true when it had not been seen before.
    fn first_time(&self, path: &str) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).insert(path.to_string())
    }

    fn snapshot(&self) -> Vec<String> {
        let mut paths: Vec<String> =
            self.0.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect();
        paths.sort();
        paths
    }
}

/// Warn-once wrapper.
#[derive(Clone)]
pub struct NilWarning {
    tree: LazyTree,
    warned: WarnedPaths,
}

impl fmt::Debug for NilWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NilWarning").field(&self.tree).finish()
    }
}

impl NilWarning {
    pub fn new(tree: LazyTree) -> Self {
        Self { tree, warned: WarnedPaths::default() }
    }

    pub fn tree(&self) -> &LazyTree {
        &self.tree
    }

    /// Paths that have triggered a warning so far, sorted.
    pub fn warned_paths(&self) -> Vec<String> {
        self.warned.snapshot()
    }

    /// Looks up a key. A nil result is logged the first time and returned as null.
    pub fn get(&self, key: &str) -> Result<Field> {
        let field = self.tree.get(key)?;
        if field.is_nil() {
            let path = self.tree.child_path(key);
            if self.warned.first_time(&path) {
                warn!("Parameter '{path}' is unset, rendering it as nil");
            }
            return Ok(Field::Value(Value::Null));
        }
        Ok(field)
    }

    fn child(&self, tree: LazyTree) -> Self {
        Self { tree, warned: self.warned.clone() }
    }
}

impl Object for NilWarning {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let key = key.as_str()?;
        let state = self.tree.hooks().state();
        match self.get(key) {
            Ok(field) if field.is_nil() => {
                Some(Unset::value(self.tree.child_path(key), state.clone()))
            }
            Ok(field) => Some(guard_value(field, &|tree| {
                minijinja::Value::from_object(self.child(tree))
            })),
            Err(err) => {
                state.defer(err);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.tree.keys().map(minijinja::Value::from).collect())
    }
}

/// Answers wrapper that warns once, or raises when strict.
#[derive(Clone)]
pub struct AnswerGuard {
    tree: LazyTree,
    strict: bool,
    warned: WarnedPaths,
}

impl fmt::Debug for AnswerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerGuard")
            .field("tree", &self.tree)
            .field("strict", &self.strict)
            .finish()
    }
}

impl AnswerGuard {
    pub fn new(tree: LazyTree, strict: bool) -> Self {
        Self { tree, strict, warned: WarnedPaths::default() }
    }

    pub fn tree(&self) -> &LazyTree {
        &self.tree
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn warned_paths(&self) -> Vec<String> {
        self.warned.snapshot()
    }

    /// Looks up an answer.
    ///
    /// # Errors
    /// * `Error::MissingParameterError` in strict mode when the answer is nil
    pub fn get(&self, key: &str) -> Result<Field> {
        let field = self.tree.get(key)?;
        if field.is_nil() {
            let path = self.tree.child_path(key);
            if self.strict {
                return Err(Error::MissingParameterError(path));
            }
            if self.warned.first_time(&path) {
                warn!("Answer '{path}' is unset, rendering it as nil");
            }
            return Ok(Field::Value(Value::Null));
        }
        Ok(field)
    }

    fn child(&self, tree: LazyTree) -> Self {
        Self { tree, strict: self.strict, warned: self.warned.clone() }
    }
}

impl Object for AnswerGuard {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let key = key.as_str()?;
        let state = self.tree.hooks().state();
        match self.get(key) {
            Ok(field) if field.is_nil() => {
                Some(Unset::value(self.tree.child_path(key), state.clone()))
            }
            Ok(field) => Some(guard_value(field, &|tree| {
                minijinja::Value::from_object(self.child(tree))
            })),
            Err(err) => {
                state.defer(err);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.tree.keys().map(minijinja::Value::from).collect())
    }
}

/// Converts a field for templates, wrapping nested trees with `wrap`.
fn guard_value(field: Field, wrap: &dyn Fn(LazyTree) -> minijinja::Value) -> minijinja::Value {
    match field {
        Field::Tree(tree) => wrap(tree),
        Field::List(items) => minijinja::Value::from(
            items.into_iter().map(|item| guard_value(item, wrap)).collect::<Vec<_>>(),
        ),
        other => other.into_template_value(),
    }
}

/// A nil value as seen from a template.
///
/// Renders as the empty string and is falsy. Any attribute access is reported as
/// [`Error::UnsetParameterAccessError`].
pub struct Unset {
    path: String,
    state: Arc<RenderState>,
}

impl fmt::Debug for Unset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unset").field(&self.path).finish()
    }
}

impl Unset {
    pub fn value(path: String, state: Arc<RenderState>) -> minijinja::Value {
        minijinja::Value::from_object(Unset { path, state })
    }
}

impl Object for Unset {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let attribute = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
        self.state.defer(Error::UnsetParameterAccessError { attribute, path: self.path.clone() });
        None
    }

    fn is_true(self: &Arc<Self>) -> bool {
        false
    }

    fn render(self: &Arc<Self>, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}
