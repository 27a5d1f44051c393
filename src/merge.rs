//! Layered override merging of scope documents.
//!
//! A [`ScopeChain`] lists documents from lowest to highest precedence. Merging folds the
//! chain left to right: nested mappings present on both sides merge key by key, anything
//! else on the higher layer replaces the lower value outright. Sequences are never
//! concatenated.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// One document of a chain, labelled with the scope it came from for error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub label: String,
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeChain {
    layers: Vec<Layer>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&mut self, label: S, data: Value) {
        self.layers.push(Layer { label: label.into(), data });
    }

    pub fn with_layer<S: Into<String>>(mut self, label: S, data: Value) -> Self {
        self.push(label, data);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Merges all layers into one mapping.
    ///
    /// # Errors
    /// * `Error::InvalidScopeDataError` if any layer is not a mapping at the top level.
    ///   Nothing is merged in that case.
    pub fn merge(&self) -> Result<Map<String, Value>> {
        for layer in &self.layers {
            if !layer.data.is_object() {
                return Err(Error::InvalidScopeDataError {
                    scope: layer.label.clone(),
                    found: describe(&layer.data).to_string(),
                });
            }
        }
        let documents: Vec<Value> = self.layers.iter().map(|layer| layer.data.clone()).collect();
        combine_hashes(&documents)
    }
}

/// Deep-merges mappings in order, later ones taking precedence.
///
/// # Errors
/// * `Error::CombineHashError` if any input is not a mapping
pub fn combine_hashes(hashes: &[Value]) -> Result<Map<String, Value>> {
    let mut merged = Map::new();
    for (index, hash) in hashes.iter().enumerate() {
        let Value::Object(hash) = hash else {
            return Err(Error::CombineHashError(format!(
                "input {index} is {}, expected a mapping",
                describe(hash)
            )));
        };
        deep_merge(&mut merged, hash);
    }
    Ok(merged)
}

/// Applies `overlay` on top of `base` in place.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
