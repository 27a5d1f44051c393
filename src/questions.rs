//! Question schema consumed to seed blank answer sets.
//!
//! Only `identifier` and `default` matter here; the interactive flow that asks the
//! questions lives elsewhere.

use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub identifier: String,
    #[serde(default)]
    pub question: String,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Follow-up questions asked when this one is answered
    #[serde(default)]
    pub dependent: Vec<Question>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Domain,
    Group,
    Node,
    Local,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Questions {
    domain: Vec<Question>,
    group: Vec<Question>,
    node: Vec<Question>,
    local: Vec<Question>,
}

impl Questions {
    /// Loads the schema, or an empty one if the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No question schema at {}", path.display());
            return Ok(Self::default());
        }
        debug!("Loading question schema from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::yaml(origin, e))
    }

    pub fn section(&self, section: Section) -> &[Question] {
        match section {
            Section::Domain => &self.domain,
            Section::Group => &self.group,
            Section::Node => &self.node,
            Section::Local => &self.local,
        }
    }

    /// Identifier to default for every question in `sections`, dependents included.
    /// Questions without a default map to null. Later sections win on repeated identifiers.
    pub fn defaults(&self, sections: &[Section]) -> Map<String, Value> {
        let mut defaults = Map::new();
        for section in sections {
            collect_defaults(self.section(*section), &mut defaults);
        }
        defaults
    }
}

fn collect_defaults(questions: &[Question], defaults: &mut Map<String, Value>) {
    for question in questions {
        defaults.insert(
            question.identifier.clone(),
            question.default.clone().unwrap_or(Value::Null),
        );
        collect_defaults(&question.dependent, defaults);
    }
}
