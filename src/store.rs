//! YAML-backed raw document store.
//!
//! Every scope owns two independent documents, `configuration` and `answers`, laid out as
//! `<kind>/domain.yaml`, `<kind>/groups/<name>.yaml` and `<kind>/nodes/<name>.yaml`.
//! Documents are read fresh on every load so edits made between invocations are picked up.

use crate::constants::{
    ANSWERS_DIR, CONFIGURATION_DIR, DOMAIN_FILE, GROUPS_DIR, NODES_DIR, PLUGINS_DIR,
};
use crate::error::{Error, Result};
use log::debug;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The two disjoint document kinds kept per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Configuration,
    Answers,
}

impl DocumentKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            DocumentKind::Configuration => CONFIGURATION_DIR,
            DocumentKind::Answers => ANSWERS_DIR,
        }
    }
}

/// Level of the hierarchy a single document belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentScope {
    Domain,
    Group(String),
    Node(String),
}

impl fmt::Display for DocumentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentScope::Domain => write!(f, "domain"),
            DocumentScope::Group(name) => write!(f, "group '{name}'"),
            DocumentScope::Node(name) => write!(f, "node '{name}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store for a plugin's documents, using the same layout under `plugins/<name>/`.
    pub fn plugin(&self, name: &str) -> RawStore {
        RawStore::new(self.root.join(PLUGINS_DIR).join(name))
    }

    pub fn path(&self, kind: DocumentKind, scope: &DocumentScope) -> PathBuf {
        let dir = self.root.join(kind.dir_name());
        match scope {
            DocumentScope::Domain => dir.join(DOMAIN_FILE),
            DocumentScope::Group(name) => dir.join(GROUPS_DIR).join(format!("{name}.yaml")),
            DocumentScope::Node(name) => dir.join(NODES_DIR).join(format!("{name}.yaml")),
        }
    }

    /// Loads one document as it is on disk.
    ///
    /// A missing or empty file yields an empty mapping. The top-level shape is not checked
    /// here; the merger rejects anything that is not a mapping.
    pub fn load(&self, kind: DocumentKind, scope: &DocumentScope) -> Result<Value> {
        let path = self.path(kind, scope);
        if !path.exists() {
            debug!("No {} document for {scope} at {}", kind.dir_name(), path.display());
            return Ok(Value::Object(Default::default()));
        }
        debug!("Loading {} document for {scope} from {}", kind.dir_name(), path.display());
        let content = fs::read_to_string(&path)?;
        parse_document(&content, &path.display().to_string())
    }

    /// Writes a document, creating parent directories as needed.
    pub fn save(&self, kind: DocumentKind, scope: &DocumentScope, document: &Value) -> Result<()> {
        let path = self.path(kind, scope);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(document)
            .map_err(|e| Error::yaml(path.display().to_string(), e))?;
        debug!("Saving {} document for {scope} to {}", kind.dir_name(), path.display());
        fs::write(&path, content)?;
        Ok(())
    }
}

/// Parses YAML content into a document value. Blank or comment-only content is an empty mapping.
pub fn parse_document(content: &str, origin: &str) -> Result<Value> {
    let blank = content.lines().map(str::trim).all(|line| line.is_empty() || line.starts_with('#'));
    if blank {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_yaml::from_str(content).map_err(|e| Error::yaml(origin, e))?;
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_paths() {
        let store = RawStore::new("/var/lib/metalware");
        assert_eq!(
            store.path(DocumentKind::Configuration, &DocumentScope::Domain),
            PathBuf::from("/var/lib/metalware/configuration/domain.yaml")
        );
        assert_eq!(
            store.path(DocumentKind::Answers, &DocumentScope::Group("masters".into())),
            PathBuf::from("/var/lib/metalware/answers/groups/masters.yaml")
        );
        assert_eq!(
            store.plugin("ganglia").path(DocumentKind::Configuration, &DocumentScope::Node("n1".into())),
            PathBuf::from("/var/lib/metalware/plugins/ganglia/configuration/nodes/n1.yaml")
        );
    }

    #[test]
    fn test_comment_only_document_is_empty_mapping() {
        let value = parse_document("# nothing here\n", "inline").unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
