//! Asset records (racks, servers, PDUs, ...) with lazy cross-references.
//!
//! Assets live as one YAML file each under `assets/`, typically `assets/<type>/<name>.yaml`.
//! A string field starting with `^` names another asset and resolves, on access, to that
//! asset's tree.

use crate::error::{Error, Result};
use crate::guard::Unset;
use crate::lazy::{LazyTree, ReferenceResolver, TreeHooks};
use crate::merge::describe;
use crate::renderer::RenderState;
use crate::store::parse_document;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use log::{debug, warn};
use minijinja::value::{Enumerator, Object, ObjectRepr};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use walkdir::WalkDir;

/// Type given to assets stored directly under the assets directory.
const UNTYPED_ASSET: &str = "asset";

#[derive(Debug, Clone)]
struct AssetFile {
    path: PathBuf,
    asset_type: String,
}

struct AssetInner {
    root: PathBuf,
    state: Arc<RenderState>,
    index: Mutex<Option<IndexMap<String, AssetFile>>>,
    loaded: Mutex<HashMap<String, LazyTree>>,
}

#[derive(Clone)]
pub struct AssetStore {
    inner: Arc<AssetInner>,
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore").field("root", &self.inner.root).finish()
    }
}

impl AssetStore {
    pub fn new<P: Into<PathBuf>>(root: P, state: Arc<RenderState>) -> Self {
        Self {
            inner: Arc::new(AssetInner {
                root: root.into(),
                state,
                index: Mutex::new(None),
                loaded: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Names of all assets, in discovery order.
    pub fn names(&self) -> Result<Vec<String>> {
        self.with_index(|index| index.keys().cloned().collect())
    }

    /// Loads an asset by name, `None` if no such asset exists.
    pub fn find(&self, name: &str) -> Result<Option<LazyTree>> {
        load_asset(&self.inner, name)
    }

    pub fn get(&self, name: &str) -> Result<LazyTree> {
        self.find(name)?
            .ok_or_else(|| Error::ConfigError(format!("unknown asset '{name}'")))
    }

    fn with_index<T>(&self, f: impl FnOnce(&IndexMap<String, AssetFile>) -> T) -> Result<T> {
        with_index(&self.inner, f)
    }
}

fn with_index<T>(
    inner: &AssetInner,
    f: impl FnOnce(&IndexMap<String, AssetFile>) -> T,
) -> Result<T> {
    let mut guard = inner.index.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_none() {
        *guard = Some(discover(&inner.root)?);
    }
    Ok(f(guard.get_or_insert_with(IndexMap::new)))
}

fn load_asset(inner: &Arc<AssetInner>, name: &str) -> Result<Option<LazyTree>> {
    if let Some(tree) = inner.loaded.lock().unwrap_or_else(PoisonError::into_inner).get(name) {
        return Ok(Some(tree.clone()));
    }
    let Some(file) = with_index(inner, |index| index.get(name).cloned())? else {
        return Ok(None);
    };
    debug!("Loading asset '{name}' from {}", file.path.display());
    let content = std::fs::read_to_string(&file.path)?;
    let mut data = match parse_document(&content, &file.path.display().to_string())? {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidScopeDataError {
                scope: format!("asset '{name}'"),
                found: describe(&other).to_string(),
            })
        }
    };
    data.insert("metadata".to_string(), json!({"name": name, "type": file.asset_type}));

    let references = AssetReferences { store: Arc::downgrade(inner) };
    let hooks = TreeHooks::new(inner.state.clone()).with_references(Arc::new(references));
    let tree = LazyTree::new(name, data, hooks);
    inner
        .loaded
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.to_string(), tree.clone());
    Ok(Some(tree))
}

fn asset_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["**/*.yaml", "**/*.yml"] {
        builder.add(Glob::new(pattern).map_err(|e| Error::ConfigError(e.to_string()))?);
    }
    builder.build().map_err(|e| Error::ConfigError(e.to_string()))
}

fn discover(root: &Path) -> Result<IndexMap<String, AssetFile>> {
    let mut index = IndexMap::new();
    if !root.exists() {
        debug!("No assets directory at {}", root.display());
        return Ok(index);
    }
    let globs = asset_globs()?;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(e.into()))?;
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if !entry.file_type().is_file() || !globs.is_match(relative) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let asset_type = relative
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or(UNTYPED_ASSET)
            .to_string();
        if index.contains_key(name) {
            warn!("Ignoring duplicate asset '{name}' at {}", path.display());
            continue;
        }
        index.insert(name.to_string(), AssetFile { path: path.to_path_buf(), asset_type });
    }
    Ok(index)
}

struct AssetReferences {
    store: Weak<AssetInner>,
}

impl ReferenceResolver for AssetReferences {
    fn resolve(&self, name: &str, field: &str) -> Result<LazyTree> {
        let missing = || Error::AssetReferenceError {
            field: field.to_string(),
            name: name.to_string(),
        };
        let store = self.store.upgrade().ok_or_else(missing)?;
        load_asset(&store, name)?.ok_or_else(missing)
    }
}

impl Object for AssetStore {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let name = key.as_str()?;
        match self.find(name) {
            Ok(Some(tree)) => Some(minijinja::Value::from_object(tree)),
            Ok(None) => Some(Unset::value(format!("assets.{name}"), self.inner.state.clone())),
            Err(err) => {
                self.inner.state.defer(err);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        match self.names() {
            Ok(names) => Enumerator::Values(names.into_iter().map(minijinja::Value::from).collect()),
            Err(err) => {
                self.inner.state.defer(err);
                Enumerator::Empty
            }
        }
    }
}
