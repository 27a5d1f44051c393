//! Scope namespaces: the cluster, its groups, its nodes, the local machine and plugins.
//!
//! A [`Cluster`] is the root of one configuration repository. It hands out [`Namespace`]s,
//! each owning the lazily rendered `config` and `answers` trees for its [`Scope`]. Leaves of
//! those trees render with that namespace as the evaluation scope, so the same template
//! text means different things under different nodes.
//!
//! Namespaces and their caches are owned by the cluster that created them; they refer back
//! to it weakly.

use crate::assets::AssetStore;
use crate::constants::{ASSETS_DIR, GENDERS_FILE, LOCAL_NODE, PLUGINS_DIR, QUESTIONS_FILE};
use crate::context::{EvaluationContext, ScopeOverride};
use crate::error::{Error, Result};
use crate::guard::{AnswerGuard, NilWarning, Unset};
use crate::lazy::{LazyTree, LeafRenderer, TreeHooks};
use crate::membership::{load_genders, GroupMembership};
use crate::merge::ScopeChain;
use crate::questions::{Questions, Section};
use crate::renderer::{coerce_rendered, MiniJinjaRenderer, RenderState, TemplateRenderer};
use crate::settings::Settings;
use crate::store::{DocumentKind, DocumentScope, RawStore};
use log::debug;
use minijinja::value::{Enumerator, Object, ObjectRepr};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Position in the configuration hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Cluster,
    Group(String),
    Node(String),
    /// The machine running the tool
    Local,
    /// A plugin's settings for one node
    Plugin { plugin: String, node: String },
}

impl Scope {
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Cluster => "cluster",
            Scope::Group(_) => "group",
            Scope::Node(_) => "node",
            Scope::Local => "local",
            Scope::Plugin { .. } => "plugin",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Cluster => "domain",
            Scope::Group(name) | Scope::Node(name) => name,
            Scope::Local => LOCAL_NODE,
            Scope::Plugin { plugin, .. } => plugin,
        }
    }

    /// The node this scope renders for, if any.
    pub fn node_name(&self) -> Option<&str> {
        match self {
            Scope::Node(node) | Scope::Plugin { node, .. } => Some(node),
            Scope::Local => Some(LOCAL_NODE),
            Scope::Cluster | Scope::Group(_) => None,
        }
    }

    /// Dotted prefix used for tree paths, e.g. `nodes.node01`.
    pub fn path_label(&self) -> String {
        match self {
            Scope::Cluster => "domain".to_string(),
            Scope::Group(name) => format!("groups.{name}"),
            Scope::Node(name) => format!("nodes.{name}"),
            Scope::Local => LOCAL_NODE.to_string(),
            Scope::Plugin { plugin, node } => format!("plugins.{plugin}.nodes.{node}"),
        }
    }

    fn question_sections(&self) -> &'static [Section] {
        match self {
            Scope::Cluster => &[Section::Domain],
            Scope::Group(_) => &[Section::Domain, Section::Group],
            Scope::Node(_) | Scope::Plugin { .. } => &[Section::Domain, Section::Group, Section::Node],
            Scope::Local => &[Section::Domain, Section::Local],
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Group(name) => write!(f, "group '{name}'"),
            Scope::Node(name) => write!(f, "node '{name}'"),
            Scope::Local => write!(f, "local node"),
            Scope::Plugin { plugin, node } => write!(f, "plugin '{plugin}' for node '{node}'"),
        }
    }
}

struct ClusterInner {
    settings: Settings,
    store: RawStore,
    membership: Arc<dyn GroupMembership>,
    questions: Questions,
    renderer: Arc<dyn TemplateRenderer>,
    state: Arc<RenderState>,
    assets: AssetStore,
    namespaces: Mutex<HashMap<Scope, Namespace>>,
    plugin_questions: Mutex<HashMap<String, Questions>>,
}

impl ClusterInner {
    fn namespace(self: &Arc<Self>, scope: Scope) -> Namespace {
        let mut namespaces = self.namespaces.lock().unwrap_or_else(PoisonError::into_inner);
        namespaces
            .entry(scope.clone())
            .or_insert_with(|| Namespace::new(scope, Arc::downgrade(self)))
            .clone()
    }

    fn plugin_names(&self) -> Result<Vec<String>> {
        let dir = self.store.root().join(PLUGINS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn questions_for(&self, scope: &Scope) -> Result<Questions> {
        let Scope::Plugin { plugin, .. } = scope else {
            return Ok(self.questions.clone());
        };
        let mut cache = self.plugin_questions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(questions) = cache.get(plugin) {
            return Ok(questions.clone());
        }
        let questions = Questions::load(self.store.plugin(plugin).root().join(QUESTIONS_FILE))?;
        cache.insert(plugin.clone(), questions.clone());
        Ok(questions)
    }

    /// Renders `template` with `namespace` in scope, one level deeper than the caller.
    fn render_in(self: &Arc<Self>, namespace: &Namespace, template: &str, path: &str) -> Result<String> {
        let _level = self.state.enter(path)?;
        let context = evaluation_context(self, namespace);
        let rendered = self.renderer.render(template, context.into_value());
        match self.state.take_deferred() {
            Some(err) => Err(err),
            None => rendered,
        }
    }
}

/// Root of one configuration repository.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("root", &self.inner.store.root())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Cluster {
    /// Opens the repository at `root`, reading group membership from its genders file and
    /// question defaults from its question schema.
    pub fn open<P: Into<PathBuf>>(root: P, settings: Settings) -> Result<Self> {
        let root = root.into();
        let membership = load_genders(root.join(GENDERS_FILE))?;
        let questions = Questions::load(root.join(QUESTIONS_FILE))?;
        Ok(Self::new(RawStore::new(root), membership, questions, settings))
    }

    pub fn new<M: GroupMembership + 'static>(
        store: RawStore,
        membership: M,
        questions: Questions,
        settings: Settings,
    ) -> Self {
        let state = Arc::new(RenderState::new(settings.max_render_depth));
        let assets = AssetStore::new(store.root().join(ASSETS_DIR), state.clone());
        debug!("Opening cluster at {}", store.root().display());
        Self {
            inner: Arc::new(ClusterInner {
                settings,
                store,
                membership: Arc::new(membership),
                questions,
                renderer: Arc::new(MiniJinjaRenderer::new()),
                state,
                assets,
                namespaces: Mutex::new(HashMap::new()),
                plugin_questions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn store(&self) -> &RawStore {
        &self.inner.store
    }

    pub fn membership(&self) -> &dyn GroupMembership {
        self.inner.membership.as_ref()
    }

    pub fn assets(&self) -> &AssetStore {
        &self.inner.assets
    }

    pub fn state(&self) -> &Arc<RenderState> {
        &self.inner.state
    }

    pub fn namespace_for(&self, scope: Scope) -> Namespace {
        self.inner.namespace(scope)
    }

    pub fn domain(&self) -> Namespace {
        self.namespace_for(Scope::Cluster)
    }

    pub fn group(&self, name: &str) -> Namespace {
        self.namespace_for(Scope::Group(name.to_string()))
    }

    pub fn node(&self, name: &str) -> Namespace {
        self.namespace_for(Scope::Node(name.to_string()))
    }

    pub fn local(&self) -> Namespace {
        self.namespace_for(Scope::Local)
    }

    pub fn plugin(&self, plugin: &str, node: &str) -> Namespace {
        self.namespace_for(Scope::Plugin { plugin: plugin.to_string(), node: node.to_string() })
    }

    /// Namespace selected by a render override; none selects the cluster.
    pub fn namespace(&self, scope: &ScopeOverride) -> Namespace {
        match scope {
            ScopeOverride::Cluster => self.domain(),
            ScopeOverride::Node(name) => self.node(name),
            ScopeOverride::Group(name) => self.group(name),
        }
    }

    pub fn nodes(&self) -> Vec<Namespace> {
        self.inner.membership.node_names().iter().map(|name| self.node(name)).collect()
    }

    pub fn groups(&self) -> Vec<Namespace> {
        self.inner.membership.group_names().iter().map(|name| self.group(name)).collect()
    }

    pub fn plugin_names(&self) -> Result<Vec<String>> {
        self.inner.plugin_names()
    }

    /// Renders `template` for the selected scope and coerces the result.
    pub fn render(&self, template: &str, scope: &ScopeOverride) -> Result<Value> {
        self.namespace(scope).render_value(template)
    }
}

struct NamespaceInner {
    scope: Scope,
    cluster: Weak<ClusterInner>,
    config: Mutex<Option<NilWarning>>,
    answers: Mutex<Option<AnswerGuard>>,
}

/// One scope of the hierarchy with its merged, lazily rendered documents. Cheap to clone.
#[derive(Clone)]
pub struct Namespace {
    inner: Arc<NamespaceInner>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Namespace").field(&self.inner.scope).finish()
    }
}

impl Namespace {
    fn new(scope: Scope, cluster: Weak<ClusterInner>) -> Self {
        Self {
            inner: Arc::new(NamespaceInner {
                scope,
                cluster,
                config: Mutex::new(None),
                answers: Mutex::new(None),
            }),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn name(&self) -> &str {
        self.inner.scope.name()
    }

    fn cluster(&self) -> Result<Arc<ClusterInner>> {
        self.inner.cluster.upgrade().ok_or_else(|| {
            Error::ConfigError(format!("{} outlived the cluster it belongs to", self.inner.scope))
        })
    }

    /// Documents contributing to this scope, lowest precedence first.
    pub fn chain(&self, kind: DocumentKind) -> Result<ScopeChain> {
        let cluster = self.cluster()?;
        let scope = &self.inner.scope;
        let mut chain = ScopeChain::new();

        if kind == DocumentKind::Answers {
            let defaults = cluster.questions_for(scope)?.defaults(scope.question_sections());
            chain.push(format!("question defaults for {scope}"), Value::Object(defaults));
        }

        let store = match scope {
            Scope::Plugin { plugin, .. } => cluster.store.plugin(plugin),
            _ => cluster.store.clone(),
        };
        let mut documents = vec![DocumentScope::Domain];
        match scope {
            Scope::Cluster => {}
            Scope::Group(name) => documents.push(DocumentScope::Group(name.clone())),
            Scope::Node(_) | Scope::Local | Scope::Plugin { .. } => {
                let node = scope.node_name().unwrap_or(LOCAL_NODE);
                documents.extend(
                    cluster.membership.groups_for_node(node).into_iter().map(DocumentScope::Group),
                );
                documents.push(DocumentScope::Node(node.to_string()));
            }
        }
        for document in documents {
            let data = store.load(kind, &document)?;
            chain.push(format!("{} of {document}", kind.dir_name()), data);
        }
        Ok(chain)
    }

    fn build_tree(&self, kind: DocumentKind) -> Result<LazyTree> {
        let cluster = self.cluster()?;
        let merged = self.chain(kind)?.merge()?;
        let renderer = ScopeRenderer { cluster: Arc::downgrade(&cluster), scope: self.inner.scope.clone() };
        let hooks = TreeHooks::new(cluster.state.clone()).with_renderer(Arc::new(renderer));
        let path = format!("{}.{}", self.inner.scope.path_label(), kind_attribute(kind));
        Ok(LazyTree::new(path, merged, hooks))
    }

    /// Configuration guarded by the warn-once nil wrapper. Built once per namespace.
    pub fn config_guard(&self) -> Result<NilWarning> {
        let mut slot = self.inner.config.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(guard) = slot.as_ref() {
            return Ok(guard.clone());
        }
        let guard = NilWarning::new(self.build_tree(DocumentKind::Configuration)?);
        *slot = Some(guard.clone());
        Ok(guard)
    }

    /// Answers guarded by the answers wrapper, strict when the settings say so.
    pub fn answer_guard(&self) -> Result<AnswerGuard> {
        let mut slot = self.inner.answers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(guard) = slot.as_ref() {
            return Ok(guard.clone());
        }
        let strict = self.cluster()?.settings.strict_answers;
        let guard = AnswerGuard::new(self.build_tree(DocumentKind::Answers)?, strict);
        *slot = Some(guard.clone());
        Ok(guard)
    }

    pub fn config(&self) -> Result<LazyTree> {
        Ok(self.config_guard()?.tree().clone())
    }

    pub fn answers(&self) -> Result<LazyTree> {
        Ok(self.answer_guard()?.tree().clone())
    }

    /// Group names of a node-like scope, primary group first. A group lists itself.
    pub fn groups(&self) -> Vec<String> {
        match &self.inner.scope {
            Scope::Group(name) => vec![name.clone()],
            scope => match (scope.node_name(), self.cluster()) {
                (Some(node), Ok(cluster)) => cluster.membership.groups_for_node(node),
                _ => Vec::new(),
            },
        }
    }

    pub fn primary_group(&self) -> Option<Namespace> {
        let cluster = self.cluster().ok()?;
        let node = self.inner.scope.node_name()?;
        let group = cluster.membership.primary_group(node)?;
        Some(cluster.namespace(Scope::Group(group)))
    }

    /// 1-based position of a node within its primary group.
    pub fn index(&self) -> Option<usize> {
        let cluster = self.cluster().ok()?;
        cluster.membership.node_index(self.inner.scope.node_name()?)
    }

    /// Member nodes of a group, or every node for the cluster.
    pub fn nodes(&self) -> Vec<Namespace> {
        let Ok(cluster) = self.cluster() else {
            return Vec::new();
        };
        let names = match &self.inner.scope {
            Scope::Cluster => cluster.membership.node_names(),
            Scope::Group(group) => cluster.membership.nodes_in_group(group),
            _ => Vec::new(),
        };
        names.into_iter().map(|name| cluster.namespace(Scope::Node(name))).collect()
    }

    /// Renders a template with this namespace in scope, without coercion.
    pub fn render_string(&self, template: &str) -> Result<String> {
        let path = format!("{} template", self.inner.scope.path_label());
        self.cluster()?.render_in(self, template, &path)
    }

    /// Renders a template with this namespace in scope and coerces the output.
    pub fn render_value(&self, template: &str) -> Result<Value> {
        self.render_string(template).map(coerce_rendered)
    }

    /// Reads and renders a template file with this namespace in scope.
    pub fn render_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        debug!("Rendering {} for {}", path.display(), self.inner.scope);
        let template = std::fs::read_to_string(path)?;
        self.cluster()?.render_in(self, &template, &path.display().to_string())
    }

    /// Template-facing attribute. Anything this scope does not have is [`Unset`].
    fn attribute(&self, name: &str) -> Result<minijinja::Value> {
        let scope = &self.inner.scope;
        let value = match name {
            "name" => minijinja::Value::from(self.name()),
            "kind" => minijinja::Value::from(scope.kind()),
            "config" => minijinja::Value::from_object(self.config_guard()?),
            "answers" => minijinja::Value::from_object(self.answer_guard()?),
            "groups" if scope.node_name().is_some() => minijinja::Value::from(self.groups()),
            "group" => match self.primary_group() {
                Some(group) => minijinja::Value::from_object(group),
                None => self.unset(name)?,
            },
            "index" => match self.index() {
                Some(index) => minijinja::Value::from(index),
                None => self.unset(name)?,
            },
            "nodes" if matches!(scope, Scope::Cluster | Scope::Group(_)) => minijinja::Value::from(
                self.nodes().into_iter().map(minijinja::Value::from_object).collect::<Vec<_>>(),
            ),
            "plugins" if matches!(scope, Scope::Node(_)) => {
                minijinja::Value::from_object(PluginIndex {
                    cluster: self.inner.cluster.clone(),
                    node: scope.name().to_string(),
                })
            }
            _ => self.unset(name)?,
        };
        Ok(value)
    }

    fn unset(&self, attribute: &str) -> Result<minijinja::Value> {
        let path = format!("{}.{attribute}", self.inner.scope.path_label());
        Ok(Unset::value(path, self.cluster()?.state.clone()))
    }
}

fn kind_attribute(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Configuration => "config",
        DocumentKind::Answers => "answers",
    }
}

impl Object for Namespace {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        match self.attribute(key.as_str()?) {
            Ok(value) => Some(value),
            Err(err) => {
                if let Ok(cluster) = self.cluster() {
                    cluster.state.defer(err);
                }
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["name", "kind", "config", "answers"])
    }
}

/// Renders tree leaves with a fixed scope.
struct ScopeRenderer {
    cluster: Weak<ClusterInner>,
    scope: Scope,
}

impl LeafRenderer for ScopeRenderer {
    fn render_leaf(&self, template: &str, path: &str) -> Result<Value> {
        let cluster = self.cluster.upgrade().ok_or_else(|| {
            Error::ConfigError(format!("cannot render '{path}' after its cluster was dropped"))
        })?;
        let namespace = cluster.namespace(self.scope.clone());
        cluster.render_in(&namespace, template, path).map(coerce_rendered)
    }
}

#[derive(Debug, Clone, Copy)]
enum IndexKind {
    Nodes,
    Groups,
}

impl IndexKind {
    fn label(&self) -> &'static str {
        match self {
            IndexKind::Nodes => "nodes",
            IndexKind::Groups => "groups",
        }
    }
}

/// `nodes` and `groups` bindings: name to namespace maps over the membership.
struct NamespaceIndex {
    cluster: Weak<ClusterInner>,
    kind: IndexKind,
}

impl fmt::Debug for NamespaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamespaceIndex").field(&self.kind).finish()
    }
}

impl NamespaceIndex {
    fn names(&self, cluster: &ClusterInner) -> Vec<String> {
        match self.kind {
            IndexKind::Nodes => cluster.membership.node_names(),
            IndexKind::Groups => cluster.membership.group_names(),
        }
    }
}

impl Object for NamespaceIndex {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let name = key.as_str()?;
        let cluster = self.cluster.upgrade()?;
        if !self.names(&cluster).iter().any(|known| known == name) {
            let path = format!("{}.{name}", self.kind.label());
            return Some(Unset::value(path, cluster.state.clone()));
        }
        let scope = match self.kind {
            IndexKind::Nodes => Scope::Node(name.to_string()),
            IndexKind::Groups => Scope::Group(name.to_string()),
        };
        Some(minijinja::Value::from_object(cluster.namespace(scope)))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let Some(cluster) = self.cluster.upgrade() else {
            return Enumerator::Empty;
        };
        Enumerator::Values(self.names(&cluster).into_iter().map(minijinja::Value::from).collect())
    }
}

/// `node.plugins` binding: plugin name to that plugin's namespace for the node.
struct PluginIndex {
    cluster: Weak<ClusterInner>,
    node: String,
}

impl fmt::Debug for PluginIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginIndex").field(&self.node).finish()
    }
}

impl Object for PluginIndex {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &minijinja::Value) -> Option<minijinja::Value> {
        let plugin = key.as_str()?;
        let cluster = self.cluster.upgrade()?;
        match cluster.plugin_names() {
            Ok(names) if names.iter().any(|name| name == plugin) => {
                let scope = Scope::Plugin { plugin: plugin.to_string(), node: self.node.clone() };
                Some(minijinja::Value::from_object(cluster.namespace(scope)))
            }
            Ok(_) => {
                let path = format!("nodes.{}.plugins.{plugin}", self.node);
                Some(Unset::value(path, cluster.state.clone()))
            }
            Err(err) => {
                cluster.state.defer(err);
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let names = self.cluster.upgrade().and_then(|cluster| cluster.plugin_names().ok());
        Enumerator::Values(names.unwrap_or_default().into_iter().map(minijinja::Value::from).collect())
    }
}

/// Bindings for a render performed on behalf of `namespace`.
fn evaluation_context(cluster: &Arc<ClusterInner>, namespace: &Namespace) -> EvaluationContext {
    let index = |kind| {
        minijinja::Value::from_object(NamespaceIndex { cluster: Arc::downgrade(cluster), kind })
    };
    let mut context = EvaluationContext::new()
        .with("domain", minijinja::Value::from_object(cluster.namespace(Scope::Cluster)))
        .with("local", minijinja::Value::from_object(cluster.namespace(Scope::Local)))
        .with("nodes", index(IndexKind::Nodes))
        .with("groups", index(IndexKind::Groups))
        .with("assets", minijinja::Value::from_object(cluster.assets.clone()))
        .with("scope", minijinja::Value::from_object(namespace.clone()));

    match namespace.scope() {
        Scope::Cluster => {}
        Scope::Group(_) => context.bind("group", minijinja::Value::from_object(namespace.clone())),
        Scope::Node(_) | Scope::Local => {
            context.bind("node", minijinja::Value::from_object(namespace.clone()))
        }
        Scope::Plugin { node, .. } => {
            let node = cluster.namespace(Scope::Node(node.clone()));
            context.bind("node", minijinja::Value::from_object(node));
            context.bind("plugin", minijinja::Value::from_object(namespace.clone()));
        }
    }
    // A scope without a node or group still answers to those names, as unset values
    for name in ["node", "group"] {
        if context.get(name).is_none() {
            context.bind(name, Unset::value(name.to_string(), cluster.state.clone()));
        }
    }
    context
}
