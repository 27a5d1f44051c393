//! Metalware resolves the layered configuration of a bare-metal cluster.
//! Cluster, group and node documents are merged in precedence order and their
//! templated values are rendered lazily, with the node or group being rendered for in scope.

/// Asset records with `^name` cross-references
pub mod assets;

/// Command-line interface for the metalware binary
pub mod cli;

/// Common constants: directory layout, defaults, markers
pub mod constants;

/// Evaluation contexts and render scope selection
pub mod context;

/// Error types and handling
pub mod error;

/// Warn-once and strict wrappers for nil values
pub mod guard;

/// Lazily rendered, memoized value trees
pub mod lazy;

/// Group membership lookups and genders parsing
pub mod membership;

/// Layered override merging of scope documents
pub mod merge;

/// Cluster, group, node, local and plugin namespaces
pub mod namespace;

/// Question schema used to seed answer defaults
pub mod questions;

/// Template rendering, depth bounding and literal coercion
pub mod renderer;

/// Settings for the engine itself (metalware.yaml)
pub mod settings;

/// YAML-backed raw document store
pub mod store;

pub use context::{EvaluationContext, ScopeOverride, ScopeOverrides};
pub use error::{Error, Result};
pub use lazy::{Field, LazyTree};
pub use namespace::{Cluster, Namespace, Scope};
