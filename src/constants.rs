//! Common constants used throughout metalware.

/// Operator-authored documents
pub const CONFIGURATION_DIR: &str = "configuration";

/// Interactively collected documents
pub const ANSWERS_DIR: &str = "answers";

/// Cluster-wide document name inside a document directory
pub const DOMAIN_FILE: &str = "domain.yaml";

pub const GROUPS_DIR: &str = "groups";
pub const NODES_DIR: &str = "nodes";
pub const PLUGINS_DIR: &str = "plugins";
pub const ASSETS_DIR: &str = "assets";

/// Question schema used to seed blank answer sets
pub const QUESTIONS_FILE: &str = "configure.yaml";

/// Group membership source
pub const GENDERS_FILE: &str = "genders";

/// Supported settings file names
pub const SETTINGS_FILES: [&str; 2] = ["metalware.yaml", "metalware.yml"];

/// Name of the node running the tool itself
pub const LOCAL_NODE: &str = "local";

pub const DEFAULT_MAX_RENDER_DEPTH: usize = 10;

/// Leading character marking an asset field as the name of another asset
pub const ASSET_REFERENCE_MARKER: char = '^';
