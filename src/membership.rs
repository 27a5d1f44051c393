//! Group membership lookups.
//!
//! The engine only asks two questions: which groups a node belongs to, in order, and which
//! nodes a group contains, in order. [`StaticMembership`] answers them from memory and can be
//! loaded from a genders file.

use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<prefix>[^\[]*)\[(?P<ranges>[^\]]+)\](?P<suffix>.*)$").unwrap());

pub trait GroupMembership: Send + Sync {
    /// Groups of a node, primary group first.
    fn groups_for_node(&self, node: &str) -> Vec<String>;

    /// Members of a group in listed order.
    fn nodes_in_group(&self, group: &str) -> Vec<String>;

    fn group_names(&self) -> Vec<String>;

    fn node_names(&self) -> Vec<String>;

    fn primary_group(&self, node: &str) -> Option<String> {
        self.groups_for_node(node).into_iter().next()
    }

    /// 1-based position of the node within its primary group.
    fn node_index(&self, node: &str) -> Option<usize> {
        let group = self.primary_group(node)?;
        self.nodes_in_group(&group).iter().position(|member| member == node).map(|i| i + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    nodes: IndexMap<String, IndexSet<String>>,
}

impl StaticMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with its groups. Groups already recorded for the node keep their place.
    pub fn add_node<S: AsRef<str>>(&mut self, node: &str, groups: &[S]) {
        let entry = self.nodes.entry(node.to_string()).or_default();
        for group in groups {
            entry.insert(group.as_ref().to_string());
        }
    }

    pub fn with_node<S: AsRef<str>>(mut self, node: &str, groups: &[S]) -> Self {
        self.add_node(node, groups);
        self
    }
}

impl GroupMembership for StaticMembership {
    fn groups_for_node(&self, node: &str) -> Vec<String> {
        self.nodes.get(node).map(|groups| groups.iter().cloned().collect()).unwrap_or_default()
    }

    fn nodes_in_group(&self, group: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, groups)| groups.contains(group))
            .map(|(node, _)| node.clone())
            .collect()
    }

    fn group_names(&self) -> Vec<String> {
        let mut names = IndexSet::new();
        for groups in self.nodes.values() {
            names.extend(groups.iter().cloned());
        }
        names.into_iter().collect()
    }

    fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }
}

/// Loads membership from a genders file. A missing file gives an empty membership.
pub fn load_genders<P: AsRef<Path>>(path: P) -> Result<StaticMembership> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No genders file at {}", path.display());
        return Ok(StaticMembership::new());
    }
    debug!("Loading genders from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_genders(&content)
}

/// Parses genders content: `<nodes> <attr>,<attr>` per line, `#` comments.
///
/// Attributes with a value (`key=value`) are not groups.
pub fn parse_genders(content: &str) -> Result<StaticMembership> {
    let mut membership = StaticMembership::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let mut columns = line.split_whitespace();
        let (Some(hosts), attributes) = (columns.next(), columns.next()) else {
            continue;
        };
        if columns.next().is_some() {
            return Err(Error::ConfigError(format!(
                "genders line {} has more than two columns",
                number + 1
            )));
        }
        let groups: Vec<&str> = attributes
            .map(|attrs| attrs.split(',').filter(|a| !a.is_empty() && !a.contains('=')).collect())
            .unwrap_or_default();
        for node in expand_hostlist(hosts)? {
            membership.add_node(&node, &groups);
        }
    }
    Ok(membership)
}

/// Expands a comma separated host list with bracket ranges, e.g. `node[01-03,07],login1`.
pub fn expand_hostlist(hostlist: &str) -> Result<Vec<String>> {
    let mut hosts = Vec::new();
    for token in split_outside_brackets(hostlist) {
        let Some(captures) = RANGE.captures(token) else {
            hosts.push(token.to_string());
            continue;
        };
        let (prefix, suffix) = (&captures["prefix"], &captures["suffix"]);
        for range in captures["ranges"].split(',') {
            let (start, end) = range.split_once('-').unwrap_or((range, range));
            let invalid = || Error::ConfigError(format!("invalid host range '{token}'"));
            let first: u64 = start.parse().map_err(|_| invalid())?;
            let last: u64 = end.parse().map_err(|_| invalid())?;
            if last < first {
                return Err(invalid());
            }
            let width = start.len();
            for number in first..=last {
                hosts.push(format!("{prefix}{number:0width$}{suffix}"));
            }
        }
    }
    Ok(hosts)
}

fn split_outside_brackets(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (index, c) in list.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_hostlist() {
        assert_eq!(
            expand_hostlist("node[01-03,07],login1").unwrap(),
            vec!["node01", "node02", "node03", "node07", "login1"]
        );
        assert_eq!(expand_hostlist("gpu[8-10]-ib").unwrap(), vec!["gpu8-ib", "gpu9-ib", "gpu10-ib"]);
        assert!(expand_hostlist("node[05-01]").is_err());
    }

    #[test]
    fn test_node_index_is_one_based() {
        let membership = StaticMembership::new()
            .with_node("n1", &["compute", "all"])
            .with_node("n2", &["compute", "all"])
            .with_node("m1", &["masters", "all"]);

        assert_eq!(membership.node_index("n2"), Some(2));
        assert_eq!(membership.node_index("m1"), Some(1));
        assert_eq!(membership.node_index("unknown"), None);
    }
}
