use metalware::error::Error;
use metalware::membership::StaticMembership;
use metalware::questions::Questions;
use metalware::settings::Settings;
use metalware::store::RawStore;
use metalware::{Cluster, Field, ScopeOverride};
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn cluster_with_domain(config: &str, max_depth: usize) -> (TempDir, Cluster) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "configuration/domain.yaml", config);
    let cluster = Cluster::new(
        RawStore::new(dir.path()),
        StaticMembership::new(),
        Questions::default(),
        Settings::default().with_max_render_depth(max_depth),
    );
    (dir, cluster)
}

fn value(field: Field) -> serde_json::Value {
    field.as_value().cloned().expect("expected a scalar")
}

#[test]
fn test_rendered_literals_are_coerced() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
number: "  {{ 1230 + 4 }}  "
truthy: "{{ 'true' }}"
falsy: "{{ 1 > 2 }}"
nothing: "{{ 'nil' }}"
text: "{{ 'node' }}01"
quoted_number: "1234"
"#,
        10,
    );
    let config = cluster.domain().config().unwrap();

    assert_eq!(value(config.get("number").unwrap()), json!(1234));
    assert_eq!(value(config.get("truthy").unwrap()), json!(true));
    assert_eq!(value(config.get("falsy").unwrap()), json!(false));
    assert_eq!(value(config.get("nothing").unwrap()), json!(null));
    assert_eq!(value(config.get("text").unwrap()), json!("node01"));
    assert_eq!(value(config.get("quoted_number").unwrap()), json!("1234"));
}

#[test]
fn test_mutual_references_hit_the_depth_bound() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
a: "{{ scope.config.b }}"
b: "{{ scope.config.a }}"
"#,
        10,
    );
    let config = cluster.domain().config().unwrap();

    let err = config.get("a").unwrap_err();
    assert!(matches!(err, Error::RecursiveConfigDepthExceededError { max_depth: 10, .. }));
    assert_eq!(cluster.state().depth(), 0);
}

#[test]
fn test_self_reference_hits_the_depth_bound() {
    let (_dir, cluster) = cluster_with_domain("me: \"x{{ domain.config.me }}\"\n", 5);
    let err = cluster.domain().config().unwrap().get("me").unwrap_err();
    assert!(matches!(err, Error::RecursiveConfigDepthExceededError { max_depth: 5, .. }));
}

#[test]
fn test_dependent_chain_within_bound_resolves() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
l1: "{{ scope.config.l2 }}"
l2: "{{ scope.config.l3 }}"
l3: "{{ 40 + 2 }}"
"#,
        3,
    );
    // l1 is read cold: l1, l2 and l3 each take one render level
    let config = cluster.domain().config().unwrap();
    assert_eq!(value(config.get("l1").unwrap()), json!(42));
    assert_eq!(cluster.state().depth(), 0);
}

#[test]
fn test_top_level_render_takes_one_level() {
    let chain = r#"
l1: "{{ scope.config.l2 }}"
l2: "{{ scope.config.l3 }}"
l3: "{{ 40 + 2 }}"
"#;
    let (_dir, cluster) = cluster_with_domain(chain, 3);
    match cluster.domain().render_string("{{ domain.config.l1 }}") {
        Err(Error::RecursiveConfigDepthExceededError { max_depth, path }) => {
            assert_eq!(max_depth, 3);
            assert_eq!(path, "domain.config.l3");
        }
        other => panic!("Expected RecursiveConfigDepthExceededError, got {other:?}"),
    }

    let (_dir, cluster) = cluster_with_domain(chain, 4);
    assert_eq!(cluster.domain().render_string("{{ domain.config.l1 }}").unwrap(), "42");
}

#[test]
fn test_dependent_chain_past_bound_fails() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
l1: "{{ scope.config.l2 }}"
l2: "{{ scope.config.l3 }}"
l3: "{{ scope.config.l4 }}"
l4: "{{ 40 + 2 }}"
"#,
        3,
    );
    let err = cluster.domain().config().unwrap().get("l1").unwrap_err();
    assert!(matches!(err, Error::RecursiveConfigDepthExceededError { max_depth: 3, .. }));
}

#[test]
fn test_failed_leaf_is_not_cached() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
l1: "{{ scope.config.l2 }}"
l2: "{{ scope.config.l3 }}"
l3: "{{ 40 + 2 }}"
"#,
        2,
    );
    let config = cluster.domain().config().unwrap();
    assert!(config.get("l1").is_err());

    // l3 and l2 resolve on their own, after which l1 only needs one level
    assert_eq!(value(config.get("l2").unwrap()), json!(42));
    assert_eq!(value(config.get("l1").unwrap()), json!(42));
}

#[test]
fn test_syntax_error_surfaces_template() {
    let (_dir, cluster) = cluster_with_domain("broken: \"{{ oops\"\n", 10);
    match cluster.domain().config().unwrap().get("broken") {
        Err(Error::TemplateSyntaxError { template, .. }) => assert_eq!(template, "    {{ oops"),
        other => panic!("Expected TemplateSyntaxError, got {other:?}"),
    }
}

#[test]
fn test_nil_leaf_renders_empty() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
unset: ~
host: "login-{{ scope.config.unset }}{{ scope.config.absent }}"
fallback: "{{ scope.config.absent or 'default' }}"
"#,
        10,
    );
    let config = cluster.domain().config().unwrap();
    assert_eq!(value(config.get("host").unwrap()), json!("login-"));
    assert_eq!(value(config.get("fallback").unwrap()), json!("default"));
}

#[test]
fn test_attribute_on_unset_value_is_an_error() {
    let (_dir, cluster) = cluster_with_domain("bad: \"{{ scope.config.network.ip }}\"\n", 10);
    match cluster.domain().config().unwrap().get("bad") {
        Err(Error::UnsetParameterAccessError { attribute, path }) => {
            assert_eq!(attribute, "ip");
            assert_eq!(path, "domain.config.network");
        }
        other => panic!("Expected UnsetParameterAccessError, got {other:?}"),
    }
}

#[test]
fn test_render_entry_point_coerces() {
    let (_dir, cluster) = cluster_with_domain("count: 3\n", 10);
    let rendered = cluster.render("{{ domain.config.count * 2 }}", &ScopeOverride::Cluster).unwrap();
    assert_eq!(rendered, json!(6));

    let text = cluster.domain().render_string("{{ domain.config.count }}\n").unwrap();
    assert_eq!(text, "3\n");
}

#[test]
fn test_iteration_forces_every_leaf() {
    let (_dir, cluster) = cluster_with_domain(
        r#"
name: demo
fqdn: "{{ scope.config.name }}.local"
nested:
  - path: "/srv/{{ scope.config.name }}"
"#,
        10,
    );
    let config = cluster.domain().config().unwrap();
    assert_eq!(
        config.to_json().unwrap(),
        json!({"name": "demo", "fqdn": "demo.local", "nested": [{"path": "/srv/demo"}]})
    );

    let rendered = cluster
        .domain()
        .render_string("{% for key, value in domain.config|items %}{% if key == 'fqdn' %}{{ value }}{% endif %}{% endfor %}")
        .unwrap();
    assert_eq!(rendered, "demo.local");
}
