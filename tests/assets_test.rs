use metalware::error::Error;
use metalware::settings::Settings;
use metalware::{Cluster, Field};
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn repository() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "assets/racks/rack1.yaml", "units: 42\npdu: ^pdu1\n");
    write(root, "assets/pdus/pdu1.yaml", "ports: 24\nmodel: apc\n");
    write(root, "assets/switch.yml", "uplinks:\n  - ^rack1\n  - spare\n");
    dir
}

#[test]
fn test_discovery() {
    let dir = repository();
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    assert_eq!(cluster.assets().names().unwrap(), vec!["pdu1", "rack1", "switch"]);
    assert!(cluster.assets().find("missing").unwrap().is_none());
}

#[test]
fn test_reference_resolves_to_record_with_metadata() {
    let dir = repository();
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    let rack = cluster.assets().get("rack1").unwrap();
    let pdu = rack.get("pdu").unwrap();
    assert_eq!(
        pdu.to_json().unwrap(),
        json!({"ports": 24, "model": "apc", "metadata": {"name": "pdu1", "type": "pdus"}})
    );

    let switch = cluster.assets().get("switch").unwrap();
    assert_eq!(switch.get_path("metadata.type").unwrap().as_value(), Some(&json!("asset")));
    assert_eq!(switch.get_path("uplinks.0.units").unwrap().as_value(), Some(&json!(42)));
    assert_eq!(switch.get_path("uplinks.1").unwrap().as_value(), Some(&json!("spare")));
}

#[test]
fn test_unknown_reference() {
    let dir = repository();
    write(dir.path(), "assets/racks/rack2.yaml", "pdu: ^pdu9\n");
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    let rack = cluster.assets().get("rack2").unwrap();
    match rack.get("pdu") {
        Err(Error::AssetReferenceError { field, name }) => {
            assert_eq!(field, "rack2.pdu");
            assert_eq!(name, "pdu9");
        }
        other => panic!("Expected AssetReferenceError, got {other:?}"),
    }
}

#[test]
fn test_cyclic_references_are_marked() {
    let dir = repository();
    write(dir.path(), "assets/pdus/pdu1.yaml", "ports: 24\nrack: ^rack1\n");
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    let rack = cluster.assets().get("rack1").unwrap();
    assert_eq!(
        rack.to_json().unwrap(),
        json!({
            "units": 42,
            "pdu": {"ports": 24, "rack": "^rack1", "metadata": {"name": "pdu1", "type": "pdus"}},
            "metadata": {"name": "rack1", "type": "racks"}
        })
    );
    let back = rack.get_path("pdu.rack").unwrap();
    assert!(matches!(back, Field::Tree(tree) if tree.path() == "rack1"));
}

#[test]
fn test_assets_in_templates() {
    let dir = repository();
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    let rendered = cluster
        .domain()
        .render_string("{{ assets.rack1.pdu.metadata.name }}/{{ assets.rack1.pdu.ports }}")
        .unwrap();
    assert_eq!(rendered, "pdu1/24");

    write(dir.path(), "assets/racks/rack2.yaml", "pdu: ^pdu9\n");
    let fresh = Cluster::open(dir.path(), Settings::default()).unwrap();
    let err = fresh.domain().render_string("{{ assets.rack2.pdu.ports }}").unwrap_err();
    assert!(matches!(err, Error::AssetReferenceError { .. }));
}

#[test]
fn test_attribute_on_absent_asset_field() {
    let dir = repository();
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    match cluster.domain().render_string("{{ assets.rack1.colour.name }}") {
        Err(Error::UnsetParameterAccessError { attribute, path }) => {
            assert_eq!(attribute, "name");
            assert_eq!(path, "rack1.colour");
        }
        other => panic!("Expected UnsetParameterAccessError, got {other:?}"),
    }
    match cluster.domain().render_string("{{ assets.ghost.units }}") {
        Err(Error::UnsetParameterAccessError { path, .. }) => assert_eq!(path, "assets.ghost"),
        other => panic!("Expected UnsetParameterAccessError, got {other:?}"),
    }
}

#[test]
fn test_asset_that_is_not_a_mapping() {
    let dir = repository();
    write(dir.path(), "assets/racks/rack3.yaml", "- a\n- b\n");
    let cluster = Cluster::open(dir.path(), Settings::default()).unwrap();

    assert!(matches!(
        cluster.assets().get("rack3"),
        Err(Error::InvalidScopeDataError { found, .. }) if found == "a sequence"
    ));
}
