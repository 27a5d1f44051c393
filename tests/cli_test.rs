use clap::Parser;
use metalware::cli::{Args, Command};
use metalware::{ScopeOverride, ScopeOverrides};
use std::ffi::OsString;
use std::path::PathBuf;

fn make_args(args: &[&str]) -> Vec<OsString> {
    let mut res = vec![OsString::from("metalware")];
    res.extend(args.iter().map(OsString::from));
    res
}

#[test]
fn test_render_args() {
    let args = make_args(&["render", "templates/hosts"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.root, PathBuf::from("."));
    assert!(!parsed.verbose);
    assert!(!parsed.strict_answers);
    assert_eq!(parsed.max_depth, None);
    match parsed.command {
        Command::Render { template, scope } => {
            assert_eq!(template, PathBuf::from("templates/hosts"));
            assert_eq!(ScopeOverrides::from(scope).resolve().unwrap(), ScopeOverride::Cluster);
        }
        other => panic!("Expected render, got {other:?}"),
    }
}

#[test]
fn test_all_flags() {
    let args = make_args(&[
        "--root",
        "/var/lib/metalware",
        "--verbose",
        "--max-depth",
        "4",
        "--strict-answers",
        "view-config",
        "--node",
        "node01",
    ]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.root, PathBuf::from("/var/lib/metalware"));
    assert!(parsed.verbose);
    assert!(parsed.strict_answers);
    assert_eq!(parsed.max_depth, Some(4));
    match parsed.command {
        Command::ViewConfig { scope } => {
            assert_eq!(
                ScopeOverrides::from(scope).resolve().unwrap(),
                ScopeOverride::Node("node01".into())
            );
        }
        other => panic!("Expected view-config, got {other:?}"),
    }
}

#[test]
fn test_short_flags() {
    let args = make_args(&["-r", "cluster", "-v", "view-answers", "--group", "compute"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.root, PathBuf::from("cluster"));
    assert!(parsed.verbose);
    assert!(matches!(parsed.command, Command::ViewAnswers { .. }));
}

#[test]
fn test_view_asset() {
    let args = make_args(&["view-asset", "rack1"]);
    let parsed = Args::try_parse_from(args).unwrap();

    assert!(matches!(parsed.command, Command::ViewAsset { name } if name == "rack1"));
}

#[test]
fn test_node_and_group_conflict() {
    let args = make_args(&["view-config", "--node", "n1", "--group", "compute"]);
    assert!(Args::try_parse_from(args).is_err());
}

#[test]
fn test_missing_args() {
    assert!(Args::try_parse_from(make_args(&["render"])).is_err());
    assert!(Args::try_parse_from(make_args(&[])).is_err());
}
