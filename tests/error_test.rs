use std::io;

use metalware::error::Error;

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();

    match err {
        Error::IoError(_) => (),
        _ => panic!("Expected IoError variant"),
    }
}

#[test]
fn test_error_display() {
    let err = Error::ConfigError("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = Error::TemplateError("rendering failed".to_string());
    assert_eq!(err.to_string(), "Template error: rendering failed.");

    let err = Error::MissingParameterError("nodes.n1.answers.root_password".to_string());
    assert_eq!(err.to_string(), "Missing answer for parameter 'nodes.n1.answers.root_password'.");

    let err = Error::UnsetParameterAccessError {
        attribute: "ip".to_string(),
        path: "domain.config.network".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Attempted to access 'ip' on unset parameter 'domain.config.network'."
    );
}

#[test]
fn test_depth_error_names_the_path() {
    let err = Error::RecursiveConfigDepthExceededError {
        max_depth: 10,
        path: "nodes.n1.config.hostname".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("(10)"));
    assert!(message.contains("'nodes.n1.config.hostname'"));
}

#[test]
fn test_yaml_error_keeps_source() {
    let source = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
    let err = Error::yaml("configuration/domain.yaml", source);

    assert!(err.to_string().starts_with("Failed to parse 'configuration/domain.yaml': "));
    assert!(std::error::Error::source(&err).is_some());
}
