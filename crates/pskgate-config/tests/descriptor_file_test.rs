//! Loading descriptors from disk

use pskgate_config::{ConfigError, TunnelDescriptor};
use std::io::Write;

#[test]
fn test_load_descriptor_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "localPort": 8123,
            "remoteAddress": "home.example.com",
            "preSharedKey": {{ "identity": "phone", "key": "0123456789abcdef" }}
        }}"#
    )
    .unwrap();

    let config = TunnelDescriptor::from_path(file.path())
        .unwrap()
        .into_config()
        .unwrap();

    assert_eq!(config.local_port(), 8123);
    assert_eq!(config.remote_host(), "home.example.com");
    assert_eq!(config.remote_port(), 443);
    assert_eq!(config.psk().identity(), "phone");
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("redirect.json");

    match TunnelDescriptor::from_path(&path) {
        Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected read error, got {:?}", other),
    }
}

#[test]
fn test_empty_object_is_invalid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{}}").unwrap();

    let descriptor = TunnelDescriptor::from_path(file.path()).unwrap();
    assert!(matches!(
        descriptor.into_config(),
        Err(ConfigError::MissingField("remoteAddress"))
    ));
}

#[test]
fn test_null_document_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "null").unwrap();

    assert!(matches!(
        TunnelDescriptor::from_reader(std::fs::File::open(file.path()).unwrap()),
        Err(ConfigError::Parse(_))
    ));
}
