use std::io::Write;
use std::time::Duration;

use dispatcher_daemon::config::{
    DaemonConfig, DEFAULT_HELLO_TIMEOUT_MS, DEFAULT_INGRESS_LISTEN, DEFAULT_TUNNEL_LISTEN,
};

#[test]
fn parses_full_config() {
    let input = r#"
[registry]
capacity = 16
submit_timeout_ms = 250

[ingress]
listen = "127.0.0.1:7000"

[tunnel]
listen = "0.0.0.0:7001"
hello_timeout_ms = 2500
"#;
    let cfg = DaemonConfig::from_toml(input).expect("parse");
    assert_eq!(cfg.registry.capacity, 16);
    assert_eq!(cfg.registry.submit_timeout, Duration::from_millis(250));
    assert_eq!(cfg.ingress.listen, "127.0.0.1:7000");
    assert_eq!(cfg.tunnel.listen, "0.0.0.0:7001");
    assert_eq!(cfg.tunnel.hello_timeout(), Duration::from_millis(2500));
}

#[test]
fn missing_sections_use_defaults() {
    let cfg = DaemonConfig::from_toml("[registry]\ncapacity = 4\n").expect("parse");
    assert_eq!(cfg.registry.capacity, 4);
    assert_eq!(cfg.registry.submit_timeout, Duration::from_secs(1));
    assert_eq!(cfg.ingress.listen, DEFAULT_INGRESS_LISTEN);
    assert_eq!(cfg.tunnel.listen, DEFAULT_TUNNEL_LISTEN);
    assert_eq!(cfg.tunnel.hello_timeout_ms, DEFAULT_HELLO_TIMEOUT_MS);
    assert_eq!(cfg.tunnel.hello_timeout(), Duration::from_secs(10));

    let empty = DaemonConfig::from_toml("").expect("parse empty");
    assert_eq!(empty.registry.capacity, 100);
}

#[test]
fn load_rejects_zero_capacity() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[registry]\ncapacity = 0").expect("write");

    let err = DaemonConfig::load(file.path()).expect_err("zero capacity");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn load_reads_file_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("dispatcherd.toml");
    std::fs::write(&path, "[tunnel]\nlisten = \"127.0.0.1:1\"\n").expect("write");

    let cfg = DaemonConfig::load(&path).expect("load");
    assert_eq!(cfg.tunnel.listen, "127.0.0.1:1");
}

#[test]
fn load_reports_malformed_toml() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[registry\ncapacity = ").expect("write");

    let err = DaemonConfig::load(&path).expect_err("malformed");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
