use std::io::Write;
use std::sync::Arc;
use trellis_config::*;
use trellis_core::{
    Annotation, InterfaceConflictPolicy, MethodDecl, MethodHandle, Reply, ResourceApplication,
    ResourceClass, ResourceType,
};

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn test_files_then_dotenv_then_environment() {
    let dir = tempfile::tempdir().unwrap();
    let toml = write_file(
        &dir,
        "trellis.toml",
        r#"
            host = "127.0.0.1"
            port = 7000
            application_path = "api"
            log_format = "compact"
        "#,
    );
    let json = write_file(&dir, "override.json", r#"{ "port": 7001 }"#);
    let dotenv = write_file(
        &dir,
        ".env",
        "TRELLIS_PORT=7002\nTRELLIS_MAX_BODY_BYTES=4096\nUNRELATED=1\n",
    );

    let manager = ServerConfig::layers(&[&toml, &json]).unwrap();
    assert_eq!(manager.get_int("port").unwrap(), 7001);

    manager.load_dotenv(Some(&dotenv)).unwrap();
    assert!(!manager.has("unrelated"));
    assert_eq!(manager.get_int("port").unwrap(), 7002);

    manager.load_env_from([("TRELLIS_PORT", "7003")]);

    let config = ServerConfig::from_manager(&manager).unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 7003);
    assert_eq!(config.application_path, "api");
    assert_eq!(config.max_body_bytes, 4096);
    assert_eq!(config.log_format, trellis_core::logging::LogFormat::Compact);
}

#[test]
fn test_unsupported_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = write_file(&dir, "trellis.yaml", "port: 1");
    assert!(matches!(
        ServerConfig::layers(&[&yaml]),
        Err(ConfigError::LoadError(_))
    ));

    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        ServerConfig::layers(&[&missing]),
        Err(ConfigError::LoadError(_))
    ));

    let manager = ConfigManager::new();
    assert!(manager.load_dotenv(Some(&dir.path().join(".env"))).is_err());
}

#[test]
fn test_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write_file(&dir, "broken.toml", "port = ");
    assert!(matches!(
        ServerConfig::layers(&[&broken]),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_config_drives_application_and_server() {
    struct Ping;

    let ping: Arc<dyn ResourceType> = ResourceClass::builder::<Ping>()
        .annotate(Annotation::path("ping"))
        .method(
            MethodDecl::new("ping")
                .annotate(Annotation::get())
                .handle(MethodHandle::new(|_, _| async { Ok(Reply::text("pong")) })),
        )
        .build();

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        application_path: "api".to_string(),
        interface_conflict: InterfaceConflictPolicy::Reject,
        ..Default::default()
    };

    let table = config
        .apply(ResourceApplication::new())
        .singleton(ping, Ping)
        .build()
        .unwrap();
    assert_eq!(table.application_path(), "api");
    assert_eq!(table.router().len(), 1);

    assert!(config.server(Arc::new(table)).is_ok());
}

#[test]
fn test_env_file_values_follow_field_types() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = write_file(
        &dir,
        "trellis.env",
        "application_path=2024\nport=7100\nmax_body_bytes=2048\n",
    );

    let manager = ServerConfig::layers(&[&env_file]).unwrap();
    let config = ServerConfig::from_manager(&manager).unwrap();
    assert_eq!(config.application_path, "2024");
    assert_eq!(config.port, 7100);
    assert_eq!(config.max_body_bytes, 2048);
}
