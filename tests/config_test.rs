//! 运行时配置集成测试
//!
//! 测试配置文件加载、环境变量覆盖和校验的完整流程

use std::path::PathBuf;

use chips_runtime::{CoreError, LoggerConfig, RotationStrategy, RuntimeConfig};
use tempfile::TempDir;

/// 测试从 YAML 文件加载配置
#[tokio::test]
async fn test_load_yaml_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("runtime.yaml");
    tokio::fs::write(
        &path,
        r#"
context_id: sar
home_dir: /opt/sar
lib_dirs:
  - /opt/sar/lib
  - /opt/sar/ext
logging:
  level: warn
  rotation: hourly
"#,
    )
    .await
    .unwrap();

    let config = RuntimeConfig::from_file(&path).await.unwrap();

    assert_eq!(config.config_path, Some(path));
    assert_eq!(config.context_id, "sar");
    assert_eq!(config.home_dir, Some(PathBuf::from("/opt/sar")));
    assert_eq!(config.lib_dirs.len(), 2);
    assert_eq!(config.logging.level, "warn");
    // 未指定的字段使用默认值
    assert_eq!(config.logging.max_files, 7);
    assert!(config.validate().is_ok());

    let logger = LoggerConfig::from_log_config(&config.logging, config.debug);
    assert_eq!(logger.rotation, RotationStrategy::Hourly);
}

/// 测试从 JSON 文件加载配置
#[tokio::test]
async fn test_load_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("runtime.json");
    tokio::fs::write(&path, r#"{ "debug": true, "logging": { "json_format": true } }"#)
        .await
        .unwrap();

    let config = RuntimeConfig::from_file(&path).await.unwrap();

    assert!(config.debug);
    assert!(config.logging.json_format);
    assert_eq!(config.context_id, "chips");
    assert_eq!(config.effective_log_level(), "debug");
}

/// 测试无效内容返回配置加载错误
#[tokio::test]
async fn test_invalid_config_content() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&path, "lib_dirs: [unclosed").await.unwrap();

    let err = RuntimeConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));
    assert_eq!(err.error_code(), "CONFIG-001");
}

/// 测试文件不存在返回 IO 错误
#[tokio::test]
async fn test_missing_config_file() {
    let err = RuntimeConfig::from_file("/nonexistent/runtime.yaml")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
}

/// 测试环境变量覆盖
///
/// 使用唯一的上下文 ID，避免与其他测试共享环境变量。
#[test]
fn test_env_overrides() {
    let mut config = RuntimeConfig::builder()
        .context_id("chips-env-test")
        .log_level("info")
        .build();
    assert_eq!(config.env_prefix(), "CHIPS_ENV_TEST");

    let lib_dirs = std::env::join_paths(["/opt/one", "/opt/two"]).unwrap();
    std::env::set_var("CHIPS_ENV_TEST_LIB_DIRS", &lib_dirs);
    std::env::set_var("CHIPS_ENV_TEST_LOG_LEVEL", "TRACE");
    std::env::set_var("CHIPS_ENV_TEST_DEBUG", "yes");
    std::env::set_var("CHIPS_ENV_TEST_HOME", "/srv/chips");

    config.apply_env_overrides();

    assert_eq!(
        config.lib_dirs,
        vec![PathBuf::from("/opt/one"), PathBuf::from("/opt/two")]
    );
    assert_eq!(config.logging.level, "trace");
    assert!(config.debug);
    assert_eq!(config.home_dir, Some(PathBuf::from("/srv/chips")));
    assert!(config.validate().is_ok());

    for name in ["LIB_DIRS", "LOG_LEVEL", "DEBUG", "HOME"] {
        std::env::remove_var(format!("CHIPS_ENV_TEST_{}", name));
    }
}

/// 测试文件日志缺少目录时校验失败
#[test]
fn test_validate_file_logging_requires_dir() {
    let mut config = RuntimeConfig::default();
    config.logging.file_output = true;

    let err = config.validate().unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { ref key, .. } if key == "logging.log_dir"));

    let config = RuntimeConfig::builder().file_logging("/var/log/chips").build();
    assert!(config.validate().is_ok());
}

/// 测试主目录推导的默认平台根目录和模块目录
#[test]
fn test_home_derived_dirs() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir(home.path().join("lib")).unwrap();
    std::fs::create_dir(home.path().join("modules")).unwrap();

    let mut config = RuntimeConfig::builder().home_dir(home.path()).build();
    config.resolve_paths().unwrap();

    assert_eq!(config.lib_dirs, vec![home.path().join("lib")]);
    assert_eq!(config.modules_dir, Some(home.path().join("modules")));

    // 已配置的目录不会被默认值替换
    let other = TempDir::new().unwrap();
    let mut config = RuntimeConfig::builder()
        .home_dir(home.path())
        .lib_dir(other.path())
        .build();
    config.resolve_paths().unwrap();
    assert_eq!(config.lib_dirs, vec![other.path().to_path_buf()]);

    // 主目录中没有对应子目录时不设置默认值
    let bare = TempDir::new().unwrap();
    let mut config = RuntimeConfig::builder().home_dir(bare.path()).build();
    config.resolve_paths().unwrap();
    assert!(config.lib_dirs.is_empty());
    assert!(config.modules_dir.is_none());
}

/// 测试路径中的占位符展开
#[test]
fn test_resolve_paths_substitutes_placeholders() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir(home.path().join("ext")).unwrap();
    std::fs::create_dir(home.path().join("plugins")).unwrap();

    let mut config = RuntimeConfig::builder()
        .context_id("sar")
        .home_dir(home.path())
        .lib_dir("${sar.home}/ext")
        .modules_dir("${sar.home}/${plugins}")
        .property("plugins", "plugins")
        .file_logging("${sar.home}/logs")
        .build();
    config.resolve_paths().unwrap();

    assert_eq!(config.lib_dirs, vec![home.path().join("ext")]);
    assert_eq!(config.modules_dir, Some(home.path().join("plugins")));
    assert_eq!(config.logging.log_dir, Some(home.path().join("logs")));
}

/// 测试显式配置的目录不存在时报错
#[test]
fn test_resolve_paths_requires_existing_dirs() {
    let home = TempDir::new().unwrap();

    let mut config = RuntimeConfig::builder()
        .home_dir(home.path())
        .modules_dir(home.path().join("absent"))
        .build();
    let err = config.resolve_paths().unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { ref key, .. } if key == "modules_dir"));

    let mut config = RuntimeConfig::builder().home_dir("/nonexistent/chips-home").build();
    let err = config.resolve_paths().unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { ref key, .. } if key == "home_dir"));
}

/// 测试从主目录下的默认配置文件加载属性
#[tokio::test]
async fn test_load_default_config_with_properties() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir(home.path().join("config")).unwrap();
    std::fs::create_dir(home.path().join("modules")).unwrap();

    let locator = RuntimeConfig::builder().context_id("sar").home_dir(home.path()).build();
    let path = locator.default_config_path().unwrap();
    assert_eq!(path, home.path().join("config").join("sar.config"));

    tokio::fs::write(
        &path,
        r#"
context_id: sar
app_id: viewer
properties:
  sar.title: "${sar.app} on ${sar.home}"
"#,
    )
    .await
    .unwrap();

    let mut config = RuntimeConfig::from_file(&path).await.unwrap();
    config.merge(locator);
    config.resolve_paths().unwrap();
    config.validate().unwrap();

    assert_eq!(config.app_id.as_deref(), Some("viewer"));
    assert_eq!(config.modules_dir, Some(home.path().join("modules")));
    assert_eq!(
        config.context_property("title"),
        Some(format!("viewer on {}", home.path().display()))
    );
}

/// 测试模块目录和应用 ID 的环境变量覆盖
#[test]
fn test_env_overrides_modules_and_app() {
    let mut config = RuntimeConfig::builder().context_id("chips-app-test").build();
    std::env::set_var("CHIPS_APP_TEST_MODULES", "/srv/modules");
    std::env::set_var("CHIPS_APP_TEST_APP", "viewer");

    config.apply_env_overrides();

    assert_eq!(config.modules_dir, Some(PathBuf::from("/srv/modules")));
    assert_eq!(config.app_id.as_deref(), Some("viewer"));

    for name in ["MODULES", "APP"] {
        std::env::remove_var(format!("CHIPS_APP_TEST_{}", name));
    }
}
