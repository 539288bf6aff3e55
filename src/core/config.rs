//! 运行时配置
//!
//! 定义运行时的配置结构和加载逻辑。配置可以来自文件（YAML 或 JSON）、
//! 构建器和环境变量，环境变量以上下文 ID 的大写形式为前缀，例如 `CHIPS_HOME`。
//!
//! 路径和属性值中可以使用 `${key}` 占位符，`key` 先在 `properties` 中查找，然后是
//! 内置的 `<上下文>.home`、`<上下文>.modules` 和 `<上下文>.app`。设置了主目录时，
//! 未配置的平台根目录和模块目录默认取主目录下的 `lib` 和 `modules`。

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::utils::{CoreError, Result};

/// 支持的日志级别
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 主目录下的默认子目录
const DEFAULT_LIB_DIR_NAME: &str = "lib";
const DEFAULT_MODULES_DIR_NAME: &str = "modules";
const DEFAULT_CONFIG_DIR_NAME: &str = "config";

/// 嵌套占位符的最大展开深度
const MAX_SUBSTITUTION_DEPTH: usize = 8;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> std::result::Result<&'static Regex, regex::Error> {
    if let Some(re) = PLACEHOLDER_RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"\$\{([^}]+)\}")?;
    Ok(PLACEHOLDER_RE.get_or_init(|| re))
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 保留日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 上下文 ID，同时作为环境变量前缀
    #[serde(default = "default_context_id")]
    pub context_id: String,

    /// 运行时主目录
    #[serde(default)]
    pub home_dir: Option<PathBuf>,

    /// 平台根代码目录
    #[serde(default)]
    pub lib_dirs: Vec<PathBuf>,

    /// 模块目录
    #[serde(default)]
    pub modules_dir: Option<PathBuf>,

    /// 应用 ID
    #[serde(default)]
    pub app_id: Option<String>,

    /// 自由格式的属性，上下文属性以 `<上下文>.` 为键前缀
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// 调试模式，日志级别强制为 debug
    #[serde(default)]
    pub debug: bool,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_context_id() -> String {
    "chips".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            context_id: default_context_id(),
            home_dir: None,
            lib_dirs: vec![],
            modules_dir: None,
            app_id: None,
            properties: BTreeMap::new(),
            debug: false,
            logging: LogConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// 创建配置构建器
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 扩展名为 `.json` 时按 JSON 解析，否则按 YAML 解析。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;

        let parsed = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str::<RuntimeConfig>(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str::<RuntimeConfig>(&content).map_err(|e| e.to_string())
        };
        let mut config = parsed
            .map_err(|e| CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "配置文件已加载");
        config.config_path = Some(path);
        Ok(config)
    }

    /// 环境变量前缀，例如 `CHIPS`
    pub fn env_prefix(&self) -> String {
        self.context_id.to_uppercase().replace(['-', '.'], "_")
    }

    /// 应用环境变量覆盖
    ///
    /// 读取 `<前缀>_HOME`、`<前缀>_DEBUG`、`<前缀>_LOG_LEVEL`、`<前缀>_MODULES`、
    /// `<前缀>_APP` 和 `<前缀>_LIB_DIRS`（按平台路径分隔符拆分）。
    pub fn apply_env_overrides(&mut self) {
        let prefix = self.env_prefix();
        let var = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();

        if let Some(home) = var("HOME") {
            self.home_dir = Some(PathBuf::from(home));
        }
        if let Some(debug) = var("DEBUG") {
            self.debug = matches!(debug.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(dir) = var("MODULES") {
            self.modules_dir = Some(PathBuf::from(dir));
        }
        if let Some(app) = var("APP") {
            self.app_id = Some(app);
        }
        if let Some(dirs) = var("LIB_DIRS") {
            self.lib_dirs = std::env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: RuntimeConfig) {
        // 只覆盖非默认值的配置
        if other.context_id != default_context_id() {
            self.context_id = other.context_id;
        }
        if other.home_dir.is_some() {
            self.home_dir = other.home_dir;
        }
        for dir in other.lib_dirs {
            if !self.lib_dirs.contains(&dir) {
                self.lib_dirs.push(dir);
            }
        }
        if other.modules_dir.is_some() {
            self.modules_dir = other.modules_dir;
        }
        if other.app_id.is_some() {
            self.app_id = other.app_id;
        }
        self.properties.extend(other.properties);
        if other.debug {
            self.debug = true;
        }
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.logging.rotation != default_rotation() {
            self.logging.rotation = other.logging.rotation;
        }
        if other.logging.max_files != default_max_files() {
            self.logging.max_files = other.logging.max_files;
        }
    }

    // ==================== 属性与占位符 ====================

    /// 获取属性值，值中的占位符已展开
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|value| self.substitute(value))
    }

    /// 获取上下文属性，即键为 `<上下文>.<key>` 的属性
    pub fn context_property(&self, key: &str) -> Option<String> {
        self.property(&self.context_key(key))
    }

    fn context_key(&self, key: &str) -> String {
        format!("{}.{}", self.context_id, key)
    }

    /// 展开 `${key}` 占位符，未知的键保持原样
    pub fn substitute(&self, value: &str) -> String {
        self.substitute_at(value, 0)
    }

    fn substitute_at(&self, value: &str, depth: usize) -> String {
        if !value.contains("${") || depth >= MAX_SUBSTITUTION_DEPTH {
            return value.to_string();
        }
        let Ok(re) = placeholder_regex() else {
            return value.to_string();
        };
        re.replace_all(value, |caps: &Captures<'_>| {
            match self.lookup(&caps[1]) {
                Some(found) => self.substitute_at(&found, depth + 1),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());
        if key == self.context_key("home") {
            path(&self.home_dir)
        } else if key == self.context_key(DEFAULT_MODULES_DIR_NAME) {
            path(&self.modules_dir)
        } else if key == self.context_key("app") {
            self.app_id.clone()
        } else {
            None
        }
    }

    fn substitute_path(&self, path: &Path) -> PathBuf {
        PathBuf::from(self.substitute(&path.to_string_lossy()))
    }

    // ==================== 目录 ====================

    /// 主目录下的默认配置文件 `<主目录>/config/<上下文>.config`
    pub fn default_config_path(&self) -> Option<PathBuf> {
        self.home_dir.as_ref().map(|home| {
            home.join(DEFAULT_CONFIG_DIR_NAME)
                .join(format!("{}.config", self.context_id))
        })
    }

    /// 展开路径中的占位符，并从主目录推导缺省的目录
    ///
    /// 显式配置的主目录、模块目录和平台根目录必须是已存在的目录。未配置平台根目录
    /// 时使用 `<主目录>/lib`，未配置模块目录时使用 `<主目录>/modules`，两者都只在
    /// 目录存在时生效。
    pub fn resolve_paths(&mut self) -> Result<()> {
        if let Some(home) = self.home_dir.take() {
            let home = self.substitute_path(&home);
            require_dir("home_dir", &home)?;
            self.home_dir = Some(home);
        }

        let lib_dirs: Vec<PathBuf> = self.lib_dirs.iter().map(|d| self.substitute_path(d)).collect();
        for dir in &lib_dirs {
            require_dir("lib_dirs", dir)?;
        }
        self.lib_dirs = lib_dirs;

        if let Some(dir) = self.modules_dir.take() {
            let dir = self.substitute_path(&dir);
            require_dir("modules_dir", &dir)?;
            self.modules_dir = Some(dir);
        }

        if let Some(dir) = self.logging.log_dir.take() {
            self.logging.log_dir = Some(self.substitute_path(&dir));
        }

        if let Some(home) = self.home_dir.clone() {
            let lib = home.join(DEFAULT_LIB_DIR_NAME);
            if self.lib_dirs.is_empty() && lib.is_dir() {
                tracing::debug!(dir = %lib.display(), "使用主目录下的默认平台根目录");
                self.lib_dirs.push(lib);
            }
            let modules = home.join(DEFAULT_MODULES_DIR_NAME);
            if self.modules_dir.is_none() && modules.is_dir() {
                tracing::debug!(dir = %modules.display(), "使用主目录下的默认模块目录");
                self.modules_dir = Some(modules);
            }
        }
        Ok(())
    }

    /// 实际生效的日志级别
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.context_id.trim().is_empty() {
            return Err(CoreError::InvalidConfigValue {
                key: "context_id".to_string(),
                reason: "不能为空".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.level".to_string(),
                reason: format!("未知的日志级别 '{}'", self.logging.level),
            });
        }

        let mut seen: HashSet<&Path> = HashSet::new();
        for dir in &self.lib_dirs {
            if !seen.insert(dir.as_path()) {
                return Err(CoreError::InvalidConfigValue {
                    key: "lib_dirs".to_string(),
                    reason: format!("目录重复: {}", dir.display()),
                });
            }
        }

        if matches!(self.app_id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(CoreError::InvalidConfigValue {
                key: "app_id".to_string(),
                reason: "设置时不能为空".to_string(),
            });
        }

        if self.logging.file_output && self.logging.log_dir.is_none() {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.log_dir".to_string(),
                reason: "启用文件日志时必须指定目录".to_string(),
            });
        }

        Ok(())
    }
}

fn require_dir(key: &str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CoreError::InvalidConfigValue {
            key: key.to_string(),
            reason: format!("不是目录: {}", path.display()),
        })
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// 设置上下文 ID
    pub fn context_id(mut self, id: impl Into<String>) -> Self {
        self.config.context_id = id.into();
        self
    }

    /// 设置主目录
    pub fn home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.home_dir = Some(dir.into());
        self
    }

    /// 添加平台根代码目录
    pub fn lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.lib_dirs.push(dir.into());
        self
    }

    /// 设置模块目录
    pub fn modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.modules_dir = Some(dir.into());
        self
    }

    /// 设置应用 ID
    pub fn app_id(mut self, id: impl Into<String>) -> Self {
        self.config.app_id = Some(id.into());
        self
    }

    /// 设置属性
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.insert(key.into(), value.into());
        self
    }

    /// 启用调试模式
    pub fn debug(mut self) -> Self {
        self.config.debug = true;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.context_id, "chips");
        assert!(!config.debug);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RuntimeConfig::builder()
            .context_id("sar")
            .lib_dir("/opt/sar/lib")
            .log_level("warn")
            .debug()
            .build();

        assert_eq!(config.env_prefix(), "SAR");
        assert_eq!(config.lib_dirs, vec![PathBuf::from("/opt/sar/lib")]);
        assert_eq!(config.effective_log_level(), "debug");
    }

    #[test]
    fn test_config_merge() {
        let mut base = RuntimeConfig::builder().lib_dir("/a").build();
        let other = RuntimeConfig::builder()
            .lib_dir("/a")
            .lib_dir("/b")
            .log_level("debug")
            .home_dir("/home/chips")
            .app_id("viewer")
            .property("chips.color", "blue")
            .build();

        base.merge(other);

        assert_eq!(base.app_id.as_deref(), Some("viewer"));
        assert_eq!(base.context_property("color").as_deref(), Some("blue"));
        assert_eq!(base.lib_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(base.logging.level, "debug");
        assert_eq!(base.home_dir, Some(PathBuf::from("/home/chips")));
    }

    #[test]
    fn test_validate() {
        let config = RuntimeConfig::builder().log_level("loud").build();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfigValue { .. })
        ));

        let config = RuntimeConfig::builder().lib_dir("/a").lib_dir("/a").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_substitute_properties() {
        let config = RuntimeConfig::builder()
            .context_id("sar")
            .home_dir("/opt/sar")
            .property("data", "${sar.home}/data")
            .property("sar.cache", "${data}/cache")
            .property("loop", "${loop}")
            .build();

        assert_eq!(config.property("data").as_deref(), Some("/opt/sar/data"));
        assert_eq!(
            config.context_property("cache").as_deref(),
            Some("/opt/sar/data/cache")
        );
        assert_eq!(config.substitute("${unknown}/x"), "${unknown}/x");
        assert_eq!(config.substitute("plain"), "plain");
        // 自引用在深度上限处停止
        assert_eq!(config.property("loop").as_deref(), Some("${loop}"));
        assert!(config.context_property("missing").is_none());
    }

    #[test]
    fn test_validate_empty_app_id() {
        let config = RuntimeConfig::builder().app_id(" ").build();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfigValue { ref key, .. }) if key == "app_id"
        ));
        assert!(RuntimeConfig::builder().app_id("viewer").build().validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        assert!(RuntimeConfig::default().default_config_path().is_none());
        let config = RuntimeConfig::builder().context_id("sar").home_dir("/opt/sar").build();
        assert_eq!(
            config.default_config_path(),
            Some(PathBuf::from("/opt/sar/config/sar.config"))
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::builder()
            .context_id("sar")
            .log_level("warn")
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: RuntimeConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed, config);
    }
}
