//! 薯片模块运行时错误类型定义
//!
//! 本模块定义了运行时中使用的所有错误类型：
//!
//! - [`CoreError`] - 注册、解析、生命周期、类加载和配置错误
//! - [`ResolveIssue`] - 解析过程中记录在模块上的错误或警告条目

use thiserror::Error;

use crate::module::metadata::{ModuleId, ModuleState};

/// 薯片运行时核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 注册错误 ====================

    /// 模块 ID 已被占用
    #[error("模块 ID 重复: {0}")]
    DuplicateId(ModuleId),

    /// 符号名与版本组合已存在
    #[error("模块 '{symbolic_name}' 的版本 {version} 已注册")]
    DuplicateSymbolicNameAndVersion {
        symbolic_name: String,
        version: String,
    },

    /// 模块位置已存在
    #[error("模块位置重复: '{0}'")]
    DuplicateLocation(String),

    /// 同一模块重复声明了扩展点
    #[error("模块 '{module}' 重复声明扩展点 '{point}'")]
    DuplicateExtensionPointInModule {
        module: String,
        point: String,
    },

    /// 无效的模块元数据
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    // ==================== 解析错误 ====================

    /// 模块解析失败，汇总模块上记录的全部解析错误
    #[error("模块 '{module}' 解析失败: {}", join_issues(.errors))]
    Resolve {
        module: String,
        errors: Vec<ResolveIssue>,
    },

    // ==================== 生命周期错误 ====================

    /// 非法的生命周期状态转换
    #[error("模块 '{module}' 无法从 {from} 转换到 {to}")]
    IllegalLifecycleTransition {
        module: String,
        from: ModuleState,
        to: ModuleState,
    },

    /// 模块启动失败
    #[error("模块启动失败: '{module_id}' - {reason}")]
    ModuleStartFailed {
        module_id: String,
        reason: String,
    },

    /// 模块停止失败
    #[error("模块停止失败: '{module_id}' - {reason}")]
    ModuleStopFailed {
        module_id: String,
        reason: String,
    },

    /// 激活器类型未注册
    #[error("激活器未注册: '{0}'")]
    ActivatorNotRegistered(String),

    /// 激活器构造失败
    #[error("激活器构造失败: '{activator}' - {reason}")]
    ActivatorConstruction {
        activator: String,
        reason: String,
    },

    // ==================== 类加载错误 ====================

    /// 类在模块、其依赖和平台根加载器中均未找到
    #[error("类未找到: '{class}' (加载器 '{loader}')")]
    ClassNotFound {
        class: String,
        loader: String,
    },

    /// 模块尚不能提供类加载器
    #[error("模块 '{module}' 的类加载器不可用: {reason}")]
    LoaderUnavailable {
        module: String,
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误（激活器代码可通过 anyhow 返回任意错误）
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 运行时操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 解析问题
///
/// 记录在模块的解析错误列表或警告列表中。同一种问题既可能是错误，
/// 也可能在可选依赖的路径上被降级为警告。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveIssue {
    /// 循环依赖，内容为 `name:version` 组成的环路径
    #[error("检测到循环依赖: {0}")]
    CyclicDependency(String),

    /// 必需的模块依赖未能解析
    #[error("模块 '{module}' 的必需依赖 {dependency} 未解析")]
    MandatoryDependencyUnresolved {
        module: String,
        dependency: String,
    },

    /// 可选的模块依赖未能解析
    #[error("模块 '{module}' 的可选依赖 {dependency} 未解析")]
    OptionalDependencyUnresolved {
        module: String,
        dependency: String,
    },

    /// 必需的库依赖未找到
    #[error("模块 '{module}' 的必需库 '{library}' 未找到")]
    MandatoryLibraryUnresolved {
        module: String,
        library: String,
    },

    /// 扩展引用的扩展点不存在，该扩展将被忽略
    #[error("模块 '{module}' 的扩展引用了不存在的扩展点 '{point}'")]
    ExtensionPointNotFound {
        module: String,
        point: String,
    },
}

fn join_issues(issues: &[ResolveIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 错误码常量
pub mod error_code {
    // 核心错误 (CORE-xxx)
    pub const CORE_INTERNAL: &str = "CORE-001";
    pub const CORE_INIT_FAILED: &str = "CORE-003";

    // 注册错误 (REGISTRY-xxx)
    pub const REGISTRY_DUPLICATE_ID: &str = "REGISTRY-001";
    pub const REGISTRY_DUPLICATE_NAME_VERSION: &str = "REGISTRY-002";
    pub const REGISTRY_DUPLICATE_LOCATION: &str = "REGISTRY-003";
    pub const REGISTRY_DUPLICATE_EXTENSION_POINT: &str = "REGISTRY-004";
    pub const REGISTRY_INVALID_METADATA: &str = "REGISTRY-005";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_RESOLVE_FAILED: &str = "MODULE-002";
    pub const MODULE_ILLEGAL_TRANSITION: &str = "MODULE-003";
    pub const MODULE_START_FAILED: &str = "MODULE-004";
    pub const MODULE_STOP_FAILED: &str = "MODULE-005";
    pub const MODULE_ACTIVATOR_FAILED: &str = "MODULE-006";

    // 类加载错误 (LOADER-xxx)
    pub const LOADER_CLASS_NOT_FOUND: &str = "LOADER-001";
    pub const LOADER_UNAVAILABLE: &str = "LOADER-002";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::DuplicateId(_) => error_code::REGISTRY_DUPLICATE_ID,
            CoreError::DuplicateSymbolicNameAndVersion { .. } => {
                error_code::REGISTRY_DUPLICATE_NAME_VERSION
            }
            CoreError::DuplicateLocation(_) => error_code::REGISTRY_DUPLICATE_LOCATION,
            CoreError::DuplicateExtensionPointInModule { .. } => {
                error_code::REGISTRY_DUPLICATE_EXTENSION_POINT
            }
            CoreError::InvalidMetadata(_) => error_code::REGISTRY_INVALID_METADATA,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::Resolve { .. } => error_code::MODULE_RESOLVE_FAILED,
            CoreError::IllegalLifecycleTransition { .. } => error_code::MODULE_ILLEGAL_TRANSITION,
            CoreError::ModuleStartFailed { .. } => error_code::MODULE_START_FAILED,
            CoreError::ModuleStopFailed { .. } => error_code::MODULE_STOP_FAILED,
            CoreError::ActivatorNotRegistered(_) | CoreError::ActivatorConstruction { .. } => {
                error_code::MODULE_ACTIVATOR_FAILED
            }
            CoreError::ClassNotFound { .. } => error_code::LOADER_CLASS_NOT_FOUND,
            CoreError::LoaderUnavailable { .. } => error_code::LOADER_UNAVAILABLE,
            CoreError::ConfigLoadFailed(_) | CoreError::Yaml(_) | CoreError::Json(_) => {
                error_code::CONFIG_LOAD_FAILED
            }
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            _ => error_code::CORE_INTERNAL,
        }
    }

    /// 是否为注册阶段的错误
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateId(_)
                | CoreError::DuplicateSymbolicNameAndVersion { .. }
                | CoreError::DuplicateLocation(_)
                | CoreError::DuplicateExtensionPointInModule { .. }
                | CoreError::InvalidMetadata(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::DuplicateLocation("/modules/a".to_string());
        assert!(err.to_string().contains("/modules/a"));
    }

    #[test]
    fn test_resolve_error_lists_issues() {
        let err = CoreError::Resolve {
            module: "a:1.0.0".to_string(),
            errors: vec![
                ResolveIssue::CyclicDependency("a:1.0.0 -> b:1.0.0 -> a:1.0.0".to_string()),
                ResolveIssue::MandatoryLibraryUnresolved {
                    module: "a:1.0.0".to_string(),
                    library: "lib/x.jar".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("b:1.0.0"));
        assert!(text.contains("lib/x.jar"));
    }

    #[test]
    fn test_error_code() {
        let err = CoreError::DuplicateId(ModuleId(3));
        assert_eq!(err.error_code(), error_code::REGISTRY_DUPLICATE_ID);
        assert!(err.is_registration_error());

        let err = CoreError::IllegalLifecycleTransition {
            module: "a:1.0.0".to_string(),
            from: ModuleState::Installed,
            to: ModuleState::Starting,
        };
        assert_eq!(err.error_code(), error_code::MODULE_ILLEGAL_TRANSITION);
        assert!(!err.is_registration_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    fn test_anyhow_conversion() {
        let core_err: CoreError = anyhow::anyhow!("activator exploded").into();
        assert!(matches!(core_err, CoreError::Other(_)));
        assert_eq!(core_err.to_string(), "activator exploded");
    }
}
