//! # Chips Runtime - 薯片模块运行时
//!
//! 薯片模块运行时负责管理一组带版本的模块，提供以下核心功能：
//!
//! - **模块注册表**: 按 ID、符号名和位置索引模块，拒绝重复注册
//! - **依赖解析**: 按版本选择依赖，检测循环依赖，区分必需和可选依赖
//! - **扩展点**: 模块声明扩展点，其他模块向其贡献扩展
//! - **类加载器组合**: 每个模块的类加载器委托给依赖模块和平台根加载器
//! - **生命周期管理**: INSTALLED → RESOLVED → STARTING → ACTIVE → STOPPING
//! - **配置与日志**: YAML/JSON 配置加载，基于 tracing 的结构化日志
//!
//! ## 快速开始
//!
//! ```rust
//! use chips_runtime::{ActivatorRegistry, Dependency, Module, ModuleManager, ModuleLoader};
//! use chips_runtime::module::parse_version;
//!
//! let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
//!
//! let report = manager.init(vec![
//!     Module::builder("chips.app", parse_version("1.0").unwrap())
//!         .dependency(Dependency::module("chips.base"))
//!         .build(),
//!     Module::builder("chips.base", parse_version("1.2").unwrap()).build(),
//! ]);
//!
//! assert!(report.is_success());
//! assert_eq!(report.started.len(), 2);
//!
//! assert!(manager.dispose().is_empty());
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块注册、解析、类加载和生命周期
//! - `core` - 运行时配置
//! - `utils` - 错误类型和日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    Activator, ActivatorRegistry, CodeRoot, ConfigurationElement, Dependency, DependencyResolver,
    DirCodeRoot, Extension, ExtensionPoint, InitReport, LifecycleManager, MemoryCodeRoot, Module,
    ModuleClassLoader, ModuleContext, ModuleId, ModuleLoader, ModuleManager, ModuleRegistry,
    ModuleState,
};

pub use utils::{error_code, CoreError, ResolveIssue, Result};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{LogConfig, RuntimeConfig, RuntimeConfigBuilder};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
