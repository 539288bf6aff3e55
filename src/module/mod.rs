//! 模块管理模块
//!
//! 包含模块运行时的核心组件：
//! - 模块元数据与代码根
//! - 模块注册表与扩展点索引
//! - 依赖解析
//! - 类加载器组合
//! - 激活器与生命周期管理
//! - 批量初始化与释放

pub mod activator;
pub mod code_root;
pub mod dependency;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod registry;

// 重导出常用类型
pub use activator::{Activator, ActivatorFactory, ActivatorRegistry, DefaultActivator, ModuleContext};
pub use code_root::{CodeRoot, DirCodeRoot, MemoryCodeRoot};
pub use dependency::DependencyResolver;
pub use lifecycle::LifecycleManager;
pub use loader::{LoadedClass, ModuleClassLoader, ModuleLoader};
pub use manager::{InitReport, ModuleFailure, ModuleManager};
pub use metadata::{
    parse_version, ConfigurationElement, Dependency, DependencyTarget, Extension, ExtensionPoint,
    Module, ModuleBuilder, ModuleId, ModuleState, Packaging, ResolvedLibrary,
};
pub use registry::ModuleRegistry;
