//! 模块激活器
//!
//! 激活器是模块提供的启动/停止回调。模块描述中只记录激活器的类型名，
//! 运行时通过模块的类加载器确认该类型可见后，再由 [`ActivatorRegistry`]
//! 中注册的工厂构造实例。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::loader::ModuleClassLoader;
use super::metadata::{Extension, ExtensionPoint, Module, ModuleId};
use super::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 模块激活器
///
/// `start` 在模块进入 `ACTIVE` 之前调用，`stop` 在模块回到 `RESOLVED` 之前调用。
/// 返回错误（或发生 panic）时，生命周期管理器会把模块回退到之前的状态。
pub trait Activator: Send {
    /// 启动回调
    fn start(&mut self, ctx: &ModuleContext<'_>) -> Result<()>;

    /// 停止回调
    fn stop(&mut self, ctx: &ModuleContext<'_>) -> Result<()>;
}

/// 默认激活器，只记录日志
///
/// 模块没有声明激活器时使用。
#[derive(Debug, Default)]
pub struct DefaultActivator;

impl Activator for DefaultActivator {
    fn start(&mut self, ctx: &ModuleContext<'_>) -> Result<()> {
        info!(module = %ctx.module().key(), "模块已启动（默认激活器）");
        Ok(())
    }

    fn stop(&mut self, ctx: &ModuleContext<'_>) -> Result<()> {
        info!(module = %ctx.module().key(), "模块已停止（默认激活器）");
        Ok(())
    }
}

/// 激活器回调的上下文
///
/// 绑定到当前模块，提供注册表查询和模块的类加载器。
pub struct ModuleContext<'a> {
    registry: &'a ModuleRegistry,
    module: &'a Module,
    class_loader: Arc<ModuleClassLoader>,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(
        registry: &'a ModuleRegistry,
        module: &'a Module,
        class_loader: Arc<ModuleClassLoader>,
    ) -> Self {
        Self {
            registry,
            module,
            class_loader,
        }
    }

    /// 当前模块
    pub fn module(&self) -> &'a Module {
        self.module
    }

    /// 当前模块 ID
    pub fn module_id(&self) -> Option<ModuleId> {
        self.module.id()
    }

    /// 模块注册表
    pub fn registry(&self) -> &'a ModuleRegistry {
        self.registry
    }

    /// 当前模块的类加载器
    pub fn class_loader(&self) -> &Arc<ModuleClassLoader> {
        &self.class_loader
    }

    /// 从当前模块的视角查找扩展点
    pub fn extension_point(&self, point_id: &str) -> Option<&'a ExtensionPoint> {
        match self.module.id() {
            Some(id) => self.registry.extension_point_from(point_id, id),
            None => self.registry.extension_point(point_id),
        }
    }

    /// 获取指向扩展点的所有扩展，扩展点 ID 可以不带模块前缀
    pub fn extensions(&self, point_id: &str) -> Vec<&'a Extension> {
        match self.extension_point(point_id) {
            Some(point) => self.registry.extensions(point.qualified_id()),
            None => vec![],
        }
    }
}

impl fmt::Debug for ModuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module.key())
            .field("class_loader", &self.class_loader.name())
            .finish()
    }
}

/// 激活器工厂
pub type ActivatorFactory = Arc<dyn Fn() -> Result<Box<dyn Activator>> + Send + Sync>;

/// 激活器注册表
///
/// 按类型名保存激活器工厂。
///
/// # 示例
///
/// ```rust
/// use chips_runtime::module::activator::{ActivatorRegistry, DefaultActivator};
///
/// let mut activators = ActivatorRegistry::new();
/// activators.register_default::<DefaultActivator>("chips.core.CoreActivator");
/// assert!(activators.contains("chips.core.CoreActivator"));
/// ```
#[derive(Clone, Default)]
pub struct ActivatorRegistry {
    factories: HashMap<String, ActivatorFactory>,
}

impl ActivatorRegistry {
    /// 创建空的激活器注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册激活器工厂
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Activator>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    /// 注册通过 `Default` 构造的激活器类型
    pub fn register_default<A>(&mut self, type_name: impl Into<String>)
    where
        A: Activator + Default + 'static,
    {
        self.register(type_name, || Ok(Box::new(A::default()) as Box<dyn Activator>));
    }

    /// 是否注册了某个类型名
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// 已注册的类型名数量
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// 通过模块的类加载器构造激活器
    ///
    /// # 错误
    ///
    /// - `ActivatorConstruction` - 类加载器中找不到该类型，或工厂返回错误
    /// - `ActivatorNotRegistered` - 没有注册该类型的工厂
    pub fn create(&self, type_name: &str, loader: &ModuleClassLoader) -> Result<Box<dyn Activator>> {
        loader
            .load_class(type_name)
            .map_err(|e| CoreError::ActivatorConstruction {
                activator: type_name.to_string(),
                reason: e.to_string(),
            })?;

        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| CoreError::ActivatorNotRegistered(type_name.to_string()))?;

        factory().map_err(|e| CoreError::ActivatorConstruction {
            activator: type_name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for ActivatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ActivatorRegistry").field("types", &names).finish()
    }
}
