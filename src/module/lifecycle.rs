//! 生命周期管理器
//!
//! 驱动模块在 `RESOLVED -> STARTING -> ACTIVE -> STOPPING -> RESOLVED` 之间转换，
//! 并在转换过程中调用模块的激活器。
//!
//! 激活器执行的是模块提供的任意代码。构造失败、回调返回错误或发生 panic
//! 都视为该模块自身的可恢复失败：模块回退一步，错误返回给调用方。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info};

use super::activator::{Activator, ActivatorRegistry, DefaultActivator, ModuleContext};
use super::loader::ModuleLoader;
use super::metadata::{ModuleId, ModuleState};
use super::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 生命周期管理器
#[derive(Debug, Default)]
pub struct LifecycleManager {
    /// 类加载器组合
    loader: ModuleLoader,

    /// 激活器工厂
    activators: ActivatorRegistry,
}

impl LifecycleManager {
    /// 创建生命周期管理器
    pub fn new(loader: ModuleLoader, activators: ActivatorRegistry) -> Self {
        info!(activators = activators.len(), "创建生命周期管理器");
        Self { loader, activators }
    }

    /// 模块加载器
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// 激活器注册表
    pub fn activators(&self) -> &ActivatorRegistry {
        &self.activators
    }

    /// 启动模块
    ///
    /// 模块已在 `STARTING` 或 `ACTIVE` 状态时不做任何事。
    ///
    /// # 错误
    ///
    /// - `IllegalLifecycleTransition` - 模块不在 `RESOLVED` 状态
    /// - `ModuleStartFailed` - 激活器构造或启动回调失败，模块已回退到 `RESOLVED`
    pub fn start(&self, registry: &mut ModuleRegistry, id: ModuleId) -> Result<()> {
        let module = registry.require(id)?;
        match module.state() {
            ModuleState::Starting | ModuleState::Active => {
                debug!(module_id = %id, state = %module.state(), "模块已启动，跳过");
                return Ok(());
            }
            ModuleState::Resolved => {}
            other => {
                return Err(CoreError::IllegalLifecycleTransition {
                    module: module.key(),
                    from: other,
                    to: ModuleState::Starting,
                })
            }
        }

        let key = module.key();
        let activator_name = module.activator_name().map(str::to_string);

        registry.require_mut(id)?.set_state(ModuleState::Starting)?;
        info!(module_id = %id, module = %key, "启动模块");

        let outcome = self.activate(registry, id, activator_name.as_deref());

        let module = registry.require_mut(id)?;
        match outcome {
            Ok(activator) => {
                module.activation = Some(activator);
                module.set_state(ModuleState::Active)?;
                info!(module_id = %id, module = %key, "模块已激活");
                Ok(())
            }
            Err(reason) => {
                module.set_state(ModuleState::Resolved)?;
                error!(module_id = %id, module = %key, error = %reason, "模块启动失败");
                Err(CoreError::ModuleStartFailed {
                    module_id: key,
                    reason,
                })
            }
        }
    }

    /// 停止模块
    ///
    /// 模块已在 `STOPPING` 或 `RESOLVED` 状态时不做任何事。
    ///
    /// # 错误
    ///
    /// - `IllegalLifecycleTransition` - 模块不在 `ACTIVE` 状态
    /// - `ModuleStopFailed` - 停止回调失败，模块已回退到 `ACTIVE`
    pub fn stop(&self, registry: &mut ModuleRegistry, id: ModuleId) -> Result<()> {
        let module = registry.require(id)?;
        match module.state() {
            ModuleState::Stopping | ModuleState::Resolved => {
                debug!(module_id = %id, state = %module.state(), "模块未运行，跳过");
                return Ok(());
            }
            ModuleState::Active => {}
            other => {
                return Err(CoreError::IllegalLifecycleTransition {
                    module: module.key(),
                    from: other,
                    to: ModuleState::Stopping,
                })
            }
        }

        let key = module.key();
        let module = registry.require_mut(id)?;
        module.set_state(ModuleState::Stopping)?;
        let activation = module.activation.take();
        info!(module_id = %id, module = %key, "停止模块");

        let mut activator: Box<dyn Activator> = match activation {
            Some(activator) => activator,
            None => Box::new(DefaultActivator),
        };
        let outcome = self.deactivate(registry, id, activator.as_mut());

        let module = registry.require_mut(id)?;
        match outcome {
            Ok(()) => {
                module.set_state(ModuleState::Resolved)?;
                info!(module_id = %id, module = %key, "模块已停止");
                Ok(())
            }
            Err(reason) => {
                module.activation = Some(activator);
                module.set_state(ModuleState::Active)?;
                error!(module_id = %id, module = %key, error = %reason, "模块停止失败");
                Err(CoreError::ModuleStopFailed {
                    module_id: key,
                    reason,
                })
            }
        }
    }

    /// 构造激活器并调用启动回调
    fn activate(
        &self,
        registry: &mut ModuleRegistry,
        id: ModuleId,
        activator_name: Option<&str>,
    ) -> std::result::Result<Box<dyn Activator>, String> {
        let class_loader = self
            .loader
            .class_loader(registry, id)
            .map_err(|e| e.to_string())?;

        let registry: &ModuleRegistry = registry;
        let module = registry.require(id).map_err(|e| e.to_string())?;
        let ctx = ModuleContext::new(registry, module, class_loader.clone());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Box<dyn Activator>> {
            let mut activator: Box<dyn Activator> = match activator_name {
                Some(name) => self.activators.create(name, &class_loader)?,
                None => Box::new(DefaultActivator),
            };
            activator.start(&ctx)?;
            Ok(activator)
        }));

        match outcome {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(payload) => Err(panic_message(payload)),
        }
    }

    /// 调用停止回调
    fn deactivate(
        &self,
        registry: &mut ModuleRegistry,
        id: ModuleId,
        activator: &mut dyn Activator,
    ) -> std::result::Result<(), String> {
        let class_loader = self
            .loader
            .class_loader(registry, id)
            .map_err(|e| e.to_string())?;

        let registry: &ModuleRegistry = registry;
        let module = registry.require(id).map_err(|e| e.to_string())?;
        let ctx = ModuleContext::new(registry, module, class_loader);

        match panic::catch_unwind(AssertUnwindSafe(|| activator.stop(&ctx))) {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(payload) => Err(panic_message(payload)),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("激活器 panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("激活器 panic: {}", message)
    } else {
        "激活器 panic".to_string()
    }
}
