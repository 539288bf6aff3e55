//! 模块管理器
//!
//! 整合注册表、依赖解析和生命周期管理，提供批量的初始化与释放流程：
//!
//! 1. 注册外部加载器提供的全部模块
//! 2. 逐个解析，失败的模块记录下来并继续处理其余模块
//! 3. 按引用计数从高到低启动已解析的模块
//! 4. 释放时按启动的逆序停止
//!
//! 单个模块的失败不会中断整个批次。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::activator::ActivatorRegistry;
use super::code_root::{CodeRoot, DirCodeRoot};
use super::dependency::DependencyResolver;
use super::lifecycle::LifecycleManager;
use super::loader::{ModuleClassLoader, ModuleLoader};
use super::metadata::{Module, ModuleId, ModuleState};
use super::registry::ModuleRegistry;
use crate::core::config::RuntimeConfig;
use crate::utils::{CoreError, Result};

/// 单个模块的失败记录
#[derive(Debug)]
pub struct ModuleFailure {
    /// 模块标识（`符号名:版本`）
    pub module: String,
    /// 失败原因
    pub error: CoreError,
}

impl ModuleFailure {
    fn new(module: impl Into<String>, error: CoreError) -> Self {
        Self {
            module: module.into(),
            error,
        }
    }
}

/// 初始化报告
#[derive(Debug, Default)]
pub struct InitReport {
    /// 注册成功的模块
    pub registered: Vec<ModuleId>,
    /// 解析成功的模块
    pub resolved: Vec<ModuleId>,
    /// 启动成功的模块（按启动顺序）
    pub started: Vec<ModuleId>,
    /// 失败记录
    pub failed: Vec<ModuleFailure>,
}

impl InitReport {
    /// 是否所有模块都成功启动
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 模块管理器
#[derive(Debug)]
pub struct ModuleManager {
    /// 模块注册表
    registry: ModuleRegistry,
    /// 生命周期管理器
    lifecycle: LifecycleManager,
    /// 由管理器启动的模块（按启动顺序）
    started: Vec<ModuleId>,
}

impl ModuleManager {
    /// 根据运行时配置创建模块管理器
    ///
    /// 配置中的 `lib_dirs` 作为平台根代码。
    pub fn new(config: &RuntimeConfig, activators: ActivatorRegistry) -> Self {
        let roots: Vec<Arc<dyn CodeRoot>> = config
            .lib_dirs
            .iter()
            .map(|dir| Arc::new(DirCodeRoot::new(dir)) as Arc<dyn CodeRoot>)
            .collect();
        Self::with_loader(ModuleLoader::with_platform_roots(roots), activators)
    }

    /// 使用指定的模块加载器创建
    pub fn with_loader(loader: ModuleLoader, activators: ActivatorRegistry) -> Self {
        info!("创建模块管理器");
        Self {
            registry: ModuleRegistry::new(),
            lifecycle: LifecycleManager::new(loader, activators),
            started: vec![],
        }
    }

    /// 模块注册表
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 可变的模块注册表
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// 生命周期管理器
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    // ==================== 批量流程 ====================

    /// 初始化：注册、解析并启动全部模块
    #[instrument(skip_all, fields(modules = modules.len()))]
    pub fn init(&mut self, modules: Vec<Module>) -> InitReport {
        info!("初始化模块运行时");
        let mut report = InitReport::default();

        let (registered, failed) = self.register_all(modules);
        report.registered = registered;
        report.failed.extend(failed);

        let (resolved, failed) = self.resolve_all();
        report.resolved = resolved;
        report.failed.extend(failed);

        let (started, failed) = self.start_all();
        report.started = started;
        report.failed.extend(failed);

        info!(
            registered = report.registered.len(),
            resolved = report.resolved.len(),
            started = report.started.len(),
            failed = report.failed.len(),
            "模块运行时初始化完成"
        );
        report
    }

    /// 释放：按启动的逆序停止模块
    ///
    /// 返回停止失败的模块。
    #[instrument(skip_all)]
    pub fn dispose(&mut self) -> Vec<ModuleFailure> {
        info!(modules = self.started.len(), "释放模块运行时");
        let mut failed = vec![];

        for id in std::mem::take(&mut self.started).into_iter().rev() {
            if let Err(e) = self.lifecycle.stop(&mut self.registry, id) {
                warn!(module_id = %id, error = %e, "停止模块失败");
                failed.push(ModuleFailure::new(self.module_key(id), e));
            }
        }
        failed
    }

    /// 注册全部模块，重复的模块被拒绝并记录
    pub fn register_all(&mut self, modules: Vec<Module>) -> (Vec<ModuleId>, Vec<ModuleFailure>) {
        let mut registered = vec![];
        let mut failed = vec![];

        for module in modules {
            let key = module.key();
            match self.registry.register(module) {
                Ok(id) => registered.push(id),
                Err(e) => {
                    warn!(module = %key, error = %e, error_code = e.error_code(), "模块注册失败");
                    failed.push(ModuleFailure::new(key, e));
                }
            }
        }
        (registered, failed)
    }

    /// 解析全部已注册的模块
    ///
    /// 每个根模块使用一个新的解析器；解析失败的模块不影响其他模块。
    pub fn resolve_all(&mut self) -> (Vec<ModuleId>, Vec<ModuleFailure>) {
        let mut failed = vec![];

        for id in self.registry.module_ids() {
            let state = self.registry.module(id).map(Module::state);
            if state != Some(ModuleState::Installed) {
                continue;
            }
            if let Err(e) = DependencyResolver::new(&mut self.registry).resolve(id) {
                warn!(module_id = %id, error = %e, "模块解析失败");
                failed.push(ModuleFailure::new(self.module_key(id), e));
            }
        }

        let resolved = self
            .registry
            .modules()
            .filter(|m| m.state() == ModuleState::Resolved)
            .filter_map(Module::id)
            .collect();
        (resolved, failed)
    }

    /// 启动顺序：引用计数从高到低，相同时按注册顺序
    pub fn activation_order(&self) -> Vec<ModuleId> {
        let mut modules: Vec<&Module> = self
            .registry
            .modules()
            .filter(|m| m.state() == ModuleState::Resolved)
            .collect();
        modules.sort_by(|a, b| b.ref_count().cmp(&a.ref_count()).then(a.id().cmp(&b.id())));
        modules.into_iter().filter_map(Module::id).collect()
    }

    /// 启动全部已解析的模块
    pub fn start_all(&mut self) -> (Vec<ModuleId>, Vec<ModuleFailure>) {
        let mut started = vec![];
        let mut failed = vec![];

        for id in self.activation_order() {
            match self.lifecycle.start(&mut self.registry, id) {
                Ok(()) => {
                    self.started.push(id);
                    started.push(id);
                }
                Err(e) => {
                    warn!(module_id = %id, error = %e, "模块启动失败");
                    failed.push(ModuleFailure::new(self.module_key(id), e));
                }
            }
        }
        (started, failed)
    }

    // ==================== 单个模块操作 ====================

    /// 启动单个模块
    pub fn start_module(&mut self, id: ModuleId) -> Result<()> {
        self.lifecycle.start(&mut self.registry, id)?;
        if !self.started.contains(&id) {
            self.started.push(id);
        }
        Ok(())
    }

    /// 停止单个模块
    pub fn stop_module(&mut self, id: ModuleId) -> Result<()> {
        self.lifecycle.stop(&mut self.registry, id)?;
        self.started.retain(|m| *m != id);
        Ok(())
    }

    /// 卸载模块，运行中的模块先停止
    pub fn uninstall_module(&mut self, id: ModuleId) -> Result<()> {
        if self.registry.require(id)?.state() == ModuleState::Active {
            self.stop_module(id)?;
        }
        self.registry.uninstall(id)
    }

    /// 获取模块的类加载器
    pub fn class_loader(&mut self, id: ModuleId) -> Result<Arc<ModuleClassLoader>> {
        self.lifecycle.loader().class_loader(&mut self.registry, id)
    }

    fn module_key(&self, id: ModuleId) -> String {
        self.registry
            .module(id)
            .map(Module::key)
            .unwrap_or_else(|| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{parse_version, Dependency};

    fn module(name: &str, deps: &[&str]) -> Module {
        let mut builder = Module::builder(name, parse_version("1.0").unwrap());
        for dep in deps {
            builder = builder.dependency(Dependency::module(*dep));
        }
        builder.build()
    }

    #[test]
    fn test_init_orders_by_ref_count() {
        let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
        let report = manager.init(vec![
            module("app", &["service"]),
            module("service", &["base"]),
            module("base", &[]),
        ]);

        assert!(report.is_success());
        assert_eq!(report.registered.len(), 3);
        assert_eq!(report.resolved.len(), 3);

        let names: Vec<&str> = report
            .started
            .iter()
            .map(|id| manager.registry().module(*id).unwrap().symbolic_name())
            .collect();
        assert_eq!(names, vec!["base", "service", "app"]);
    }

    #[test]
    fn test_init_continues_after_failures() {
        let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
        let report = manager.init(vec![
            module("ok", &[]),
            module("broken", &["missing"]),
            module("ok", &[]),
        ]);

        assert_eq!(report.registered.len(), 2);
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].error.is_registration_error());
        assert!(matches!(report.failed[1].error, CoreError::Resolve { .. }));
    }

    #[test]
    fn test_dispose_reverse_order() {
        let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
        let report = manager.init(vec![module("app", &["base"]), module("base", &[])]);

        assert!(manager.dispose().is_empty());
        for id in &report.started {
            assert_eq!(
                manager.registry().module(*id).unwrap().state(),
                ModuleState::Resolved
            );
        }
        // 第二次释放没有可停止的模块
        assert!(manager.dispose().is_empty());
    }

    #[test]
    fn test_uninstall_active_module() {
        let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
        let report = manager.init(vec![module("a", &[])]);
        let id = report.started[0];

        manager.uninstall_module(id).unwrap();
        assert_eq!(
            manager.registry().module(id).unwrap().state(),
            ModuleState::Uninstalled
        );
        assert!(manager.start_module(id).is_err());
    }

    #[test]
    fn test_new_uses_lib_dirs_as_platform_roots() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("platform")).unwrap();
        std::fs::write(dir.path().join("platform/Object.class"), b"").unwrap();

        let config = RuntimeConfig::builder().lib_dir(dir.path()).build();
        let mut manager = ModuleManager::new(&config, ActivatorRegistry::new());
        let report = manager.init(vec![module("a", &[])]);

        let loader = manager.class_loader(report.started[0]).unwrap();
        assert!(loader.load_class("platform.Object").is_ok());
    }
}
