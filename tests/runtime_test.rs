//! # 模块运行时集成测试
//!
//! 测试模块运行时的完整工作流程，包括：
//! - 注册 → 解析 → 启动 → 停止
//! - 重复注册、循环依赖、缺失依赖等错误场景
//! - 版本选择与引用计数
//! - 扩展点查询与类加载器委托

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chips_runtime::module::metadata::parse_version;
use chips_runtime::{
    Activator, ActivatorRegistry, CoreError, Dependency, DependencyResolver, Extension,
    ExtensionPoint, MemoryCodeRoot, Module, ModuleContext, ModuleId, ModuleLoader, ModuleManager,
    ModuleRegistry, ModuleState, ResolveIssue, Result,
};

// ============================================================================
// 测试辅助结构
// ============================================================================

fn module(name: &str, version: &str) -> chips_runtime::module::ModuleBuilder {
    Module::builder(name, parse_version(version).unwrap())
}

fn resolve(registry: &mut ModuleRegistry, id: ModuleId) -> Result<()> {
    DependencyResolver::new(registry).resolve(id)
}

/// 计数激活器，同时记录启动时可见的扩展数量
struct CountingActivator {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    extensions_seen: Arc<AtomicUsize>,
}

impl Activator for CountingActivator {
    fn start(&mut self, ctx: &ModuleContext<'_>) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.extensions_seen
            .store(ctx.extensions("actions").len(), Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self, _ctx: &ModuleContext<'_>) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default, Clone)]
struct Counters {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    extensions_seen: Arc<AtomicUsize>,
}

impl Counters {
    fn activators(&self, type_name: &str) -> ActivatorRegistry {
        let counters = self.clone();
        let mut activators = ActivatorRegistry::new();
        activators.register(type_name, move || {
            Ok(Box::new(CountingActivator {
                starts: counters.starts.clone(),
                stops: counters.stops.clone(),
                extensions_seen: counters.extensions_seen.clone(),
            }) as Box<dyn Activator>)
        });
        activators
    }
}

// ============================================================================
// 注册
// ============================================================================

#[test]
fn test_duplicate_name_and_version_rejected() {
    let mut registry = ModuleRegistry::new();
    registry.register(module("a", "1.0").location("first").build()).unwrap();

    let err = registry
        .register(module("a", "1.0").location("second").build())
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateSymbolicNameAndVersion { .. }));

    // 不同版本可以共存
    registry.register(module("a", "1.1").build()).unwrap();
    assert_eq!(registry.modules_by_name("a").len(), 2);
}

#[test]
fn test_duplicate_id_rejected() {
    let mut registry = ModuleRegistry::new();
    registry.register(module("a", "1.0").id(7).build()).unwrap();

    let err = registry.register(module("b", "1.0").id(7).build()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateId(ModuleId(7))));
    assert_eq!(registry.len(), 1);
}

// ============================================================================
// 解析
// ============================================================================

#[test]
fn test_direct_cycle_never_resolves() {
    let mut registry = ModuleRegistry::new();
    let a = registry
        .register(module("a", "1.0").dependency(Dependency::module("b")).build())
        .unwrap();
    let b = registry
        .register(module("b", "1.0").dependency(Dependency::module("a")).build())
        .unwrap();

    let err = resolve(&mut registry, a).unwrap_err();
    assert!(matches!(err, CoreError::Resolve { .. }));

    let cycle = registry
        .module(a)
        .unwrap()
        .resolve_errors()
        .iter()
        .find_map(|e| match e {
            ResolveIssue::CyclicDependency(path) => Some(path.clone()),
            _ => None,
        })
        .expect("cycle recorded on a");
    assert!(cycle.contains("a:1.0.0"));
    assert!(cycle.contains("b:1.0.0"));

    assert_ne!(registry.module(a).unwrap().state(), ModuleState::Resolved);
    assert_ne!(registry.module(b).unwrap().state(), ModuleState::Resolved);
}

#[test]
fn test_optional_back_edge_independent_of_registration_order() {
    let app = || module("app", "1.0").dependency(Dependency::module("plugin")).build();
    let plugin = || {
        module("plugin", "1.0")
            .dependency(Dependency::module("app").optional())
            .build()
    };

    for modules in [vec![app(), plugin()], vec![plugin(), app()]] {
        let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
        let report = manager.init(modules);

        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(report.resolved.len(), 2);
        assert_eq!(report.started.len(), 2);
    }
}

#[test]
fn test_missing_optional_dependency_is_warning() {
    let mut registry = ModuleRegistry::new();
    let a = registry
        .register(
            module("a", "1.0")
                .dependency(Dependency::module("missing").optional())
                .build(),
        )
        .unwrap();

    resolve(&mut registry, a).unwrap();

    let a = registry.module(a).unwrap();
    assert_eq!(a.state(), ModuleState::Resolved);
    assert!(a.resolve_errors().is_empty());
    assert_eq!(a.resolve_warnings().len(), 1);
    assert!(matches!(
        a.resolve_warnings()[0],
        ResolveIssue::OptionalDependencyUnresolved { .. }
    ));
}

#[test]
fn test_version_selection() {
    let mut registry = ModuleRegistry::new();
    let mut ids = vec![];
    for version in ["1.0", "1.5", "2.0"] {
        ids.push(registry.register(module("lib", version).build()).unwrap());
    }

    let wants_1_2 = registry
        .register(
            module("app", "1.0")
                .dependency(Dependency::module_version("lib", parse_version("1.2").unwrap()))
                .build(),
        )
        .unwrap();
    resolve(&mut registry, wants_1_2).unwrap();
    assert_eq!(
        registry.module(wants_1_2).unwrap().resolved_dependencies(),
        Some(&[ids[1]][..])
    );

    let wants_3_0 = registry
        .register(
            module("tool", "1.0")
                .dependency(Dependency::module_version("lib", parse_version("3.0").unwrap()))
                .build(),
        )
        .unwrap();
    assert!(resolve(&mut registry, wants_3_0).is_err());

    let tool = registry.module(wants_3_0).unwrap();
    assert_eq!(tool.state(), ModuleState::Installed);
    assert!(tool
        .resolve_errors()
        .iter()
        .any(|e| matches!(e, ResolveIssue::MandatoryDependencyUnresolved { .. })));
}

#[test]
fn test_ref_count_counts_distinct_dependents() {
    // app -> (left, right) -> base
    let mut registry = ModuleRegistry::new();
    let base = registry.register(module("base", "1.0").build()).unwrap();
    let left = registry
        .register(module("left", "1.0").dependency(Dependency::module("base")).build())
        .unwrap();
    let right = registry
        .register(module("right", "1.0").dependency(Dependency::module("base")).build())
        .unwrap();
    let app = registry
        .register(
            module("app", "1.0")
                .dependency(Dependency::module("left"))
                .dependency(Dependency::module("right"))
                .build(),
        )
        .unwrap();

    resolve(&mut registry, app).unwrap();

    let count = |id| registry.module(id).unwrap().ref_count();
    assert_eq!(count(app), 1);
    assert_eq!(count(left), 2);
    assert_eq!(count(right), 2);
    assert_eq!(count(base), 4);
}

// ============================================================================
// 扩展点
// ============================================================================

#[test]
fn test_declarer_extensions_listed_first() {
    let mut registry = ModuleRegistry::new();
    registry
        .register(
            module("ext", "1.0")
                .dependency(Dependency::module("core"))
                .extension(Extension::new("core:actions").with_id("e1"))
                .build(),
        )
        .unwrap();
    registry
        .register(
            module("core", "1.0")
                .extension_point(ExtensionPoint::new("actions"))
                .extension(Extension::new("actions").with_id("d1"))
                .build(),
        )
        .unwrap();

    let ids: Vec<Option<&str>> = registry
        .extensions("core:actions")
        .into_iter()
        .map(Extension::id)
        .collect();
    assert_eq!(ids, vec![Some("d1"), Some("e1")]);
}

// ============================================================================
// 生命周期
// ============================================================================

#[test]
fn test_start_requires_resolved_module() {
    let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
    let id = manager.registry_mut().register(module("a", "1.0").build()).unwrap();

    let err = manager.start_module(id).unwrap_err();
    assert!(matches!(
        err,
        CoreError::IllegalLifecycleTransition {
            from: ModuleState::Installed,
            to: ModuleState::Starting,
            ..
        }
    ));
}

#[test]
fn test_full_lifecycle_with_activator() {
    let counters = Counters::default();
    let mut manager =
        ModuleManager::with_loader(ModuleLoader::new(), counters.activators("app.Activator"));

    let report = manager.init(vec![
        module("core", "1.0")
            .extension_point(ExtensionPoint::new("actions"))
            .build(),
        module("app", "1.0")
            .dependency(Dependency::module("core"))
            .activator("app.Activator")
            .extension(Extension::new("core:actions").with_id("open"))
            .code_root(MemoryCodeRoot::new("mem:app").with_class("app.Activator").into_shared())
            .build(),
    ]);

    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.started.len(), 2);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.extensions_seen.load(Ordering::SeqCst), 1);

    // 第二次启动不会再次调用激活器
    let app = report.started[1];
    manager.start_module(app).unwrap();
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

    let app_module = manager.registry().module(app).unwrap();
    assert_eq!(app_module.state(), ModuleState::Active);
    assert!(app_module.started_at().is_some());

    assert!(manager.dispose().is_empty());
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.registry().module(app).unwrap().state(),
        ModuleState::Resolved
    );
}

// ============================================================================
// 类加载
// ============================================================================

#[test]
fn test_class_lookup_delegates_to_dependencies() {
    let mut manager = ModuleManager::with_loader(ModuleLoader::new(), ActivatorRegistry::new());
    let report = manager.init(vec![
        module("base", "1.0")
            .code_root(MemoryCodeRoot::new("mem:base").with_class("base.Util").into_shared())
            .build(),
        module("app", "1.0")
            .dependency(Dependency::module("base"))
            .code_root(MemoryCodeRoot::new("mem:app").with_class("app.Main").into_shared())
            .build(),
    ]);
    assert!(report.is_success());

    let base = manager.registry().modules_by_name("base")[0].id().unwrap();
    let app = manager.registry().modules_by_name("app")[0].id().unwrap();
    let loader = manager.class_loader(app).unwrap();

    let own = loader.load_class("app.Main").unwrap();
    assert_eq!(own.module_id, Some(app));

    let delegated = loader.load_class("base.Util").unwrap();
    assert_eq!(delegated.module_id, Some(base));

    let err = loader.load_class("missing.Thing").unwrap_err();
    assert!(matches!(err, CoreError::ClassNotFound { .. }));
}
