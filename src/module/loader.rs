//! 模块类加载器
//!
//! 为每个已解析的模块组合一个类加载器，首次请求时构建并缓存在模块上。
//!
//! 查找顺序：
//! 1. 模块自身的代码根和库
//! 2. 已解析依赖模块的类加载器（按声明顺序，按需递归构建）
//! 3. 共享的平台根加载器
//!
//! 加载器构建完成后不再改变，可以被多个线程并发查询。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::code_root::{class_entry, file_name, native_library_name, CodeRoot, LIB_DIR};
use super::metadata::ModuleId;
use super::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 模块上的类加载器槽位
///
/// `Building` 标记用于在依赖图中出现环时避免无限递归。
#[derive(Debug, Default)]
pub(crate) enum LoaderSlot {
    #[default]
    Unbuilt,
    Building,
    Built(Arc<ModuleClassLoader>),
}

impl LoaderSlot {
    pub(crate) fn built(&self) -> Option<&Arc<ModuleClassLoader>> {
        match self {
            LoaderSlot::Built(loader) => Some(loader),
            _ => None,
        }
    }
}

/// 加载到的类
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    /// 类名
    pub name: String,
    /// 类条目的位置
    pub location: String,
    /// 定义该类的加载器名称
    pub loader: String,
    /// 定义该类的模块（平台根加载器为 `None`）
    pub module_id: Option<ModuleId>,
}

/// 模块类加载器
#[derive(Debug)]
pub struct ModuleClassLoader {
    module_id: Option<ModuleId>,
    name: String,
    roots: Vec<Arc<dyn CodeRoot>>,
    /// 本地库：逻辑名 -> 位置
    native_libraries: BTreeMap<String, String>,
    delegates: Vec<Arc<ModuleClassLoader>>,
    parent: Option<Arc<ModuleClassLoader>>,
}

impl ModuleClassLoader {
    /// 创建平台根加载器
    pub fn platform(roots: Vec<Arc<dyn CodeRoot>>) -> Self {
        let native_libraries = scan_native_libraries(&roots);
        Self {
            module_id: None,
            name: "platform".to_string(),
            roots,
            native_libraries,
            delegates: vec![],
            parent: None,
        }
    }

    /// 所属模块
    pub fn module_id(&self) -> Option<ModuleId> {
        self.module_id
    }

    /// 加载器名称（模块的 `符号名:版本`）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 自身的代码位置
    pub fn locations(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.location()).collect()
    }

    /// 委托加载器
    pub fn delegates(&self) -> &[Arc<ModuleClassLoader>] {
        &self.delegates
    }

    /// 加载类
    ///
    /// # 错误
    ///
    /// 类不在本模块、其依赖和平台根中时返回 `ClassNotFound`。
    pub fn load_class(&self, class_name: &str) -> Result<LoadedClass> {
        let entry = class_entry(class_name);
        self.find_entry(&entry)
            .map(|(loader, location)| LoadedClass {
                name: class_name.to_string(),
                location,
                loader: loader.name.clone(),
                module_id: loader.module_id,
            })
            .ok_or_else(|| CoreError::ClassNotFound {
                class: class_name.to_string(),
                loader: self.name.clone(),
            })
    }

    /// 查找资源，返回第一个匹配的位置
    pub fn find_resource(&self, name: &str) -> Option<String> {
        self.find_entry(name).map(|(_, location)| location)
    }

    /// 查找所有同名资源，按查找顺序去重
    pub fn find_resources(&self, name: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut found = vec![];
        self.collect_local(name, &mut visited, &mut found);
        if let Some(parent) = &self.parent {
            parent.collect_local(name, &mut visited, &mut found);
        }
        let mut seen = HashSet::new();
        found.retain(|location| seen.insert(location.clone()));
        found
    }

    /// 查找本地库，返回其位置
    pub fn find_library(&self, name: &str) -> Option<String> {
        let mut visited = HashSet::new();
        self.find_library_local(name, &mut visited)
            .or_else(|| self.parent.as_ref()?.find_library(name))
    }

    fn find_entry(&self, entry: &str) -> Option<(&ModuleClassLoader, String)> {
        let mut visited = HashSet::new();
        self.find_local(entry, &mut visited)
            .or_else(|| self.parent.as_ref()?.find_entry(entry))
    }

    /// 在自身和委托加载器中查找（不经过平台根）
    fn find_local<'a>(
        &'a self,
        entry: &str,
        visited: &mut HashSet<*const ModuleClassLoader>,
    ) -> Option<(&'a ModuleClassLoader, String)> {
        if !visited.insert(self as *const _) {
            return None;
        }
        if let Some(root) = self.roots.iter().find(|r| r.contains(entry)) {
            return Some((self, root.entry_location(entry)));
        }
        self.delegates
            .iter()
            .find_map(|delegate| delegate.find_local(entry, visited))
    }

    fn collect_local(
        &self,
        entry: &str,
        visited: &mut HashSet<*const ModuleClassLoader>,
        found: &mut Vec<String>,
    ) {
        if !visited.insert(self as *const _) {
            return;
        }
        found.extend(
            self.roots
                .iter()
                .filter(|r| r.contains(entry))
                .map(|r| r.entry_location(entry)),
        );
        for delegate in &self.delegates {
            delegate.collect_local(entry, visited, found);
        }
    }

    fn find_library_local(
        &self,
        name: &str,
        visited: &mut HashSet<*const ModuleClassLoader>,
    ) -> Option<String> {
        if !visited.insert(self as *const _) {
            return None;
        }
        if let Some(location) = self.native_libraries.get(name) {
            return Some(location.clone());
        }
        self.delegates
            .iter()
            .find_map(|delegate| delegate.find_library_local(name, visited))
    }
}

/// 扫描代码根顶层和 `lib/` 目录中的本地库
fn scan_native_libraries(roots: &[Arc<dyn CodeRoot>]) -> BTreeMap<String, String> {
    let mut libraries = BTreeMap::new();
    for root in roots {
        for entry in root.list("").into_iter().chain(root.list(LIB_DIR)) {
            if let Some(name) = native_library_name(file_name(&entry)) {
                libraries
                    .entry(name.to_string())
                    .or_insert_with(|| root.entry_location(&entry));
            }
        }
    }
    libraries
}

/// 模块加载器
///
/// 持有平台根加载器，按需为模块构建类加载器。
#[derive(Debug)]
pub struct ModuleLoader {
    platform: Arc<ModuleClassLoader>,
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader {
    /// 创建没有平台根代码的加载器
    pub fn new() -> Self {
        Self::with_platform_roots(vec![])
    }

    /// 以给定的平台根代码创建加载器
    pub fn with_platform_roots(roots: Vec<Arc<dyn CodeRoot>>) -> Self {
        info!(roots = roots.len(), "创建模块加载器");
        Self {
            platform: Arc::new(ModuleClassLoader::platform(roots)),
        }
    }

    /// 平台根加载器
    pub fn platform_loader(&self) -> &Arc<ModuleClassLoader> {
        &self.platform
    }

    /// 获取模块的类加载器，首次调用时构建
    ///
    /// # 错误
    ///
    /// - `ModuleNotFound` - 模块不存在
    /// - `LoaderUnavailable` - 模块尚未解析
    /// - `Internal` - 模块的加载器正在构建中（依赖图中出现了环）
    pub fn class_loader(
        &self,
        registry: &mut ModuleRegistry,
        id: ModuleId,
    ) -> Result<Arc<ModuleClassLoader>> {
        let module = registry.require(id)?;
        match &module.class_loader {
            LoaderSlot::Built(loader) => return Ok(Arc::clone(loader)),
            LoaderSlot::Building => {
                return Err(CoreError::Internal(format!(
                    "模块 '{}' 的类加载器正在构建",
                    module.key()
                )))
            }
            LoaderSlot::Unbuilt => {}
        }
        if !module.state().is_resolved() {
            return Err(CoreError::LoaderUnavailable {
                module: module.key(),
                reason: format!("模块状态为 {}", module.state()),
            });
        }

        registry.require_mut(id)?.class_loader = LoaderSlot::Building;
        let result = self.build(registry, id);

        let module = registry.require_mut(id)?;
        match result {
            Ok(loader) => {
                module.class_loader = LoaderSlot::Built(Arc::clone(&loader));
                Ok(loader)
            }
            Err(e) => {
                module.class_loader = LoaderSlot::Unbuilt;
                Err(e)
            }
        }
    }

    fn build(&self, registry: &mut ModuleRegistry, id: ModuleId) -> Result<Arc<ModuleClassLoader>> {
        let dependencies = registry
            .require(id)?
            .resolved_dependencies()
            .unwrap_or_default()
            .to_vec();

        let mut delegates = vec![];
        for dep in dependencies {
            let Some(target) = registry.module(dep) else {
                continue;
            };
            if matches!(target.class_loader, LoaderSlot::Building) {
                warn!(module_id = %id, dependency = %dep, "依赖的类加载器正在构建，跳过委托");
                continue;
            }
            if !target.state().is_resolved() {
                debug!(module_id = %id, dependency = %dep, state = %target.state(), "依赖未处于已解析状态，跳过委托");
                continue;
            }
            delegates.push(self.class_loader(registry, dep)?);
        }

        let module = registry.require(id)?;
        let mut roots: Vec<Arc<dyn CodeRoot>> = module.code_root().cloned().into_iter().collect();
        for library in module.resolved_libraries().unwrap_or_default() {
            let Some(entry) = &library.entry else {
                continue;
            };
            let nested = registry
                .module(library.owner)
                .and_then(|owner| owner.code_root())
                .and_then(|root| root.library(entry));
            if let Some(nested) = nested {
                roots.push(nested);
            }
        }

        let native_libraries = if module.is_native() {
            scan_native_libraries(&roots)
        } else {
            BTreeMap::new()
        };

        debug!(
            module_id = %id,
            roots = roots.len(),
            delegates = delegates.len(),
            native_libraries = native_libraries.len(),
            "类加载器已构建"
        );

        Ok(Arc::new(ModuleClassLoader {
            module_id: Some(id),
            name: module.key(),
            roots,
            native_libraries,
            delegates,
            parent: Some(Arc::clone(&self.platform)),
        }))
    }
}
