//! 模块注册表
//!
//! 管理所有已注册的模块，并维护全局唯一的扩展点命名空间。
//!
//! 注册表是一个以 [`ModuleId`] 为键的模块仓库，按注册顺序迭代。解析器、
//! 类加载器和生命周期管理器都通过显式传入的注册表访问模块，而不是全局单例。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::module::metadata::{Extension, ExtensionPoint, Module, ModuleId, ModuleState};
use crate::utils::{CoreError, Result};

/// 模块注册表
///
/// 维护以下索引：
/// - ID -> 模块（按注册顺序）
/// - 位置 -> ID
/// - 符号名 -> ID 列表（同一模块的多个版本可以共存）
/// - 限定扩展点 ID -> 声明模块 ID
#[derive(Debug)]
pub struct ModuleRegistry {
    /// 已注册的模块：id -> Module
    modules: BTreeMap<ModuleId, Module>,

    /// 位置索引：location -> id
    locations: HashMap<String, ModuleId>,

    /// 符号名索引：symbolic_name -> [id]
    names: HashMap<String, Vec<ModuleId>>,

    /// 扩展点索引：qualified_id -> 声明模块 id
    extension_points: HashMap<String, ModuleId>,

    /// 下一个可分配的 ID
    next_id: u64,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
            locations: HashMap::new(),
            names: HashMap::new(),
            extension_points: HashMap::new(),
            next_id: 1,
        }
    }

    /// 注册模块
    ///
    /// # Arguments
    ///
    /// * `module` - 由外部加载器构建的模块
    ///
    /// # Returns
    ///
    /// 分配给模块的 ID
    ///
    /// # Errors
    ///
    /// - `DuplicateId` - 模块预先指定的 ID 已被占用
    /// - `InvalidMetadata` - 模块元数据无效
    /// - `DuplicateSymbolicNameAndVersion` - 同名同版本的模块已注册
    /// - `DuplicateLocation` - 位置已被其他模块占用
    /// - `DuplicateExtensionPointInModule` - 模块重复声明同一扩展点
    ///
    /// 所有检查都在修改注册表之前完成，失败时注册表保持不变。
    /// 其他模块已经声明过的扩展点不会被索引（先注册者优先）。
    pub fn register(&mut self, mut module: Module) -> Result<ModuleId> {
        if let Some(id) = module.id() {
            if self.modules.contains_key(&id) {
                return Err(CoreError::DuplicateId(id));
            }
        }

        if module.state() != ModuleState::Null {
            return Err(CoreError::InvalidMetadata(format!(
                "模块 '{}' 的状态为 {}，无法注册",
                module.key(),
                module.state()
            )));
        }

        module
            .validate()
            .map_err(|errors| CoreError::InvalidMetadata(errors.join("; ")))?;

        let duplicate_version = self
            .modules_by_name(module.symbolic_name())
            .iter()
            .any(|m| m.version() == module.version());
        if duplicate_version {
            return Err(CoreError::DuplicateSymbolicNameAndVersion {
                symbolic_name: module.symbolic_name().to_string(),
                version: module.version().to_string(),
            });
        }

        if self.locations.contains_key(module.location()) {
            return Err(CoreError::DuplicateLocation(module.location().to_string()));
        }

        let mut own_points = HashSet::new();
        let mut new_points = vec![];
        for point in module.extension_points() {
            let qualified = point.qualified_id().to_string();
            if !own_points.insert(qualified.clone()) {
                return Err(CoreError::DuplicateExtensionPointInModule {
                    module: module.key(),
                    point: qualified,
                });
            }
            match self.extension_points.get(&qualified) {
                Some(owner) => {
                    tracing::debug!(
                        point = %qualified,
                        owner = %owner,
                        module = %module.key(),
                        "扩展点已由其他模块声明，保留原声明"
                    );
                }
                None => new_points.push(qualified),
            }
        }

        let id = match module.id() {
            Some(id) => id,
            None => self.allocate_id(),
        };
        self.next_id = self.next_id.max(id.0 + 1);

        module.assign_id(id);
        module.set_state(ModuleState::Installed)?;

        self.locations.insert(module.location().to_string(), id);
        self.names
            .entry(module.symbolic_name().to_string())
            .or_default()
            .push(id);
        for qualified in new_points {
            self.extension_points.insert(qualified, id);
        }

        tracing::info!(
            module_id = %id,
            symbolic_name = %module.symbolic_name(),
            version = %module.version(),
            location = %module.location(),
            "模块已注册"
        );

        self.modules.insert(id, module);
        Ok(id)
    }

    fn allocate_id(&mut self) -> ModuleId {
        while self.modules.contains_key(&ModuleId(self.next_id)) {
            self.next_id += 1;
        }
        let id = ModuleId(self.next_id);
        self.next_id += 1;
        id
    }

    /// 将模块标记为已卸载
    ///
    /// 只允许从 `INSTALLED` 或 `RESOLVED` 状态卸载。模块声明的扩展点移交给下一个
    /// 声明了同一限定 ID 的模块（按注册顺序），文件的物理删除由调用方负责。
    pub fn uninstall(&mut self, id: ModuleId) -> Result<()> {
        let module = self.require_mut(id)?;
        module.set_state(ModuleState::Uninstalled)?;
        let points: Vec<String> = module
            .extension_points()
            .iter()
            .map(|p| p.qualified_id().to_string())
            .collect();

        for qualified in points {
            if self.extension_points.get(&qualified) != Some(&id) {
                continue;
            }
            self.extension_points.remove(&qualified);
            let successor = self
                .modules
                .values()
                .filter(|m| m.state() != ModuleState::Uninstalled)
                .find(|m| {
                    m.extension_points()
                        .iter()
                        .any(|p| p.qualified_id() == qualified)
                })
                .and_then(Module::id);
            if let Some(successor) = successor {
                tracing::debug!(point = %qualified, owner = %successor, "扩展点移交");
                self.extension_points.insert(qualified, successor);
            }
        }

        tracing::info!(module_id = %id, "模块已卸载");
        Ok(())
    }

    // ==================== 模块查询 ====================

    /// 按 ID 获取模块
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// 按 ID 获取模块，不存在时返回 `ModuleNotFound`
    pub fn require(&self, id: ModuleId) -> Result<&Module> {
        self.modules
            .get(&id)
            .ok_or_else(|| CoreError::ModuleNotFound(id.to_string()))
    }

    pub(crate) fn require_mut(&mut self, id: ModuleId) -> Result<&mut Module> {
        self.modules
            .get_mut(&id)
            .ok_or_else(|| CoreError::ModuleNotFound(id.to_string()))
    }

    /// 按位置获取模块
    pub fn module_by_location(&self, location: &str) -> Option<&Module> {
        self.locations
            .get(location)
            .and_then(|id| self.modules.get(id))
    }

    /// 按符号名获取模块（可能有多个版本，按注册顺序）
    pub fn modules_by_name(&self, symbolic_name: &str) -> Vec<&Module> {
        self.names
            .get(symbolic_name)
            .map(|ids| ids.iter().filter_map(|id| self.modules.get(id)).collect())
            .unwrap_or_default()
    }

    /// 按注册顺序迭代所有模块
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// 所有模块 ID（按注册顺序）
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.keys().copied().collect()
    }

    /// 已注册模块数量
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    // ==================== 扩展点查询 ====================

    /// 按限定 ID 查找扩展点
    pub fn extension_point(&self, qualified_id: &str) -> Option<&ExtensionPoint> {
        let owner = self.extension_points.get(qualified_id)?;
        self.modules
            .get(owner)?
            .extension_points()
            .iter()
            .find(|p| p.qualified_id() == qualified_id)
    }

    /// 从某个模块的视角查找扩展点
    ///
    /// 直接查找失败时，去掉 `模块名:` 前缀。没有前缀或前缀就是 `from` 自身时，先在
    /// `from` 模块自身中查找；然后按层搜索其依赖树：先检查所有直接依赖，再进入下一层
    /// 依赖。第一个匹配者胜出。
    pub fn extension_point_from(&self, point_id: &str, from: ModuleId) -> Option<&ExtensionPoint> {
        if let Some(point) = self.extension_point(point_id) {
            return Some(point);
        }

        let (prefix, local) = match point_id.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, point_id),
        };

        let origin = self.modules.get(&from)?;
        if prefix.map_or(true, |p| p == origin.symbolic_name()) {
            if let Some(point) = origin.extension_point(local) {
                return Some(point);
            }
        }

        let mut visited = HashSet::from([from]);
        let mut queue: VecDeque<ModuleId> = self.dependency_modules(origin).into();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(module) = self.modules.get(&id) else {
                continue;
            };
            if let Some(point) = module.extension_point(local) {
                return Some(point);
            }
            queue.extend(self.dependency_modules(module));
        }
        None
    }

    /// 查找扩展的目标扩展点，首次成功的查找结果缓存在扩展上
    pub fn resolve_extension(&self, extension: &Extension) -> Option<&ExtensionPoint> {
        if let Some(qualified) = extension.resolved_point_id() {
            return self.extension_point(qualified);
        }

        let point = match extension.declaring_module() {
            Some(from) => self.extension_point_from(extension.point(), from),
            None => self.extension_point(extension.point()),
        }?;
        extension.cache_point(point.qualified_id());
        Some(point)
    }

    /// 获取指向扩展点的所有扩展
    ///
    /// 声明扩展点的模块自己的扩展排在前面（按声明顺序），然后是其他模块的扩展
    /// （按注册顺序）。已卸载模块的扩展不包含在内。
    pub fn extensions(&self, qualified_point_id: &str) -> Vec<&Extension> {
        let Some(&declarer) = self.extension_points.get(qualified_point_id) else {
            return vec![];
        };

        let mut result = vec![];
        if let Some(module) = self.modules.get(&declarer) {
            if module.state() != ModuleState::Uninstalled {
                result.extend(self.matching_extensions(module, qualified_point_id));
            }
        }
        for module in self.modules.values() {
            if module.id() == Some(declarer) || module.state() == ModuleState::Uninstalled {
                continue;
            }
            result.extend(self.matching_extensions(module, qualified_point_id));
        }
        result
    }

    fn matching_extensions<'a>(
        &'a self,
        module: &'a Module,
        qualified_point_id: &str,
    ) -> impl Iterator<Item = &'a Extension> + 'a {
        let qualified_point_id = qualified_point_id.to_string();
        module.extensions().iter().filter(move |ext| {
            self.resolve_extension(ext)
                .map_or(false, |p| p.qualified_id() == qualified_point_id)
        })
    }

    /// 模块依赖的模块 ID
    ///
    /// 已解析的模块使用解析结果；否则按声明的模块依赖在注册表中挑选候选版本。
    pub(crate) fn dependency_modules(&self, module: &Module) -> Vec<ModuleId> {
        if let Some(resolved) = module.resolved_dependencies() {
            return resolved.to_vec();
        }

        module
            .dependencies()
            .iter()
            .filter_map(|dep| {
                let name = dep.module_name()?;
                let candidates = self.modules_by_name(name);
                crate::module::dependency::select_version(&candidates, dep.required_version())
                    .and_then(Module::id)
            })
            .collect()
    }
}
