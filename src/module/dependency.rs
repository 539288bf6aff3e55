//! 依赖解析
//!
//! 将模块从 `INSTALLED` 推进到 `RESOLVED`，或者记录无法解析的原因。
//!
//! 解析过程：
//! 1. 已有解析错误的模块直接失败，不在 `INSTALLED` 状态的模块跳过
//! 2. 收集依赖：声明的模块依赖，加上扩展所指向扩展点的声明模块（隐式、可选）
//! 3. 对每个依赖选择版本，检测循环，必要时递归解析
//! 4. 传播依赖的错误和警告：必需依赖的错误仍是错误，可选依赖的错误降级为警告
//! 5. 解析库依赖
//! 6. 没有错误则进入 `RESOLVED`，并为模块及其传递依赖增加引用计数

use std::collections::{HashSet, VecDeque};

use semver::Version;

use crate::module::code_root::{is_native_library, LIB_DIR};
use crate::module::metadata::{Dependency, Module, ModuleId, ModuleState, ResolvedLibrary};
use crate::module::registry::ModuleRegistry;
use crate::utils::{CoreError, ResolveIssue, Result};

/// 从候选版本中选择一个模块
///
/// 规则：
/// - 精确匹配要求的版本时直接选中
/// - 否则选择不低于要求版本的最低版本
/// - 没有满足要求的候选时，退回到最高版本（之后的版本检查会将其报告为未解析）
/// - 没有版本要求时选择最高版本
///
/// 已卸载的模块不参与选择。
///
/// # 示例
///
/// ```rust
/// use chips_runtime::module::dependency::select_version;
/// use chips_runtime::module::metadata::{parse_version, Module};
///
/// let modules: Vec<Module> = ["1.0", "1.5", "2.0"]
///     .iter()
///     .map(|v| Module::builder("a", parse_version(v).unwrap()).build())
///     .collect();
/// let candidates: Vec<&Module> = modules.iter().collect();
///
/// let required = parse_version("1.2").unwrap();
/// let selected = select_version(&candidates, Some(&required)).unwrap();
/// assert_eq!(selected.version().to_string(), "1.5.0");
/// ```
pub fn select_version<'m>(candidates: &[&'m Module], required: Option<&Version>) -> Option<&'m Module> {
    let live = || {
        candidates
            .iter()
            .copied()
            .filter(|m| m.state() != ModuleState::Uninstalled)
    };

    let highest = live().max_by(|a, b| a.version().cmp(b.version()));
    let Some(required) = required else {
        return highest;
    };

    if let Some(exact) = live().find(|m| m.version() == required) {
        return Some(exact);
    }

    live()
        .filter(|m| m.version() >= required)
        .min_by(|a, b| a.version().cmp(b.version()))
        .or(highest)
}

/// 一条待解析的模块依赖
#[derive(Debug, Clone)]
struct Requirement {
    target: RequirementTarget,
    optional: bool,
    description: String,
}

impl Requirement {
    fn merge(&mut self, dep: &Dependency) {
        let mut changed = self.optional && !dep.is_optional();
        self.optional &= dep.is_optional();
        if let RequirementTarget::Named { version, .. } = &mut self.target {
            if let Some(required) = dep.required_version() {
                if version.as_ref().map_or(true, |v| required > v) {
                    *version = Some(required.clone());
                    changed = true;
                }
            }
        }
        if changed {
            self.description = dep.to_string();
        }
    }
}

#[derive(Debug, Clone)]
enum RequirementTarget {
    /// 按符号名和最低版本选择
    Named {
        symbolic_name: String,
        version: Option<Version>,
    },
    /// 扩展点的声明模块
    Declarer(ModuleId),
}

/// 解析栈上的一帧
#[derive(Debug, Clone, Copy)]
struct Frame {
    id: ModuleId,
    /// 是否经由可选依赖进入
    optional: bool,
}

/// 依赖解析器
///
/// 一个解析器实例处理一次根调用形成的调用图，解析栈用于循环检测。
/// 批量解析时每个根模块使用一个新的解析器。
///
/// 环上只有必需依赖时，闭合环的模块记录 `CyclicDependency` 错误，并沿必需依赖
/// 传播。环上有可选依赖时，经由该可选依赖进入的模块及其之上的模块推迟解析：
/// 它们保持 `INSTALLED` 且不记录错误，之后可以单独解析。
///
/// # 示例
///
/// ```rust
/// use chips_runtime::module::dependency::DependencyResolver;
/// use chips_runtime::module::metadata::{parse_version, Dependency, Module, ModuleState};
/// use chips_runtime::module::registry::ModuleRegistry;
///
/// let mut registry = ModuleRegistry::new();
/// registry.register(Module::builder("base", parse_version("1.0").unwrap()).build()).unwrap();
/// let app = registry
///     .register(
///         Module::builder("app", parse_version("1.0").unwrap())
///             .dependency(Dependency::module("base"))
///             .build(),
///     )
///     .unwrap();
///
/// DependencyResolver::new(&mut registry).resolve(app).unwrap();
/// assert_eq!(registry.module(app).unwrap().state(), ModuleState::Resolved);
/// ```
pub struct DependencyResolver<'r> {
    registry: &'r mut ModuleRegistry,
    /// 正在解析的模块
    stack: Vec<Frame>,
    /// 栈中从该深度开始的模块推迟解析
    deferred_from: Option<usize>,
}

impl<'r> DependencyResolver<'r> {
    /// 创建解析器
    pub fn new(registry: &'r mut ModuleRegistry) -> Self {
        Self {
            registry,
            stack: vec![],
            deferred_from: None,
        }
    }

    /// 解析模块
    ///
    /// # 错误
    ///
    /// - `ModuleNotFound` - 模块不存在
    /// - `Resolve` - 模块记录了解析错误（包括之前失败的解析）
    ///
    /// 已经解析过的模块直接返回 `Ok`。
    pub fn resolve(&mut self, id: ModuleId) -> Result<()> {
        let module = self.registry.require(id)?;
        if module.has_resolve_errors() {
            return Err(resolve_error(module));
        }
        if module.state() != ModuleState::Installed {
            tracing::debug!(module_id = %id, state = %module.state(), "模块无需解析，跳过");
            return Ok(());
        }

        self.stack.clear();
        self.deferred_from = None;
        self.resolve_module(id, false)?;

        let module = self.registry.require(id)?;
        if module.has_resolve_errors() {
            return Err(resolve_error(module));
        }
        Ok(())
    }

    fn resolve_module(&mut self, id: ModuleId, optional: bool) -> Result<()> {
        let (requirements, warnings) = self.collect_requirements(id)?;
        for warning in warnings {
            self.registry.require_mut(id)?.add_resolve_warning(warning);
        }

        tracing::debug!(
            module_id = %id,
            dependencies = requirements.len(),
            "开始解析模块"
        );

        self.stack.push(Frame { id, optional });
        let mut resolved = vec![];
        for requirement in &requirements {
            match self.resolve_requirement(id, requirement) {
                Ok(Some(dep)) if !resolved.contains(&dep) => resolved.push(dep),
                Ok(_) => {}
                Err(e) => {
                    self.stack.pop();
                    return Err(e);
                }
            }
            let depth = self.stack.len() - 1;
            if self.deferred_from.is_some_and(|from| depth >= from) {
                break;
            }
        }
        self.stack.pop();

        let depth = self.stack.len();
        if let Some(from) = self.deferred_from.filter(|from| depth >= *from) {
            if depth == from {
                self.deferred_from = None;
            }
            self.registry.require_mut(id)?.clear_resolve_issues();
            tracing::debug!(module_id = %id, "模块位于经由可选依赖的循环中，推迟解析");
            return Ok(());
        }

        let (libraries, issues) = self.resolve_libraries(id, &resolved)?;
        let module = self.registry.require_mut(id)?;
        for issue in issues {
            module.add_resolve_error(issue);
        }

        if module.has_resolve_errors() {
            tracing::warn!(
                module_id = %id,
                symbolic_name = %module.symbolic_name(),
                errors = module.resolve_errors().len(),
                "模块解析失败"
            );
            return Ok(());
        }

        module.set_resolution(resolved, libraries)?;
        module.set_state(ModuleState::Resolved)?;
        tracing::info!(
            module_id = %id,
            symbolic_name = %module.symbolic_name(),
            version = %module.version(),
            warnings = module.resolve_warnings().len(),
            "模块已解析"
        );

        self.increment_ref_counts(id)
    }

    /// 收集模块依赖：声明的模块依赖和扩展带来的隐式依赖
    fn collect_requirements(&self, id: ModuleId) -> Result<(Vec<Requirement>, Vec<ResolveIssue>)> {
        let module = self.registry.require(id)?;
        let mut requirements: Vec<Requirement> = vec![];
        let mut warnings = vec![];

        for dep in module.dependencies() {
            let Some(name) = dep.module_name() else {
                continue;
            };
            if name == module.symbolic_name() {
                tracing::debug!(module_id = %id, "忽略对自身的依赖");
                continue;
            }
            let existing = requirements.iter_mut().find(|r| {
                matches!(&r.target, RequirementTarget::Named { symbolic_name, .. } if symbolic_name == name)
            });
            match existing {
                // 重复声明合并：全部可选时才可选，版本取最高要求
                Some(requirement) => requirement.merge(dep),
                None => requirements.push(Requirement {
                    target: RequirementTarget::Named {
                        symbolic_name: name.to_string(),
                        version: dep.required_version().cloned(),
                    },
                    optional: dep.is_optional(),
                    description: dep.to_string(),
                }),
            }
        }

        for ext in module.extensions() {
            let Some(point) = self.registry.extension_point_from(ext.point(), id) else {
                warnings.push(ResolveIssue::ExtensionPointNotFound {
                    module: module.key(),
                    point: ext.point().to_string(),
                });
                continue;
            };
            let Some(declarer) = point.declaring_module() else {
                continue;
            };
            if declarer == id {
                continue;
            }
            let Some(owner) = self.registry.module(declarer) else {
                continue;
            };
            let seen = requirements.iter().any(|r| match &r.target {
                RequirementTarget::Named { symbolic_name, .. } => symbolic_name == owner.symbolic_name(),
                RequirementTarget::Declarer(existing) => *existing == declarer,
            });
            if !seen {
                requirements.push(Requirement {
                    target: RequirementTarget::Declarer(declarer),
                    optional: true,
                    description: format!("'{}'", owner.key()),
                });
            }
        }

        Ok((requirements, warnings))
    }

    /// 解析一条依赖，成功时返回依赖模块的 ID
    fn resolve_requirement(&mut self, id: ModuleId, requirement: &Requirement) -> Result<Option<ModuleId>> {
        let candidate = match &requirement.target {
            RequirementTarget::Named {
                symbolic_name,
                version,
            } => {
                let candidates = self.registry.modules_by_name(symbolic_name);
                select_version(&candidates, version.as_ref())
                    .filter(|m| version.as_ref().map_or(true, |v| m.version() >= v))
                    .and_then(Module::id)
            }
            RequirementTarget::Declarer(declarer) => self
                .registry
                .module(*declarer)
                .filter(|m| m.state() != ModuleState::Uninstalled)
                .and_then(Module::id),
        };

        let Some(dep) = candidate else {
            self.record_unresolved(id, requirement)?;
            return Ok(None);
        };

        if let Some(position) = self.stack.iter().position(|f| f.id == dep) {
            let issue = ResolveIssue::CyclicDependency(self.cycle_path(position, dep));
            let optional_entry = self.stack[position + 1..]
                .iter()
                .rposition(|f| f.optional)
                .map(|offset| position + 1 + offset);
            if let (false, Some(from)) = (requirement.optional, optional_entry) {
                tracing::debug!(module_id = %id, cycle = %issue, "循环经过可选依赖");
                self.deferred_from = Some(self.deferred_from.map_or(from, |d| d.min(from)));
                return Ok(None);
            }
            tracing::warn!(module_id = %id, cycle = %issue, "检测到循环依赖");
            let module = self.registry.require_mut(id)?;
            if requirement.optional {
                module.add_resolve_warning(issue);
            } else {
                module.add_resolve_error(issue);
            }
            return Ok(None);
        }

        let target = self.registry.require(dep)?;
        if target.state() == ModuleState::Installed && !target.has_resolve_errors() {
            self.resolve_module(dep, requirement.optional)?;
        }

        let target = self.registry.require(dep)?;
        let dep_errors = target.resolve_errors().to_vec();
        let dep_warnings = target.resolve_warnings().to_vec();
        let dep_resolved = target.state().is_resolved();

        let module = self.registry.require_mut(id)?;
        for warning in dep_warnings {
            module.add_resolve_warning(warning);
        }
        for error in dep_errors {
            if requirement.optional {
                module.add_resolve_warning(error);
            } else {
                module.add_resolve_error(error);
            }
        }

        if !dep_resolved {
            self.record_unresolved(id, requirement)?;
            return Ok(None);
        }
        Ok(Some(dep))
    }

    fn record_unresolved(&mut self, id: ModuleId, requirement: &Requirement) -> Result<()> {
        let module = self.registry.require_mut(id)?;
        let key = module.key();
        if requirement.optional {
            tracing::debug!(module = %key, dependency = %requirement.description, "可选依赖未解析");
            module.add_resolve_warning(ResolveIssue::OptionalDependencyUnresolved {
                module: key,
                dependency: requirement.description.clone(),
            });
        } else {
            module.add_resolve_error(ResolveIssue::MandatoryDependencyUnresolved {
                module: key,
                dependency: requirement.description.clone(),
            });
        }
        Ok(())
    }

    /// 从栈中 `position` 处开始的环路径，例如 `a:1.0.0 -> b:1.0.0 -> a:1.0.0`
    fn cycle_path(&self, position: usize, closing: ModuleId) -> String {
        self.stack[position..]
            .iter()
            .map(|f| f.id)
            .chain(std::iter::once(closing))
            .filter_map(|id| self.registry.module(id))
            .map(Module::key)
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// 解析库依赖
    ///
    /// 依次收集：模块自身的代码位置、声明的库依赖（先在自身代码根中查找，再到已解析的
    /// 依赖模块中查找）、`lib/` 目录下隐式打包的非本地库。
    fn resolve_libraries(
        &self,
        id: ModuleId,
        dependencies: &[ModuleId],
    ) -> Result<(Vec<ResolvedLibrary>, Vec<ResolveIssue>)> {
        let module = self.registry.require(id)?;
        let mut libraries = vec![ResolvedLibrary {
            owner: id,
            entry: None,
            location: module.location().to_string(),
        }];
        let mut issues = vec![];

        for dep in module.dependencies() {
            let Some(name) = dep.library_name() else {
                continue;
            };

            let found = std::iter::once(id)
                .chain(dependencies.iter().copied())
                .filter_map(|owner| self.registry.module(owner))
                .find_map(|owner| {
                    let root = owner.code_root()?;
                    if !root.contains(name) {
                        return None;
                    }
                    Some(ResolvedLibrary {
                        owner: owner.id()?,
                        entry: Some(name.to_string()),
                        location: root.entry_location(name),
                    })
                });

            match found {
                Some(library) => {
                    if !libraries.contains(&library) {
                        libraries.push(library);
                    }
                }
                None if dep.is_optional() => {
                    tracing::debug!(module_id = %id, library = %name, "可选库未找到");
                }
                None => issues.push(ResolveIssue::MandatoryLibraryUnresolved {
                    module: module.key(),
                    library: name.to_string(),
                }),
            }
        }

        if let Some(root) = module.code_root() {
            for entry in root.list(LIB_DIR) {
                if is_native_library(&entry) {
                    continue;
                }
                let library = ResolvedLibrary {
                    owner: id,
                    location: root.entry_location(&entry),
                    entry: Some(entry),
                };
                if !libraries.contains(&library) {
                    libraries.push(library);
                }
            }
        }

        Ok((libraries, issues))
    }

    /// 为模块及其传递依赖（去重）各增加一次引用计数
    fn increment_ref_counts(&mut self, id: ModuleId) -> Result<()> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let module = self.registry.require_mut(current)?;
            module.increment_ref_count();
            if let Some(deps) = module.resolved_dependencies() {
                queue.extend(deps.iter().copied());
            }
        }
        Ok(())
    }
}

fn resolve_error(module: &Module) -> CoreError {
    CoreError::Resolve {
        module: module.key(),
        errors: module.resolve_errors().to_vec(),
    }
}
