//! 模块元数据定义
//!
//! 定义运行时的数据模型：模块、依赖、扩展点、扩展和配置元素。
//!
//! 模块由外部加载器构建（见 [`ModuleBuilder`]）后交给注册表。声明部分在构建后不再改变；
//! 解析器写入的字段（依赖集合、库集合）只写一次，之后只读。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::module::activator::Activator;
use crate::module::code_root::CodeRoot;
use crate::module::loader::{LoaderSlot, ModuleClassLoader};
use crate::utils::{CoreError, ResolveIssue, Result};

/// 符号名格式
const SYMBOLIC_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.\-]*$";

static SYMBOLIC_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn symbolic_name_regex() -> std::result::Result<&'static Regex, regex::Error> {
    if let Some(re) = SYMBOLIC_NAME_RE.get() {
        return Ok(re);
    }
    let re = Regex::new(SYMBOLIC_NAME_PATTERN)?;
    Ok(SYMBOLIC_NAME_RE.get_or_init(|| re))
}

/// 模块运行时 ID
///
/// 注册时分配，之后不再改变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 宽松地解析版本号
///
/// 缺失的次版本号和修订号补 0，例如 `"1.5"` 解析为 `1.5.0`。
///
/// # 示例
///
/// ```rust
/// use chips_runtime::module::metadata::parse_version;
///
/// assert_eq!(parse_version("1.5").unwrap().to_string(), "1.5.0");
/// assert_eq!(parse_version("2").unwrap().to_string(), "2.0.0");
/// assert_eq!(parse_version("1.2.3-beta").unwrap().to_string(), "1.2.3-beta");
/// ```
pub fn parse_version(text: &str) -> Result<Version> {
    let text = text.trim();
    if let Ok(version) = Version::parse(text) {
        return Ok(version);
    }

    let (core, suffix) = match text.find(['-', '+']) {
        Some(index) => text.split_at(index),
        None => (text, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => text.to_string(),
    };
    Ok(Version::parse(&padded)?)
}

/// 模块状态
///
/// 合法的转换见 [`ModuleState::can_transition_to`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 已创建但未注册
    #[default]
    Null,
    /// 已注册
    Installed,
    /// 依赖已解析
    Resolved,
    /// 正在启动
    Starting,
    /// 运行中
    Active,
    /// 正在停止
    Stopping,
    /// 已卸载（终态）
    Uninstalled,
}

impl ModuleState {
    /// 是否允许从当前状态转换到 `next`
    ///
    /// `Starting -> Resolved` 和 `Stopping -> Active` 是激活器失败时的回退。
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Null, Installed)
                | (Installed, Resolved)
                | (Installed, Uninstalled)
                | (Resolved, Starting)
                | (Resolved, Uninstalled)
                | (Starting, Active)
                | (Starting, Resolved)
                | (Active, Stopping)
                | (Stopping, Resolved)
                | (Stopping, Active)
        )
    }

    /// 依赖是否已解析（包括启动中、运行中和停止中）
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ModuleState::Resolved | ModuleState::Starting | ModuleState::Active | ModuleState::Stopping
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Null => "NULL",
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::Starting => "STARTING",
            ModuleState::Active => "ACTIVE",
            ModuleState::Stopping => "STOPPING",
            ModuleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(name)
    }
}

/// 打包方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    /// 目录形式
    #[default]
    Dir,
    /// 单个归档文件
    Jar,
    /// 需要解包后使用的归档
    Archive,
}

/// 依赖目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyTarget {
    /// 依赖另一个模块
    Module {
        /// 目标模块符号名
        symbolic_name: String,
        /// 要求的最低版本
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<Version>,
    },
    /// 依赖一个库
    Library {
        /// 库名（相对模块位置的路径）
        name: String,
    },
}

/// 依赖声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// 依赖目标
    pub target: DependencyTarget,

    /// 是否可选；可选依赖未满足时只产生警告
    #[serde(default)]
    pub optional: bool,
}

impl Dependency {
    /// 模块依赖（不限版本）
    pub fn module(symbolic_name: impl Into<String>) -> Self {
        Self {
            target: DependencyTarget::Module {
                symbolic_name: symbolic_name.into(),
                version: None,
            },
            optional: false,
        }
    }

    /// 带最低版本要求的模块依赖
    pub fn module_version(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            target: DependencyTarget::Module {
                symbolic_name: symbolic_name.into(),
                version: Some(version),
            },
            optional: false,
        }
    }

    /// 库依赖
    pub fn library(name: impl Into<String>) -> Self {
        Self {
            target: DependencyTarget::Library { name: name.into() },
            optional: false,
        }
    }

    /// 设置为可选依赖
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 是否可选
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// 目标模块符号名（库依赖返回 `None`）
    pub fn module_name(&self) -> Option<&str> {
        match &self.target {
            DependencyTarget::Module { symbolic_name, .. } => Some(symbolic_name),
            DependencyTarget::Library { .. } => None,
        }
    }

    /// 要求的最低版本
    pub fn required_version(&self) -> Option<&Version> {
        match &self.target {
            DependencyTarget::Module { version, .. } => version.as_ref(),
            DependencyTarget::Library { .. } => None,
        }
    }

    /// 库名（模块依赖返回 `None`）
    pub fn library_name(&self) -> Option<&str> {
        match &self.target {
            DependencyTarget::Library { name } => Some(name),
            DependencyTarget::Module { .. } => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            DependencyTarget::Module {
                symbolic_name,
                version: Some(version),
            } => write!(f, "'{}' (>= {})", symbolic_name, version),
            DependencyTarget::Module { symbolic_name, .. } => write!(f, "'{}'", symbolic_name),
            DependencyTarget::Library { name } => write!(f, "库 '{}'", name),
        }
    }
}

/// 配置元素
///
/// 带属性的树节点。运行时只负责透传，不解释其内容。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationElement {
    /// 元素名
    pub name: String,

    /// 属性
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// 文本值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// 有序子元素
    #[serde(default)]
    pub children: Vec<ConfigurationElement>,
}

impl ConfigurationElement {
    /// 创建配置元素
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 设置属性
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 设置文本值
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// 追加子元素
    pub fn with_child(mut self, child: ConfigurationElement) -> Self {
        self.children.push(child);
        self
    }

    /// 读取属性
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 第一个指定名称的子元素
    pub fn child(&self, name: &str) -> Option<&ConfigurationElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 所有指定名称的子元素
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ConfigurationElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// 扩展点
///
/// `id` 在模块内唯一，`qualified_id`（`符号名:id`）注册后全局唯一。
#[derive(Debug, Clone)]
pub struct ExtensionPoint {
    id: String,
    qualified_id: String,
    declaring_module: Option<ModuleId>,
    configuration: Option<ConfigurationElement>,
}

impl ExtensionPoint {
    /// 创建扩展点
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            qualified_id: id.clone(),
            id,
            declaring_module: None,
            configuration: None,
        }
    }

    /// 设置配置模式
    pub fn with_configuration(mut self, configuration: ConfigurationElement) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// 模块内 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 全局限定 ID
    pub fn qualified_id(&self) -> &str {
        &self.qualified_id
    }

    /// 声明该扩展点的模块
    pub fn declaring_module(&self) -> Option<ModuleId> {
        self.declaring_module
    }

    /// 配置模式
    pub fn configuration(&self) -> Option<&ConfigurationElement> {
        self.configuration.as_ref()
    }
}

/// 扩展
///
/// `point` 可以是限定或非限定的扩展点 ID；首次成功查找后缓存限定 ID。
#[derive(Debug, Clone)]
pub struct Extension {
    id: Option<String>,
    point: String,
    declaring_module: Option<ModuleId>,
    configuration: Option<ConfigurationElement>,
    resolved_point: OnceLock<String>,
}

impl Extension {
    /// 创建指向 `point` 的扩展
    pub fn new(point: impl Into<String>) -> Self {
        Self {
            id: None,
            point: point.into(),
            declaring_module: None,
            configuration: None,
            resolved_point: OnceLock::new(),
        }
    }

    /// 设置扩展 ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// 设置配置
    pub fn with_configuration(mut self, configuration: ConfigurationElement) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// 扩展 ID
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 声明的目标扩展点
    pub fn point(&self) -> &str {
        &self.point
    }

    /// 声明该扩展的模块
    pub fn declaring_module(&self) -> Option<ModuleId> {
        self.declaring_module
    }

    /// 配置
    pub fn configuration(&self) -> Option<&ConfigurationElement> {
        self.configuration.as_ref()
    }

    /// 已缓存的目标扩展点限定 ID
    pub fn resolved_point_id(&self) -> Option<&str> {
        self.resolved_point.get().map(String::as_str)
    }

    pub(crate) fn cache_point(&self, qualified_id: &str) {
        let _ = self.resolved_point.set(qualified_id.to_string());
    }
}

/// 解析得到的库位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedLibrary {
    /// 库所在的模块
    pub owner: ModuleId,
    /// 在所属模块代码根中的条目；`None` 表示模块自身的代码位置
    pub entry: Option<String>,
    /// 库位置
    pub location: String,
}

/// 模块
///
/// 一个可部署的功能单元。标识（ID、位置、符号名与版本）注册后不可变。
pub struct Module {
    id: Option<ModuleId>,
    symbolic_name: String,
    version: Version,
    name: Option<String>,
    location: String,
    packaging: Packaging,
    native: bool,
    activator: Option<String>,
    dependencies: Vec<Dependency>,
    extension_points: Vec<ExtensionPoint>,
    extensions: Vec<Extension>,
    code_root: Option<Arc<dyn CodeRoot>>,

    state: ModuleState,
    resolved_dependencies: Option<Vec<ModuleId>>,
    resolved_libraries: Option<Vec<ResolvedLibrary>>,
    pub(crate) class_loader: LoaderSlot,
    ref_count: u32,
    resolve_errors: Vec<ResolveIssue>,
    resolve_warnings: Vec<ResolveIssue>,
    resolved_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    pub(crate) activation: Option<Box<dyn Activator>>,
}

impl Module {
    /// 创建模块构建器
    pub fn builder(symbolic_name: impl Into<String>, version: Version) -> ModuleBuilder {
        ModuleBuilder::new(symbolic_name, version)
    }

    /// 运行时 ID（注册前为 `None`）
    pub fn id(&self) -> Option<ModuleId> {
        self.id
    }

    /// 符号名
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    /// 版本
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// 显示名称，未设置时为符号名
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.symbolic_name)
    }

    /// `符号名:版本`，用于日志和循环检测
    pub fn key(&self) -> String {
        format!("{}:{}", self.symbolic_name, self.version)
    }

    /// 来源位置
    pub fn location(&self) -> &str {
        &self.location
    }

    /// 打包方式
    pub fn packaging(&self) -> Packaging {
        self.packaging
    }

    /// 是否包含本地库
    pub fn is_native(&self) -> bool {
        self.native
    }

    /// 激活器类型名
    pub fn activator_name(&self) -> Option<&str> {
        self.activator.as_deref()
    }

    /// 声明的依赖
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// 声明的扩展点
    pub fn extension_points(&self) -> &[ExtensionPoint] {
        &self.extension_points
    }

    /// 按模块内 ID 查找声明的扩展点
    pub fn extension_point(&self, id: &str) -> Option<&ExtensionPoint> {
        self.extension_points.iter().find(|p| p.id == id)
    }

    /// 声明的扩展
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// 可读的代码根
    pub fn code_root(&self) -> Option<&Arc<dyn CodeRoot>> {
        self.code_root.as_ref()
    }

    /// 当前状态
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// 解析得到的模块依赖（按声明顺序）
    pub fn resolved_dependencies(&self) -> Option<&[ModuleId]> {
        self.resolved_dependencies.as_deref()
    }

    /// 解析得到的库位置
    pub fn resolved_libraries(&self) -> Option<&[ResolvedLibrary]> {
        self.resolved_libraries.as_deref()
    }

    /// 已构建的类加载器
    pub fn class_loader(&self) -> Option<&Arc<ModuleClassLoader>> {
        self.class_loader.built()
    }

    /// 引用计数
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// 解析错误
    pub fn resolve_errors(&self) -> &[ResolveIssue] {
        &self.resolve_errors
    }

    /// 解析警告
    pub fn resolve_warnings(&self) -> &[ResolveIssue] {
        &self.resolve_warnings
    }

    /// 是否有解析错误
    pub fn has_resolve_errors(&self) -> bool {
        !self.resolve_errors.is_empty()
    }

    /// 解析完成时间
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// 最近一次启动时间
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// 验证元数据有效性
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = vec![];

        match symbolic_name_regex() {
            Ok(re) if re.is_match(&self.symbolic_name) => {}
            Ok(_) => errors.push(format!("无效的符号名: '{}'", self.symbolic_name)),
            Err(e) => errors.push(format!("符号名格式无法编译: {}", e)),
        }

        if self.location.trim().is_empty() {
            errors.push("模块位置不能为空".to_string());
        }

        for point in &self.extension_points {
            if point.id.is_empty() || point.id.contains(':') {
                errors.push(format!("无效的扩展点 ID: '{}'", point.id));
            }
        }

        for ext in &self.extensions {
            if ext.point.is_empty() {
                errors.push("扩展必须指定扩展点".to_string());
            }
        }

        for dep in &self.dependencies {
            if dep.module_name().map_or(false, str::is_empty)
                || dep.library_name().map_or(false, str::is_empty)
            {
                errors.push("依赖名称不能为空".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    // ==================== 运行时写入 ====================

    pub(crate) fn assign_id(&mut self, id: ModuleId) {
        self.id = Some(id);
        for point in &mut self.extension_points {
            point.declaring_module = Some(id);
        }
        for ext in &mut self.extensions {
            ext.declaring_module = Some(id);
        }
    }

    pub(crate) fn set_state(&mut self, next: ModuleState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::IllegalLifecycleTransition {
                module: self.key(),
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(module = %self.key(), from = %self.state, to = %next, "模块状态转换");
        self.state = next;
        match next {
            ModuleState::Resolved if self.resolved_at.is_none() => {
                self.resolved_at = Some(Utc::now());
            }
            ModuleState::Active => {
                self.started_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// 连续重复的消息只记录一次
    pub(crate) fn add_resolve_error(&mut self, issue: ResolveIssue) {
        if self.resolve_errors.last() != Some(&issue) {
            self.resolve_errors.push(issue);
        }
    }

    pub(crate) fn add_resolve_warning(&mut self, issue: ResolveIssue) {
        if self.resolve_warnings.last() != Some(&issue) {
            self.resolve_warnings.push(issue);
        }
    }

    /// 推迟解析时清除本次记录的问题
    pub(crate) fn clear_resolve_issues(&mut self) {
        self.resolve_errors.clear();
        self.resolve_warnings.clear();
    }

    pub(crate) fn set_resolution(
        &mut self,
        dependencies: Vec<ModuleId>,
        libraries: Vec<ResolvedLibrary>,
    ) -> Result<()> {
        if self.resolved_dependencies.is_some() || self.resolved_libraries.is_some() {
            return Err(CoreError::Internal(format!(
                "模块 '{}' 的解析结果已写入",
                self.key()
            )));
        }
        self.resolved_dependencies = Some(dependencies);
        self.resolved_libraries = Some(libraries);
        Ok(())
    }

    pub(crate) fn increment_ref_count(&mut self) {
        self.ref_count += 1;
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("symbolic_name", &self.symbolic_name)
            .field("version", &self.version.to_string())
            .field("location", &self.location)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .field("resolved_dependencies", &self.resolved_dependencies)
            .field("ref_count", &self.ref_count)
            .field("resolve_errors", &self.resolve_errors)
            .field("resolve_warnings", &self.resolve_warnings)
            .field("active", &self.activation.is_some())
            .finish()
    }
}

/// 模块构建器
///
/// 供外部加载器使用，一次性填充模块的声明部分。
///
/// # 示例
///
/// ```rust
/// use chips_runtime::module::metadata::{parse_version, Dependency, Extension, Module};
///
/// let module = Module::builder("chips.viewer", parse_version("1.2").unwrap())
///     .location("/modules/chips.viewer")
///     .dependency(Dependency::module("chips.core"))
///     .extension(Extension::new("chips.core:actions").with_id("open"))
///     .build();
///
/// assert_eq!(module.key(), "chips.viewer:1.2.0");
/// assert!(module.id().is_none());
/// ```
pub struct ModuleBuilder {
    id: Option<ModuleId>,
    symbolic_name: String,
    version: Version,
    name: Option<String>,
    location: Option<String>,
    packaging: Packaging,
    native: bool,
    activator: Option<String>,
    dependencies: Vec<Dependency>,
    extension_points: Vec<ExtensionPoint>,
    extensions: Vec<Extension>,
    code_root: Option<Arc<dyn CodeRoot>>,
}

impl ModuleBuilder {
    /// 创建构建器
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            id: None,
            symbolic_name: symbolic_name.into(),
            version,
            name: None,
            location: None,
            packaging: Packaging::default(),
            native: false,
            activator: None,
            dependencies: vec![],
            extension_points: vec![],
            extensions: vec![],
            code_root: None,
        }
    }

    /// 预先指定模块 ID（默认由注册表分配）
    pub fn id(mut self, id: u64) -> Self {
        self.id = Some(ModuleId(id));
        self
    }

    /// 显示名称
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 来源位置；未设置时取代码根位置
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// 打包方式
    pub fn packaging(mut self, packaging: Packaging) -> Self {
        self.packaging = packaging;
        self
    }

    /// 标记为本地模块
    pub fn native(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    /// 激活器类型名
    pub fn activator(mut self, type_name: impl Into<String>) -> Self {
        self.activator = Some(type_name.into());
        self
    }

    /// 添加依赖
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 添加扩展点
    pub fn extension_point(mut self, point: ExtensionPoint) -> Self {
        self.extension_points.push(point);
        self
    }

    /// 添加扩展
    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// 代码根
    pub fn code_root(mut self, root: Arc<dyn CodeRoot>) -> Self {
        self.code_root = Some(root);
        self
    }

    /// 构建模块
    pub fn build(self) -> Module {
        let location = self
            .location
            .or_else(|| self.code_root.as_ref().map(|r| r.location().to_string()))
            .unwrap_or_else(|| format!("{}-{}", self.symbolic_name, self.version));

        let mut extension_points = self.extension_points;
        for point in &mut extension_points {
            point.qualified_id = format!("{}:{}", self.symbolic_name, point.id);
        }

        Module {
            id: self.id,
            symbolic_name: self.symbolic_name,
            version: self.version,
            name: self.name,
            location,
            packaging: self.packaging,
            native: self.native,
            activator: self.activator,
            dependencies: self.dependencies,
            extension_points,
            extensions: self.extensions,
            code_root: self.code_root,
            state: ModuleState::Null,
            resolved_dependencies: None,
            resolved_libraries: None,
            class_loader: LoaderSlot::Unbuilt,
            ref_count: 0,
            resolve_errors: vec![],
            resolve_warnings: vec![],
            resolved_at: None,
            started_at: None,
            activation: None,
        }
    }
}
