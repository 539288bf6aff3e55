//! 代码根
//!
//! 代码根是模块代码的可读位置：一个目录、一个归档或者内存中的条目集合。
//! 解析器通过它查找库依赖，类加载器通过它查找类、资源和本地库。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// 隐式库目录
pub const LIB_DIR: &str = "lib";

/// 可读的代码位置
pub trait CodeRoot: Send + Sync + Debug {
    /// 代码根位置（用于日志和资源定位）
    fn location(&self) -> &str;

    /// 是否包含给定的条目
    fn contains(&self, entry: &str) -> bool;

    /// 列出目录的直接子条目（返回完整条目路径，`""` 表示根目录）
    fn list(&self, dir: &str) -> Vec<String>;

    /// 将条目作为嵌套代码根打开，例如 `lib/` 下的库
    fn library(&self, _entry: &str) -> Option<Arc<dyn CodeRoot>> {
        None
    }

    /// 条目的完整位置
    fn entry_location(&self, entry: &str) -> String {
        format!("{}/{}", self.location().trim_end_matches('/'), entry)
    }
}

/// 类名到条目路径的映射
///
/// `.` 和 `::` 均视为包分隔符，例如 `chips.core.Activator` 映射为
/// `chips/core/Activator.class`。
pub fn class_entry(class_name: &str) -> String {
    format!("{}.class", class_name.replace("::", "/").replace('.', "/"))
}

/// 当前平台上的本地库文件名，例如 Linux 上 `foo` 映射为 `libfoo.so`
pub fn native_library_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

/// 从文件名中提取本地库的逻辑名；不是当前平台的本地库时返回 `None`
pub fn native_library_name(file_name: &str) -> Option<&str> {
    let suffix = std::env::consts::DLL_SUFFIX;
    let stem = file_name.strip_suffix(suffix)?;
    let name = stem
        .strip_prefix(std::env::consts::DLL_PREFIX)
        .unwrap_or(stem);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// 条目是否是本地库
pub fn is_native_library(entry: &str) -> bool {
    native_library_name(file_name(entry)).is_some()
}

/// 条目的最后一段
pub fn file_name(entry: &str) -> &str {
    entry.trim_end_matches('/').rsplit('/').next().unwrap_or(entry)
}

fn normalize(entry: &str) -> String {
    entry.trim_matches('/').to_string()
}

fn direct_children<'a>(entries: impl Iterator<Item = &'a String>, dir: &str) -> Vec<String> {
    let dir = normalize(dir);
    let prefix = if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir)
    };

    let mut children = BTreeSet::new();
    for entry in entries {
        if let Some(rest) = entry.strip_prefix(&prefix) {
            if rest.is_empty() {
                continue;
            }
            let first = rest.split('/').next().unwrap_or(rest);
            children.insert(format!("{}{}", prefix, first));
        }
    }
    children.into_iter().collect()
}

// ==================== 内存代码根 ====================

/// 内存中的代码根
///
/// 主要用于测试和嵌入场景。
#[derive(Debug, Clone, Default)]
pub struct MemoryCodeRoot {
    location: String,
    entries: BTreeSet<String>,
    libraries: BTreeMap<String, Arc<MemoryCodeRoot>>,
}

impl MemoryCodeRoot {
    /// 创建空的代码根
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    /// 添加条目
    pub fn with_entry(mut self, entry: impl AsRef<str>) -> Self {
        self.entries.insert(normalize(entry.as_ref()));
        self
    }

    /// 添加类（按类名映射为条目）
    pub fn with_class(self, class_name: &str) -> Self {
        self.with_entry(class_entry(class_name))
    }

    /// 添加嵌套库；条目本身也会出现在代码根中
    pub fn with_library(mut self, entry: impl AsRef<str>, library: MemoryCodeRoot) -> Self {
        let entry = normalize(entry.as_ref());
        self.entries.insert(entry.clone());
        self.libraries.insert(entry, Arc::new(library));
        self
    }

    /// 包装为共享的代码根
    pub fn into_shared(self) -> Arc<dyn CodeRoot> {
        Arc::new(self)
    }
}

impl CodeRoot for MemoryCodeRoot {
    fn location(&self) -> &str {
        &self.location
    }

    fn contains(&self, entry: &str) -> bool {
        self.entries.contains(&normalize(entry))
    }

    fn list(&self, dir: &str) -> Vec<String> {
        direct_children(self.entries.iter(), dir)
    }

    fn library(&self, entry: &str) -> Option<Arc<dyn CodeRoot>> {
        self.libraries
            .get(&normalize(entry))
            .map(|lib| Arc::clone(lib) as Arc<dyn CodeRoot>)
    }
}

// ==================== 目录代码根 ====================

/// 文件系统目录形式的代码根
#[derive(Debug, Clone)]
pub struct DirCodeRoot {
    root: PathBuf,
    location: String,
}

impl DirCodeRoot {
    /// 以目录创建代码根
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.to_string_lossy().into_owned();
        Self { root, location }
    }

    /// 根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 条目对应的文件路径；拒绝跳出根目录的条目
    fn path_of(&self, entry: &str) -> Option<PathBuf> {
        let relative = Path::new(entry.trim_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl CodeRoot for DirCodeRoot {
    fn location(&self) -> &str {
        &self.location
    }

    fn contains(&self, entry: &str) -> bool {
        self.path_of(entry).map_or(false, |p| p.exists())
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let Some(path) = self.path_of(dir) else {
            return vec![];
        };
        let Ok(read_dir) = std::fs::read_dir(&path) else {
            return vec![];
        };

        let dir = normalize(dir);
        let mut children: Vec<String> = read_dir
            .flatten()
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", dir, name)
                }
            })
            .collect();
        children.sort();
        children
    }

    fn library(&self, entry: &str) -> Option<Arc<dyn CodeRoot>> {
        let path = self.path_of(entry)?;
        if path.is_dir() {
            Some(Arc::new(DirCodeRoot::new(path)))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_class_entry_mapping() {
        assert_eq!(class_entry("chips.core.Activator"), "chips/core/Activator.class");
        assert_eq!(class_entry("chips::core::Activator"), "chips/core/Activator.class");
        assert_eq!(class_entry("Plain"), "Plain.class");
    }

    #[test]
    fn test_native_library_names() {
        let file = native_library_file_name("render");
        assert_eq!(native_library_name(&file), Some("render"));
        assert!(is_native_library(&format!("lib/{}", file)));
        assert!(!is_native_library("lib/jdom.jar"));
    }

    #[test]
    fn test_memory_root_lists_direct_children() {
        let root = MemoryCodeRoot::new("mem:a")
            .with_entry("lib/x.jar")
            .with_entry("lib/y.jar")
            .with_entry("lib/nested/z.jar")
            .with_class("a.Main");

        assert_eq!(
            root.list("lib"),
            vec!["lib/nested", "lib/x.jar", "lib/y.jar"]
        );
        assert_eq!(root.list(""), vec!["a", "lib"]);
        assert!(root.contains("a/Main.class"));
        assert!(!root.contains("a/Other.class"));
        assert_eq!(root.entry_location("lib/x.jar"), "mem:a/lib/x.jar");
    }

    #[test]
    fn test_memory_root_nested_library() {
        let root = MemoryCodeRoot::new("mem:a")
            .with_library("lib/util.jar", MemoryCodeRoot::new("mem:util").with_class("util.Helper"));

        assert!(root.contains("lib/util.jar"));
        let lib = root.library("lib/util.jar").unwrap();
        assert!(lib.contains(&class_entry("util.Helper")));
        assert!(root.library("lib/none.jar").is_none());
    }

    #[test]
    fn test_dir_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/classes/util")).unwrap();
        std::fs::write(dir.path().join("lib/x.jar"), b"").unwrap();
        std::fs::write(dir.path().join("lib/classes/util/Helper.class"), b"").unwrap();

        let root = DirCodeRoot::new(dir.path());
        assert!(root.contains("lib/x.jar"));
        assert!(!root.contains("../outside"));
        assert_eq!(root.list("lib"), vec!["lib/classes", "lib/x.jar"]);

        let nested = root.library("lib/classes").unwrap();
        assert!(nested.contains("util/Helper.class"));
        assert!(root.library("lib/x.jar").is_none());
    }
}
