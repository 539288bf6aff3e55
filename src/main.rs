//! Chips Runtime 命令行入口
//!
//! 薯片模块运行时的命令行工具，用于检查配置和平台根代码。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `platform` - 列出平台根加载器中的条目
//!
//! # 使用示例
//!
//! ```bash
//! # 检查配置文件
//! chips-runtime check-config -c config.yaml
//!
//! # 使用主目录下的默认配置 (<主目录>/config/chips.config)
//! CHIPS_HOME=/opt/chips chips-runtime check-config
//!
//! # 查看平台根代码（开发模式输出更多日志）
//! chips-runtime --dev platform -c config.yaml
//!
//! # 查看版本
//! chips-runtime version
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use chips_runtime::module::code_root::{self, CodeRoot, DirCodeRoot};
use chips_runtime::{Logger, LoggerConfig, ModuleLoader, RuntimeConfig};

/// Chips Runtime - 薯片模块运行时
#[derive(Parser)]
#[command(name = "chips-runtime")]
#[command(version, about = "薯片模块运行时", long_about = None)]
#[command(author = "Chips Team")]
#[command(propagate_version = true)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// 开发模式（日志级别强制为 debug，并显示文件和行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 加载配置、应用环境变量覆盖并校验，显示最终生效的配置。
    CheckConfig {
        /// 配置文件路径（默认为 `<主目录>/config/<上下文>.config`）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 列出平台根代码
    ///
    /// 显示配置中 `lib_dirs` 组成的平台根加载器包含的条目和本地库。
    Platform {
        /// 配置文件路径（不存在时使用默认配置）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// 确定配置文件路径：未指定时使用环境变量给出的主目录下的默认配置文件
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let mut locator = RuntimeConfig::default();
        locator.apply_env_overrides();
        locator.default_config_path()
    })
}

/// 加载配置：文件不存在时使用默认值，随后应用环境变量覆盖、展开路径并校验
async fn load_config(path: Option<&Path>) -> chips_runtime::Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) if path.exists() => RuntimeConfig::from_file(path).await?,
        Some(path) => {
            debug!(path = %path.display(), "配置文件不存在，使用默认配置");
            RuntimeConfig::default()
        }
        None => RuntimeConfig::default(),
    };
    config.apply_env_overrides();
    config.resolve_paths()?;
    config.validate()?;
    Ok(config)
}

/// 检查配置文件
async fn check_config(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) => println!("检查配置文件: {}", path.display()),
        None => println!("未找到配置文件，检查默认配置"),
    }
    println!();

    let config = match load_config(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置无效 [{}]: {}", e.error_code(), e);
            return Err(Box::new(e));
        }
    };

    println!("✅ 配置有效！");
    println!();
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  上下文 ID:        {}", config.context_id);
    println!("  环境变量前缀:     {}_", config.env_prefix());
    if let Some(ref home) = config.home_dir {
        println!("  主目录:           {}", home.display());
    }
    println!("  平台根目录:       {:?}", config.lib_dirs);
    if let Some(ref modules) = config.modules_dir {
        println!("  模块目录:         {}", modules.display());
    }
    if let Some(ref app) = config.app_id {
        println!("  应用 ID:          {}", app);
    }
    println!("  调试模式:         {}", if config.debug { "是" } else { "否" });
    println!();
    println!("  [日志配置]");
    println!("    生效级别:       {}", config.effective_log_level());
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!("    轮转策略:       {}", config.logging.rotation);
    if !config.properties.is_empty() {
        println!();
        println!("  [属性]");
        for key in config.properties.keys() {
            println!("    {} = {}", key, config.property(key).unwrap_or_default());
        }
    }
    println!("────────────────────────────────────────");
    Ok(())
}

/// 列出平台根代码
async fn show_platform(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).await?;

    let roots: Vec<Arc<dyn CodeRoot>> = config
        .lib_dirs
        .iter()
        .map(|dir| Arc::new(DirCodeRoot::new(dir)) as Arc<dyn CodeRoot>)
        .collect();
    let loader = ModuleLoader::with_platform_roots(roots.clone());
    let platform = loader.platform_loader();
    info!(roots = roots.len(), "平台根加载器已创建");

    println!();
    println!("平台根加载器");
    println!("═══════════════════════════════════════");
    for root in &roots {
        println!("  {}", root.location());
        let entries = root.list("");
        if entries.is_empty() {
            println!("    (空)");
        }
        for entry in entries {
            if let Some(name) = code_root::native_library_name(code_root::file_name(&entry)) {
                let resolved = platform.find_library(name).unwrap_or_default();
                println!("    {} [本地库 {} -> {}]", entry, name, resolved);
            } else {
                println!("    {}", entry);
            }
        }
    }
    println!("═══════════════════════════════════════");
    println!();
    Ok(())
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Chips Runtime - 薯片模块运行时");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", chips_runtime::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Version 命令不需要日志
    let _guard = if matches!(cli.command, Commands::Version) {
        None
    } else {
        let config = LoggerConfig::builder()
            .level(if cli.dev { "debug".to_string() } else { cli.log_level.clone() })
            .show_file_line(cli.dev)
            .build();
        Some(Logger::init(config)?)
    };

    match cli.command {
        Commands::Version => print_version(),
        Commands::CheckConfig { config } => check_config(config_path(config).as_deref()).await?,
        Commands::Platform { config } => show_platform(config_path(config).as_deref()).await?,
    }

    Ok(())
}
