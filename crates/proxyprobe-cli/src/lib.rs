//! ProxyProbe CLI - Command line adapters for ProxyProbe
//!
//! Everything around the core that touches the outside world: argument
//! parsing, the proxy list file and the export of valid proxies.

use anyhow::{Context, Result};
use clap::Parser;
use proxyprobe_core::{Config, ProbeResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "proxyprobe.toml";

/// 命令行参数
#[derive(Debug, Clone, Parser)]
#[command(name = "proxyprobe", version, about = "Check which proxies answer within a latency budget")]
pub struct Cli {
    /// 代理列表文件，每行一个代理
    pub input: PathBuf,

    /// 最大延迟（毫秒）
    #[arg(short = 'l', long = "max-latency", value_name = "MS")]
    pub max_latency: Option<u64>,

    /// 同时进行的检查数
    #[arg(short = 'c', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// 测试URL
    #[arg(long, value_name = "URL")]
    pub target: Option<String>,

    /// 导出有效代理；不带文件名时使用配置中的 output.valid_file
    #[arg(short = 'o', long, value_name = "FILE", num_args = 0..=1)]
    pub output: Option<Option<PathBuf>>,

    /// 配置文件路径
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// 以JSON行输出结果
    #[arg(long)]
    pub json: bool,

    /// 不显示进度条
    #[arg(long)]
    pub no_progress: bool,

    /// 禁用彩色输出
    #[arg(long)]
    pub no_color: bool,

    /// 不显示横幅
    #[arg(long)]
    pub no_banner: bool,
}

impl Cli {
    /// 用命令行参数覆盖配置文件中的值
    pub fn apply(&self, config: &mut Config) {
        if let Some(latency) = self.max_latency {
            config.max_latency_ms = latency;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(target) = &self.target {
            config.target_url = target.clone();
        }
    }

    /// 有效代理的导出路径，未要求导出时为 `None`
    pub fn export_path(&self, config: &Config) -> Option<PathBuf> {
        match &self.output {
            Some(Some(path)) => Some(path.clone()),
            Some(None) => Some(PathBuf::from(&config.output.valid_file)),
            None => None,
        }
    }
}

/// CLI配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// 是否显示横幅
    pub show_banner: bool,
    /// 是否启用彩色输出
    pub colored_output: bool,
    /// 是否显示进度条
    pub show_progress: bool,
    /// 是否输出JSON行
    pub json: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            show_banner: true,
            colored_output: true,
            show_progress: true,
            json: false,
        }
    }
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        // JSON模式下stdout只留给结果
        Self {
            show_banner: !cli.no_banner && !cli.json,
            colored_output: !cli.no_color && !cli.json,
            show_progress: !cli.no_progress && !cli.json,
            json: cli.json,
        }
    }
}

/// 加载配置文件，不存在或无法读取时使用默认配置
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!("使用默认配置");
        return Config::default();
    }

    match Config::from_file(path) {
        Ok(cfg) => {
            info!("配置已从 {} 加载", path.display());
            cfg
        }
        Err(e) => {
            error!("加载配置失败: {}", e);
            Config::default()
        }
    }
}

/// 读取代理列表：每行一个，去掉首尾空白并跳过空行
pub fn load_proxies(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取代理列表 {}", path.display()))?;
    Ok(parse_proxy_list(&content))
}

pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// 把有效代理按行写入文件，返回写入的数量；没有有效代理时不写文件
pub fn export_valid(path: &Path, results: &[ProbeResult]) -> Result<usize> {
    let valid: Vec<&str> = results
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| r.proxy.as_str())
        .collect();

    if valid.is_empty() {
        return Ok(0);
    }

    fs::write(path, valid.join("\n"))
        .with_context(|| format!("无法写入 {}", path.display()))?;
    info!("{} 个有效代理已导出到 {}", valid.len(), path.display());
    Ok(valid.len())
}
