use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::prober::{ProbeOptions, DEFAULT_TARGET_URL};
use tracing::{info, warn};

/// 传输层超时在延迟阈值之上的默认余量
pub const DEFAULT_TRANSPORT_GRACE: Duration = Duration::from_millis(1000);

/// 外层超时在传输层超时之上的余量
pub const OUTER_TIMEOUT_SLACK: Duration = Duration::from_millis(250);

/// 一次检查运行的参数，运行期间不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    max_latency_ms: u64,
    concurrency_limit: usize,
    transport_grace: Duration,
}

impl CheckConfig {
    /// 创建并校验运行参数，两个值都必须大于0
    pub fn new(max_latency_ms: u64, concurrency_limit: usize) -> Result<Self> {
        if max_latency_ms == 0 {
            return Err(Error::configuration("max_latency_ms must be greater than 0"));
        }
        if concurrency_limit == 0 {
            return Err(Error::configuration("concurrency_limit must be greater than 0"));
        }
        Ok(Self {
            max_latency_ms,
            concurrency_limit,
            transport_grace: DEFAULT_TRANSPORT_GRACE,
        })
    }

    /// 调整传输层超时余量
    pub fn with_transport_grace(mut self, grace: Duration) -> Self {
        self.transport_grace = grace;
        self
    }

    pub fn max_latency_ms(&self) -> u64 {
        self.max_latency_ms
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    /// 交给HTTP客户端的超时：阈值加余量，避免刚好在阈值内的代理被传输层提前杀掉
    pub fn transport_timeout(&self) -> Duration {
        self.max_latency() + self.transport_grace
    }

    /// 每次探测的硬上限，无论探测器实现如何都保证结束
    pub fn outer_timeout(&self) -> Duration {
        self.transport_timeout() + OUTER_TIMEOUT_SLACK
    }
}

/// 主配置结构体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// 最大延迟（毫秒）
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    /// 同时进行的检查数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 测试URL
    #[serde(default = "default_target_url")]
    pub target_url: String,
    /// 传输层超时余量（毫秒）
    #[serde(default = "default_transport_grace_ms")]
    pub transport_grace_ms: u64,
    /// 输出配置
    #[serde(default)]
    pub output: OutputSettings,
}

fn default_max_latency_ms() -> u64 { 1000 }
fn default_concurrency() -> usize { 10 }
fn default_target_url() -> String { DEFAULT_TARGET_URL.to_string() }
fn default_transport_grace_ms() -> u64 { DEFAULT_TRANSPORT_GRACE.as_millis() as u64 }

/// 输出设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// 有效代理导出文件
    #[serde(default = "default_valid_file")]
    pub valid_file: String,
}

fn default_valid_file() -> String { "valid_proxies.txt".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            max_latency_ms: default_max_latency_ms(),
            concurrency: default_concurrency(),
            target_url: default_target_url(),
            transport_grace_ms: default_transport_grace_ms(),
            output: OutputSettings::default(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            valid_file: default_valid_file(),
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("无法读取配置文件: {}", e);
                return Err(Error::Configuration(
                    format!("无法读取配置文件: {}", e)
                ));
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => {
                info!(
                    "成功读取配置: 最大延迟 {}ms, 并发 {}",
                    config.max_latency_ms, config.concurrency
                );
                Ok(config)
            },
            Err(e) => {
                warn!("配置文件格式错误: {}", e);
                warn!("尝试使用更宽松的解析方式...");
                let config = Self::parse_with_fallbacks(&content)?;
                info!(
                    "使用宽松解析成功读取配置: 最大延迟 {}ms, 并发 {}",
                    config.max_latency_ms, config.concurrency
                );
                Ok(config)
            }
        }
    }

    /// 逐个字段解析，类型不对或缺失的字段保留默认值
    fn parse_with_fallbacks(content: &str) -> Result<Self> {
        let parsed_toml = content.parse::<toml::Table>()?;
        let mut config = Config::default();

        if let Some(latency) = parsed_toml.get("max_latency_ms").and_then(|v| v.as_integer()) {
            match u64::try_from(latency) {
                Ok(latency) => config.max_latency_ms = latency,
                Err(_) => warn!("忽略非法的 max_latency_ms: {}", latency),
            }
        }

        if let Some(concurrency) = parsed_toml.get("concurrency").and_then(|v| v.as_integer()) {
            match usize::try_from(concurrency) {
                Ok(concurrency) => config.concurrency = concurrency,
                Err(_) => warn!("忽略非法的 concurrency: {}", concurrency),
            }
        }

        if let Some(url) = parsed_toml.get("target_url").and_then(|v| v.as_str()) {
            config.target_url = url.to_string();
        }

        if let Some(grace) = parsed_toml.get("transport_grace_ms").and_then(|v| v.as_integer()) {
            match u64::try_from(grace) {
                Ok(grace) => config.transport_grace_ms = grace,
                Err(_) => warn!("忽略非法的 transport_grace_ms: {}", grace),
            }
        }

        if let Some(output) = parsed_toml.get("output").and_then(|v| v.as_table()) {
            if let Some(file) = output.get("valid_file").and_then(|v| v.as_str()) {
                config.output.valid_file = file.to_string();
            }
        }

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 生成经过校验的运行参数
    pub fn check_config(&self) -> Result<CheckConfig> {
        Ok(CheckConfig::new(self.max_latency_ms, self.concurrency)?
            .with_transport_grace(Duration::from_millis(self.transport_grace_ms)))
    }

    /// 生成探测器选项
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            target_url: self.target_url.clone(),
            ..ProbeOptions::default()
        }
    }
}
