//! ProxyProbe Core - bounded-concurrency proxy latency checking (core functionality)
//!
//! Given a list of proxies, a latency budget and a concurrency limit, the
//! [`Scheduler`] probes every proxy through a [`Prober`] while keeping at most
//! `concurrency_limit` probes in flight, and streams one [`ProbeResult`] per
//! proxy in completion order.

// 导出模块
pub mod config;
pub mod error;
pub mod prober;
pub mod result;
pub mod scheduler;

// 从模块导出核心类型
pub use config::{CheckConfig, Config, OutputSettings};
pub use error::{Error, Result};
pub use prober::{probe, HttpProber, ProbeOptions, Prober};
pub use result::{ProbeOutcome, ProbeRecord, ProbeResult, ProbeStatus};
pub use scheduler::{run_check, CheckRun, RunHandle, RunProgress, RunStatus, RunSummary, Scheduler};

/// 实现 [`Prober`] 时使用
pub use async_trait::async_trait;

/// Initialize the logger with default settings
pub fn init_logger() {
    use tracing_subscriber::{fmt, EnvFilter};

    // 重复初始化时忽略错误
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .try_init();
}
