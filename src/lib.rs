//! ProxyProbe - A proxy checker with bounded concurrency and latency thresholds
//!
//! This library re-exports the core checking engine and, with the `ui`
//! feature, the terminal presentation helpers used by the `proxyprobe` binary.

// 重导出core库
pub use proxyprobe_core::{
    async_trait, init_logger, probe, run_check, CheckConfig, CheckRun, Config, Error,
    HttpProber, OutputSettings, ProbeOptions, ProbeOutcome, ProbeRecord, ProbeResult,
    ProbeStatus, Prober, Result, RunHandle, RunProgress, RunStatus, RunSummary, Scheduler,
};

// 命令行适配层
pub use proxyprobe_cli as cli;

// 可选的命令行界面
#[cfg(feature = "ui")]
pub mod ui;
