use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use proxyprobe::cli::{self, Cli, CliConfig};
use proxyprobe::{init_logger, ui, RunStatus, Scheduler};
use std::path::Path;
use tokio::signal;
use tracing::{info, warn};

const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    init_logger();

    let args = Cli::parse();
    let cli_config = CliConfig::from(&args);
    ui::init_ui(cli_config.colored_output);

    if cli_config.show_banner {
        ui::print_banner(VERSION);
    }

    // 加载配置，命令行参数优先
    let mut config = cli::load_config(&args.config);
    args.apply(&mut config);

    let check = match config.check_config() {
        Ok(check) => check,
        Err(e) => {
            ui::print_error(&format!("配置无效，无法开始检查: {}", e));
            std::process::exit(2);
        }
    };
    let scheduler = Scheduler::http(config.probe_options())
        .with_context(|| format!("无法使用测试URL {}", config.target_url))?;

    let proxies = cli::load_proxies(&args.input)?;
    if proxies.is_empty() {
        ui::print_warning("代理列表为空，请先导入代理");
        return Ok(());
    }
    if !cli_config.json {
        ui::print_info(&format!(
            "{} 个代理, 最大延迟 {}ms, 并发 {}",
            proxies.len(),
            check.max_latency_ms(),
            check.concurrency_limit()
        ));
    }

    let mut run = scheduler.run_check(proxies, check)?;

    // Ctrl+C 取消本次检查
    let handle = run.handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("接收到终止信号，正在取消检查...");
            handle.cancel();
        }
    });

    let reporter = ui::Reporter::new(run.progress().total, cli_config.show_progress);
    let mut results = Vec::new();
    while let Some(result) = run.next().await {
        if cli_config.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            reporter.report(&result);
        }
        results.push(result);
    }

    let summary = run.summary();
    reporter.finish(summary.status);
    let valid = results.iter().filter(|r| r.is_valid()).count();
    if !cli_config.json {
        println!("\n{}", ui::format_summary(&summary, valid));
    }

    if let Some(output) = args.export_path(&config) {
        export(&output, &results, cli_config.json)?;
    }

    info!("ProxyProbe 已退出");
    match summary.status {
        RunStatus::Cancelled => std::process::exit(130),
        RunStatus::Failed => std::process::exit(1),
        _ => {}
    }
    Ok(())
}

fn export(output: &Path, results: &[proxyprobe::ProbeResult], quiet: bool) -> Result<()> {
    let written = cli::export_valid(output, results)?;
    if quiet {
        return Ok(());
    }
    if written == 0 {
        ui::print_warning("没有可导出的有效代理");
    } else {
        ui::print_success(&format!("{} 个有效代理已导出到 {}", written, output.display()));
    }
    Ok(())
}
