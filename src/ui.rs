//! UI相关功能模块
//!
//! 提供命令行输出、进度条和结果渲染

use crate::{ProbeResult, RunSummary, RunStatus};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// 进度条模板
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// 根据终端能力和用户选择决定是否使用颜色
pub fn init_ui(colored_output: bool) {
    let supported = console::Term::stdout().features().colors_supported();
    colored::control::set_override(colored_output && supported);
}

/// 标准错误是否连接到终端
pub fn is_interactive() -> bool {
    console::Term::stderr().is_term()
}

/// 创建一个标准格式的进度条
pub fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// 打印横幅
pub fn print_banner(version: &str) {
    println!("{}\n{}",
        r#"
╔═╗┬─┐┌─┐─┐ ┬┬ ┬╔═╗┬─┐┌─┐┌┐ ┌─┐
╠═╝├┬┘│ │┌┴┬┘└┬┘╠═╝├┬┘│ │├┴┐├┤
╩  ┴└─└─┘┴ └─ ┴ ╩  ┴└─└─┘└─┘└─┘
        "#.cyan().bold(),
        format!("Version: {}", version).yellow()
    );
}

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "i".blue().bold(), msg);
}

/// 按延迟着色
pub fn colorize_latency(latency_ms: u64) -> ColoredString {
    let text = format!("{}ms", latency_ms);
    match latency_ms {
        0..=100 => text.green(),
        101..=300 => text.yellow(),
        _ => text.red(),
    }
}

/// 渲染单条结果
pub fn format_result(result: &ProbeResult) -> String {
    match result.latency_ms() {
        Some(latency) => format!(
            "{} {} - {}",
            "✓".green().bold(),
            result.proxy.cyan(),
            colorize_latency(latency)
        ),
        None => format!(
            "{} {} - {}",
            "✗".red().bold(),
            result.proxy.cyan(),
            "Invalid".red()
        ),
    }
}

/// 渲染运行汇总
pub fn format_summary(summary: &RunSummary, valid: usize) -> String {
    match summary.status {
        RunStatus::Cancelled => format!(
            "{} {}/{} {}, {} {}",
            "检查已取消:".yellow().bold(),
            summary.emitted.to_string().yellow().bold(),
            summary.total,
            "个代理已检查",
            valid.to_string().green().bold(),
            "个有效"
        ),
        RunStatus::Failed => format!(
            "{} {}/{} {}, {} {}",
            "检查中断:".red().bold(),
            summary.emitted.to_string().yellow().bold(),
            summary.total,
            "个代理已检查",
            valid.to_string().green().bold(),
            "个有效"
        ),
        _ => format!(
            "{} {} {}, {} {}",
            "检查完成:".green().bold(),
            summary.total.to_string().yellow().bold(),
            "个代理",
            valid.to_string().green().bold(),
            "个有效"
        ),
    }
}

/// 结果输出器：有进度条时把结果打印在进度条上方
#[derive(Debug)]
pub struct Reporter {
    progress: Option<ProgressBar>,
}

impl Reporter {
    pub fn new(total: usize, show_progress: bool) -> Self {
        let progress = (show_progress && is_interactive())
            .then(|| create_progress_bar(total as u64));
        Self { progress }
    }

    /// 输出一条结果
    pub fn report(&self, result: &ProbeResult) {
        let line = format_result(result);
        match &self.progress {
            Some(pb) => {
                pb.println(line);
                pb.inc(1);
            }
            None => println!("{}", line),
        }
    }

    /// 结束进度条
    pub fn finish(&self, status: RunStatus) {
        if let Some(pb) = &self.progress {
            match status {
                RunStatus::Cancelled => pb.abandon_with_message("已取消"),
                RunStatus::Failed => pb.abandon_with_message("检查中断"),
                _ => pb.finish_with_message("代理测试完成"),
            }
        }
    }
}
