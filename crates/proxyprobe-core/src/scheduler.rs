//! 有界并发的批量检查
//!
//! 调度器按输入顺序逐个放行代理：放行前先从信号量拿到一个许可，探测结束
//! （无论成功、失败还是panic）时归还。因此任意时刻最多有
//! `concurrency_limit` 个探测在进行，而结果按完成顺序从 [`CheckRun`] 流出。

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::prober::{probe, HttpProber, ProbeOptions, Prober};
use crate::result::ProbeResult;
use futures::{FutureExt, Stream};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 结果流尚未结束
    Running,
    /// 每个代理都产生了结果
    Completed,
    /// 被取消，结果少于输入数量
    Cancelled,
    /// 没有被取消，但调度任务提前退出，结果不完整
    Failed,
}

/// 运行进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    /// 输入代理总数
    pub total: usize,
    /// 已放行（开始探测）的数量
    pub admitted: usize,
    /// 正在探测的数量
    pub in_flight: usize,
    /// 已产生结果的数量
    pub completed: usize,
    /// 尚未放行的数量
    pub pending: usize,
}

/// 运行结束（或当前）的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub total: usize,
    /// 调用方实际收到的结果数
    pub emitted: usize,
}

/// 运行的取消句柄，可以随意克隆并跨任务传递
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: Uuid,
    token: CancellationToken,
    state: Arc<RunState>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 取消运行：不再放行新的代理，正在进行的探测被放弃。
    ///
    /// 可以重复调用；运行结束后调用没有任何效果。
    pub fn cancel(&self) {
        if self.state.finished.load(Ordering::SeqCst) {
            debug!(run = %self.id, "检查已结束，忽略取消");
            return;
        }
        if !self.token.is_cancelled() {
            info!(run = %self.id, "取消检查");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct RunState {
    total: usize,
    admitted: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    /// 结果流已结束
    finished: AtomicBool,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            total,
            admitted: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> RunProgress {
        let admitted = self.admitted.load(Ordering::SeqCst);
        RunProgress {
            total: self.total,
            admitted,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            pending: self.total.saturating_sub(admitted),
        }
    }
}

/// 一次正在进行的检查，按完成顺序产出 [`ProbeResult`]。
///
/// 流在所有已放行的探测结束且没有剩余代理时结束；流不可重启。
/// 丢弃 `CheckRun` 会取消该运行。
#[derive(Debug)]
pub struct CheckRun {
    handle: RunHandle,
    results: mpsc::UnboundedReceiver<ProbeResult>,
    state: Arc<RunState>,
    emitted: usize,
    finished: bool,
    /// 流结束时令牌是否已被取消
    cancelled: bool,
}

impl CheckRun {
    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    /// 获取取消句柄
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    /// 取消运行，等同于 `self.handle().cancel()`
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn progress(&self) -> RunProgress {
        self.state.snapshot()
    }

    /// 当前汇总；流结束前状态为 `Running`
    pub fn summary(&self) -> RunSummary {
        let status = if !self.finished {
            RunStatus::Running
        } else if self.emitted == self.state.total {
            RunStatus::Completed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };

        RunSummary {
            id: self.handle.id,
            status,
            total: self.state.total,
            emitted: self.emitted,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for CheckRun {
    type Item = ProbeResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProbeResult>> {
        let this = &mut *self;
        match this.results.poll_recv(cx) {
            Poll::Ready(Some(result)) => {
                this.emitted += 1;
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                if !this.finished {
                    this.finished = true;
                    this.cancelled = this.handle.token.is_cancelled();
                    this.state.finished.store(true, Ordering::SeqCst);
                    let summary = this.summary();
                    if summary.status == RunStatus::Failed {
                        warn!(run = %summary.id, "调度任务提前退出，结果不完整");
                    }
                    info!(
                        run = %summary.id,
                        status = ?summary.status,
                        results = summary.emitted,
                        total = summary.total,
                        "检查结束"
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else {
            (0, Some(self.state.total.saturating_sub(self.emitted)))
        }
    }
}

impl Drop for CheckRun {
    fn drop(&mut self) {
        if !self.finished {
            self.handle.token.cancel();
        }
    }
}

/// 调度器，持有探测器并启动检查运行
#[derive(Clone)]
pub struct Scheduler {
    prober: Arc<dyn Prober>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// 使用自定义探测器创建调度器
    pub fn new<P: Prober + 'static>(prober: P) -> Self {
        Self {
            prober: Arc::new(prober),
        }
    }

    /// 使用HTTP探测器创建调度器
    pub fn http(options: ProbeOptions) -> Result<Self> {
        Ok(Self::new(HttpProber::new(options)?))
    }

    /// 启动一次检查。
    ///
    /// 必须在tokio运行时中调用；配置错误在这里同步返回，不会开始任何探测。
    pub fn run_check(&self, proxies: Vec<String>, config: CheckConfig) -> Result<CheckRun> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("run_check requires a tokio runtime: {}", e)))?;

        let state = Arc::new(RunState::new(proxies.len()));
        let handle = RunHandle {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            state: Arc::clone(&state),
        };
        let (tx, rx) = mpsc::unbounded_channel();

        info!(
            run = %handle.id,
            proxies = proxies.len(),
            max_latency_ms = config.max_latency_ms(),
            concurrency = config.concurrency_limit(),
            "开始检查"
        );

        runtime.spawn(drive(
            proxies,
            config,
            Arc::clone(&self.prober),
            handle.clone(),
            Arc::clone(&state),
            tx,
        ));

        Ok(CheckRun {
            handle,
            results: rx,
            state,
            emitted: 0,
            finished: false,
            cancelled: false,
        })
    }
}

/// 使用默认HTTP探测器检查一批代理
pub fn run_check(
    proxies: Vec<String>,
    max_latency_ms: u64,
    concurrency_limit: usize,
) -> Result<CheckRun> {
    let config = CheckConfig::new(max_latency_ms, concurrency_limit)?;
    Scheduler::http(ProbeOptions::default())?.run_check(proxies, config)
}

/// 放行循环：按输入顺序拿许可、启动探测，最后等待所有探测结束
async fn drive(
    proxies: Vec<String>,
    config: CheckConfig,
    prober: Arc<dyn Prober>,
    handle: RunHandle,
    state: Arc<RunState>,
    results: mpsc::UnboundedSender<ProbeResult>,
) {
    // 许可数不超过代理数，也不超过信号量的上限
    let permits = config
        .concurrency_limit()
        .min(proxies.len().max(1))
        .min(Semaphore::MAX_PERMITS);
    let gate = Arc::new(Semaphore::new(permits));
    let mut tasks = JoinSet::new();

    for proxy in proxies {
        let permit = tokio::select! {
            biased;
            _ = handle.token.cancelled() => break,
            permit = Arc::clone(&gate).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        // 拿到许可的同时可能已被取消
        if handle.token.is_cancelled() {
            break;
        }

        state.admitted.fetch_add(1, Ordering::SeqCst);
        state.in_flight.fetch_add(1, Ordering::SeqCst);

        let prober = Arc::clone(&prober);
        let token = handle.token.clone();
        let state = Arc::clone(&state);
        let results = results.clone();
        tasks.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = AssertUnwindSafe(probe(prober.as_ref(), &proxy, &config)).catch_unwind() => {
                    Some(result.unwrap_or_else(|_| {
                        warn!(proxy = %proxy, "探测器panic，按无效处理");
                        ProbeResult::invalid(proxy.as_str())
                    }))
                }
            };

            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            match outcome {
                Some(result) => {
                    state.completed.fetch_add(1, Ordering::SeqCst);
                    debug!(proxy = %result.proxy, status = %result.status(), latency_ms = ?result.latency_ms(), "探测完成");
                    // 接收端已丢弃时结果无处可去，直接忽略
                    let _ = results.send(result);
                }
                None => debug!(proxy = %proxy, "探测已放弃"),
            }
            drop(permit);
        });

        while tasks.try_join_next().is_some() {}
    }

    drop(results);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(run = %handle.id, error = %e, "探测任务异常结束");
        }
    }

    let progress = state.snapshot();
    debug!(
        run = %handle.id,
        admitted = progress.admitted,
        completed = progress.completed,
        cancelled = handle.is_cancelled(),
        "放行循环退出"
    );
}
