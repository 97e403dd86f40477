use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 对外可见的探测状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeStatus {
    /// 在延迟阈值内收到响应
    Valid,
    /// 失败或超出阈值
    Invalid,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Valid => write!(f, "Valid"),
            ProbeStatus::Invalid => write!(f, "Invalid"),
        }
    }
}

/// 单次探测的结果，延迟只在 `Valid` 时存在
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    /// 有效，附带测得的延迟（毫秒）
    Valid { latency_ms: u64 },
    /// 无效
    Invalid,
}

/// 一个代理的探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "ProbeRecord")]
pub struct ProbeResult {
    /// 被测代理，原样保留调用方传入的字符串
    pub proxy: String,
    /// 探测结论
    pub outcome: ProbeOutcome,
    /// 结果产生时间
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// 创建有效结果
    pub fn valid(proxy: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            proxy: proxy.into(),
            outcome: ProbeOutcome::Valid { latency_ms },
            checked_at: Utc::now(),
        }
    }

    /// 创建无效结果
    pub fn invalid(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            outcome: ProbeOutcome::Invalid,
            checked_at: Utc::now(),
        }
    }

    /// 按延迟阈值对一次完成的请求分类。
    ///
    /// 延迟向下取整到毫秒，恰好等于阈值时仍然有效。
    pub fn classify(proxy: impl Into<String>, elapsed: Duration, max_latency_ms: u64) -> Self {
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if latency_ms <= max_latency_ms {
            Self::valid(proxy, latency_ms)
        } else {
            Self::invalid(proxy)
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match self.outcome {
            ProbeOutcome::Valid { .. } => ProbeStatus::Valid,
            ProbeOutcome::Invalid => ProbeStatus::Invalid,
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self.outcome {
            ProbeOutcome::Valid { latency_ms } => Some(latency_ms),
            ProbeOutcome::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status() == ProbeStatus::Valid
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.latency_ms() {
            Some(latency) => write!(f, "{} - {} ({}ms)", self.proxy, self.status(), latency),
            None => write!(f, "{} - {}", self.proxy, self.status()),
        }
    }
}

/// 序列化后的结果记录：`{ proxy, status, latency_ms, checked_at }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub proxy: String,
    pub status: ProbeStatus,
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

impl From<ProbeResult> for ProbeRecord {
    fn from(result: ProbeResult) -> Self {
        Self {
            status: result.status(),
            latency_ms: result.latency_ms(),
            checked_at: result.checked_at,
            proxy: result.proxy,
        }
    }
}
