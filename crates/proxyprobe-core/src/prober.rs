//! 单个代理的网络探测
//!
//! [`Prober`] 只负责“发出一次请求并测量耗时”，[`probe`] 在其外层施加
//! 硬超时与延迟阈值，并把所有失败折叠成 `Invalid`。

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::result::ProbeResult;
use async_trait::async_trait;
use reqwest::{redirect, Client, Proxy, Url};
use std::time::{Duration, Instant};
use tracing::debug;

/// 默认测试目标
pub const DEFAULT_TARGET_URL: &str = "https://www.google.com";

/// 探测选项
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// 测试目标URL
    pub target_url: String,
    /// 请求使用的User-Agent
    pub user_agent: String,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            user_agent: concat!("proxyprobe/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// 通过代理发出一次请求并测量耗时。
///
/// 实现只需要返回从发出请求到收到响应头的耗时，或者失败原因；
/// 阈值判断和外层超时由 [`probe`] 统一处理。
#[async_trait]
pub trait Prober: Send + Sync {
    async fn measure(&self, proxy: &str, transport_timeout: Duration) -> Result<Duration>;
}

/// 基于reqwest的HTTP(S)探测器
#[derive(Debug, Clone)]
pub struct HttpProber {
    target: Url,
    options: ProbeOptions,
}

impl HttpProber {
    /// 创建新的探测器，目标URL必须合法
    pub fn new(options: ProbeOptions) -> Result<Self> {
        let target = Url::parse(&options.target_url).map_err(|e| {
            Error::Configuration(format!("invalid target url '{}': {}", options.target_url, e))
        })?;
        Ok(Self { target, options })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// 每次探测独立建立客户端，不复用连接，避免结果互相影响
    fn client_for(&self, proxy: &str, transport_timeout: Duration) -> Result<Client> {
        let proxy = Proxy::all(proxy_url(proxy))
            .map_err(|e| Error::InvalidProxy(format!("{}: {}", proxy, e)))?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(transport_timeout)
            .connect_timeout(transport_timeout)
            .pool_max_idle_per_host(0)
            .redirect(redirect::Policy::none())
            .user_agent(self.options.user_agent.as_str())
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn measure(&self, proxy: &str, transport_timeout: Duration) -> Result<Duration> {
        let client = self.client_for(proxy, transport_timeout)?;

        let start = Instant::now();
        // send() 在收到响应头时返回，任何HTTP状态码都算作响应
        let response = client
            .get(self.target.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(transport_timeout.as_millis() as u64)
                } else {
                    Error::from(e)
                }
            })?;
        let elapsed = start.elapsed();

        debug!(proxy, status = %response.status(), elapsed_ms = elapsed.as_millis() as u64, "收到响应");
        Ok(elapsed)
    }
}

/// 没有scheme的 `host:port` 按HTTP代理处理
fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{}", proxy)
    }
}

/// 探测单个代理，永远返回结果而不是错误。
///
/// 整个测量被 `config.outer_timeout()` 包住，保证挂起的代理也会结束；
/// 完成的测量再按 `config.max_latency_ms()` 判定是否有效。
pub async fn probe<P>(prober: &P, proxy: &str, config: &CheckConfig) -> ProbeResult
where
    P: Prober + ?Sized,
{
    let outer = config.outer_timeout();
    match tokio::time::timeout(outer, prober.measure(proxy, config.transport_timeout())).await {
        Ok(Ok(elapsed)) => {
            let result = ProbeResult::classify(proxy, elapsed, config.max_latency_ms());
            if !result.is_valid() {
                debug!(
                    proxy,
                    elapsed_ms = elapsed.as_millis() as u64,
                    max_latency_ms = config.max_latency_ms(),
                    "延迟超出阈值"
                );
            }
            result
        }
        Ok(Err(e)) => {
            debug!(proxy, error = %e, "代理探测失败");
            ProbeResult::invalid(proxy)
        }
        Err(_) => {
            debug!(proxy, error = %Error::Timeout(outer.as_millis() as u64), "代理探测超时");
            ProbeResult::invalid(proxy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ProbeOutcome;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    struct FixedLatency(Duration);

    #[async_trait]
    impl Prober for FixedLatency {
        async fn measure(&self, _proxy: &str, _timeout: Duration) -> Result<Duration> {
            Ok(self.0)
        }
    }

    struct Hangs;

    #[async_trait]
    impl Prober for Hangs {
        async fn measure(&self, _proxy: &str, _timeout: Duration) -> Result<Duration> {
            std::future::pending().await
        }
    }

    struct Refuses;

    #[async_trait]
    impl Prober for Refuses {
        async fn measure(&self, proxy: &str, _timeout: Duration) -> Result<Duration> {
            Err(Error::ProxyConnection(format!("{}: connection refused", proxy)))
        }
    }

    fn config(max_latency_ms: u64) -> CheckConfig {
        CheckConfig::new(max_latency_ms, 1).unwrap()
    }

    fn test_prober() -> HttpProber {
        HttpProber::new(ProbeOptions {
            target_url: "http://probe.test/generate_204".to_string(),
            ..ProbeOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn bare_host_port_defaults_to_http() {
        assert_eq!(proxy_url("10.0.0.1:8080"), "http://10.0.0.1:8080");
        assert_eq!(proxy_url("socks5://user:pw@10.0.0.1:1080"), "socks5://user:pw@10.0.0.1:1080");
    }

    #[test]
    fn invalid_target_url_is_rejected() {
        let err = HttpProber::new(ProbeOptions {
            target_url: "not a url".to_string(),
            ..ProbeOptions::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn boundary_latency_is_valid() {
        let result = probe(&FixedLatency(Duration::from_millis(500)), "p:1", &config(500)).await;
        assert_eq!(result.outcome, ProbeOutcome::Valid { latency_ms: 500 });
    }

    #[tokio::test]
    async fn latency_over_threshold_is_invalid() {
        let result = probe(&FixedLatency(Duration::from_millis(501)), "p:1", &config(500)).await;
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
    }

    #[tokio::test]
    async fn errors_collapse_to_invalid() {
        let result = probe(&Refuses, "10.0.0.2:8080", &config(500)).await;
        assert_eq!(result.proxy, "10.0.0.2:8080");
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_prober_is_cut_off_by_outer_timeout() {
        let config = config(500);
        let start = tokio::time::Instant::now();
        let result = probe(&Hangs, "10.9.9.9:3128", &config).await;
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
        let elapsed = start.elapsed();
        assert!(elapsed >= config.outer_timeout());
        assert!(elapsed < config.outer_timeout() + Duration::from_millis(10));
    }

    #[test_log::test(tokio::test)]
    async fn responding_http_proxy_is_valid() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(204)
            .create_async()
            .await;

        let result = probe(&test_prober(), &server.host_with_port(), &config(5_000)).await;

        assert!(result.is_valid(), "unexpected result: {}", result);
        assert!(result.latency_ms().unwrap() <= 5_000);
        mock.assert_async().await;
    }

    #[test_log::test(tokio::test)]
    async fn error_status_still_counts_as_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = probe(&test_prober(), &server.url(), &config(5_000)).await;
        assert!(result.is_valid());
    }

    #[test_log::test(tokio::test)]
    async fn refused_connection_is_invalid() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe(&test_prober(), &addr.to_string(), &config(1_000)).await;
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
    }

    #[test_log::test(tokio::test)]
    async fn silent_proxy_terminates_within_bound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = config(50).with_transport_grace(Duration::from_millis(100));
        let start = std::time::Instant::now();
        let result = probe(&test_prober(), &addr.to_string(), &config).await;

        assert_eq!(result.outcome, ProbeOutcome::Invalid);
        assert!(start.elapsed() < Duration::from_secs(3));
        holder.abort();
    }

    #[test_log::test(tokio::test)]
    async fn garbage_response_is_invalid() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"definitely not http\r\n\r\n").await;
                let _ = stream.shutdown().await;
            }
        });

        let result = probe(&test_prober(), &addr.to_string(), &config(1_000)).await;
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
        server.abort();
    }

    #[tokio::test]
    async fn unparseable_proxy_is_invalid() {
        let result = probe(&test_prober(), "http://[::1", &config(1_000)).await;
        assert_eq!(result.outcome, ProbeOutcome::Invalid);
    }
}
