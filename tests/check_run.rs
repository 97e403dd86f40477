//! End-to-end checks of the public facade

use futures::StreamExt;
use proxyprobe::{
    async_trait, CheckConfig, Error, ProbeOptions, ProbeOutcome, ProbeResult, Prober, Result,
    RunStatus, Scheduler,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 每个代理随机延迟，结果由代理名决定
struct Jittery;

#[async_trait]
impl Prober for Jittery {
    async fn measure(&self, proxy: &str, _timeout: Duration) -> Result<Duration> {
        let jitter = u64::from(Uuid::new_v4().as_bytes()[0]) % 15;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        let index: u64 = proxy
            .rsplit('.')
            .next()
            .and_then(|tail| tail.split(':').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        if index % 3 == 0 {
            Err(Error::ProxyConnection("refused".to_string()))
        } else {
            Ok(Duration::from_millis(index * 10))
        }
    }
}

#[derive(Default)]
struct PeakCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct Counted(Arc<PeakCounter>);

#[async_trait]
impl Prober for Counted {
    async fn measure(&self, _proxy: &str, _timeout: Duration) -> Result<Duration> {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.0.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Duration::from_millis(1))
    }
}

fn proxies(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("10.1.{}.{}:8080", i / 250, i % 250)).collect()
}

async fn result_set(scheduler: &Scheduler, input: Vec<String>) -> BTreeSet<(String, Option<u64>)> {
    let config = tokio_test::assert_ok!(CheckConfig::new(1_500, 8));
    let run = tokio_test::assert_ok!(scheduler.run_check(input, config));
    run.map(|r: ProbeResult| (r.proxy.clone(), r.latency_ms()))
        .collect()
        .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_input_yields_same_result_set() {
    let scheduler = Scheduler::new(Jittery);
    let input = proxies(120);

    let first = result_set(&scheduler, input.clone()).await;
    let second = result_set(&scheduler, input.clone()).await;

    assert_eq!(first.len(), input.len());
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn peak_concurrency_does_not_depend_on_input_size() {
    for size in [10, 2_000] {
        let counter = Arc::new(PeakCounter::default());
        let scheduler = Scheduler::new(Counted(Arc::clone(&counter)));
        let run = scheduler
            .run_check(proxies(size), CheckConfig::new(1_000, 10).unwrap())
            .unwrap();

        assert_eq!(run.count().await, size);
        assert!(counter.peak.load(Ordering::SeqCst) <= 10);
    }
}

#[test_log::test(tokio::test)]
async fn http_prober_end_to_end() {
    let mut fast = mockito::Server::new_async().await;
    fast.mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap().to_string();
    drop(closed);

    let scheduler = Scheduler::http(ProbeOptions {
        target_url: "http://reference.test/".to_string(),
        ..ProbeOptions::default()
    })
    .unwrap();
    let mut run = scheduler
        .run_check(
            vec![fast.host_with_port(), closed_addr.clone()],
            CheckConfig::new(5_000, 2).unwrap(),
        )
        .unwrap();

    let mut outcomes = HashMap::new();
    while let Some(result) = run.next().await {
        outcomes.insert(result.proxy.clone(), result.outcome);
    }

    assert!(matches!(outcomes[&fast.host_with_port()], ProbeOutcome::Valid { .. }));
    assert_eq!(outcomes[&closed_addr], ProbeOutcome::Invalid);
    assert_eq!(run.summary().status, RunStatus::Completed);
}
