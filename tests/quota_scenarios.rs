// End-to-end quota scenarios against in-memory stores
//
// Covers the reference scenarios for the "uploads" service and the
// documented check-then-record race under concurrency.

use async_trait::async_trait;
use quota_engine::quota::{
    AdminOps, BatchEvaluator, ConfigResolver, DefaultTable, ManualClock, MemoryConfigStore,
    MemoryUsageStore, QuotaEngine, QuotaError, QuotaRequest, ServiceConfig, StoreError, TierRule,
    UsageKey, UsageRecord, UsageStore,
};
use std::sync::Arc;
use tokio::sync::Barrier;

const NOW: i64 = 1_700_000_000_000;

fn uploads_config() -> ServiceConfig {
    ServiceConfig::new("uploads").with_rule("default", TierRule::new(60_000, 5))
}

async fn engine_with(usage: Arc<dyn UsageStore>) -> Arc<QuotaEngine> {
    let resolver = ConfigResolver::new(Arc::new(MemoryConfigStore::new()), DefaultTable::empty());
    resolver.save(uploads_config()).await.unwrap();
    Arc::new(QuotaEngine::new(resolver, usage, Arc::new(ManualClock::new(NOW))))
}

async fn seed(usage: &MemoryUsageStore, client: &str, ages_ms: &[i64]) {
    for age in ages_ms {
        let ts = NOW - age;
        usage
            .append(UsageRecord::new(UsageKey::new("uploads", client), ts, ts + 86_400_000))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_two_prior_requests_leave_two_remaining() {
    let usage = MemoryUsageStore::new();
    seed(&usage, "ip:10.0.0.1", &[30_000, 20_000]).await;
    let engine = engine_with(Arc::new(usage.clone())).await;

    let decision = engine
        .evaluate(&QuotaRequest::new("uploads", "ip:10.0.0.1").with_tier("default"))
        .await
        .unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.remaining, 2);
    assert_eq!(usage.record_count().await, 3);
}

#[tokio::test]
async fn test_five_prior_requests_are_denied() {
    let usage = MemoryUsageStore::new();
    seed(&usage, "ip:10.0.0.2", &[59_000, 45_000, 30_000, 15_000, 1_000]).await;
    let engine = engine_with(Arc::new(usage.clone())).await;

    let decision = engine
        .evaluate(&QuotaRequest::new("uploads", "ip:10.0.0.2"))
        .await
        .unwrap();

    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);
    assert!(decision.retry_after_secs.unwrap() > 0);
    assert_eq!(usage.record_count().await, 5);

    let response = serde_json::to_value(decision.to_response()).unwrap();
    assert_eq!(response["retryAfter"], 1);
    assert_eq!(response["metadata"]["maxRequests"], 5);
}

#[tokio::test]
async fn test_unconfigured_service_fails() {
    let engine = engine_with(Arc::new(MemoryUsageStore::new())).await;

    let err = engine
        .evaluate(&QuotaRequest::new("billing", "user:1"))
        .await
        .unwrap_err();

    assert_eq!(err, QuotaError::ConfigNotFound("billing".to_string()));
}

#[tokio::test]
async fn test_reset_then_admit() {
    let usage = MemoryUsageStore::new();
    seed(&usage, "user:7", &[5_000, 4_000, 3_000, 2_000, 1_000]).await;
    let engine = engine_with(Arc::new(usage.clone())).await;
    let admin = AdminOps::new(engine.clone());
    let request = QuotaRequest::new("uploads", "user:7");

    assert!(engine.is_blocked("uploads", "user:7", None).await);

    admin.reset("uploads", "user:7").await.unwrap();
    admin.reset("uploads", "user:7").await.unwrap();

    assert!(!engine.is_blocked("uploads", "user:7", None).await);
    assert_eq!(engine.evaluate(&request).await.unwrap().remaining, 4);
}

/// Usage store whose queries all wait for each other before returning
struct LockstepStore {
    inner: MemoryUsageStore,
    barrier: Barrier,
}

#[async_trait]
impl UsageStore for LockstepStore {
    async fn query(&self, key: &UsageKey, since: i64) -> Result<Vec<UsageRecord>, StoreError> {
        let records = self.inner.query(key, since).await;
        self.barrier.wait().await;
        records
    }

    async fn append(&self, record: UsageRecord) -> Result<(), StoreError> {
        self.inner.append(record).await
    }

    async fn purge(&self, key: &UsageKey, before: i64) -> Result<usize, StoreError> {
        self.inner.purge(key, before).await
    }
}

/// Run `n` concurrent evaluations for one client that already used 4 of 5
async fn admitted_under_contention(n: usize) -> (usize, usize) {
    let inner = MemoryUsageStore::new();
    seed(&inner, "user:race", &[4_000, 3_000, 2_000, 1_000]).await;
    let store = LockstepStore {
        inner: inner.clone(),
        barrier: Barrier::new(n),
    };
    let engine = engine_with(Arc::new(store)).await;

    let requests = vec![QuotaRequest::new("uploads", "user:race"); n];
    let decisions = BatchEvaluator::new(engine).evaluate_many(&requests).await.unwrap();

    let admitted = decisions.iter().filter(|d| d.allowed).count();
    (admitted, inner.record_count().await)
}

// Known limitation: counting and recording are separate store operations, so
// evaluations that read the count before any of them appends are all admitted.
#[tokio::test]
async fn test_concurrent_evaluations_can_overshoot_limit() {
    let (admitted, records) = admitted_under_contention(3).await;

    assert_eq!(admitted, 3);
    assert_eq!(records, 4 + 3);
}

#[tokio::test]
#[should_panic(expected = "admitted beyond maxRequests")]
async fn test_concurrent_admissions_exceed_limit() {
    let (_, records) = admitted_under_contention(3).await;
    assert!(records <= 5, "admitted beyond maxRequests: {records} records in window");
}
