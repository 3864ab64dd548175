//! Property-Based Tests for the Quota Engine
//!
//! Checks the decision invariants over random rules and usage histories.
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib quota::proptests
//! ```

use proptest::prelude::*;
use std::sync::Arc;

use crate::quota::clock::ManualClock;
use crate::quota::defaults::DefaultTable;
use crate::quota::engine::QuotaEngine;
use crate::quota::resolver::ConfigResolver;
use crate::quota::store::{MemoryConfigStore, MemoryUsageStore, UsageStore};
use crate::quota::types::{QuotaDecision, QuotaRequest, ServiceConfig, TierRule, UsageKey, UsageRecord};

const NOW: i64 = 1_700_000_000_000;

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Evaluate one request after seeding records `ages` milliseconds old
async fn evaluate_with_history(rule: TierRule, ages: &[i64]) -> (QuotaDecision, usize, usize) {
    let mut defaults = DefaultTable::empty();
    defaults.insert(ServiceConfig::new("svc").with_rule("default", rule));
    let resolver = ConfigResolver::new(Arc::new(MemoryConfigStore::new()), defaults);
    let usage = MemoryUsageStore::new();
    let key = UsageKey::new("svc", "client");

    for age in ages {
        let ts = NOW - age;
        usage
            .append(UsageRecord::new(key.clone(), ts, ts + 86_400_000))
            .await
            .unwrap();
    }

    let engine = QuotaEngine::new(resolver, Arc::new(usage.clone()), Arc::new(ManualClock::new(NOW)));
    let before = usage.record_count().await;
    let decision = engine
        .evaluate(&QuotaRequest::new("svc", "client"))
        .await
        .unwrap();
    let after = usage.record_count().await;
    (decision, before, after)
}

fn arb_rule() -> impl Strategy<Value = TierRule> {
    (1_000u64..120_000, 1u32..20).prop_map(|(w, m)| TierRule::new(w, m))
}

fn arb_history() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..240_000, 0..40)
}

// ============================================================================
// Property 1: Admission matches the window count
// ============================================================================

proptest! {
    #[test]
    fn prop_admission_matches_usage(rule in arb_rule(), ages in arb_history()) {
        let in_window = ages.iter().filter(|a| **a <= rule.window_millis()).count() as u32;
        let (decision, before, after) = run(evaluate_with_history(rule, &ages));

        prop_assert_eq!(decision.allowed, in_window < rule.max_requests);
        if decision.allowed {
            prop_assert_eq!(after, before + 1);
        } else {
            prop_assert_eq!(after, before);
        }
    }

    #[test]
    fn prop_remaining_bounds(rule in arb_rule(), ages in arb_history()) {
        let in_window = ages.iter().filter(|a| **a <= rule.window_millis()).count() as i64;
        let (decision, _, _) = run(evaluate_with_history(rule, &ages));

        let consumed = if decision.allowed { 1 } else { 0 };
        let expected = (rule.max_requests as i64 - in_window - consumed).max(0);

        prop_assert!(decision.remaining <= rule.max_requests);
        prop_assert_eq!(decision.remaining as i64, expected);
        prop_assert_eq!(decision.reset_at, NOW + rule.window_ms as i64);
    }
}

// ============================================================================
// Property 2: Retry hint
// ============================================================================

proptest! {
    #[test]
    fn prop_retry_after_iff_denied_with_usage(rule in arb_rule(), ages in arb_history()) {
        let window: Vec<i64> = ages.iter().copied().filter(|a| *a <= rule.window_millis()).collect();
        let (decision, _, _) = run(evaluate_with_history(rule, &ages));

        let expect_hint = !decision.allowed && !window.is_empty();
        prop_assert_eq!(decision.retry_after_secs.is_some(), expect_hint);

        if let Some(secs) = decision.retry_after_secs {
            let oldest_age = *window.iter().max().unwrap();
            let wait_ms = (rule.window_millis() - oldest_age) as u64;
            prop_assert_eq!(secs, wait_ms.div_ceil(1_000).max(1));
            prop_assert!(secs >= 1);
        }
    }
}

// ============================================================================
// Property 3: Tier fallback is total
// ============================================================================

proptest! {
    #[test]
    fn prop_unknown_tiers_resolve_to_default(tier in "[a-z]{1,12}", rule in arb_rule()) {
        let mut defaults = DefaultTable::empty();
        defaults.insert(
            ServiceConfig::new("svc")
                .with_rule("default", rule)
                .with_rule("named", TierRule::new(rule.window_ms, rule.max_requests + 1)),
        );
        let resolver = ConfigResolver::new(Arc::new(MemoryConfigStore::new()), defaults);

        let resolved = run(resolver.resolve("svc", &tier)).unwrap();
        if tier == "named" {
            prop_assert_eq!(resolved.max_requests, rule.max_requests + 1);
        } else {
            prop_assert_eq!(resolved, rule);
        }
    }
}
