//! Integration tests for the cache read/write/invalidate paths.

mod common;

use bytes::Bytes;
use common::{paths, Harness};
use edgeweave::edge::{NodeStatus, NodeTier};
use edgeweave::events::CacheEventKind;
use edgeweave::orchestrator::{AnalyticsOptions, CacheOptions, GetOptions, GroupBy, InvalidateOptions};
use edgeweave::provider::{CacheRule, InvalidationRule};
use edgeweave::StrategyKind;
use std::time::Duration;

#[tokio::test]
async fn test_smart_static_write_hits_edge_and_origin() {
    let h = Harness::new();

    let outcome = h
        .orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Smart);
    assert_eq!(outcome.total_nodes, 2);
    assert_eq!(outcome.cached_nodes, 2);
    assert_eq!(outcome.nodes, vec!["edge-us-east", "origin"]);
    assert!(outcome.failures.is_empty());
    assert!(h.node("edge-us-east").peek("/static/app.js").await.is_some());
    assert!(h.node("regional-us-east-1").peek("/static/app.js").await.is_none());
}

#[tokio::test]
async fn test_api_read_falls_through_to_origin() {
    let h = Harness::new();
    h.orchestrator
        .cache_content(
            "/api/orders",
            Bytes::from_static(b"[]"),
            CacheOptions::default().levels(vec![NodeTier::Origin]),
        )
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .get_content("/api/orders", GetOptions::default())
        .await
        .unwrap();

    assert!(outcome.hit);
    assert_eq!(outcome.node.as_deref(), Some("origin"));
    assert_eq!(outcome.content, Some(Bytes::from_static(b"[]")));
    assert_eq!(outcome.searched_nodes, None);
    // The regional node was probed first.
    assert_eq!(h.node("regional-us-east-1").reads(), 1);
}

#[tokio::test]
async fn test_miss_reports_searched_nodes() {
    let h = Harness::new();
    let mut misses = h.events.subscribe();

    let outcome = h
        .orchestrator
        .get_content("/static/missing.css", GetOptions::default())
        .await
        .unwrap();

    assert!(!outcome.hit);
    assert!(outcome.content.is_none());
    assert_eq!(outcome.searched_nodes, Some(2));

    let event = misses.recv().await.unwrap();
    assert_eq!(event.kind, CacheEventKind::CacheMiss);
}

#[tokio::test]
async fn test_empty_content_is_not_a_hit() {
    let h = Harness::new();
    h.orchestrator
        .cache_content("/static/empty.js", Bytes::new(), CacheOptions::default())
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .get_content("/static/empty.js", GetOptions::default())
        .await
        .unwrap();

    assert!(!outcome.hit);
    assert!(outcome.node.is_none());
    assert!(outcome.content.is_none());
    assert_eq!(outcome.searched_nodes, Some(2));
    assert_eq!(h.node("edge-us-east").reads(), 1);
    assert_eq!(h.node("origin").reads(), 1);
    assert!(h.events.history_of(CacheEventKind::CacheHit).is_empty());
}

#[tokio::test]
async fn test_empty_edge_copy_falls_through_to_origin() {
    let h = Harness::new();
    h.orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::new(),
            CacheOptions::default().levels(vec![NodeTier::Edge]),
        )
        .await
        .unwrap();
    h.orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().levels(vec![NodeTier::Origin]),
        )
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .get_content("/static/app.js", GetOptions::default())
        .await
        .unwrap();

    assert!(outcome.hit);
    assert_eq!(outcome.node.as_deref(), Some("origin"));
    assert_eq!(outcome.content, Some(Bytes::from_static(b"js")));
}

#[tokio::test]
async fn test_write_never_errors_when_every_node_fails() {
    let h = Harness::new();
    for node in h.nodes.values() {
        node.fail_writes(true);
    }

    let outcome = h
        .orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.cached_nodes, 0);
    assert_eq!(outcome.total_nodes, 2);
    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(h.events.history_of(CacheEventKind::CacheError).len(), 2);
    assert!(h.events.history_of(CacheEventKind::ContentCached).is_empty());
}

#[tokio::test]
async fn test_slow_node_times_out_without_failing_write() {
    let mut config = common::test_config();
    config.orchestrator.node_timeout = Duration::from_millis(30);
    let h = Harness::with(config, Duration::ZERO, |b| b);
    h.node("edge-us-east").set_delay(Duration::from_millis(200));

    let outcome = h
        .orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.cached_nodes, 1);
    assert_eq!(outcome.nodes, vec!["origin"]);
    assert_eq!(outcome.failures[0].node, "edge-us-east");
}

#[tokio::test]
async fn test_read_error_counts_as_miss_and_probing_continues() {
    let h = Harness::new();
    h.orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();
    h.node("edge-us-east").fail_reads(true);

    let outcome = h
        .orchestrator
        .get_content("/static/app.js", GetOptions::default())
        .await
        .unwrap();

    assert!(outcome.hit);
    assert_eq!(outcome.node.as_deref(), Some("origin"));
    assert_eq!(h.events.history_of(CacheEventKind::RetrievalError).len(), 1);
}

#[tokio::test]
async fn test_unknown_strategy_falls_back_to_smart() {
    let h = Harness::new();

    let outcome = h
        .orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().strategy("round-robin"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Smart);
    assert_eq!(outcome.total_nodes, 2);
}

#[tokio::test]
async fn test_tiered_write_skips_regional() {
    let h = Harness::new();

    let outcome = h
        .orchestrator
        .cache_content(
            "/images/hero.png",
            Bytes::from_static(b"png"),
            CacheOptions::default().strategy("tiered"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Tiered);
    assert_eq!(outcome.nodes, vec!["edge-us-east", "origin"]);
}

#[tokio::test]
async fn test_geographic_write_for_eu_user() {
    let h = Harness::new();

    let outcome = h
        .orchestrator
        .cache_content(
            "/page.html",
            Bytes::from_static(b"<html>"),
            CacheOptions::default().strategy("geographic").location("eu"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.nodes, vec!["regional-eu-west-1", "origin"]);
}

#[tokio::test]
async fn test_failed_edge_is_skipped() {
    let h = Harness::new();
    h.node("edge-us-east").fail_health(true);
    for _ in 0..5 {
        h.orchestrator.run_health_checks().await;
    }
    assert_eq!(
        h.orchestrator.registry().get("edge-us-east").unwrap().status(),
        NodeStatus::Failed
    );

    let outcome = h
        .orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.nodes, vec!["origin"]);
    assert_eq!(h.node("edge-us-east").writes(), 0);
}

#[tokio::test]
async fn test_cache_rule_ttl_and_publish() {
    let h = Harness::new();
    h.orchestrator
        .add_cache_rule("/static/*", CacheRule::ttl(86_400).with_header("x-tier", "static"))
        .unwrap();

    let outcome = h
        .orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().publish(),
        )
        .await
        .unwrap();

    let upload = outcome.upload.unwrap();
    assert!(upload.error.is_none());
    let asset = h.cloudflare.asset("/static/app.js").unwrap();
    assert_eq!(asset.cache_control.as_deref(), Some("public, max-age=86400"));
    assert_eq!(asset.headers["x-tier"], "static");
}

#[tokio::test]
async fn test_invalidation_is_idempotent() {
    let h = Harness::new();
    h.orchestrator
        .cache_content("/static/app.js", Bytes::from_static(b"js"), CacheOptions::default())
        .await
        .unwrap();

    let targets = paths(&["/static/app.js"]);
    let first = h
        .orchestrator
        .invalidate_content(&targets, InvalidateOptions::default())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .invalidate_content(&targets, InvalidateOptions::default())
        .await
        .unwrap();

    assert_eq!(first.nodes_invalidated, 5);
    assert_eq!(first.total_invalidations, 2);
    assert_eq!(second.nodes_invalidated, 5);
    assert_eq!(second.total_invalidations, 0);
    assert!(h.node("origin").peek("/static/app.js").await.is_none());

    // Active provider purged each time, mirrored to fastly.
    assert_eq!(h.cloudflare.purges().len(), 2);
    let report = first.provider.unwrap().report.unwrap();
    assert_eq!(report.provider, "cloudflare");
    assert_eq!(report.synced, vec!["fastly"]);
}

#[tokio::test]
async fn test_invalidation_rules_expand_paths() {
    let h = Harness::new();
    h.orchestrator
        .add_invalidation_rule(
            "/products/*",
            InvalidationRule {
                also_invalidate: vec!["/api/catalog".to_string()],
                recursive: false,
            },
        )
        .unwrap();
    h.orchestrator
        .cache_content(
            "/api/catalog",
            Bytes::from_static(b"{}"),
            CacheOptions::default().levels(vec![NodeTier::Origin]),
        )
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .invalidate_content(&paths(&["/products/42"]), InvalidateOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.paths, vec!["/products/42", "/api/catalog"]);
    assert_eq!(outcome.total_invalidations, 1);
    assert_eq!(
        h.events.history_of(CacheEventKind::InvalidationRuleTriggered).len(),
        1
    );
}

#[tokio::test]
async fn test_invalidation_partial_failure() {
    let h = Harness::new();
    h.node("regional-eu-west-1").fail_invalidations(true);

    let outcome = h
        .orchestrator
        .invalidate_content(&paths(&["/a"]), InvalidateOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.nodes_invalidated, 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].node, "regional-eu-west-1");
}

#[tokio::test]
async fn test_metrics_invariant_holds() {
    let h = Harness::new();
    let o = &h.orchestrator;

    o.cache_content("/static/a.js", Bytes::from_static(b"a"), CacheOptions::default())
        .await
        .unwrap();
    for path in ["/static/a.js", "/static/b.js", "/static/a.js", "/api/x"] {
        o.get_content(path, GetOptions::default()).await.unwrap();
    }

    let analytics = o.get_cache_analytics(AnalyticsOptions {
        time_range: Some("24h".to_string()),
        group_by: GroupBy::Tier,
        include_predictions: true,
    });
    let overview = &analytics.overview;

    assert_eq!(overview.total_lookups, overview.cache_hits + overview.cache_misses);
    assert_eq!(overview.cache_hits, 2);
    assert_eq!(overview.cache_misses, 2);
    assert!((overview.cache_hit_rate - 50.0).abs() < 1e-9);
    assert!(overview.average_response_time_ema_ms >= 0.0);
    assert_eq!(overview.writes, 1);

    assert_eq!(analytics.time_range.as_deref(), Some("24h"));
    assert_eq!(analytics.nodes.len(), 5);
    let tiers = analytics.tiers.unwrap();
    assert_eq!(tiers[&NodeTier::Regional].nodes, 2);
    assert_eq!(analytics.predictions.unwrap().warmups_in_flight, 0);

    let smart = &analytics.strategies[&StrategyKind::Smart];
    assert_eq!(smart.lookups, smart.hits + smart.misses);
}
