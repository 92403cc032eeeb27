//! Integration tests for provider health, failover and bulk publishing.

mod common;

use bytes::Bytes;
use common::{paths, test_config, Harness};
use edgeweave::events::CacheEventKind;
use edgeweave::orchestrator::{CacheOptions, InvalidateOptions};
use edgeweave::provider::{CdnProvider, ProviderState, UploadRequest};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_three_failures_queue_without_switching() {
    let h = Harness::new();
    h.cloudflare.set_healthy(false);

    for _ in 0..3 {
        h.orchestrator.run_health_checks().await;
    }

    let queue = h.orchestrator.gateway().failover_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].provider, "cloudflare");
    assert_eq!(
        h.orchestrator.gateway().active().as_deref(),
        Some("cloudflare")
    );
    assert_eq!(
        h.orchestrator.gateway().state_of("cloudflare"),
        Some(ProviderState::FailoverQueued)
    );
    assert!(h.events.history_of(CacheEventKind::ProviderSwitched).is_empty());

    // Further failures do not queue it twice.
    h.orchestrator.run_health_checks().await;
    assert_eq!(h.orchestrator.gateway().failover_queue().len(), 1);
}

#[tokio::test]
async fn test_manual_switch_after_failover_queue() {
    let h = Harness::new();
    h.cloudflare
        .update_config(json!({ "cache_level": "aggressive" }))
        .await
        .unwrap();
    h.cloudflare.set_healthy(false);
    for _ in 0..3 {
        h.orchestrator.run_health_checks().await;
    }

    let record = h
        .orchestrator
        .switch_provider("fastly", "cloudflare unhealthy")
        .await
        .unwrap();

    assert_eq!(record.from.as_deref(), Some("cloudflare"));
    assert_eq!(record.to, "fastly");
    assert!(record.config_synced);
    assert_eq!(h.fastly.config()["cache_level"], "aggressive");
    assert!(h.orchestrator.gateway().failover_queue().is_empty());
    assert_eq!(h.events.history_of(CacheEventKind::ProviderSwitched).len(), 1);

    // New writes publish through fastly.
    h.orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().publish(),
        )
        .await
        .unwrap();
    assert!(h.fastly.asset("/static/app.js").is_some());
    assert!(h.cloudflare.asset("/static/app.js").is_none());
}

#[tokio::test]
async fn test_switch_to_unknown_provider_keeps_active() {
    let h = Harness::new();

    assert!(h.orchestrator.switch_provider("akamai", "test").await.is_err());
    assert_eq!(
        h.orchestrator.gateway().active().as_deref(),
        Some("cloudflare")
    );
}

#[tokio::test]
async fn test_publish_failure_is_reported_not_raised() {
    let h = Harness::new();
    h.cloudflare.set_fail_uploads(true);

    let outcome = h
        .orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().publish(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.cached_nodes, 2);
    let upload = outcome.upload.unwrap();
    assert!(upload.response.is_none());
    assert!(upload.error.is_some());
}

#[tokio::test]
async fn test_purge_sync_failure_is_reported() {
    let h = Harness::new();
    h.fastly.set_fail_purges(true);

    let outcome = h
        .orchestrator
        .invalidate_content(&paths(&["/static/app.js"]), InvalidateOptions::default())
        .await
        .unwrap();

    let report = outcome.provider.unwrap().report.unwrap();
    assert!(report.synced.is_empty());
    assert_eq!(report.sync_failures.len(), 1);
    assert_eq!(report.sync_failures[0].0, "fastly");
    assert_eq!(h.events.history_of(CacheEventKind::SyncError).len(), 1);
}

#[tokio::test]
async fn test_active_purge_failure_raises_in_outcome() {
    let h = Harness::new();
    h.cloudflare.set_fail_purges(true);

    let outcome = h
        .orchestrator
        .invalidate_content(&paths(&["/a"]), InvalidateOptions::default())
        .await
        .unwrap();

    let purge = outcome.provider.unwrap();
    assert!(purge.report.is_none());
    assert!(purge.error.is_some());
    assert_eq!(outcome.nodes_invalidated, 5);
}

#[tokio::test]
async fn test_bulk_publish() {
    let h = Harness::new();
    let requests = (0..12)
        .map(|i| {
            UploadRequest::new(format!("/assets/img-{}.png", i), Bytes::from(vec![0u8; 64]))
                .with_content_type("image/png")
        })
        .collect();

    let results = h.orchestrator.publish_assets(requests).await.unwrap();

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.error.is_none()));
    assert_eq!(h.cloudflare.upload_count(), 12);
}

fn slow_assets(count: usize) -> Vec<UploadRequest> {
    (0..count)
        .map(|i| UploadRequest::new(format!("/assets/bundle-{}.js", i), Bytes::from_static(b"js")))
        .collect()
}

#[tokio::test]
async fn test_bulk_publish_caps_outstanding_uploads() {
    let h = Harness::new();
    h.cloudflare.set_upload_delay(Duration::from_millis(30));

    let results = h.orchestrator.publish_assets(slow_assets(12)).await.unwrap();

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.error.is_none()));
    // Default concurrency is 5; a full first wave proves uploads overlap.
    assert_eq!(h.cloudflare.peak_uploads_in_flight(), 5);
}

#[tokio::test]
async fn test_bulk_publish_honours_configured_concurrency() {
    let mut config = test_config();
    config.orchestrator.upload_concurrency = 2;
    let h = Harness::with(config, Duration::ZERO, |b| b);
    h.cloudflare.set_upload_delay(Duration::from_millis(20));

    let results = h.orchestrator.publish_assets(slow_assets(7)).await.unwrap();

    assert_eq!(results.len(), 7);
    assert!(h.cloudflare.peak_uploads_in_flight() <= 2);
    assert_eq!(h.cloudflare.upload_count(), 7);
}

fn unsynced_harness() -> Harness {
    let mut config = test_config();
    config.providers.enable_real_time_sync = false;
    Harness::with(config, Duration::ZERO, |b| b)
}

#[tokio::test]
async fn test_purge_is_not_mirrored_with_sync_off() {
    let h = unsynced_harness();

    let outcome = h
        .orchestrator
        .invalidate_content(&paths(&["/static/app.js"]), InvalidateOptions::default())
        .await
        .unwrap();

    let report = outcome.provider.unwrap().report.unwrap();
    assert_eq!(report.provider, "cloudflare");
    assert!(report.synced.is_empty());
    assert!(report.sync_failures.is_empty());
    assert_eq!(h.cloudflare.purges().len(), 1);
    assert!(h.fastly.purges().is_empty());
}

#[tokio::test]
async fn test_switch_skips_config_copy_with_sync_off() {
    let h = unsynced_harness();
    h.cloudflare
        .update_config(json!({ "cache_level": "aggressive" }))
        .await
        .unwrap();

    let record = h
        .orchestrator
        .switch_provider("fastly", "maintenance")
        .await
        .unwrap();

    assert_eq!(record.to, "fastly");
    assert!(!record.config_synced);
    assert_eq!(h.cloudflare.config_reads(), 0);
    assert!(h.fastly.config().get("cache_level").is_none());
    assert_eq!(h.orchestrator.gateway().active().as_deref(), Some("fastly"));
    assert!(h.events.history_of(CacheEventKind::SyncError).is_empty());
}

#[tokio::test]
async fn test_provider_metrics_roll_up() {
    let h = Harness::new();
    h.orchestrator
        .cache_content(
            "/static/app.js",
            Bytes::from_static(b"js"),
            CacheOptions::default().publish(),
        )
        .await
        .unwrap();

    let metrics = h.orchestrator.roll_up_provider_metrics().await;
    assert!(metrics.contains_key("cloudflare"));
    assert!(metrics.contains_key("fastly"));

    let statuses = h.orchestrator.gateway().statuses();
    let cloudflare = statuses.iter().find(|s| s.name == "cloudflare").unwrap();
    assert!(cloudflare.active);
    assert!(cloudflare.analytics.is_some());
}
