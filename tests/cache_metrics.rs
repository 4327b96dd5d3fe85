use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serial_test::serial;
use tower::ServiceExt;

use canopy::application::pagination::{PageRequest, PaginatedTree};
use canopy::application::tree::{NodeCommand, TreeService};
use canopy::cache::{
    CacheConfig, CacheProviderKind, MemoryTreeCache, PageKey, RedisTreeCache, TreeCache,
    TreeCacheProvider,
};
use canopy::infra::http::{RouterState, build_router};
use canopy::infra::memory::InMemoryNodes;

static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();

fn snapshotter() -> &'static Snapshotter {
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

fn counter(name: &str, provider: &str) -> u64 {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|label| label.key() == "provider" && label.value() == provider)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(value) => value,
            _ => 0,
        })
        .sum()
}

fn tree_service() -> Arc<TreeService> {
    let cache = TreeCache::new(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))));
    Arc::new(TreeService::new(Arc::new(InMemoryNodes::new()), cache))
}

#[tokio::test]
#[serial]
async fn tree_paths_emit_expected_metric_keys() {
    let snapshotter = snapshotter();
    let tree = tree_service();
    let app = build_router(RouterState::new(tree.clone()));

    tree.create_node(NodeCommand {
        label: "root".into(),
        parent_id: None,
    })
    .await
    .expect("create");

    for uri in ["/tree", "/tree", "/tree?page=2"] {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let config = CacheConfig {
        provider: CacheProviderKind::Redis,
        redis_url: Some("redis://127.0.0.1:1".to_string()),
        connect_timeout_ms: 200,
        ..Default::default()
    };
    let redis = RedisTreeCache::new(&config).expect("valid redis config");
    let key = PageKey::from(PageRequest::default());
    assert!(redis.get(key).await.is_none());
    redis
        .put(key, &PaginatedTree::empty(PageRequest::default(), 0))
        .await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "canopy_tree_cache_hit_total",
        "canopy_tree_cache_miss_total",
        "canopy_tree_cache_invalidate_total",
        "canopy_tree_cache_degraded_total",
        "canopy_tree_build_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

#[tokio::test]
#[serial]
async fn hits_and_misses_are_counted_per_lookup() {
    let tree = tree_service();
    tree.create_node(NodeCommand {
        label: "root".into(),
        parent_id: None,
    })
    .await
    .expect("create");

    let hits_before = counter("canopy_tree_cache_hit_total", "memory");
    let misses_before = counter("canopy_tree_cache_miss_total", "memory");

    let request = PageRequest::new(1, 5).expect("valid page");
    tree.list_page(request).await.expect("first read");
    tree.list_page(request).await.expect("second read");
    tree.list_page(request).await.expect("third read");

    assert_eq!(counter("canopy_tree_cache_miss_total", "memory") - misses_before, 1);
    assert_eq!(counter("canopy_tree_cache_hit_total", "memory") - hits_before, 2);
}
