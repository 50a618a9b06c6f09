use std::sync::Arc;
use std::time::Duration;

use lowcoder_runtime::config::CacheConfig;
use lowcoder_runtime::engine::{ComponentRef, MockComponentResolver};
use lowcoder_runtime::event::EventType;
use lowcoder_runtime::schema::Node;
use lowcoder_runtime::{EngineConfig, RenderContext, RenderEngine, RenderOptions, Schema};
use pretty_assertions::assert_eq;

fn cached_config(max_size: usize) -> EngineConfig {
    EngineConfig {
        cache: CacheConfig {
            enabled: true,
            ttl: Duration::ZERO,
            max_size,
        },
        ..Default::default()
    }
}

fn page(id: &str) -> Schema {
    Schema::new(id, "1.0.0", Node::new(&format!("{}-root", id), "Page"))
}

#[tokio::test]
async fn test_cache_hit_skips_the_renderer() {
    let mut components = MockComponentResolver::new();
    components
        .expect_resolve()
        .times(1)
        .returning(|node_type| Some(ComponentRef::new(node_type)));
    let engine = RenderEngine::builder(cached_config(10))
        .component_resolver(Arc::new(components))
        .build();
    let (mut events, _) = engine.event_bus().subscribe();
    let schema = page("home");
    let context = RenderContext::new();

    let first = engine.render(&schema, &context, None).await.unwrap();
    let second = engine.render(&schema, &context, None).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(
        seen.last(),
        Some(&EventType::RenderCached {
            schema_id: "home".to_string()
        })
    );
}

#[tokio::test]
async fn test_debug_render_skips_lookup_but_refreshes_cache() {
    let engine = RenderEngine::builder(cached_config(10)).build();
    let schema = page("home");
    let context = RenderContext::new();
    let debug = RenderOptions {
        debug: true,
        ..Default::default()
    };

    let cached = engine.render(&schema, &context, None).await.unwrap();
    let fresh = engine.render(&schema, &context, Some(debug)).await.unwrap();
    assert!(!Arc::ptr_eq(&cached, &fresh));
    assert_eq!(cached.as_ref(), fresh.as_ref());

    // The debug result replaced the stored entry.
    let again = engine.render(&schema, &context, None).await.unwrap();
    assert!(Arc::ptr_eq(&fresh, &again));
    assert_eq!(engine.cache_stats().size, 1);
}

#[tokio::test]
async fn test_oldest_inserted_schema_is_evicted_first() {
    let engine = RenderEngine::builder(cached_config(2)).build();
    let context = RenderContext::new();
    let (a, b, c) = (page("a"), page("b"), page("c"));

    let first_a = engine.render(&a, &context, None).await.unwrap();
    let first_b = engine.render(&b, &context, None).await.unwrap();
    engine.render(&c, &context, None).await.unwrap();
    assert_eq!(engine.cache_stats().size, 2);

    let second_b = engine.render(&b, &context, None).await.unwrap();
    assert!(Arc::ptr_eq(&first_b, &second_b));
    let second_a = engine.render(&a, &context, None).await.unwrap();
    assert!(!Arc::ptr_eq(&first_a, &second_a));
}

#[tokio::test]
async fn test_clear_cache() {
    let engine = RenderEngine::builder(cached_config(4)).build();
    let context = RenderContext::new();
    engine.render(&page("a"), &context, None).await.unwrap();
    let (mut events, _) = engine.event_bus().subscribe();

    engine.clear_cache();
    assert_eq!(engine.cache_stats().size, 0);
    assert_eq!(events.recv().await.unwrap().event_type, EventType::CacheCleared);
}

#[tokio::test(start_paused = true)]
async fn test_cached_results_expire() {
    let mut config = cached_config(4);
    config.cache.ttl = Duration::from_millis(500);
    let engine = RenderEngine::builder(config).build();
    let context = RenderContext::new();
    let schema = page("a");

    let first = engine.render(&schema, &context, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.cache_stats().size, 0);
    let second = engine.render(&schema, &context, None).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}
