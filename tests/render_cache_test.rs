use sdfview::render::{Artifact, RenderKey, Renderer, StructureRenderer};
use sdfview::{RenderCache, RenderError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

fn key(s: &str) -> RenderKey {
    RenderKey::new(s).unwrap()
}

fn svg(k: &RenderKey) -> Artifact {
    Artifact::new(format!("<svg>{}</svg>", k.as_str()))
}

#[test]
fn test_capacity_two_evicts_least_recently_used() {
    let cache = RenderCache::with_capacity(2);
    let (a, b, c) = (key("CCO"), key("c1ccccc1"), key("CC(=O)O"));
    let calls = AtomicUsize::new(0);
    let counted = |k: &RenderKey| {
        calls.fetch_add(1, Ordering::SeqCst);
        svg(k)
    };

    cache.get_or_compute(&a, counted);
    cache.get_or_compute(&b, counted);
    cache.get_or_compute(&c, counted);

    assert!(!cache.contains(&a));
    assert!(cache.contains(&b));
    assert!(cache.contains(&c));
    assert_eq!(cache.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    assert_eq!(cache.get_or_compute(&b, counted), svg(&b));
    assert_eq!(cache.get_or_compute(&c, counted), svg(&c));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (2, 3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // A was evicted, so it is rendered again and pushes out B.
    assert_eq!(cache.get_or_compute(&a, counted), svg(&a));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (2, 4));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!cache.contains(&b));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_access_refreshes_recency() {
    let cache = RenderCache::with_capacity(2);
    let (a, b, c) = (key("CCO"), key("c1ccccc1"), key("CC(=O)O"));

    cache.get_or_compute(&a, svg);
    cache.get_or_compute(&b, svg);
    cache.get_or_compute(&a, svg);
    cache.get_or_compute(&c, svg);

    assert!(cache.contains(&a));
    assert!(!cache.contains(&b));
}

#[test]
fn test_stats_snapshot() {
    let cache = RenderCache::with_capacity(500);
    assert_eq!(cache.stats().hit_rate, 0.0);

    let k = key("CCO");
    cache.get_or_compute(&k, svg);
    cache.get_or_compute(&k, svg);
    cache.get_or_compute(&k, svg);
    cache.get_or_compute(&key("CCN"), svg);

    let stats = cache.stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.capacity, 500);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 2);
    assert!((stats.hit_rate - 0.5).abs() < 1e-12);

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["hitRate"], 0.5);
}

#[test]
fn test_failed_render_is_cached_as_empty() {
    let cache = RenderCache::with_capacity(10);
    let calls = AtomicUsize::new(0);
    let failing = |_: &RenderKey| -> Result<Artifact, RenderError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(RenderError::Empty)
    };

    let k = key("not a molecule");
    assert!(cache.get_or_render(&k, &failing).is_empty());
    assert!(cache.get_or_render(&k, &failing).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.contains(&k));
}

#[test]
fn test_structure_renderer_output_is_single_line_svg() {
    let renderer = StructureRenderer::new();
    let artifact = renderer.render(&key("CC(=O)Oc1ccccc1C(=O)O")).unwrap();
    assert!(artifact.as_str().starts_with("<svg"));
    assert!(artifact.as_str().ends_with("</svg>"));
    assert!(!artifact.as_str().contains('\n'));
    assert!(renderer.render(&key("C1CC")).is_err());
}

#[test]
fn test_concurrent_get_or_compute_keeps_one_entry_per_key() {
    let cache = RenderCache::with_capacity(4);
    let computed = AtomicUsize::new(0);
    let keys: Vec<RenderKey> = ["C", "CC", "CCC", "CCCC", "CCCCC", "CCCCCC"]
        .iter()
        .map(|s| key(s))
        .collect();

    thread::scope(|scope| {
        for t in 0..8 {
            let cache = &cache;
            let keys = &keys;
            let computed = &computed;
            scope.spawn(move || {
                for round in 0..200 {
                    let k = &keys[(t + round) % keys.len()];
                    let artifact = cache.get_or_compute(k, |k| {
                        computed.fetch_add(1, Ordering::SeqCst);
                        svg(k)
                    });
                    assert_eq!(artifact.as_str(), format!("<svg>{}</svg>", k.as_str()));
                }
            });
        }
    });

    let stats = cache.stats();
    assert!(stats.size <= 4);
    assert_eq!(stats.hits + stats.misses, 8 * 200);
    assert_eq!(computed.load(Ordering::SeqCst) as u64, stats.misses);
}

#[test]
fn test_clear_resets_entries_and_counters() {
    let cache = RenderCache::with_capacity(3);
    cache.get_or_compute(&key("CCO"), svg);
    cache.get_or_compute(&key("CCO"), svg);
    cache.clear();
    let stats = cache.stats();
    assert_eq!((stats.size, stats.hits, stats.misses), (0, 0, 0));
    assert!(cache.is_empty());
}
