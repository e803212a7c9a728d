use async_trait::async_trait;
use bytes::Bytes;
use dynamicimage::cache::{CacheEntry, CacheError, CacheResult};
use dynamicimage::source::{ContentResolver, SourceImage};
use dynamicimage::{
    BoxError, DynamicImageError, ImageCache, ImageFormat, ImageResizer, ImageService, Mapping,
    MappingEnforcement, MappingSet, MemoryCache, ResizeMode, TransformOptions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dynamicimage=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn options() -> TransformOptions {
    TransformOptions::new("/images/logo.png", 50, 50, ResizeMode::Crop, ImageFormat::Jpeg)
}

#[derive(Clone)]
struct FakeSource {
    bytes: Bytes,
    last_modified: OffsetDateTime,
}

/// Resolver over a mutable in-memory set of originals.
#[derive(Default)]
struct FakeResolver {
    sources: Mutex<HashMap<String, FakeSource>>,
    resolve_delay: Option<Duration>,
    resolve_calls: AtomicUsize,
}

impl FakeResolver {
    fn with_source(path: &str, bytes: &'static [u8]) -> Self {
        let resolver = Self::default();
        let mut sources = resolver.sources.try_lock().unwrap();
        sources.insert(
            path.to_string(),
            FakeSource {
                bytes: Bytes::from_static(bytes),
                last_modified: OffsetDateTime::now_utc() - Duration::from_secs(3600),
            },
        );
        drop(sources);
        resolver
    }

    async fn touch(&self, path: &str, bytes: &'static [u8]) {
        let mut sources = self.sources.lock().await;
        sources.insert(
            path.to_string(),
            FakeSource {
                bytes: Bytes::from_static(bytes),
                last_modified: OffsetDateTime::now_utc() + Duration::from_secs(1),
            },
        );
    }
}

#[async_trait]
impl ContentResolver for FakeResolver {
    async fn last_modified(
        &self,
        source_path: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<OffsetDateTime>, BoxError> {
        Ok(self.sources.lock().await.get(source_path).map(|s| s.last_modified))
    }

    async fn resolve(
        &self,
        source_path: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<SourceImage>, BoxError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.sources.lock().await.get(source_path).map(|s| SourceImage {
            bytes: s.bytes.clone(),
            last_modified: s.last_modified,
        }))
    }
}

/// Resizer that prefixes the source bytes, counting invocations.
#[derive(Default)]
struct CountingResizer {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ImageResizer for CountingResizer {
    async fn resize(
        &self,
        source: &[u8],
        options: &TransformOptions,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("decoder exploded".into());
        }
        let mut out = format!("{}x{}:", options.width, options.height).into_bytes();
        out.extend_from_slice(source);
        Ok(Bytes::from(out))
    }
}

struct Harness {
    service: Arc<ImageService<MemoryCache>>,
    resolver: Arc<FakeResolver>,
    resizer: Arc<CountingResizer>,
}

fn harness(resolver: FakeResolver, resizer: CountingResizer) -> Harness {
    let resolver = Arc::new(resolver);
    let resizer = Arc::new(resizer);
    let service = Arc::new(ImageService::new(
        MemoryCache::default(),
        Arc::clone(&resolver) as Arc<dyn ContentResolver>,
        Arc::clone(&resizer) as Arc<dyn ImageResizer>,
    ));
    Harness {
        service,
        resolver,
        resizer,
    }
}

#[tokio::test]
async fn miss_generates_then_hit_serves_from_cache() {
    init_tracing();
    let h = harness(
        FakeResolver::with_source("/images/logo.png", b"raw"),
        CountingResizer::default(),
    );
    let cancel = CancellationToken::new();

    let first = h.service.get_image(&options(), &cancel).await.unwrap().unwrap();
    assert_eq!(first.content(&cancel).await.unwrap(), Bytes::from("50x50:raw"));
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 1);

    let second = h.service.get_image(&options(), &cancel).await.unwrap().unwrap();
    assert_eq!(second.content(&cancel).await.unwrap(), Bytes::from("50x50:raw"));
    // Served from cache: no second resize, no second download.
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.resolver.resolve_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_source_returns_none_without_caching() {
    let h = harness(FakeResolver::default(), CountingResizer::default());
    let cancel = CancellationToken::new();

    assert!(h.service.get_image(&options(), &cancel).await.unwrap().is_none());
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resize_failure_surfaces_as_transformation_error() {
    let h = harness(
        FakeResolver::with_source("/images/logo.png", b"raw"),
        CountingResizer {
            fail: true,
            ..Default::default()
        },
    );
    let cancel = CancellationToken::new();

    let err = h.service.get_image(&options(), &cancel).await.unwrap_err();
    match err {
        DynamicImageError::Transformation { options: failed, source } => {
            assert_eq!(failed, options());
            assert_eq!(source.to_string(), "decoder exploded");
        }
        other => panic!("expected transformation failure, got {other:?}"),
    }

    // Nothing was cached: the next attempt resolves again.
    let _ = h.service.get_image(&options(), &cancel).await;
    assert_eq!(h.resolver.resolve_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn updated_source_invalidates_cached_entry() {
    let h = harness(
        FakeResolver::with_source("/images/logo.png", b"old"),
        CountingResizer::default(),
    );
    let cancel = CancellationToken::new();

    let first = h.service.get_image(&options(), &cancel).await.unwrap().unwrap();
    assert_eq!(first.content(&cancel).await.unwrap(), Bytes::from("50x50:old"));

    // Source replaced with a newer timestamp: the stale cache entry is
    // bypassed and the image regenerated.
    h.resolver.touch("/images/logo.png", b"new").await;
    let second = h.service.get_image(&options(), &cancel).await.unwrap().unwrap();
    assert_eq!(second.content(&cancel).await.unwrap(), Bytes::from("50x50:new"));
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_forces_regeneration() {
    let h = harness(
        FakeResolver::with_source("/images/logo.png", b"raw"),
        CountingResizer::default(),
    );
    let cancel = CancellationToken::new();

    h.service.get_image(&options(), &cancel).await.unwrap();
    h.service.invalidate(&options(), &cancel).await.unwrap();
    h.service.get_image(&options(), &cancel).await.unwrap();
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn enforced_mapping_rejects_before_any_work() {
    let resolver = FakeResolver::with_source("/images/logo.png", b"raw");
    let resizer = CountingResizer::default();
    let resolver = Arc::new(resolver);
    let resizer = Arc::new(resizer);
    let mappings: MappingSet =
        [Mapping::new(100, 100, ResizeMode::Crop, ImageFormat::Jpeg)].into_iter().collect();
    let service = ImageService::new(
        MemoryCache::default(),
        Arc::clone(&resolver) as Arc<dyn ContentResolver>,
        Arc::clone(&resizer) as Arc<dyn ImageResizer>,
    )
    .with_mappings(mappings, MappingEnforcement::Enforce);
    let cancel = CancellationToken::new();

    // 50x50 is not in the allow-list.
    assert!(service.get_image(&options(), &cancel).await.unwrap().is_none());
    assert_eq!(resolver.resolve_calls.load(Ordering::SeqCst), 0);
    assert_eq!(resizer.calls.load(Ordering::SeqCst), 0);

    let allowed = TransformOptions::new(
        "/images/logo.png",
        100,
        100,
        ResizeMode::Crop,
        ImageFormat::Jpeg,
    );
    assert!(service.get_image(&allowed, &cancel).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_identical_misses_share_one_generation() {
    init_tracing();
    let resolver = FakeResolver {
        resolve_delay: Some(Duration::from_millis(100)),
        ..FakeResolver::with_source("/images/logo.png", b"raw")
    };
    let h = harness(resolver, CountingResizer::default());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = Arc::clone(&h.service);
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            service.get_image(&options(), &cancel).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    assert_eq!(
        h.resizer.calls.load(Ordering::SeqCst),
        1,
        "concurrent identical misses should coalesce onto one generation"
    );
}

#[tokio::test]
async fn cancellation_aborts_without_partial_state() {
    let h = harness(
        FakeResolver::with_source("/images/logo.png", b"raw"),
        CountingResizer::default(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        h.service.get_image(&options(), &cancel).await,
        Err(DynamicImageError::Cancelled)
    ));
    assert_eq!(h.resizer.calls.load(Ordering::SeqCst), 0);

    // A live token afterwards works normally.
    let live = CancellationToken::new();
    assert!(h.service.get_image(&options(), &live).await.unwrap().is_some());
}

#[tokio::test]
async fn cache_failures_stay_distinct_from_transformation_failures() {
    struct BrokenCache;

    #[async_trait]
    impl ImageCache for BrokenCache {
        async fn add(&self, _entry: &CacheEntry, _cancel: &CancellationToken) -> CacheResult<()> {
            Err(CacheError::Io(std::io::Error::other("disk on fire")))
        }
        async fn get(
            &self,
            _options: &TransformOptions,
            _source_last_modified: OffsetDateTime,
            _cancel: &CancellationToken,
        ) -> CacheResult<Option<CacheEntry>> {
            Err(CacheError::Io(std::io::Error::other("disk on fire")))
        }
        async fn remove(
            &self,
            _options: &TransformOptions,
            _cancel: &CancellationToken,
        ) -> CacheResult<()> {
            Ok(())
        }
    }

    let resolver: Arc<dyn ContentResolver> =
        Arc::new(FakeResolver::with_source("/images/logo.png", b"raw"));
    let resizer: Arc<dyn ImageResizer> = Arc::new(CountingResizer::default());
    let service = ImageService::new(BrokenCache, resolver, resizer);
    let cancel = CancellationToken::new();

    let err = service.get_image(&options(), &cancel).await.unwrap_err();
    match err {
        DynamicImageError::Cache { key, .. } => assert_eq!(key.len(), 64),
        other => panic!("expected cache failure, got {other:?}"),
    }
}
