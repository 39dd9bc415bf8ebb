use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use pixcache::database::MetadataStore;
use pixcache::models::{FetchOutcome, FreshResponse, PayloadSource, ValidatorPair};
use pixcache::network::ConditionalFetcher;
use pixcache::pipeline::RevalidationPipeline;
use pixcache::services::CacheManager;
use pixcache::storage::{DirectoryManager, DiskObjectStore};

const URLS: [&str; 2] = [
    "https://images.example.com/a.png",
    "https://images.example.com/b.png",
];

/// Always answers with a fresh image and records whether validators were sent
#[derive(Default)]
struct AlwaysFresh {
    calls: AtomicUsize,
    conditional_calls: AtomicUsize,
}

#[async_trait]
impl ConditionalFetcher for AlwaysFresh {
    async fn fetch_conditional(&self, _url: &str, validators: Option<&ValidatorPair>) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if validators.is_some() {
            self.conditional_calls.fetch_add(1, Ordering::SeqCst);
        }

        let image = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]));
        let mut data = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();

        FetchOutcome::Fresh(FreshResponse {
            data,
            validators: ValidatorPair::new("\"v1\"", ""),
        })
    }
}

#[tokio::test]
async fn wipe_forgets_everything_and_next_load_is_cold() {
    let temp_dir = TempDir::new().unwrap();
    let directories = Arc::new(DirectoryManager::new(
        temp_dir.path().join("CacheImages"),
        temp_dir.path().join("DataBase"),
    ));
    let store = Arc::new(MetadataStore::new(directories.clone()).await.unwrap());
    let fetcher = Arc::new(AlwaysFresh::default());
    let pipeline = RevalidationPipeline::new(
        store.clone(),
        DiskObjectStore::new(directories.clone()),
        fetcher.clone(),
    );
    let manager = CacheManager::new(store.clone(), directories.clone());

    for url in URLS {
        assert!(pipeline.load(url, CancellationToken::new()).await.is_success());
        assert!(store.exists(url).await.unwrap());
    }
    assert!(manager.usage(None).await.total_bytes > 0);

    let report = manager.clean().await.unwrap();
    assert_eq!(report.failed_entries, 0);

    for url in URLS {
        assert!(!store.exists(url).await.unwrap());
    }
    let images_root = temp_dir.path().join("CacheImages");
    assert_eq!(
        std::fs::read_dir(&images_root).map(|entries| entries.count()).unwrap_or(0),
        0
    );

    // Behaves exactly like a first-ever load
    let outcome = pipeline.load(URLS[0], CancellationToken::new()).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.values.len(), 1);
    assert_eq!(outcome.values[0].source, PayloadSource::Network);
    assert_eq!(fetcher.conditional_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    assert!(images_root.is_dir());
}

#[tokio::test]
async fn wipe_on_empty_cache_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let directories = Arc::new(DirectoryManager::new(
        temp_dir.path().join("CacheImages"),
        temp_dir.path().join("DataBase"),
    ));
    let store = Arc::new(MetadataStore::new(directories.clone()).await.unwrap());
    let manager = CacheManager::new(store.clone(), directories);

    manager.clean().await.unwrap();
    manager.clean().await.unwrap();

    assert!(store.is_open().await);
    assert_eq!(store.count().await.unwrap(), 0);
}
