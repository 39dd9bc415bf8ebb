pub mod cache_manager;
pub mod prefetcher;

pub use cache_manager::{CacheManager, CacheUsage, CleanReport};
pub use prefetcher::{PrefetchSummary, Prefetcher};
