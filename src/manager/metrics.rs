use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tracks load, cache and residency metrics for an `AssetManager`
#[derive(Debug, Default)]
pub struct AssetMetrics {
    load_times: RwLock<HashMap<String, Duration>>,
    load_counts: RwLock<HashMap<String, u64>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    load_failures: AtomicU64,
    gpu_bytes: AtomicU64,
    reclaimed_entries: AtomicU64,
}

impl AssetMetrics {
    /// Create a new instance of AssetMetrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed load of `path`
    pub fn record_load(&self, path: String, duration: Duration) {
        *self.load_counts.write().entry(path.clone()).or_insert(0) += 1;
        self.load_times.write().insert(path, duration);
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gpu_alloc(&self, bytes: u64) {
        self.gpu_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_gpu_free(&self, bytes: u64) {
        // never wraps below zero
        let _ = self
            .gpu_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    pub fn record_reclaimed(&self, entries: u64) {
        self.reclaimed_entries.fetch_add(entries, Ordering::Relaxed);
    }

    /// Get the cache hit rate as a percentage
    pub fn cache_hit_rate(&self) -> f32 {
        let hits = self.cache_hits.load(Ordering::Relaxed) as f32;
        let misses = self.cache_misses.load(Ordering::Relaxed) as f32;

        if hits + misses > 0.0 {
            hits / (hits + misses) * 100.0
        } else {
            0.0
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    /// Bytes of mesh buffers and texture images currently owned
    pub fn gpu_bytes_resident(&self) -> u64 {
        self.gpu_bytes.load(Ordering::Relaxed)
    }

    /// Entries destroyed by garbage collection so far
    pub fn reclaimed_entries(&self) -> u64 {
        self.reclaimed_entries.load(Ordering::Relaxed)
    }

    /// Duration of the most recent load of `path`
    pub fn last_load_time(&self, path: &str) -> Option<Duration> {
        self.load_times.read().get(path).cloned()
    }

    /// Get the load count for an asset
    pub fn load_count(&self, path: &str) -> u64 {
        *self.load_counts.read().get(path).unwrap_or(&0)
    }

    /// Get all recorded load times
    pub fn all_load_times(&self) -> HashMap<String, Duration> {
        self.load_times.read().clone()
    }
}

/// A thread-safe wrapper around AssetMetrics
#[derive(Debug, Clone, Default)]
pub struct AssetMetricsHandle(Arc<AssetMetrics>);

impl AssetMetricsHandle {
    /// Create a new metrics handle
    pub fn new() -> Self {
        Self(Arc::new(AssetMetrics::new()))
    }

    /// Get a reference to the underlying metrics
    pub fn inner(&self) -> &AssetMetrics {
        &self.0
    }
}

impl std::ops::Deref for AssetMetricsHandle {
    type Target = AssetMetrics;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = AssetMetrics::new();
        assert_eq!(metrics.cache_hit_rate(), 0.0);
        metrics.record_cache_miss();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        assert_eq!(metrics.cache_hit_rate(), 75.0);
    }

    #[test]
    fn test_gpu_bytes_saturate() {
        let metrics = AssetMetrics::new();
        metrics.record_gpu_alloc(100);
        metrics.record_gpu_free(40);
        assert_eq!(metrics.gpu_bytes_resident(), 60);
        metrics.record_gpu_free(1000);
        assert_eq!(metrics.gpu_bytes_resident(), 0);
    }

    #[test]
    fn test_load_counts_and_times() {
        let metrics = AssetMetrics::new();
        metrics.record_load("a.smodel".to_string(), Duration::from_millis(5));
        metrics.record_load("a.smodel".to_string(), Duration::from_millis(7));
        assert_eq!(metrics.load_count("a.smodel"), 2);
        assert_eq!(metrics.last_load_time("a.smodel"), Some(Duration::from_millis(7)));
        assert_eq!(metrics.load_count("b.smodel"), 0);
    }
}
