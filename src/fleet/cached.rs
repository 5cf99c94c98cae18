//! Cache-backed decorators for slow-changing fleet facts
//!
//! Latest image ids change at most a few times a day and per-instance CPU
//! averages over a ten-minute window barely move between two checks of the
//! same pass, so both are memoised in a [`TtlCache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ComputeMetrics, ImageResolver, NodeGroup};
use crate::cache::TtlCache;
use crate::error::Result;

/// Memoises `latest_image_id` per control-plane version and image family
pub struct CachedImageResolver {
    inner: Arc<dyn ImageResolver>,
    cache: TtlCache<(String, String), Option<String>>,
    ttl: Duration,
}

impl CachedImageResolver {
    pub fn new(inner: Arc<dyn ImageResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(),
            ttl,
        }
    }
}

#[async_trait]
impl ImageResolver for CachedImageResolver {
    async fn current_image_id(
        &self,
        cluster: &str,
        node_group: &NodeGroup,
    ) -> Result<Option<String>> {
        // Varies per node group; not cached.
        self.inner.current_image_id(cluster, node_group).await
    }

    async fn latest_image_id(&self, k8s_version: &str, ami_type: &str) -> Result<Option<String>> {
        let key = (k8s_version.to_string(), ami_type.to_string());
        self.cache
            .get_or_try_insert_with(key, self.ttl, || async {
                debug!(
                    "Latest image cache miss for {} / {}",
                    k8s_version, ami_type
                );
                self.inner.latest_image_id(k8s_version, ami_type).await
            })
            .await
    }
}

/// Memoises per-instance CPU averages
pub struct CachedMetrics {
    inner: Arc<dyn ComputeMetrics>,
    cache: TtlCache<(String, Duration), Option<f64>>,
    ttl: Duration,
}

impl CachedMetrics {
    pub fn new(inner: Arc<dyn ComputeMetrics>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(),
            ttl,
        }
    }
}

#[async_trait]
impl ComputeMetrics for CachedMetrics {
    async fn average_cpu(&self, instance_id: &str, window: Duration) -> Result<Option<f64>> {
        let key = (instance_id.to_string(), window);
        self.cache
            .get_or_try_insert_with(key, self.ttl, || {
                self.inner.average_cpu(instance_id, window)
            })
            .await
    }
}
