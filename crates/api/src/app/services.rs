//! Store selection and engine wiring.

use std::sync::Arc;

use djt_infra::{InMemoryKvStore, KvStore, StoreError, TrackingConfig, TrackingEngine};

use crate::config::AppConfig;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub engine: TrackingEngine,
}

impl AppServices {
    pub fn new(kv: Arc<dyn KvStore>, tracking: TrackingConfig) -> Self {
        Self {
            engine: TrackingEngine::new(kv, tracking),
        }
    }

    pub fn in_memory(tracking: TrackingConfig) -> Self {
        Self::new(Arc::new(InMemoryKvStore::new()), tracking)
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    tracing::info!("using in-memory tracking store");
    Ok(AppServices::in_memory(config.tracking.clone()))
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    use djt_core::RetryPolicy;
    use djt_infra::kv::RedisKvStore;

    let store = RedisKvStore::connect(
        &config.redis_url,
        config.tracking.scan_count,
        &RetryPolicy::default(),
    )
    .await?;
    Ok(AppServices::new(Arc::new(store), config.tracking.clone()))
}
