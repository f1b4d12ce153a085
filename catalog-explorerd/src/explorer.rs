use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use shared::types::{QueryOptions, QueryResult, Resource, Service, WalkPhase};
use crate::cache::{keys, CacheStore, ResultCache};
use crate::config::{Config, TtlClasses};
use crate::error::{ExplorerError, Result};
use crate::gateway::Gateway;
use crate::prober::Prober;
use crate::token::TokenStore;
use crate::urls;
use crate::walker::{ProgressCallback, ProgressReporter, WalkContext, Walker};

/// Entry point used by the presentation layer.
///
/// At most one discovery runs at a time: starting a walk cancels the one before it.
pub struct Explorer {
    walker: Walker,
    gateway: Arc<Gateway>,
    cache: ResultCache,
    tokens: Arc<dyn TokenStore>,
    ttl: TtlClasses,
    current_walk: Mutex<CancellationToken>,
}

impl Explorer {
    pub fn new(
        config: &Config,
        store: Arc<dyn CacheStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let gateway = Arc::new(Gateway::new(&config.gateway, tokens.clone())?);
        let prober = Arc::new(Prober::new(&config.gateway, tokens.clone())?);
        let cache = ResultCache::new(store);
        let ttl = config.cache.ttl_classes();

        let walker = Walker::new(
            gateway.clone(),
            prober,
            cache.clone(),
            ttl,
            config.walker.batch_size,
        );

        Ok(Self {
            walker,
            gateway,
            cache,
            tokens,
            ttl,
            current_walk: Mutex::new(CancellationToken::new()),
        })
    }

    /// Discover every service and folder under `base_url`.
    pub async fn get_catalog(
        &self,
        base_url: &str,
        use_cache: bool,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<Service>> {
        let base_url = self.prepare_url(base_url)?;
        let ctx = WalkContext::new(self.begin_walk(), use_cache);
        let progress = ProgressReporter::new(WalkPhase::Catalog, on_progress);

        tracing::info!("Starting catalog discovery of {}", base_url);
        let result = self.walker.walk_catalog(&ctx, &base_url, &progress).await;
        log_outcome(&base_url, &result);
        result
    }

    /// Discover every layer and table, with fields, under `base_url`.
    pub async fn get_resource_catalog(
        &self,
        base_url: &str,
        use_cache: bool,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<Resource>> {
        let base_url = self.prepare_url(base_url)?;
        let ctx = WalkContext::new(self.begin_walk(), use_cache);
        let catalog_progress = ProgressReporter::new(WalkPhase::Catalog, on_progress.clone());
        let resource_progress = ProgressReporter::new(WalkPhase::Resources, on_progress);

        tracing::info!("Starting resource discovery of {}", base_url);
        let result = self
            .walker
            .walk_resources(&ctx, &base_url, &catalog_progress, &resource_progress)
            .await;
        log_outcome(&base_url, &result);
        result
    }

    /// Run an attribute query against one layer or table. Not retried, not paginated.
    pub async fn query_layer(
        &self,
        service_url: &str,
        id: i64,
        options: &QueryOptions,
        use_cache: bool,
    ) -> Result<QueryResult> {
        let service_url = self.prepare_url(service_url)?;
        let key = keys::query_key(&service_url, id, options);

        if use_cache {
            match self.cache.get::<QueryResult>(&key).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read of {} failed: {}", key, e),
            }
        }

        let result = self.gateway.query_resource(&service_url, id, options).await?;
        if let Some(warning) = result.warning() {
            tracing::warn!("Query of {}/{}: {}", service_url, id, warning);
        }

        if use_cache {
            if let Err(e) = self.cache.set(&key, &result, self.ttl.short).await {
                tracing::warn!("Cache write of {} failed: {}", key, e);
            }
        }

        Ok(result)
    }

    /// Cancel the walk in flight, if any.
    pub fn cancel_discovery(&self) {
        let current = self.current_walk.lock().unwrap_or_else(|e| e.into_inner());
        if !current.is_cancelled() {
            tracing::info!("Cancelling discovery");
            current.cancel();
        }
    }

    /// Drop cached results for `base_url`, or everything when `None`.
    pub async fn clear_cache(&self, base_url: Option<&str>) -> Result<usize> {
        match base_url {
            Some(base_url) => {
                let base_url = urls::strip_token(base_url);
                let removed = self.cache.clear_for(&base_url).await?;
                tracing::info!("Cleared {} cache entries for {}", removed, base_url);
                Ok(removed)
            }
            None => {
                let removed = self.cache.keys().await?.len();
                self.cache.clear().await?;
                tracing::info!("Cleared cache ({} entries)", removed);
                Ok(removed)
            }
        }
    }

    /// Cancel the previous walk and hand out a token for the new one.
    fn begin_walk(&self) -> CancellationToken {
        let mut current = self.current_walk.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    /// Canonicalize a user-supplied URL, remembering any token it carried.
    fn prepare_url(&self, input: &str) -> Result<String> {
        let normalized = urls::normalize_base_url(input)?;
        if let Some(token) = normalized.token {
            self.tokens.set_token(&normalized.url, token);
        }
        Ok(normalized.url)
    }
}

fn log_outcome<T>(base_url: &str, result: &Result<Vec<T>>) {
    match result {
        Ok(items) => tracing::info!("Discovery of {} finished with {} records", base_url, items.len()),
        Err(ExplorerError::Cancelled) => tracing::info!("Discovery of {} cancelled", base_url),
        Err(e) => tracing::warn!("Discovery of {} failed: {}", base_url, e),
    }
}
