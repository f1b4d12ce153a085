//! Recursive discovery of an ArcGIS catalog.
//!
//! A walk lists the catalog root, then fans out one task per folder and one per
//! service. Every branch yields its own result; branches are only combined once
//! all of them have been awaited. A failed service or folder becomes a record
//! carrying an error, a failed root listing or a cancellation fails the walk.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use shared::protocol::ROOT_FOLDER;
use shared::types::{LayerRef, Progress, Resource, ResourceKind, Service, WalkPhase};
use crate::cache::{keys, ResultCache};
use crate::config::TtlClasses;
use crate::error::{ExplorerError, Result};
use crate::gateway::{Gateway, ResourceDescriptor, ServiceDescriptor, ServiceRef};
use crate::prober::Prober;
use crate::urls;

pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Per-walk state shared by every concurrent branch of that walk.
///
/// A fresh context is built for each top-level call; cancelling its token
/// invalidates every operation still running on behalf of the walk.
pub struct WalkContext {
    cancel: CancellationToken,
    use_cache: bool,
}

impl WalkContext {
    pub fn new(cancel: CancellationToken, use_cache: bool) -> Self {
        Self { cancel, use_cache }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ExplorerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the walk is cancelled first; the future is dropped on cancel.
    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExplorerError::Cancelled),
            result = fut => result,
        }
    }
}

/// Progress counter for one phase of a walk.
///
/// The callback runs under the counter lock so reports from concurrent branches
/// reach it in order and `completed` never goes backwards.
pub struct ProgressReporter {
    phase: WalkPhase,
    counts: Mutex<(usize, usize)>,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(phase: WalkPhase, callback: Option<ProgressCallback>) -> Self {
        Self {
            phase,
            // total is unknown until the root is listed
            counts: Mutex::new((0, 1)),
            callback,
        }
    }

    /// Revise the total upward. Reported with the next `advance`.
    fn set_total(&self, total: usize) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.1 = counts.1.max(total);
    }

    fn advance(&self, n: usize, message: impl Into<String>) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.0 += n;
        counts.1 = counts.1.max(counts.0);

        if let Some(callback) = &self.callback {
            callback(&Progress {
                phase: self.phase,
                completed: counts.0,
                total: counts.1,
                message: message.into(),
            });
        }
    }
}

pub struct Walker {
    gateway: Arc<Gateway>,
    prober: Arc<Prober>,
    cache: ResultCache,
    ttl: TtlClasses,
    batch_size: usize,
}

impl Walker {
    pub fn new(
        gateway: Arc<Gateway>,
        prober: Arc<Prober>,
        cache: ResultCache,
        ttl: TtlClasses,
        batch_size: usize,
    ) -> Self {
        Self {
            gateway,
            prober,
            cache,
            ttl,
            batch_size: batch_size.max(1),
        }
    }

    /// Discover every service under `base_url`.
    pub async fn walk_catalog(
        &self,
        ctx: &WalkContext,
        base_url: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<Service>> {
        let catalog_key = keys::catalog_key(base_url);

        if ctx.use_cache {
            if let Some(services) = self.cache_get::<Vec<Service>>(&catalog_key).await {
                tracing::info!("Catalog for {} served from cache ({} services)", base_url, services.len());
                progress.advance(1, "Loaded catalog from cache");
                return Ok(services);
            }
        }

        ctx.ensure_active()?;
        let root = ctx.guard(self.gateway.fetch_catalog_level(base_url, "")).await?;
        tracing::info!(
            "Root of {} lists {} services and {} folders",
            base_url,
            root.services.len(),
            root.folders.len()
        );

        progress.set_total(1 + root.folders.len());
        progress.advance(1, format!("Listed catalog root: {} folders", root.folders.len()));

        let root_services = self.resolve_services(ctx, base_url, ROOT_FOLDER, &root.services);
        let folders = join_all(
            root.folders
                .iter()
                .map(|folder| self.walk_folder(ctx, base_url, folder, progress)),
        );
        let (root_services, folders) = tokio::join!(root_services, folders);

        let mut services = root_services?;
        for folder_services in folders {
            services.extend(folder_services?);
        }

        ctx.ensure_active()?;

        if ctx.use_cache {
            self.cache_set(&catalog_key, &services, self.ttl.medium).await;
        }

        tracing::info!("Catalog walk of {} found {} records", base_url, services.len());
        Ok(services)
    }

    /// Walk the catalog, then expand every layer and table with field detail.
    /// Services are processed in batches to bound concurrent requests.
    pub async fn walk_resources(
        &self,
        ctx: &WalkContext,
        base_url: &str,
        catalog_progress: &ProgressReporter,
        progress: &ProgressReporter,
    ) -> Result<Vec<Resource>> {
        let services = self.walk_catalog(ctx, base_url, catalog_progress).await?;
        let eligible: Vec<&Service> = services.iter().filter(|s| s.has_resources()).collect();

        progress.set_total(eligible.len());
        tracing::info!("Expanding resources of {} services under {}", eligible.len(), base_url);

        let mut resources = Vec::new();
        let mut seen = HashSet::new();
        for batch in eligible.chunks(self.batch_size) {
            ctx.ensure_active()?;

            let tasks = batch.iter().copied().flat_map(|service| {
                let layers = service
                    .layer_refs()
                    .iter()
                    .map(move |r| (service, r, ResourceKind::Layer));
                let tables = service
                    .table_refs()
                    .iter()
                    .map(move |r| (service, r, ResourceKind::Table));
                layers.chain(tables)
            });

            let results = join_all(
                tasks.map(|(service, layer, kind)| self.resolve_resource(ctx, service, layer, kind)),
            )
            .await;

            for result in results {
                let resource = result?;
                if seen.insert(resource.key()) {
                    resources.push(resource);
                } else {
                    tracing::debug!("Skipping duplicate resource {}", resource.url);
                }
            }

            progress.advance(
                batch.len(),
                format!("Fetched resource details ({} so far)", resources.len()),
            );
        }

        ctx.ensure_active()?;
        tracing::info!("Resource walk of {} found {} resources", base_url, resources.len());
        Ok(resources)
    }

    async fn walk_folder(
        &self,
        ctx: &WalkContext,
        base_url: &str,
        folder: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<Service>> {
        let folder_url = urls::join(base_url, &[folder]);

        let services = match ctx.guard(self.gateway.fetch_catalog_level(base_url, folder)).await {
            Ok(listing) if listing.services.is_empty() => {
                tracing::debug!("Folder {} is empty", folder);
                vec![Service::folder_placeholder(folder, folder_url, None)]
            }
            Ok(listing) => self.resolve_services(ctx, base_url, folder, &listing.services).await?,
            Err(ExplorerError::Cancelled) => return Err(ExplorerError::Cancelled),
            Err(e) => {
                tracing::warn!("Failed to list folder {}: {}", folder, e);
                let verdict = ctx.guard(async { Ok::<_, ExplorerError>(self.prober.probe(&folder_url).await) }).await?;
                let mut placeholder = Service::folder_placeholder(folder, folder_url, Some(e.to_string()));
                placeholder.requires_auth = verdict.requires_auth || e.indicates_auth();
                placeholder.response_time_ms = Some(verdict.response_time_ms);
                vec![placeholder]
            }
        };

        progress.advance(1, format!("Scanned folder {}", folder));
        Ok(services)
    }

    async fn resolve_services(
        &self,
        ctx: &WalkContext,
        base_url: &str,
        folder: &str,
        refs: &[ServiceRef],
    ) -> Result<Vec<Service>> {
        join_all(refs.iter().map(|r| self.resolve_service(ctx, base_url, folder, r)))
            .await
            .into_iter()
            .collect()
    }

    /// Describe one service. Only cancellation is an error; any other failure is
    /// classified by the prober and recorded on the service.
    async fn resolve_service(
        &self,
        ctx: &WalkContext,
        base_url: &str,
        folder: &str,
        service_ref: &ServiceRef,
    ) -> Result<Service> {
        let url = urls::join(base_url, &[&service_ref.name, service_ref.service_type.as_str()]);
        let started = Instant::now();

        match self.service_detail(ctx, &url).await {
            Ok(detail) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let summary = detail.summary();
                Ok(Service::resolved(
                    service_ref.name.clone(),
                    service_ref.service_type.clone(),
                    url,
                    folder.to_string(),
                    detail.layers,
                    detail.tables,
                    summary,
                    detail.capabilities,
                    elapsed,
                ))
            }
            Err(ExplorerError::Cancelled) => Err(ExplorerError::Cancelled),
            Err(e) => {
                tracing::debug!("Service {} failed, probing: {}", url, e);
                let verdict = ctx.guard(async { Ok::<_, ExplorerError>(self.prober.probe(&url).await) }).await?;
                Ok(Service::unresolved(
                    service_ref.name.clone(),
                    service_ref.service_type.clone(),
                    url,
                    folder.to_string(),
                    verdict.requires_auth || e.indicates_auth(),
                    verdict.is_empty,
                    verdict.error.or_else(|| Some(e.to_string())),
                    Some(verdict.response_time_ms),
                ))
            }
        }
    }

    async fn resolve_resource(
        &self,
        ctx: &WalkContext,
        service: &Service,
        layer: &LayerRef,
        kind: ResourceKind,
    ) -> Result<Resource> {
        let mut resource = Resource {
            id: layer.id,
            name: layer.name.clone(),
            kind,
            service_name: service.name.clone(),
            service_type: service.service_type.clone(),
            service_url: service.url.clone(),
            url: urls::join(&service.url, &[&layer.id.to_string()]),
            folder: service.folder.clone(),
            geometry_type: layer.geometry_type.clone(),
            field_count: None,
            fields: None,
            edit_fields_info: None,
            description: None,
            error: None,
            requires_auth: false,
        };

        match self.resource_detail(ctx, &service.url, layer.id).await {
            Ok(detail) => {
                resource.field_count = detail.fields.as_ref().map(Vec::len);
                resource.fields = detail.fields;
                resource.geometry_type = detail.geometry_type.or(resource.geometry_type);
                resource.edit_fields_info = detail.edit_fields_info;
                resource.description = detail.description.filter(|d| !d.trim().is_empty());
            }
            Err(ExplorerError::Cancelled) => return Err(ExplorerError::Cancelled),
            Err(e) => {
                tracing::debug!("Resource {} failed: {}", resource.url, e);
                resource.error = Some("Could not fetch details".to_string());
                resource.requires_auth = service.requires_auth || e.indicates_auth();
            }
        }

        Ok(resource)
    }

    async fn service_detail(&self, ctx: &WalkContext, url: &str) -> Result<ServiceDescriptor> {
        let key = keys::service_key(url);
        if ctx.use_cache {
            if let Some(detail) = self.cache_get(&key).await {
                return Ok(detail);
            }
        }

        let detail = ctx.guard(self.gateway.fetch_service_detail(url)).await?;
        if ctx.use_cache && !ctx.is_cancelled() {
            self.cache_set(&key, &detail, self.ttl.long).await;
        }
        Ok(detail)
    }

    async fn resource_detail(
        &self,
        ctx: &WalkContext,
        service_url: &str,
        id: i64,
    ) -> Result<ResourceDescriptor> {
        let key = keys::layer_key(service_url, id);
        if ctx.use_cache {
            if let Some(detail) = self.cache_get(&key).await {
                return Ok(detail);
            }
        }

        let detail = ctx.guard(self.gateway.fetch_resource_detail(service_url, id)).await?;
        if ctx.use_cache && !ctx.is_cancelled() {
            self.cache_set(&key, &detail, self.ttl.long).await;
        }
        Ok(detail)
    }

    /// Cache failures degrade to a miss
    async fn cache_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Cache read of {} failed: {}", key, e);
                None
            }
        }
    }

    async fn cache_set<T: serde::Serialize>(&self, key: &str, value: &T, ttl: std::time::Duration) {
        if let Err(e) = self.cache.set(key, value, ttl).await {
            tracing::warn!("Cache write of {} failed: {}", key, e);
        }
    }
}
