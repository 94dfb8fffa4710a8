//! Page-set pipeline: catalogues → cross product → decisions → sitemap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use pagegen_content::{ContentStore, HttpContentStore, fetch_catalogue};
use pagegen_gateway::{FetchGateway, GatewayStats, RetryObserver};
use pagegen_indexing::DecisionEngine;
use pagegen_shared::{
    AppConfig, GatewayConfig, GeneratorConfig, LocationEntity, PagegenError, Result,
    ServiceEntity, SitemapEntry, content_store_token,
};

use crate::pair::{PairFailure, PairOutcome, evaluate_pair_within};
use crate::sitemap::{CandidateReport, CandidateStatus, SitemapBuilder, page_path};

/// Result of one generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Static routes followed by indexable pages, de-duplicated by URL.
    pub entries: Vec<SitemapEntry>,
    /// Every service×location pair, services-outer/locations-inner.
    pub candidates: Vec<CandidateReport>,
    /// Pairs that produced a decision (indexable or not).
    pub evaluated: usize,
    pub indexed: usize,
    /// Pairs that could not be evaluated.
    pub failed: usize,
    pub static_routes: usize,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub gateway: GatewayStats,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Progress callback for reporting generation status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time a pair finishes, in completion order.
    fn pair_evaluated(&self, completed: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &GenerationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn pair_evaluated(&self, _completed: usize, _total: usize) {}
    fn done(&self, _report: &GenerationReport) {}
}

/// Builds the indexable page set from the content store.
pub struct PageSetGenerator<S> {
    store: Arc<S>,
    gateway: FetchGateway,
    engine: Arc<DecisionEngine>,
    config: GeneratorConfig,
}

impl PageSetGenerator<HttpContentStore> {
    /// Wire the HTTP content store, gateway and rules from application config.
    pub fn from_app_config(config: &AppConfig, observer: Arc<dyn RetryObserver>) -> Result<Self> {
        config.validate()?;
        let store = HttpContentStore::new(&config.content_store, content_store_token(config))?;
        let gateway = FetchGateway::with_observer(&GatewayConfig::from(config), observer)?;
        let engine = DecisionEngine::from_config(&config.indexing);
        Ok(Self::new(
            store,
            gateway,
            engine,
            GeneratorConfig::try_from(config)?,
        ))
    }
}

impl<S> PageSetGenerator<S>
where
    S: ContentStore + 'static,
{
    pub fn new(store: S, gateway: FetchGateway, engine: DecisionEngine, config: GeneratorConfig) -> Self {
        Self {
            store: Arc::new(store),
            gateway,
            engine: Arc::new(engine),
            config,
        }
    }

    pub fn gateway(&self) -> &FetchGateway {
        &self.gateway
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Run the full pipeline.
    ///
    /// 1. Fetch services and locations concurrently (failure aborts the run)
    /// 2. Evaluate every pair on its own task, bounded by the gateway
    /// 3. Assemble static routes and indexable pages in candidate order
    #[instrument(skip_all, fields(namespace = %self.config.namespace))]
    pub async fn generate(&self, progress: &dyn ProgressReporter) -> Result<GenerationReport> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        let generated_at = Utc::now();
        info!(%run_id, "starting page-set generation");

        progress.phase("Fetching catalogues");
        let (services, locations) = self.fetch_catalogues().await?;
        if services.is_empty() || locations.is_empty() {
            warn!(
                services = services.len(),
                locations = locations.len(),
                "empty catalogue, only static routes will be emitted"
            );
        }

        progress.phase("Evaluating pages");
        let services = Arc::new(services);
        let locations = Arc::new(locations);
        let outcomes = self.evaluate_all(&services, &locations, progress).await;

        progress.phase("Assembling sitemap");
        let site_url = self.config.site_url.as_ref();
        let mut sitemap = SitemapBuilder::new();
        let static_routes = sitemap.push_static(&self.config.static_routes, site_url, generated_at)?;

        let mut candidates = Vec::with_capacity(outcomes.len());
        let (mut evaluated, mut indexed, mut failed) = (0, 0, 0);

        for (index, outcome) in outcomes.into_iter().enumerate() {
            let service = &services[index / locations.len()];
            let location = &locations[index % locations.len()];
            let path = page_path(&self.config.namespace, &service.slug, &location.slug);

            // A page URL that cannot be resolved fails only its own pair.
            let outcome = outcome.and_then(|decision| {
                if decision.indexable() {
                    sitemap.push_page(&path, service, location, site_url, generated_at)?;
                }
                Ok(decision)
            });

            let status = match outcome {
                Ok(decision) if decision.indexable() => {
                    evaluated += 1;
                    indexed += 1;
                    CandidateStatus::Indexed
                }
                Ok(decision) => {
                    evaluated += 1;
                    CandidateStatus::Rejected {
                        reasons: decision.reasons().to_vec(),
                    }
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        service = %service.slug,
                        location = %location.slug,
                        operation = err.operation().unwrap_or("-"),
                        error = %err,
                        "pair evaluation failed, treating as not indexable"
                    );
                    CandidateStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };

            candidates.push(CandidateReport {
                service: service.slug.clone(),
                location: location.slug.clone(),
                path,
                status,
            });
        }

        let report = GenerationReport {
            run_id,
            generated_at,
            entries: sitemap.finish(),
            candidates,
            evaluated,
            indexed,
            failed,
            static_routes,
            duration: start.elapsed(),
            gateway: self.gateway.stats(),
        };

        info!(
            %run_id,
            entries = report.entries.len(),
            evaluated,
            indexed,
            failed,
            elapsed_ms = report.duration.as_millis() as u64,
            "page-set generation complete"
        );
        progress.done(&report);

        Ok(report)
    }

    /// Evaluate a single pair by slug, for diagnostics.
    #[instrument(skip(self), fields(service = %service_slug, location = %location_slug))]
    pub async fn explain(&self, service_slug: &str, location_slug: &str) -> Result<CandidateReport> {
        let (services, locations) = self.fetch_catalogues().await?;

        let service = services
            .iter()
            .find(|s| s.slug == service_slug)
            .ok_or_else(|| PagegenError::validation(format!("unknown service `{service_slug}`")))?;
        let location = locations
            .iter()
            .find(|l| l.slug == location_slug)
            .ok_or_else(|| PagegenError::validation(format!("unknown location `{location_slug}`")))?;

        let outcome = self.evaluate_one(service, location).await;
        let status = match outcome {
            Ok(decision) if decision.indexable() => CandidateStatus::Indexed,
            Ok(decision) => CandidateStatus::Rejected {
                reasons: decision.reasons().to_vec(),
            },
            Err(err) => CandidateStatus::Failed {
                error: err.to_string(),
            },
        };

        Ok(CandidateReport {
            service: service.slug.clone(),
            location: location.slug.clone(),
            path: page_path(&self.config.namespace, &service.slug, &location.slug),
            status,
        })
    }

    async fn fetch_catalogues(&self) -> Result<(Vec<ServiceEntity>, Vec<LocationEntity>)> {
        let store = self.store.as_ref();
        tokio::try_join!(
            fetch_catalogue::<ServiceEntity, _>(
                store,
                &self.gateway,
                &self.config.service_type,
                self.config.page_size,
            ),
            fetch_catalogue::<LocationEntity, _>(
                store,
                &self.gateway,
                &self.config.location_type,
                self.config.page_size,
            ),
        )
    }

    async fn evaluate_one(&self, service: &ServiceEntity, location: &LocationEntity) -> PairOutcome {
        evaluate_pair_within(
            self.config.pair_timeout,
            self.store.as_ref(),
            &self.gateway,
            &self.engine,
            service,
            location,
        )
        .await
    }

    /// Evaluate the full cross product; outcomes are indexed
    /// `service_index * locations.len() + location_index`.
    async fn evaluate_all(
        &self,
        services: &Arc<Vec<ServiceEntity>>,
        locations: &Arc<Vec<LocationEntity>>,
        progress: &dyn ProgressReporter,
    ) -> Vec<PairOutcome> {
        let total = services.len() * locations.len();
        let mut tasks: JoinSet<(usize, PairOutcome)> = JoinSet::new();

        for index in 0..total {
            let store = Arc::clone(&self.store);
            let gateway = self.gateway.clone();
            let engine = Arc::clone(&self.engine);
            let services = Arc::clone(services);
            let locations = Arc::clone(locations);
            let timeout = self.config.pair_timeout;

            tasks.spawn(async move {
                let service = &services[index / locations.len()];
                let location = &locations[index % locations.len()];
                let outcome =
                    evaluate_pair_within(timeout, store.as_ref(), &gateway, &engine, service, location)
                        .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<PairOutcome>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => warn!(error = %err, "pair task ended without a result"),
            }
            progress.pair_evaluated(completed, total);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(PairFailure::Aborted("task panicked or was cancelled".into()))
                })
            })
            .collect()
    }
}
