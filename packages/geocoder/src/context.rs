//! Process-wide geocoding state shared by every run.
//!
//! Holds what must outlive a single job: the provider clients, one rate limiter
//! per provider (request ceilings apply to the whole process), the ZIP
//! lookup table, and the elevation grid. Each job asks for a fresh
//! [`Resolver`] via [`GeocodingContext::resolver_for`], which gets its own
//! per-run blocked-provider flags.

use std::sync::Arc;

use async_trait::async_trait;
use geobatch_geocoder_models::{FailureCause, LookupKind, Outcome, Query};

use crate::census::CensusGeocoder;
use crate::chain::{ChainLink, ProviderChain};
use crate::elevation::ElevationGrid;
use crate::lookup::ZipLookup;
use crate::nominatim::NominatimClient;
use crate::rate_limit::RateLimiter;
use crate::resolver::{ElevationResolver, ForwardResolver, Resolver, ReverseResolver};
use crate::retry::RetryPolicy;
use crate::service_registry::{GeocodingService, ProviderConfig, ServiceRole, select};
use crate::{ForwardProvider, ReverseProvider};

/// A reverse provider with its shared limiter and retry policy.
#[derive(Clone)]
struct ReverseLink {
    provider: Arc<dyn ReverseProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

/// Long-lived state behind every resolver.
#[derive(Clone)]
pub struct GeocodingContext {
    forward: Vec<ChainLink>,
    reverse: Option<ReverseLink>,
    lookup: Arc<ZipLookup>,
    grid: Option<Arc<ElevationGrid>>,
}

impl std::fmt::Debug for GeocodingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingContext")
            .field("forward", &self.forward)
            .field(
                "reverse",
                &self.reverse.as_ref().map(|r| r.provider.id().to_string()),
            )
            .field("zip_codes", &self.lookup.len())
            .field("grid", &self.grid.is_some())
            .finish()
    }
}

impl GeocodingContext {
    /// Builds provider clients for every enabled service.
    ///
    /// Forward services form the chain in priority order; the first
    /// enabled reverse service answers reverse lookups.
    #[must_use]
    pub fn from_services(
        services: Vec<GeocodingService>,
        client: &reqwest::Client,
        lookup: Arc<ZipLookup>,
        grid: Option<Arc<ElevationGrid>>,
    ) -> Self {
        let forward = select(services.clone(), ServiceRole::Forward)
            .into_iter()
            .map(|svc| {
                let provider: Arc<dyn ForwardProvider> = match &svc.provider {
                    ProviderConfig::Census {
                        base_url,
                        benchmark,
                    } => Arc::new(CensusGeocoder::new(
                        &svc.id,
                        client.clone(),
                        base_url,
                        benchmark,
                        single_attempt(&svc.retry),
                    )),
                    ProviderConfig::Nominatim { base_url } => Arc::new(NominatimClient::new(
                        &svc.id,
                        client.clone(),
                        base_url,
                        single_attempt(&svc.retry),
                    )),
                };
                log::debug!(
                    "forward provider {} ({}), priority {}, {}ms between requests",
                    svc.id,
                    svc.name,
                    svc.priority,
                    svc.rate_limit_ms
                );
                ChainLink {
                    provider,
                    limiter: Arc::new(RateLimiter::from_millis(svc.rate_limit_ms)),
                    retry: svc.retry,
                }
            })
            .collect();

        let reverse = select(services, ServiceRole::Reverse)
            .into_iter()
            .find_map(|svc| match &svc.provider {
                ProviderConfig::Nominatim { base_url } => Some(ReverseLink {
                    provider: Arc::new(NominatimClient::new(
                        &svc.id,
                        client.clone(),
                        base_url,
                        single_attempt(&svc.retry),
                    )),
                    limiter: Arc::new(RateLimiter::from_millis(svc.rate_limit_ms)),
                    retry: svc.retry.clone(),
                }),
                ProviderConfig::Census { .. } => {
                    log::warn!("{}: Census does not support reverse lookups, skipping", svc.id);
                    None
                }
            });

        Self {
            forward,
            reverse,
            lookup,
            grid,
        }
    }

    /// Assembles a context from ready-made parts.
    #[must_use]
    pub fn from_parts(
        forward: Vec<ChainLink>,
        reverse: Option<(Arc<dyn ReverseProvider>, Arc<RateLimiter>, RetryPolicy)>,
        lookup: Arc<ZipLookup>,
        grid: Option<Arc<ElevationGrid>>,
    ) -> Self {
        Self {
            forward,
            reverse: reverse.map(|(provider, limiter, retry)| ReverseLink {
                provider,
                limiter,
                retry,
            }),
            lookup,
            grid,
        }
    }

    /// The ZIP lookup table.
    #[must_use]
    pub fn lookup(&self) -> &ZipLookup {
        &self.lookup
    }

    /// Whether an elevation grid is loaded.
    #[must_use]
    pub const fn has_elevation(&self) -> bool {
        self.grid.is_some()
    }

    /// Ids of the forward providers in chain order.
    #[must_use]
    pub fn forward_providers(&self) -> Vec<&str> {
        self.forward.iter().map(|l| l.provider.id()).collect()
    }

    /// Id of the reverse provider, if one is configured.
    #[must_use]
    pub fn reverse_provider(&self) -> Option<&str> {
        self.reverse.as_ref().map(|r| r.provider.id())
    }

    /// Creates a resolver for one run of `kind`.
    ///
    /// Rate limiters are shared with every other run; blocked-provider flags
    /// start clear.
    #[must_use]
    pub fn resolver_for(&self, kind: LookupKind) -> Arc<dyn Resolver> {
        match kind {
            LookupKind::Forward => Arc::new(ForwardResolver::new(
                ProviderChain::new(self.forward.clone()),
                Arc::clone(&self.lookup),
            )),
            LookupKind::Reverse => match &self.reverse {
                Some(link) => Arc::new(ReverseResolver::new(
                    Arc::clone(&link.provider),
                    Arc::clone(&link.limiter),
                    link.retry.clone(),
                )),
                None => Arc::new(UnavailableResolver { kind }),
            },
            LookupKind::Elevation => Arc::new(ElevationResolver::new(self.grid.clone())),
        }
    }
}

/// Providers resend nothing themselves; the resolver's retry loop owns the
/// attempts so every retry also waits on the rate limiter.
fn single_attempt(policy: &RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        ..policy.clone()
    }
}

/// Resolver used when no provider is configured for a lookup kind.
struct UnavailableResolver {
    kind: LookupKind,
}

#[async_trait]
impl Resolver for UnavailableResolver {
    fn kind(&self) -> LookupKind {
        self.kind
    }

    async fn resolve(&self, query: Query) -> Outcome {
        Outcome::error(
            query,
            FailureCause::DataUnavailable,
            format!("no {} provider is configured", self.kind),
        )
    }
}

#[cfg(test)]
mod tests {
    use geobatch_geocoder_models::OutcomeKind;

    use super::*;
    use crate::address::normalize;
    use crate::service_registry::all_services;

    fn context(services: Vec<GeocodingService>) -> GeocodingContext {
        GeocodingContext::from_services(
            services,
            &reqwest::Client::new(),
            Arc::new(ZipLookup::empty()),
            None,
        )
    }

    #[test]
    fn builds_chain_from_embedded_services() {
        let ctx = context(all_services());
        assert_eq!(ctx.forward_providers(), vec!["census", "nominatim"]);
        assert_eq!(ctx.reverse_provider(), Some("nominatim_reverse"));
        assert!(!ctx.has_elevation());
    }

    #[test]
    fn resolvers_report_their_kind() {
        let ctx = context(all_services());
        for kind in [LookupKind::Forward, LookupKind::Reverse, LookupKind::Elevation] {
            assert_eq!(ctx.resolver_for(kind).kind(), kind);
        }
    }

    #[tokio::test]
    async fn missing_reverse_provider_is_data_unavailable() {
        let forward_only = all_services()
            .into_iter()
            .filter(|s| s.role == ServiceRole::Forward)
            .collect();
        let ctx = context(forward_only);
        assert_eq!(ctx.reverse_provider(), None);

        let outcome = ctx
            .resolver_for(LookupKind::Reverse)
            .resolve(normalize("40.0,-75.0", LookupKind::Reverse))
            .await;
        assert!(matches!(
            outcome.kind,
            OutcomeKind::Error {
                cause: FailureCause::DataUnavailable,
                ..
            }
        ));
    }
}
