//! Per-query resolution: one [`Query`] in, exactly one [`Outcome`] out.
//!
//! Resolvers never return errors. Provider failures, malformed input, and
//! missing datasets are all classified into an outcome so the batch
//! pipeline can write one row per input line no matter what happened.

use std::sync::Arc;

use async_trait::async_trait;
use geobatch_geocoder_models::{
    AddressQuery, Answer, FailureCause, LookupKind, Outcome, Query, QueryKind,
};

use crate::chain::{ChainResult, ProviderChain};
use crate::elevation::ElevationGrid;
use crate::lookup::ZipLookup;
use crate::rate_limit::RateLimiter;
use crate::retry::{self, RetryPolicy};
use crate::{ReverseProvider, states};

/// Source tag recorded on elevation outcomes.
pub const ELEVATION_SOURCE: &str = "elevation_grid";

/// Resolves a single query into an outcome.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Which lookup this resolver performs.
    fn kind(&self) -> LookupKind;

    /// Resolves one query. Never fails; every failure becomes an outcome.
    async fn resolve(&self, query: Query) -> Outcome;
}

/// Rejects queries a resolver cannot handle.
fn reject(query: Query, expected: &str) -> Outcome {
    let message = match &query.kind {
        QueryKind::Malformed { reason } => reason.clone(),
        QueryKind::Address(_) | QueryKind::Coordinate(_) => format!("expected {expected}"),
    };
    Outcome::error(query, FailureCause::MalformedInput, message)
}

/// Address → coordinates through the provider chain, falling back to a ZIP
/// centroid when no provider matches.
pub struct ForwardResolver {
    chain: ProviderChain,
    lookup: Arc<ZipLookup>,
}

impl ForwardResolver {
    /// Creates a resolver over a per-run provider chain.
    #[must_use]
    pub const fn new(chain: ProviderChain, lookup: Arc<ZipLookup>) -> Self {
        Self { chain, lookup }
    }

    fn fallback(&self, query: Query, address: &AddressQuery, note: Option<String>) -> Outcome {
        match address.zip5().and_then(|zip| self.lookup.centroid(zip)) {
            Some(centroid) => {
                log::warn!(
                    "no provider matched '{}', using ZIP {} centroid",
                    query.raw,
                    centroid.zip
                );
                Outcome::fallback(query, centroid, note)
            }
            None => Outcome::not_found(query, note),
        }
    }
}

#[async_trait]
impl Resolver for ForwardResolver {
    fn kind(&self) -> LookupKind {
        LookupKind::Forward
    }

    async fn resolve(&self, query: Query) -> Outcome {
        let QueryKind::Address(address) = query.kind.clone() else {
            return reject(query, "an address");
        };

        match self.chain.resolve(&address).await {
            ChainResult::Matched { source, mut found } => {
                found.state = found.state.map(|s| states::expand(&s));
                Outcome::matched(query, source, Answer::Forward(found))
            }
            ChainResult::NoMatch { note } => self.fallback(query, &address, note),
            ChainResult::Failed { cause, message } => {
                match address.zip5().and_then(|zip| self.lookup.centroid(zip)) {
                    Some(centroid) => {
                        log::warn!(
                            "'{}' failed ({message}), using ZIP {} centroid",
                            query.raw,
                            centroid.zip
                        );
                        Outcome::fallback(query, centroid, Some(message))
                    }
                    None => Outcome::error(query, cause, message),
                }
            }
        }
    }
}

/// Coordinates → address through a single rate-limited provider.
pub struct ReverseResolver {
    provider: Arc<dyn ReverseProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl ReverseResolver {
    /// Creates a resolver. `limiter` must be shared process-wide.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ReverseProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            retry,
        }
    }
}

#[async_trait]
impl Resolver for ReverseResolver {
    fn kind(&self) -> LookupKind {
        LookupKind::Reverse
    }

    async fn resolve(&self, query: Query) -> Outcome {
        let QueryKind::Coordinate(point) = query.kind else {
            return reject(query, "a coordinate pair");
        };
        if !point.in_range() {
            return Outcome::error(
                query,
                FailureCause::InvalidCoordinates,
                format!(
                    "invalid coordinates ({}, {}): latitude must be in [-90, 90] and longitude in [-180, 180]",
                    point.latitude, point.longitude
                ),
            );
        }

        let id = self.provider.id();
        let result = retry::with_retry(&self.retry, id, || async {
            self.limiter.acquire().await;
            self.provider.reverse(point).await
        })
        .await;

        match result {
            Ok(Some(found)) => Outcome::matched(query, id, Answer::Reverse(found)),
            Ok(None) => Outcome::not_found(query, None),
            Err(e) => {
                log::warn!("{id}: reverse lookup of {} failed: {e}", query.raw);
                let cause = e.cause();
                Outcome::error(query, cause, e.to_string())
            }
        }
    }
}

/// Coordinates → elevation from a preloaded grid.
pub struct ElevationResolver {
    grid: Option<Arc<ElevationGrid>>,
}

impl ElevationResolver {
    /// Creates a resolver. `None` means the dataset failed to load and every
    /// query resolves to a data-unavailable error.
    #[must_use]
    pub const fn new(grid: Option<Arc<ElevationGrid>>) -> Self {
        Self { grid }
    }
}

#[async_trait]
impl Resolver for ElevationResolver {
    fn kind(&self) -> LookupKind {
        LookupKind::Elevation
    }

    async fn resolve(&self, query: Query) -> Outcome {
        let QueryKind::Coordinate(point) = query.kind else {
            return reject(query, "a coordinate pair");
        };
        if !point.in_range() {
            return Outcome::error(
                query,
                FailureCause::InvalidCoordinates,
                format!("invalid coordinates ({}, {})", point.latitude, point.longitude),
            );
        }
        let Some(grid) = &self.grid else {
            return Outcome::error(
                query,
                FailureCause::DataUnavailable,
                "elevation dataset is not loaded",
            );
        };

        match grid.sample(point.latitude, point.longitude) {
            Some(value) => Outcome::matched(query, ELEVATION_SOURCE, Answer::Elevation { value }),
            None => Outcome::not_found(query, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use geobatch_geocoder_models::{
        CoordinateQuery, ForwardMatch, OutcomeKind, OutcomeStatus, ReverseMatch,
    };

    use super::*;
    use crate::GeocodeError;
    use crate::address::normalize;
    use crate::chain::tests::{MockForward, found, link};
    use crate::lookup::ZipCentroid;

    fn lookup() -> Arc<ZipLookup> {
        Arc::new(ZipLookup::from_entries([(
            "62704".to_string(),
            ZipCentroid {
                lat: 39.77,
                long: -89.68,
                place: "Springfield".to_string(),
            },
        )]))
    }

    fn forward(provider: Arc<MockForward>) -> ForwardResolver {
        ForwardResolver::new(
            ProviderChain::new(vec![link(provider, RetryPolicy::none())]),
            lookup(),
        )
    }

    #[tokio::test]
    async fn forward_match_expands_state_code() {
        let provider = MockForward::new("census", |_| {
            Ok(Some(ForwardMatch {
                state: Some("IL".to_string()),
                ..found(39.8, -89.6)
            }))
        });
        let resolver = forward(provider);
        let outcome = resolver
            .resolve(normalize("1 Main St, Springfield, IL 62704", LookupKind::Forward))
            .await;

        let OutcomeKind::Matched { source, answer: Answer::Forward(m) } = outcome.kind else {
            panic!("expected forward match, got {:?}", outcome.kind);
        };
        assert_eq!(source, "census");
        assert_eq!(m.state.as_deref(), Some("Illinois"));
    }

    #[tokio::test]
    async fn no_match_falls_back_to_zip_centroid() {
        let resolver = forward(MockForward::new("census", |_| Ok(None)));
        let outcome = resolver
            .resolve(normalize("999 Nowhere Rd, Springfield, IL 62704", LookupKind::Forward))
            .await;

        let OutcomeKind::FallbackUsed { centroid, note } = outcome.kind else {
            panic!("expected fallback, got {:?}", outcome.kind);
        };
        assert_eq!(centroid.zip, "62704");
        assert_eq!(centroid.place, "Springfield");
        assert_eq!(note, None);
    }

    #[tokio::test]
    async fn unknown_zip_is_not_found() {
        let resolver = forward(MockForward::new("census", |_| Ok(None)));
        let outcome = resolver
            .resolve(normalize("999 Nowhere Rd, Nowhere, NV 89999", LookupKind::Forward))
            .await;
        assert_eq!(outcome.status(), OutcomeStatus::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_chain_without_zip_is_not_found() {
        let census = MockForward::new("census", |_| Err(GeocodeError::Status { status: 400 }));
        let nominatim =
            MockForward::new("nominatim", |_| Err(GeocodeError::Status { status: 503 }));
        let resolver = ForwardResolver::new(
            ProviderChain::new(vec![
                link(
                    Arc::clone(&census),
                    RetryPolicy::linear(3, Duration::from_secs(1)),
                ),
                link(
                    Arc::clone(&nominatim),
                    RetryPolicy::linear(2, Duration::from_secs(1)),
                ),
            ]),
            Arc::new(ZipLookup::empty()),
        );

        let outcome = resolver
            .resolve(normalize("1 Main St", LookupKind::Forward))
            .await;

        let OutcomeKind::NotFound { note } = outcome.kind else {
            panic!("expected not found, got {:?}", outcome.kind);
        };
        assert_eq!(note.as_deref(), Some("nominatim: HTTP status 503"));
        assert_eq!(census.calls(), 1);
        assert_eq!(nominatim.calls(), 2);
    }

    #[tokio::test]
    async fn client_error_with_zip_uses_fallback() {
        let resolver = forward(MockForward::new("census", |_| {
            Err(GeocodeError::Status { status: 404 })
        }));
        let outcome = resolver
            .resolve(normalize("1 Main St, Springfield, IL 62704", LookupKind::Forward))
            .await;

        let OutcomeKind::FallbackUsed { centroid, note } = outcome.kind else {
            panic!("expected fallback, got {:?}", outcome.kind);
        };
        assert_eq!(centroid.zip, "62704");
        assert_eq!(note.as_deref(), Some("census: HTTP status 404"));
    }

    #[tokio::test]
    async fn unexpected_failure_still_uses_fallback() {
        let resolver = forward(MockForward::new("census", |_| {
            Err(GeocodeError::Parse {
                message: "garbage".to_string(),
            })
        }));
        let outcome = resolver
            .resolve(normalize("1 Main St, Springfield, IL 62704", LookupKind::Forward))
            .await;

        assert_eq!(outcome.status(), OutcomeStatus::Fallback);
        assert!(outcome.error_message().unwrap().contains("garbage"));
    }

    #[tokio::test]
    async fn unexpected_failure_without_zip_is_error() {
        let resolver = forward(MockForward::new("census", |_| {
            Err(GeocodeError::Parse {
                message: "garbage".to_string(),
            })
        }));
        let outcome = resolver
            .resolve(normalize("1 Main St", LookupKind::Forward))
            .await;

        assert!(matches!(
            outcome.kind,
            OutcomeKind::Error {
                cause: FailureCause::Unexpected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn forward_rejects_empty_address() {
        let provider = MockForward::new("census", |_| Ok(None));
        let resolver = forward(Arc::clone(&provider));
        let outcome = resolver.resolve(normalize("   ", LookupKind::Forward)).await;

        assert!(matches!(
            outcome.kind,
            OutcomeKind::Error {
                cause: FailureCause::MalformedInput,
                ..
            }
        ));
        assert_eq!(provider.calls(), 0);
    }

    struct MockReverse {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReverseProvider for MockReverse {
        fn id(&self) -> &str {
            "nominatim"
        }

        async fn reverse(
            &self,
            point: CoordinateQuery,
        ) -> Result<Option<ReverseMatch>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if point.latitude > 80.0 {
                return Ok(None);
            }
            Ok(Some(ReverseMatch {
                full_address: "1600 Pennsylvania Avenue NW".to_string(),
                ..ReverseMatch::default()
            }))
        }
    }

    fn reverse() -> (Arc<MockReverse>, ReverseResolver) {
        let provider = Arc::new(MockReverse {
            calls: AtomicU32::new(0),
        });
        let resolver = ReverseResolver::new(
            Arc::clone(&provider) as Arc<dyn ReverseProvider>,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            RetryPolicy::none(),
        );
        (provider, resolver)
    }

    #[tokio::test]
    async fn out_of_range_coordinates_make_no_call() {
        let (provider, resolver) = reverse();
        for line in ["95,0", "0,-200"] {
            let outcome = resolver.resolve(normalize(line, LookupKind::Reverse)).await;
            assert!(matches!(
                outcome.kind,
                OutcomeKind::Error {
                    cause: FailureCause::InvalidCoordinates,
                    ..
                }
            ));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_coordinates_are_an_outcome() {
        let (provider, resolver) = reverse();
        let outcome = resolver.resolve(normalize("abc,def", LookupKind::Reverse)).await;
        assert!(matches!(
            outcome.kind,
            OutcomeKind::Error {
                cause: FailureCause::MalformedInput,
                ..
            }
        ));
        assert_eq!(outcome.query.raw, "abc,def");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reverse_match_and_no_result_are_distinct() {
        let (_, resolver) = reverse();
        let hit = resolver
            .resolve(normalize("38.8977,-77.0365", LookupKind::Reverse))
            .await;
        assert_eq!(hit.status(), OutcomeStatus::Matched);
        assert_eq!(hit.source(), Some("nominatim"));

        let miss = resolver.resolve(normalize("85.0,0.0", LookupKind::Reverse)).await;
        assert_eq!(miss.status(), OutcomeStatus::NotFound);
    }

    #[tokio::test]
    async fn elevation_without_grid_is_data_unavailable() {
        let resolver = ElevationResolver::new(None);
        let outcome = resolver.resolve(normalize("39.5,-89.5", LookupKind::Elevation)).await;
        assert!(matches!(
            outcome.kind,
            OutcomeKind::Error {
                cause: FailureCause::DataUnavailable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn elevation_samples_grid() {
        let grid: ElevationGrid = "ncols 1\nnrows 1\nxllcorner -90\nyllcorner 39\ncellsize 1\nNODATA_value -9999\n182.5\n"
            .parse()
            .unwrap();
        let resolver = ElevationResolver::new(Some(Arc::new(grid)));
        let outcome = resolver.resolve(normalize("39.5,-89.5", LookupKind::Elevation)).await;
        assert_eq!(
            outcome.kind,
            OutcomeKind::Matched {
                source: ELEVATION_SOURCE.to_string(),
                answer: Answer::Elevation { value: 182.5 },
            }
        );
    }
}
