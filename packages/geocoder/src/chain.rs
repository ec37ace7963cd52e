//! Ordered chain of forward-geocoding providers.
//!
//! Providers are tried in priority order until one returns a match. Each
//! link has its own rate limiter (shared across runs, since a provider's
//! request ceiling is process-wide) and retry policy.
//!
//! A provider that answers with a block is skipped for the rest of the run:
//! the chain keeps a per-run flag per link, so one block costs a single
//! request instead of one per remaining address.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geobatch_geocoder_models::{AddressQuery, FailureCause, ForwardMatch};

use crate::{ForwardProvider, GeocodeError};
use crate::rate_limit::RateLimiter;
use crate::retry::{self, RetryPolicy};

/// One provider with its limiter and retry policy.
#[derive(Clone)]
pub struct ChainLink {
    /// The provider.
    pub provider: Arc<dyn ForwardProvider>,
    /// Limiter shared by every caller of this provider.
    pub limiter: Arc<RateLimiter>,
    /// Attempts and backoff for transient failures.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLink")
            .field("provider", &self.provider.id())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Result of walking the chain for one address.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainResult {
    /// A provider matched.
    Matched {
        /// Provider id.
        source: String,
        /// The match.
        found: ForwardMatch,
    },
    /// No provider matched. `note` carries the last HTTP-level error
    /// (exhausted retries, error statuses, blocks) if there was one.
    NoMatch {
        /// Last HTTP-level error, if any.
        note: Option<String>,
    },
    /// A provider failed in a way retries cannot fix (e.g. an unparseable
    /// response) and no later provider matched.
    Failed {
        /// Classified cause.
        cause: FailureCause,
        /// Error text.
        message: String,
    },
}

/// A provider chain bound to a single run.
#[derive(Debug)]
pub struct ProviderChain {
    links: Vec<ChainLink>,
    blocked: Vec<AtomicBool>,
}

impl ProviderChain {
    /// Creates a chain with every provider unblocked.
    #[must_use]
    pub fn new(links: Vec<ChainLink>) -> Self {
        let blocked = links.iter().map(|_| AtomicBool::new(false)).collect();
        Self { links, blocked }
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Whether the provider at `index` has been skipped for this run.
    #[must_use]
    pub fn is_blocked(&self, index: usize) -> bool {
        self.blocked
            .get(index)
            .is_some_and(|b| b.load(Ordering::Relaxed))
    }

    /// Tries each unblocked provider in order.
    pub async fn resolve(&self, address: &AddressQuery) -> ChainResult {
        let mut note = None;
        let mut failure: Option<(FailureCause, String)> = None;

        for (link, blocked) in self.links.iter().zip(&self.blocked) {
            if blocked.load(Ordering::Relaxed) {
                continue;
            }

            let id = link.provider.id();
            let result = retry::with_retry(&link.retry, id, || async {
                link.limiter.acquire().await;
                link.provider.geocode(address).await
            })
            .await;

            match result {
                Ok(Some(found)) => {
                    return ChainResult::Matched {
                        source: id.to_string(),
                        found,
                    };
                }
                Ok(None) => {
                    log::debug!("{id}: no match for {}", address.street);
                }
                Err(e) if e.is_blocked() => {
                    if !blocked.swap(true, Ordering::Relaxed) {
                        log::warn!(
                            "{id}: provider blocked us, skipping it for the rest of this run ({e})"
                        );
                    }
                    note = Some(format!("{id}: {e}"));
                }
                Err(e @ GeocodeError::Parse { .. }) => {
                    log::warn!("{id}: failed on {}: {e}", address.street);
                    failure = Some((e.cause(), format!("{id}: {e}")));
                }
                Err(e) => {
                    log::warn!("{id}: giving up on {}: {e}", address.street);
                    note = Some(format!("{id}: {e}"));
                }
            }
        }

        match failure {
            Some((cause, message)) => ChainResult::Failed { cause, message },
            None => ChainResult::NoMatch { note },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Scripted provider that counts its calls.
    pub struct MockForward {
        pub id: &'static str,
        pub calls: AtomicU32,
        pub respond: Box<dyn Fn(u32) -> Result<Option<ForwardMatch>, GeocodeError> + Send + Sync>,
    }

    impl MockForward {
        pub fn new(
            id: &'static str,
            respond: impl Fn(u32) -> Result<Option<ForwardMatch>, GeocodeError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                calls: AtomicU32::new(0),
                respond: Box::new(respond),
            })
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ForwardProvider for MockForward {
        fn id(&self) -> &str {
            self.id
        }

        async fn geocode(
            &self,
            _address: &AddressQuery,
        ) -> Result<Option<ForwardMatch>, GeocodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(n)
        }
    }

    pub fn link(provider: Arc<MockForward>, retry: RetryPolicy) -> ChainLink {
        ChainLink {
            provider,
            limiter: Arc::new(RateLimiter::new(Duration::ZERO)),
            retry,
        }
    }

    pub fn found(lat: f64, lon: f64) -> ForwardMatch {
        ForwardMatch {
            matched_address: "1 MAIN ST".to_string(),
            latitude: lat,
            longitude: lon,
            ..ForwardMatch::default()
        }
    }

    fn address() -> AddressQuery {
        AddressQuery {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip: Some("62704".to_string()),
        }
    }

    #[tokio::test]
    async fn first_match_wins() {
        let a = MockForward::new("a", |_| Ok(Some(found(1.0, 2.0))));
        let b = MockForward::new("b", |_| Ok(Some(found(3.0, 4.0))));
        let chain = ProviderChain::new(vec![
            link(Arc::clone(&a), RetryPolicy::none()),
            link(Arc::clone(&b), RetryPolicy::none()),
        ]);

        let result = chain.resolve(&address()).await;
        assert_eq!(
            result,
            ChainResult::Matched {
                source: "a".to_string(),
                found: found(1.0, 2.0)
            }
        );
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn falls_through_to_next_provider() {
        let a = MockForward::new("a", |_| Ok(None));
        let b = MockForward::new("b", |_| Ok(Some(found(3.0, 4.0))));
        let chain = ProviderChain::new(vec![
            link(a, RetryPolicy::none()),
            link(b, RetryPolicy::none()),
        ]);

        assert!(matches!(
            chain.resolve(&address()).await,
            ChainResult::Matched { source, .. } if source == "b"
        ));
    }

    #[tokio::test]
    async fn blocked_provider_is_skipped_for_rest_of_run() {
        let a = MockForward::new("a", |_| {
            Err(GeocodeError::Blocked {
                message: "HTTP 403 Forbidden".to_string(),
            })
        });
        let b = MockForward::new("b", |_| Ok(Some(found(3.0, 4.0))));
        let chain = ProviderChain::new(vec![
            link(Arc::clone(&a), RetryPolicy::linear(3, Duration::from_secs(1))),
            link(Arc::clone(&b), RetryPolicy::none()),
        ]);

        for _ in 0..5 {
            assert!(matches!(
                chain.resolve(&address()).await,
                ChainResult::Matched { source, .. } if source == "b"
            ));
        }
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 5);
        assert!(chain.is_blocked(0));
        assert!(!chain.is_blocked(1));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_into_note() {
        let a = MockForward::new("a", |_| Err(GeocodeError::Status { status: 503 }));
        let chain = ProviderChain::new(vec![link(
            Arc::clone(&a),
            RetryPolicy::linear(3, Duration::from_secs(10)),
        )]);

        let ChainResult::NoMatch { note } = chain.resolve(&address()).await else {
            panic!("expected NoMatch");
        };
        assert_eq!(note.as_deref(), Some("a: HTTP status 503"));
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn client_error_status_is_no_match() {
        let a = MockForward::new("a", |_| Err(GeocodeError::Status { status: 400 }));
        let b = MockForward::new("b", |_| Ok(None));
        let chain = ProviderChain::new(vec![
            link(Arc::clone(&a), RetryPolicy::linear(3, Duration::from_secs(1))),
            link(Arc::clone(&b), RetryPolicy::none()),
        ]);

        assert_eq!(
            chain.resolve(&address()).await,
            ChainResult::NoMatch {
                note: Some("a: HTTP status 400".to_string())
            }
        );
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert!(!chain.is_blocked(0));
    }

    #[tokio::test]
    async fn unexpected_error_is_failure() {
        let a = MockForward::new("a", |_| {
            Err(GeocodeError::Parse {
                message: "Missing addressMatches array".to_string(),
            })
        });
        let b = MockForward::new("b", |_| Ok(None));
        let chain = ProviderChain::new(vec![
            link(a, RetryPolicy::none()),
            link(b, RetryPolicy::none()),
        ]);

        let ChainResult::Failed { cause, message } = chain.resolve(&address()).await else {
            panic!("expected Failed");
        };
        assert_eq!(cause, FailureCause::Unexpected);
        assert!(message.contains("Missing addressMatches"));
    }

    #[tokio::test]
    async fn empty_chain_is_no_match() {
        let chain = ProviderChain::new(Vec::new());
        assert!(chain.is_empty());
        assert_eq!(
            chain.resolve(&address()).await,
            ChainResult::NoMatch { note: None }
        );
    }
}
