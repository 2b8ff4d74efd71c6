//! Manifest requests dispatched by URI scheme.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ErrorCode, PlayerError};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collaborators::{FetchOutcome, ManifestFetcher};
use crate::generation::Generation;
use crate::retry::AttemptOutcome;

/// Handler for one URI scheme
#[async_trait]
pub trait SchemeHandler: Send + Sync {
    async fn request(&self, uri: &str, generation: Generation) -> FetchOutcome;
}

/// Scheme name → handler map, injected into each [`SchemeFetcher`]
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    handlers: HashMap<String, Arc<dyn SchemeHandler>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(mut self, scheme: &str, handler: Arc<dyn SchemeHandler>) -> Self {
        self.register(scheme, handler);
        self
    }

    /// Replaces any handler already registered for `scheme`
    pub fn register(&mut self, scheme: &str, handler: Arc<dyn SchemeHandler>) {
        self.handlers.insert(scheme.to_ascii_lowercase(), handler);
    }

    pub fn unregister(&mut self, scheme: &str) -> bool {
        self.handlers.remove(&scheme.to_ascii_lowercase()).is_some()
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn SchemeHandler>> {
        self.handlers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.handlers.keys().cloned().collect();
        schemes.sort();
        schemes
    }
}

/// Scheme of `uri` (`"test"` for `"test:sintel"`), if it has a valid one.
pub fn scheme_of(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

/// Abort token of one generation and the number of requests holding it
struct InFlight {
    token: CancellationToken,
    requests: usize,
}

/// Unregisters a request when its future completes or is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<Generation, InFlight>,
    generation: Generation,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.in_flight.get_mut(&self.generation) {
            entry.requests = entry.requests.saturating_sub(1);
        }
        self.in_flight.remove_if(&self.generation, |_, e| e.requests == 0);
    }
}

/// [`ManifestFetcher`] dispatching on the URI scheme.
pub struct SchemeFetcher {
    registry: SchemeRegistry,
    in_flight: DashMap<Generation, InFlight>,
}

impl SchemeFetcher {
    pub fn new(registry: SchemeRegistry) -> Self {
        Self {
            registry,
            in_flight: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    /// Generations with at least one request still running
    pub fn in_flight_generations(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl ManifestFetcher for SchemeFetcher {
    async fn fetch(&self, uri: &str, generation: Generation) -> FetchOutcome {
        let Some(handler) = scheme_of(uri).and_then(|scheme| self.registry.get(scheme)) else {
            return AttemptOutcome::Fatal(PlayerError::critical(
                ErrorCode::UnsupportedScheme,
                format!("no handler registered for {}", uri),
            ));
        };

        let token = {
            let mut entry = self.in_flight.entry(generation).or_insert_with(|| InFlight {
                token: CancellationToken::new(),
                requests: 0,
            });
            entry.requests += 1;
            entry.token.clone()
        };
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            generation,
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!("Request for {} aborted ({})", uri, generation);
                AttemptOutcome::Fatal(PlayerError::critical(
                    ErrorCode::OperationAborted,
                    format!("request for {} aborted", uri),
                ))
            }
            outcome = handler.request(uri, generation) => outcome,
        }
    }

    fn abort(&self, generation: Generation) {
        if let Some((_, entry)) = self.in_flight.remove(&generation) {
            entry.token.cancel();
        }
    }
}
