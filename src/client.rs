//! Inschrijving retrieval: cache lookup, signed request, reply classification.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::cache::{CacheStore, DirectoryCache};
use crate::config::{Environment, InschrijvingConfig};
use crate::envelope::ophalen_inschrijving_envelope;
use crate::error::{InschrijvingError, InschrijvingResult};
use crate::model::OphalenInschrijvingResponse;
use crate::parser::{interpret, parse_document};
use crate::transport::{HttpsTransport, OutboundRequest, Transport};
use crate::wsse::Credential;

/// Counters over the lifetime of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Lookups answered from the cache
    pub cache_hits: u64,
    /// Requests sent to the registry
    pub network_fetches: u64,
    /// Registry faults received, including not-found
    pub faults: u64,
}

/// Client for the `ophalenInschrijving` operation.
///
/// Consults the cache first, then signs and sends a request, classifies the
/// reply, and writes successful replies back to the cache.
pub struct InschrijvingClient<T = HttpsTransport, C = DirectoryCache> {
    config: InschrijvingConfig,
    transport: T,
    cache: C,
    cache_hits: AtomicU64,
    network_fetches: AtomicU64,
    faults: AtomicU64,
}

impl InschrijvingClient<HttpsTransport, DirectoryCache> {
    /// Create a client with the HTTPS transport and directory cache from `config`.
    pub fn new(config: InschrijvingConfig) -> Self {
        let transport = HttpsTransport::new(config.transport.clone());
        let cache = DirectoryCache::new(config.cache.directory.clone());
        Self::with_parts(config, transport, cache)
    }
}

impl<T: Transport, C: CacheStore> InschrijvingClient<T, C> {
    pub fn with_parts(config: InschrijvingConfig, transport: T, cache: C) -> Self {
        Self {
            config,
            transport,
            cache,
            cache_hits: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &InschrijvingConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    /// Retrieve using the configured environment and cache setting.
    pub async fn fetch(
        &self,
        kvk_nummer: &str,
        credential: &Credential,
    ) -> InschrijvingResult<OphalenInschrijvingResponse> {
        self.retrieve(
            kvk_nummer,
            credential,
            self.config.cache.enabled,
            self.config.environment,
        )
        .await
    }

    /// Retrieve the inschrijving for `kvk_nummer`.
    pub async fn retrieve(
        &self,
        kvk_nummer: &str,
        credential: &Credential,
        use_cache: bool,
        environment: Environment,
    ) -> InschrijvingResult<OphalenInschrijvingResponse> {
        self.retrieve_until(
            kvk_nummer,
            credential,
            use_cache,
            environment,
            std::future::pending::<()>(),
        )
        .await
    }

    /// Like [`retrieve`](Self::retrieve), but abort the network step once
    /// `shutdown` completes. The cache is left untouched on abort.
    pub async fn retrieve_until<F>(
        &self,
        kvk_nummer: &str,
        credential: &Credential,
        use_cache: bool,
        environment: Environment,
        shutdown: F,
    ) -> InschrijvingResult<OphalenInschrijvingResponse>
    where
        F: Future<Output = ()>,
    {
        if kvk_nummer.is_empty() {
            return Err(InschrijvingError::EmptyKvkNummer);
        }

        if use_cache {
            if let Some(response) = self.from_cache(kvk_nummer) {
                return Ok(response);
            }
        }

        if !credential.is_complete() {
            warn!(kvk_nummer = %kvk_nummer, "No credential available and no cached inschrijving");
            return Err(InschrijvingError::MissingCredential);
        }

        let endpoint = self.config.endpoints.for_environment(environment);
        info!(
            kvk_nummer = %kvk_nummer,
            environment = environment.as_str(),
            endpoint = %endpoint.url,
            "Fetching inschrijving from registry"
        );

        let envelope = ophalen_inschrijving_envelope(
            kvk_nummer,
            self.config.soap.version,
            &endpoint.to_address,
            credential,
        )?;

        self.network_fetches.fetch_add(1, Ordering::Relaxed);
        let request = OutboundRequest {
            endpoint,
            envelope: &envelope,
            credential,
        };

        let reply = tokio::select! {
            result = self.transport.send(request) => result?,
            _ = shutdown => {
                warn!(kvk_nummer = %kvk_nummer, "Shutdown requested, abandoning registry request");
                return Err(InschrijvingError::Cancelled);
            }
        };

        let response = interpret(kvk_nummer, &reply).inspect_err(|e| {
            if matches!(
                e,
                InschrijvingError::NotFound { .. } | InschrijvingError::ProtocolFault { .. }
            ) {
                self.faults.fetch_add(1, Ordering::Relaxed);
            }
        })?;

        if use_cache {
            match self.cache.store(kvk_nummer, &reply.body) {
                Ok(path) => debug!(path = %path.display(), "Cached inschrijving"),
                Err(e) => warn!(
                    kvk_nummer = %kvk_nummer,
                    error = %e,
                    "Failed to cache inschrijving, continuing"
                ),
            }
        }

        Ok(response)
    }

    /// Serve from the cache. Unreadable or unparseable entries count as a miss.
    fn from_cache(&self, kvk_nummer: &str) -> Option<OphalenInschrijvingResponse> {
        let path = self.cache.find(kvk_nummer)?;

        let result = self.cache.load(&path).and_then(|document| {
            parse_document(&document).map_err(|e| {
                InschrijvingError::CacheRead(format!("{}: {}", path.display(), e))
            })
        });

        match result {
            Ok(response) => {
                info!(kvk_nummer = %kvk_nummer, path = %path.display(), "Using cached inschrijving");
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            Err(e) => {
                warn!(kvk_nummer = %kvk_nummer, error = %e, "Ignoring unusable cache entry");
                None
            }
        }
    }
}

/// Retrieve an inschrijving with default configuration.
///
/// `cert` and `key` are PEM strings and may be empty when the cache can
/// answer. `env == "prd"` selects production, anything else pre-production.
pub async fn get_inschrijving(
    kvk_nummer: &str,
    cert: &str,
    key: &str,
    use_cache: bool,
    env: &str,
) -> InschrijvingResult<OphalenInschrijvingResponse> {
    let client = InschrijvingClient::new(InschrijvingConfig::default());
    client
        .retrieve(
            kvk_nummer,
            &Credential::new(cert, key),
            use_cache,
            Environment::from_tag(env),
        )
        .await
}
