//! Rotating JWKS loader
//!
//! One loader per issuer. Keys arrive from an inline document, a file, a
//! JWKS endpoint, or OIDC discovery. HTTP-backed loaders load asynchronously
//! and refresh in the background; a rotation retires the previous keyset,
//! which keeps serving lookups for the configured grace period.
//!
//! # State machine
//!
//! `Undefined → Loading → (Ok | Error)`. A failed initial load stays
//! `Undefined` while background refresh is enabled (the retry loop will get
//! another chance) and becomes `Error` otherwise. Refresh outcomes flip the
//! status in either direction; already-loaded keys keep serving across
//! refresh failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fetch::{FetchError, FetchOutcome, HttpFetcher};
use super::wellknown::{WellKnownResolver, default_well_known_url};
use crate::config::{IssuerConfig, KeySource, RotationConfig};
use crate::error::{EngineError, ValidationError, redact};
use crate::events::{SecurityEventCounter, SecurityEventKind};
use crate::keys::jwk::{KeyError, VerificationKey, parse_jwk_set};

/// Externally visible loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStatus {
    /// No load attempt has concluded (or the last initial attempt failed but
    /// remains retriable)
    Undefined,
    /// Initial load in flight
    Loading,
    /// Keys loaded
    Ok,
    /// Last load attempt failed terminally
    Error,
}

#[derive(Debug, PartialEq)]
struct Keyset {
    keys: HashMap<String, Arc<VerificationKey>>,
}

impl Keyset {
    fn from_keys(keys: Vec<VerificationKey>) -> Self {
        let keys = keys
            .into_iter()
            .filter_map(|key| {
                let kid = key.kid.clone()?;
                Some((kid, Arc::new(key)))
            })
            .collect();
        Self { keys }
    }
}

#[derive(Debug)]
struct RetiredKeyset {
    keys: Keyset,
    retired_at: Instant,
}

#[derive(Debug, Default)]
struct KeysetState {
    current: Option<Keyset>,
    retired: VecDeque<RetiredKeyset>,
}

#[derive(Debug)]
enum KeySupply {
    Static,
    Http { url: String },
    Discovery { resolver: WellKnownResolver },
}

#[derive(Error, Debug)]
enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error("discovery document exposes no jwks_uri")]
    NoJwksUri,
}

#[derive(Debug)]
struct LoaderShared {
    issuer: String,
    supply: KeySupply,
    fetcher: Option<Arc<HttpFetcher>>,
    state: RwLock<KeysetState>,
    status_tx: watch::Sender<LoaderStatus>,
    initial_tx: watch::Sender<bool>,
    rotation: RotationConfig,
    background_refresh: bool,
    reconciled: AtomicBool,
    events: Arc<SecurityEventCounter>,
}

fn validate_endpoint_url(issuer: &str, raw: &str) -> Result<(), EngineError> {
    let parsed = url::Url::parse(raw).map_err(|e| EngineError::Config(format!(
        "issuer {issuer:?}: invalid key endpoint URL {raw:?}: {e}"
    )))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(EngineError::Config(format!(
            "issuer {issuer:?}: key endpoint URL {raw:?} must be http(s)"
        )));
    }
    Ok(())
}

/// Per-issuer key provider with atomic rotation and grace-period lookups.
#[derive(Debug)]
pub struct JwksLoader {
    shared: Arc<LoaderShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JwksLoader {
    /// Build the loader for an issuer's key source.
    ///
    /// HTTP-backed sources spawn their initial load immediately, so this must
    /// run inside a Tokio runtime. Inline and file sources load synchronously
    /// and fail construction on unusable documents.
    pub fn new(
        config: &IssuerConfig,
        events: Arc<SecurityEventCounter>,
    ) -> Result<Self, EngineError> {
        match &config.key_source {
            KeySource::Inline { jwks } => {
                Self::from_document(config, jwks.as_bytes(), events)
            }
            KeySource::File { path } => {
                let text = std::fs::read_to_string(path).map_err(|e| EngineError::KeySource {
                    issuer: config.identifier.clone(),
                    detail: format!("reading {}: {e}", path.display()),
                })?;
                Self::from_document(config, text.as_bytes(), events)
            }
            KeySource::Http { url } => {
                validate_endpoint_url(&config.identifier, url)?;
                let fetcher = Arc::new(
                    HttpFetcher::new(&config.http, &config.retry)
                        .map_err(|e| EngineError::HttpClient(e.to_string()))?,
                );
                Ok(Self::spawn(
                    config,
                    KeySupply::Http { url: url.clone() },
                    fetcher,
                    events,
                ))
            }
            KeySource::WellKnown { url } => {
                // An empty URL means "use the OIDC convention for this issuer".
                let url = if url.is_empty() {
                    default_well_known_url(&config.identifier)
                } else {
                    url.clone()
                };
                validate_endpoint_url(&config.identifier, &url)?;
                let fetcher = Arc::new(
                    HttpFetcher::new(&config.http, &config.retry)
                        .map_err(|e| EngineError::HttpClient(e.to_string()))?,
                );
                let resolver = WellKnownResolver::new(url, Arc::clone(&fetcher));
                Ok(Self::spawn(
                    config,
                    KeySupply::Discovery { resolver },
                    fetcher,
                    events,
                ))
            }
        }
    }

    fn from_document(
        config: &IssuerConfig,
        bytes: &[u8],
        events: Arc<SecurityEventCounter>,
    ) -> Result<Self, EngineError> {
        let keys = parse_jwk_set(bytes).map_err(|e| EngineError::KeySource {
            issuer: config.identifier.clone(),
            detail: e.to_string(),
        })?;
        let shared = Arc::new(LoaderShared {
            issuer: config.identifier.clone(),
            supply: KeySupply::Static,
            fetcher: None,
            state: RwLock::new(KeysetState {
                current: Some(Keyset::from_keys(keys)),
                retired: VecDeque::new(),
            }),
            status_tx: watch::Sender::new(LoaderStatus::Ok),
            initial_tx: watch::Sender::new(true),
            rotation: config.rotation.clone(),
            background_refresh: false,
            reconciled: AtomicBool::new(true),
            events,
        });
        Ok(Self {
            shared,
            task: Mutex::new(None),
        })
    }

    fn spawn(
        config: &IssuerConfig,
        supply: KeySupply,
        fetcher: Arc<HttpFetcher>,
        events: Arc<SecurityEventCounter>,
    ) -> Self {
        let shared = Arc::new(LoaderShared {
            issuer: config.identifier.clone(),
            supply,
            fetcher: Some(fetcher),
            state: RwLock::new(KeysetState::default()),
            status_tx: watch::Sender::new(LoaderStatus::Loading),
            initial_tx: watch::Sender::new(false),
            rotation: config.rotation.clone(),
            background_refresh: config.http.background_refresh,
            reconciled: AtomicBool::new(false),
            events,
        });
        let task = tokio::spawn(Self::run(
            Arc::clone(&shared),
            config.http.refresh_interval,
        ));
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(shared: Arc<LoaderShared>, refresh_interval: Duration) {
        // Initial load. A failure stays retriable (Undefined) only while the
        // refresh loop is there to retry it.
        match Self::load_once(&shared).await {
            Ok(()) => {
                shared.status_tx.send_replace(LoaderStatus::Ok);
            }
            Err(err) => {
                warn!(issuer = %shared.issuer, %err, "initial JWKS load failed");
                let status = if shared.background_refresh {
                    LoaderStatus::Undefined
                } else {
                    LoaderStatus::Error
                };
                shared.status_tx.send_replace(status);
            }
        }
        shared.initial_tx.send_replace(true);

        if !shared.background_refresh {
            return;
        }
        loop {
            tokio::time::sleep(refresh_interval).await;
            // The engine dropped its handle: nobody can observe us anymore.
            if Arc::strong_count(&shared) <= 1 {
                break;
            }
            match Self::load_once(&shared).await {
                Ok(()) => {
                    shared.status_tx.send_replace(LoaderStatus::Ok);
                }
                Err(err) => {
                    warn!(issuer = %shared.issuer, %err, "JWKS refresh failed, serving existing keys");
                    shared.status_tx.send_replace(LoaderStatus::Error);
                }
            }
        }
    }

    async fn load_once(shared: &LoaderShared) -> Result<(), LoadError> {
        let url = match &shared.supply {
            KeySupply::Static => return Ok(()),
            KeySupply::Http { url } => url.clone(),
            KeySupply::Discovery { resolver } => {
                let document = resolver.document().await?;
                if !shared.reconciled.swap(true, Ordering::Relaxed) {
                    match document.issuer.as_deref() {
                        Some(discovered) if discovered != shared.issuer => {
                            // Explicit administrator intent wins over discovery.
                            warn!(
                                configured = %shared.issuer,
                                discovered,
                                "discovery document issuer differs from configuration"
                            );
                            shared.events.record(SecurityEventKind::IssuerMismatch);
                        }
                        _ => {}
                    }
                }
                document.jwks_uri.clone().ok_or(LoadError::NoJwksUri)?
            }
        };

        let fetcher = shared
            .fetcher
            .as_ref()
            .expect("http-backed supplies always carry a fetcher");
        match fetcher.fetch(&url).await? {
            FetchOutcome::NotModified => {
                debug!(issuer = %shared.issuer, "JWKS unchanged (304)");
                Ok(())
            }
            FetchOutcome::Fresh(bytes) => {
                let keys = parse_jwk_set(&bytes)?;
                Self::rotate_in(shared, Keyset::from_keys(keys));
                Ok(())
            }
        }
    }

    /// Install `keyset` as current, retiring the previous one.
    ///
    /// No-op when the fetched set is value-equal to the current one. The
    /// whole swap happens under one write lock, so readers observe either the
    /// old state or the new, never a mix.
    fn rotate_in(shared: &LoaderShared, keyset: Keyset) {
        let mut state = shared.state.write();
        if state.current.as_ref() == Some(&keyset) {
            debug!(issuer = %shared.issuer, "fetched JWKS is identical, no rotation");
            return;
        }
        if let Some(previous) = state.current.take() {
            state.retired.push_front(RetiredKeyset {
                keys: previous,
                retired_at: Instant::now(),
            });
        }
        let grace = shared.rotation.grace_period;
        state.retired.retain(|r| r.retired_at.elapsed() <= grace);
        state.retired.truncate(shared.rotation.max_retired_keysets);
        info!(
            issuer = %shared.issuer,
            keys = keyset.keys.len(),
            retired_sets = state.retired.len(),
            "rotated JWKS"
        );
        state.current = Some(keyset);
    }

    /// Look up a verification key by kid: current keyset first, then retired
    /// keysets still inside the grace period.
    ///
    /// Blocks until the initial load has concluded (either way) when called
    /// before first completion.
    pub async fn get_key(&self, kid: &str) -> Result<Arc<VerificationKey>, ValidationError> {
        self.await_initial().await;
        let state = self.shared.state.read();
        if let Some(current) = &state.current {
            if let Some(key) = current.keys.get(kid) {
                return Ok(Arc::clone(key));
            }
        }
        let grace = self.shared.rotation.grace_period;
        for retired in &state.retired {
            if retired.retired_at.elapsed() <= grace {
                if let Some(key) = retired.keys.keys.get(kid) {
                    debug!(issuer = %self.shared.issuer, kid, "serving key from retired keyset");
                    return Ok(Arc::clone(key));
                }
            }
        }
        Err(ValidationError::KeyNotFound(redact(kid)))
    }

    async fn await_initial(&self) {
        let mut initial = self.shared.initial_tx.subscribe();
        // Resolves immediately once the first attempt has concluded.
        let _ = initial.wait_for(|done| *done).await;
    }

    /// Current loader status.
    #[must_use]
    pub fn status(&self) -> LoaderStatus {
        *self.shared.status_tx.borrow()
    }

    /// `(current keys, retired keysets)` for health surfaces.
    #[must_use]
    pub fn key_counts(&self) -> (usize, usize) {
        let state = self.shared.state.read();
        (
            state.current.as_ref().map_or(0, |ks| ks.keys.len()),
            state.retired.len(),
        )
    }

    /// Stop the background refresh task, if any.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for JwksLoader {
    fn drop(&mut self) {
        self.close();
    }
}
