//! Issuer registry
//!
//! Resolves the `iss` claim of an incoming token to the issuer's trust
//! context (configuration plus key loader). Built once at engine
//! construction and read-shared afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::IssuerConfig;
use crate::error::EngineError;
use crate::events::SecurityEventCounter;
use crate::jwks::{JwksLoader, LoaderStatus};

/// One issuer's immutable trust context.
#[derive(Debug)]
pub struct IssuerHandle {
    /// The issuer configuration, as given at construction
    pub config: IssuerConfig,
    /// The issuer's key provider
    pub loader: JwksLoader,
}

/// Immutable issuer-identifier → trust-context map.
#[derive(Debug, Default)]
pub struct IssuerRegistry {
    enabled: HashMap<String, Arc<IssuerHandle>>,
    disabled: Vec<String>,
}

impl IssuerRegistry {
    /// Build loaders for every enabled issuer.
    ///
    /// Disabled issuers are skipped entirely (no loader, no network); they
    /// still appear in [`Self::statuses`] for health surfaces.
    pub fn new(
        issuers: Vec<IssuerConfig>,
        events: &Arc<SecurityEventCounter>,
    ) -> Result<Self, EngineError> {
        let mut enabled = HashMap::new();
        let mut disabled = Vec::new();
        for config in issuers {
            if config.identifier.is_empty() {
                return Err(EngineError::Config(
                    "issuer configuration without an identifier".to_string(),
                ));
            }
            if !config.enabled {
                debug!(issuer = %config.identifier, "issuer disabled, skipping");
                disabled.push(config.identifier);
                continue;
            }
            if enabled.contains_key(&config.identifier) {
                return Err(EngineError::Config(format!(
                    "duplicate issuer configuration for {:?}",
                    config.identifier
                )));
            }
            let loader = JwksLoader::new(&config, Arc::clone(events))?;
            enabled.insert(
                config.identifier.clone(),
                Arc::new(IssuerHandle { config, loader }),
            );
        }
        Ok(Self { enabled, disabled })
    }

    /// The trust context for `iss`, when that issuer is configured and
    /// enabled.
    #[must_use]
    pub fn resolve(&self, issuer: &str) -> Option<Arc<IssuerHandle>> {
        self.enabled.get(issuer).map(Arc::clone)
    }

    /// Health view over every configured issuer.
    #[must_use]
    pub fn statuses(&self) -> Vec<IssuerStatus> {
        let mut out: Vec<IssuerStatus> = self
            .enabled
            .values()
            .map(|handle| {
                let (current_keys, retired_keysets) = handle.loader.key_counts();
                IssuerStatus {
                    identifier: handle.config.identifier.clone(),
                    enabled: true,
                    loader_status: handle.loader.status(),
                    current_keys,
                    retired_keysets,
                }
            })
            .chain(self.disabled.iter().map(|identifier| IssuerStatus {
                identifier: identifier.clone(),
                enabled: false,
                loader_status: LoaderStatus::Undefined,
                current_keys: 0,
                retired_keysets: 0,
            }))
            .collect();
        out.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        out
    }

    /// Stop every loader's background task.
    pub fn close(&self) {
        for handle in self.enabled.values() {
            handle.loader.close();
        }
    }
}

/// Health snapshot for one configured issuer.
#[derive(Debug, Clone, Serialize)]
pub struct IssuerStatus {
    /// Issuer identifier
    pub identifier: String,
    /// Whether the issuer participates in validation
    pub enabled: bool,
    /// Key-loader state
    pub loader_status: LoaderStatus,
    /// Keys in the current keyset
    pub current_keys: usize,
    /// Retired keysets still retained
    pub retired_keysets: usize,
}
