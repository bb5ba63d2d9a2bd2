//! Claim mappers
//!
//! A process-wide registry of per-claim transformations applied after
//! signature verification, identical for every issuer. Mapper behaviors are a
//! closed enum; the registry rejects two enabled mappers claiming the same
//! claim name.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::claims::{ClaimMap, ClaimValue, ParsedClaim, nested_value};
use crate::error::{EngineError, ValidationError};

/// Behavior of a claim mapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapperKind {
    /// Split a delimited string claim into an ordered string set
    SplitString {
        /// Delimiter between elements (a space for OAuth `scope`)
        delimiter: String,
    },
    /// Interpret the claim as a string array (a lone string becomes a
    /// one-element set)
    StringArray,
    /// Interpret a numeric or numeric-string claim as epoch seconds
    EpochSeconds,
    /// Promote a nested value (dotted path into the body) to this claim name
    NestedPath {
        /// Dotted path, e.g. `"realm_access.roles"`
        path: String,
    },
}

/// A mapper bound to the claim name it handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMapper {
    /// Claim this mapper rewrites
    pub claim: String,
    /// Disabled mappers are ignored by the registry
    pub enabled: bool,
    /// What the mapper does
    pub kind: MapperKind,
}

impl ClaimMapper {
    /// Construct an enabled mapper.
    #[must_use]
    pub fn new(claim: impl Into<String>, kind: MapperKind) -> Self {
        Self {
            claim: claim.into(),
            enabled: true,
            kind,
        }
    }

    /// The stock mapper set: space-split `scope`, array-typed `roles` and
    /// `groups`, epoch `auth_time`.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "scope",
                MapperKind::SplitString {
                    delimiter: " ".to_string(),
                },
            ),
            Self::new("roles", MapperKind::StringArray),
            Self::new("groups", MapperKind::StringArray),
            Self::new("auth_time", MapperKind::EpochSeconds),
        ]
    }

    /// Apply this mapper against `body`, rewriting `claims` in place.
    ///
    /// Absent source claims are a no-op; present claims of the wrong shape
    /// are a [`ValidationError::ClaimMappingFailed`] fatal.
    pub fn apply(
        &self,
        body: &Map<String, Value>,
        claims: &mut ClaimMap,
    ) -> Result<(), ValidationError> {
        let fail = |detail: &str| ValidationError::ClaimMappingFailed {
            claim: self.claim.clone(),
            detail: detail.to_string(),
        };

        match &self.kind {
            MapperKind::SplitString { delimiter } => {
                let Some(raw) = body.get(&self.claim) else {
                    return Ok(());
                };
                let text = raw.as_str().ok_or_else(|| fail("expected a string"))?;
                let parts: Vec<String> = text
                    .split(delimiter.as_str())
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                claims.set(
                    &self.claim,
                    ClaimValue {
                        original: text.to_string(),
                        parsed: ParsedClaim::StringSet(parts),
                    },
                );
            }
            MapperKind::StringArray => {
                let Some(raw) = body.get(&self.claim) else {
                    return Ok(());
                };
                let set = match raw {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| fail("expected an array of strings"))?,
                    _ => return Err(fail("expected a string or string array")),
                };
                claims.set(
                    &self.claim,
                    ClaimValue {
                        original: match raw {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                        parsed: ParsedClaim::StringSet(set),
                    },
                );
            }
            MapperKind::EpochSeconds => {
                let Some(raw) = body.get(&self.claim) else {
                    return Ok(());
                };
                let secs = match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| fail("expected epoch seconds"))?;
                let at = DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| fail("epoch seconds out of range"))?;
                claims.set(
                    &self.claim,
                    ClaimValue {
                        original: secs.to_string(),
                        parsed: ParsedClaim::Instant(at),
                    },
                );
            }
            MapperKind::NestedPath { path } => {
                let Some(value) = nested_value(body, path) else {
                    return Ok(());
                };
                claims.set(&self.claim, ClaimValue::from_json(value));
            }
        }
        Ok(())
    }
}

/// The validated, process-wide mapper registry.
#[derive(Debug, Default)]
pub struct MapperRegistry {
    mappers: Vec<ClaimMapper>,
}

impl MapperRegistry {
    /// Build the registry, dropping disabled mappers.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] when two enabled mappers claim the same name.
    pub fn new(mappers: Vec<ClaimMapper>) -> Result<Self, EngineError> {
        let enabled: Vec<ClaimMapper> = mappers.into_iter().filter(|m| m.enabled).collect();
        let mut seen = std::collections::HashSet::new();
        for mapper in &enabled {
            if !seen.insert(mapper.claim.clone()) {
                return Err(EngineError::Config(format!(
                    "duplicate claim mapper for {:?}",
                    mapper.claim
                )));
            }
        }
        Ok(Self { mappers: enabled })
    }

    /// Look up the mapper registered for a claim name.
    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&ClaimMapper> {
        self.mappers.iter().find(|m| m.claim == claim)
    }

    /// Apply every registered mapper against `body`, rewriting `claims`.
    pub fn apply_all(
        &self,
        body: &Map<String, Value>,
        claims: &mut ClaimMap,
    ) -> Result<(), ValidationError> {
        for mapper in &self.mappers {
            mapper.apply(body, claims)?;
        }
        Ok(())
    }
}
