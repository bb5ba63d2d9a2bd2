//! Key provisioning: HTTP fetching, OIDC discovery, and the rotating loader

pub mod fetch;
pub mod loader;
pub mod wellknown;

pub use fetch::{FetchError, FetchOutcome, HttpFetcher};
pub use loader::{JwksLoader, LoaderStatus};
pub use wellknown::{DiscoveryDocument, WellKnownResolver};
