//! Row-level security probe engine
//!
//! Issues anonymous and authenticated requests against a REST data API and
//! checks that the observed outcomes match the access-control policy the
//! operator expects.
//!
//! ## Key Components
//!
//! - [`Identity`] - calling principal and the headers it derives
//! - [`Transport`] / [`RestTransport`] - one request per probe, no retries
//! - [`classify`] - pure status/body → [`Verdict`] mapping
//! - [`Probe`] / [`ProbeRunner`] - declarative probes run strictly in order
//! - [`RunReport`] - text and JSON rendering of the results
//!
//! ```ignore
//! let config = RunConfig::new(url, api_key, token, user_id);
//! config.validate()?;
//! let probes = builtin_probes(&config, &config.vars(Utc::now()));
//! let transport = Arc::new(RestTransport::new(&config.base_url, config.timeout)?);
//! let results = ProbeRunner::new(transport).run_all(&probes).await;
//! println!("{}", RunReport::new(&config.base_url, results).render_text());
//! ```

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod identity;
pub mod operation;
pub mod probe;
pub mod report;
pub mod resource;
pub mod runner;
pub mod transport;

// Re-exports for convenience
pub use catalog::{builtin_probes, load_catalog, parse_catalog};
pub use classifier::{classify, inspect_rows, OwnershipScope, ProbeContext, RowInspection, Verdict};
pub use config::{CatalogVars, RunConfig};
pub use error::{ProbeError, TransportError};
pub use identity::{Identities, Identity, IdentityKind};
pub use operation::{Operation, Prefer, Preference};
pub use probe::{Capture, Disposition, Outcome, Probe, ProbeResult};
pub use report::{RunReport, Summary};
pub use resource::{FilterValue, Order, ResourceRef};
pub use runner::ProbeRunner;
pub use transport::{RawResponse, RestTransport, Transport};
