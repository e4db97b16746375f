//! Face identity resolution against a catalog of reference embeddings.
//!
//! # Usage
//!
//! ```
//! use facegate_faceid::{CatalogEntry, DEFAULT_THRESHOLD, resolve};
//!
//! let catalog = vec![
//!     CatalogEntry::new("A", "Asha", vec![1.0, 0.0]),
//!     CatalogEntry::new("B", "Bilal", vec![0.0, 1.0]),
//! ];
//!
//! let outcome = resolve(&[0.6, 0.8], &catalog, DEFAULT_THRESHOLD);
//! assert_eq!(outcome.identity_key(), Some("A"));
//! ```
//!
//! # Design
//!
//! - [`cosine_similarity`] scores two vectors and rejects mismatched
//!   lengths and zero vectors.
//! - [`Resolver`] accepts an entry when `similarity > 1 - threshold` and, by
//!   default, returns the first such entry in catalog order rather than the
//!   best one. [`MatchPolicy::BestMatch`] opts into the full scan.
//! - [`Synchronizer`] fills absent embedding slots from each identity's
//!   image. It is idempotent and isolates per-identity failures.
//! - [`Gate`] ties an embedder and an [`IdentityStore`] together for the
//!   request surface.

mod api;
mod cosine;
mod error;
mod export;
mod gate;
mod identity;
mod redb_store;
mod resolver;
mod store;
mod sync;

pub use api::{CompareRequest, OutcomeTag, VerifyRequest, VerifyResponse};
pub use cosine::cosine_similarity;
pub use error::FaceIdError;
pub use export::{ExportRecord, ImportSummary, export, import, load_json, save_json};
pub use gate::{Gate, GateConfig};
pub use identity::{CatalogEntry, IdentityRecord};
pub use redb_store::RedbStore;
pub use resolver::{
    DEFAULT_THRESHOLD, MatchOutcome, MatchPolicy, PairVerdict, Resolver, resolve, verify_pair,
};
pub use store::{IdentityStore, MemoryStore};
pub use sync::{IdentityOutcome, SyncConfig, SyncReport, SyncStatus, Synchronizer, sync};
