//! Core data model definitions shared across Sunlapse crates.

pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod frame;
pub mod health;
pub mod instant;
pub mod manifest;
pub mod source;
pub mod state;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use fetch::FetchResult;
pub use fingerprint::Fingerprint;
pub use frame::{FrameRecord, FrameStatus};
pub use health::HealthSnapshot;
pub use instant::TargetInstant;
pub use manifest::{MANIFEST_SCHEMA_VERSION, Manifest};
pub use source::{SourceKind, SourceSpec};
pub use state::{RunPhase, RunState};
