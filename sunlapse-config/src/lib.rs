//! Shared configuration library for Sunlapse.
//!
//! This crate centralizes the pipeline's configuration records, their
//! documented defaults, environment-variable loading, and startup
//! validation. The binary loads exactly one [`Config`] per run so there is
//! a single source of truth for defaults and guard rails.

pub mod loader;
pub mod models;
pub mod validation;

pub use models::{
    Config, CropRect, EncodeConfig, FetchConfig, GradeParams,
    CompositeConfig, PipelineConfig, RenditionSpec, SourcesConfig,
    StorageConfig, WindowConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
