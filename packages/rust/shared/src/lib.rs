//! Shared types, error model, and configuration for the page generator.
//!
//! This crate is the foundation depended on by all other pagegen crates.
//! It provides:
//! - [`PagegenError`]: the unified error type
//! - Domain types ([`ServiceEntity`], [`LocationEntity`], [`IndexDecision`], [`SitemapEntry`])
//! - Configuration ([`AppConfig`], [`GatewayConfig`], [`GeneratorConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CohortConfig, ContentStoreConfig, GatewayConfig, GatewaySection, GeneratorConfig,
    GeneratorSection, IndexingConfig, SitemapConfig, StaticRoute, VariantWeight, config_dir,
    config_file_path, content_store_token, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{PagegenError, Result};
pub use types::{
    ChangeFrequency, IndexDecision, LocationEntity, LocationTier, RichContent, ServiceEntity,
    SitemapEntry,
};
