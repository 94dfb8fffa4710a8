//! Page-set generation for the service×location landing pages.
//!
//! This crate ties the content store, fetch gateway and decision engine
//! together: both catalogues are fetched, every pair is evaluated, and the
//! indexable pages are merged with the static routes into a sitemap.

pub mod pair;
pub mod pipeline;
pub mod sitemap;

pub use pair::{PairFailure, PairOutcome, estimated_body, evaluate_pair, evaluate_pair_within};
pub use pipeline::{GenerationReport, PageSetGenerator, ProgressReporter, SilentProgress};
pub use sitemap::{CandidateReport, CandidateStatus, SitemapBuilder};
