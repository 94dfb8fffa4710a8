//! Indexability decisions for service×location pages.
//!
//! This crate provides:
//! - [`text`]: plain-text extraction and word counting for CMS content
//! - [`Rule`]: independently checkable rules over a [`PageCandidate`]
//! - [`DecisionEngine`]: ordered, non-short-circuiting rule evaluation

mod engine;
mod rules;
pub mod text;

pub use engine::DecisionEngine;
pub use rules::{PageCandidate, Rule};
