//! Core domain types for the services × locations page set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RichContent
// ---------------------------------------------------------------------------

/// Body content as delivered by the CMS.
///
/// A field may hold plain text, an HTML fragment, or a rich-text document
/// (a JSON node tree whose text leaves carry a `value` string).
#[derive(Debug, Clone, PartialEq)]
pub enum RichContent {
    Plain(String),
    Html(String),
    Document(serde_json::Value),
}

impl From<serde_json::Value> for RichContent {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) if looks_like_html(&s) => Self::Html(s),
            serde_json::Value::String(s) => Self::Plain(s),
            serde_json::Value::Null => Self::Plain(String::new()),
            v @ (serde_json::Value::Object(_) | serde_json::Value::Array(_)) => Self::Document(v),
            other => Self::Plain(other.to_string()),
        }
    }
}

impl From<RichContent> for serde_json::Value {
    fn from(content: RichContent) -> Self {
        match content {
            RichContent::Plain(s) | RichContent::Html(s) => Self::String(s),
            RichContent::Document(v) => v,
        }
    }
}

impl Serialize for RichContent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RichContent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

fn looks_like_html(s: &str) -> bool {
    let trimmed = s.trim_start();
    trimmed.starts_with('<') && trimmed.contains('>')
}

// ---------------------------------------------------------------------------
// Catalogue entities
// ---------------------------------------------------------------------------

/// A treatment offered by the practice (e.g. `teeth-whitening`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntity {
    /// Unique, lowercase, hyphenated identifier.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Category tag (e.g. `cosmetic`, `general`).
    #[serde(default)]
    pub category: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Marketing priority flag.
    #[serde(default)]
    pub priority: bool,
    /// Last modification time reported by the CMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Size class of a location, used to weight sitemap priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationTier {
    Major,
    Secondary,
    Tertiary,
}

/// A suburb or town served by the practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationEntity {
    /// Unique identifier.
    pub slug: String,
    /// Suburb name.
    pub suburb: String,
    /// Parent city.
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<LocationTier>,
    /// Hand-written content specific to this location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_content: Option<RichContent>,
    /// References to testimonials from patients in this location.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testimonials: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// IndexDecision
// ---------------------------------------------------------------------------

/// Outcome of evaluating one page candidate.
///
/// `indexable` is derived from `reasons`, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDecision {
    indexable: bool,
    reasons: Vec<String>,
}

impl IndexDecision {
    /// Build a decision from the accumulated rejection reasons.
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            indexable: reasons.is_empty(),
            reasons,
        }
    }

    /// A rejection with a single reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::from_reasons(vec![reason.into()])
    }

    pub fn indexable(&self) -> bool {
        self.indexable
    }

    /// Rejection reasons in rule order. Empty iff indexable.
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

// ---------------------------------------------------------------------------
// SitemapEntry
// ---------------------------------------------------------------------------

/// Sitemap `changefreq` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

/// One record of the produced sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    /// URL path, or an absolute URL when a site URL is configured.
    pub url: String,
    pub last_modified: DateTime<Utc>,
    pub change_frequency: ChangeFrequency,
    /// Relative weight in `0.0..=1.0`.
    pub priority: f32,
}
