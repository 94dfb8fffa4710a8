//! Indexability rules and the page candidate they inspect.

use std::collections::HashSet;

use pagegen_shared::{LocationEntity, RichContent, ServiceEntity};

use crate::text;

/// A prospective service×location page, with the derived fields rules look at.
#[derive(Debug, Clone)]
pub struct PageCandidate<'a> {
    pub service: &'a ServiceEntity,
    pub location: &'a LocationEntity,
    /// Words in the page body's plain text.
    pub word_count: usize,
    /// Testimonials or unique local content exist for the location.
    pub has_local_proof: bool,
}

impl<'a> PageCandidate<'a> {
    /// Build a candidate, deriving word count from `body` (missing body counts 0).
    pub fn new(
        service: &'a ServiceEntity,
        location: &'a LocationEntity,
        body: Option<&RichContent>,
    ) -> Self {
        let has_local_proof = !location.testimonials.is_empty()
            || text::has_text(location.unique_content.as_ref());

        Self {
            service,
            location,
            word_count: text::word_count(body),
            has_local_proof,
        }
    }
}

/// One independently checkable indexability rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Service slug must be in the priority list (case-insensitive).
    ServiceAllow { allowed: HashSet<String> },
    /// Location slug must be in the suburb allow-list (case-insensitive).
    LocationAllow { allowed: HashSet<String> },
    /// Body must have at least `min_words` words.
    ContentDepth { min_words: usize },
    /// Location must carry testimonials or unique content.
    LocalProof,
}

impl Rule {
    pub fn service_allow<I, S>(slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::ServiceAllow {
            allowed: normalize(slugs),
        }
    }

    pub fn location_allow<I, S>(slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::LocationAllow {
            allowed: normalize(slugs),
        }
    }

    /// Short identifier for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServiceAllow { .. } => "service_allow",
            Self::LocationAllow { .. } => "location_allow",
            Self::ContentDepth { .. } => "content_depth",
            Self::LocalProof => "local_proof",
        }
    }

    /// `None` if the candidate passes, otherwise the rejection reason.
    pub fn check(&self, candidate: &PageCandidate<'_>) -> Option<String> {
        match self {
            Self::ServiceAllow { allowed } => (!contains(allowed, &candidate.service.slug))
                .then(|| "service not prioritized".to_string()),
            Self::LocationAllow { allowed } => (!contains(allowed, &candidate.location.slug))
                .then(|| "location not allow-listed".to_string()),
            Self::ContentDepth { min_words } => (candidate.word_count < *min_words).then(|| {
                format!("content too short ({} < {min_words})", candidate.word_count)
            }),
            Self::LocalProof => {
                (!candidate.has_local_proof).then(|| "missing local proof".to_string())
            }
        }
    }
}

fn normalize<I, S>(slugs: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    slugs
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn contains(allowed: &HashSet<String>, slug: &str) -> bool {
    allowed.contains(&slug.trim().to_lowercase())
}
