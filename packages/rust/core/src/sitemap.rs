//! Sitemap entry assembly: paths, priorities, timestamps, de-duplication.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use pagegen_shared::{
    ChangeFrequency, LocationEntity, LocationTier, PagegenError, Result, ServiceEntity,
    SitemapEntry, StaticRoute,
};

/// Path of a generated page: `/<namespace>/<service>/<location>`.
///
/// Slugs are percent-encoded as single path segments, so a slug can never
/// add segments or turn the path into a scheme-relative or foreign URL.
pub fn page_path(namespace: &str, service: &str, location: &str) -> String {
    let service = encode_segment(service);
    let location = encode_segment(location);
    if namespace.is_empty() {
        format!("/{service}/{location}")
    } else {
        format!("/{namespace}/{service}/{location}")
    }
}

fn encode_segment(segment: &str) -> String {
    // `byte_serialize` targets form bodies; a literal `+` is already `%2B`.
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Sitemap priority for a pair: location tier weight plus a bump for
/// priority services, clamped to `0.0..=1.0`.
pub fn page_priority(service: &ServiceEntity, location: &LocationEntity) -> f32 {
    let base: f32 = match location.tier {
        Some(LocationTier::Major) => 0.8,
        Some(LocationTier::Secondary) => 0.7,
        Some(LocationTier::Tertiary) | None => 0.6,
    };
    let bump = if service.priority { 0.1 } else { 0.0 };
    round_priority((base + bump).clamp(0.0, 1.0))
}

fn round_priority(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Later of the two entity timestamps, falling back to `run_at`.
pub fn page_last_modified(
    service: &ServiceEntity,
    location: &LocationEntity,
    run_at: DateTime<Utc>,
) -> DateTime<Utc> {
    service
        .updated_at
        .into_iter()
        .chain(location.updated_at)
        .max()
        .unwrap_or(run_at)
}

/// Resolve a site-relative path against the optional site URL.
///
/// The site URL's own path is kept as a prefix, so `https://example.com/clinic`
/// and `/services/a/b` give `https://example.com/clinic/services/a/b`.
pub fn resolve_url(site_url: Option<&Url>, path: &str) -> Result<String> {
    let Some(base) = site_url else {
        return Ok(path.to_string());
    };

    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    // `./` keeps a leading `name:` segment from parsing as a scheme.
    base.join(&format!("./{}", path.trim_start_matches('/')))
        .map(|u| u.to_string())
        .map_err(|e| PagegenError::validation(format!("cannot resolve `{path}` against {base}: {e}")))
}

/// Outcome of one candidate pair, as reported after a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CandidateStatus {
    Indexed,
    Rejected { reasons: Vec<String> },
    Failed { error: String },
}

/// One row of the candidate report, in services-outer/locations-inner order.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub service: String,
    pub location: String,
    pub path: String,
    #[serde(flatten)]
    pub status: CandidateStatus,
}

impl CandidateReport {
    pub fn is_indexed(&self) -> bool {
        matches!(self.status, CandidateStatus::Indexed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CandidateStatus::Failed { .. })
    }
}

/// Ordered sitemap accumulator that drops repeated URLs.
#[derive(Debug, Default)]
pub struct SitemapBuilder {
    entries: Vec<SitemapEntry>,
    seen: HashSet<String>,
}

impl SitemapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` unless its URL is already present. Returns whether it was kept.
    pub fn push(&mut self, entry: SitemapEntry) -> bool {
        if !self.seen.insert(entry.url.clone()) {
            tracing::debug!(url = %entry.url, "dropping duplicate sitemap url");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Append every static route, stamped with `run_at`.
    pub fn push_static(
        &mut self,
        routes: &[StaticRoute],
        site_url: Option<&Url>,
        run_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut added = 0;
        for route in routes {
            let kept = self.push(SitemapEntry {
                url: resolve_url(site_url, &route.path)?,
                last_modified: run_at,
                change_frequency: route.change_frequency,
                priority: route.priority,
            });
            added += usize::from(kept);
        }
        Ok(added)
    }

    /// Append the entry for an indexable pair.
    pub fn push_page(
        &mut self,
        path: &str,
        service: &ServiceEntity,
        location: &LocationEntity,
        site_url: Option<&Url>,
        run_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.push(SitemapEntry {
            url: resolve_url(site_url, path)?,
            last_modified: page_last_modified(service, location, run_at),
            change_frequency: ChangeFrequency::Monthly,
            priority: page_priority(service, location),
        }))
    }

    pub fn finish(self) -> Vec<SitemapEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn service(priority: bool, updated: Option<DateTime<Utc>>) -> ServiceEntity {
        ServiceEntity {
            slug: "teeth-whitening".into(),
            name: "Teeth Whitening".into(),
            category: "cosmetic".into(),
            description: String::new(),
            priority,
            updated_at: updated,
        }
    }

    fn location(tier: Option<LocationTier>, updated: Option<DateTime<Utc>>) -> LocationEntity {
        LocationEntity {
            slug: "nottingham".into(),
            suburb: "Nottingham".into(),
            city: "Nottingham".into(),
            tier,
            unique_content: None,
            testimonials: vec![],
            updated_at: updated,
        }
    }

    #[test]
    fn paths() {
        assert_eq!(page_path("services", "implants", "leeds"), "/services/implants/leeds");
        assert_eq!(page_path("", "implants", "leeds"), "/implants/leeds");
    }

    #[test]
    fn paths_encode_odd_slugs_as_single_segments() {
        assert_eq!(page_path("", "mailto:x", "leeds"), "/mailto%3Ax/leeds");
        assert_eq!(page_path("services", "a/b", "c d"), "/services/a%2Fb/c%20d");
        assert_eq!(page_path("services", "c++", "leeds"), "/services/c%2B%2B/leeds");
        assert_eq!(page_path("", "//evil.example", "x"), "/%2F%2Fevil.example/x");
    }

    #[test]
    fn priority_by_tier_and_service() {
        assert_eq!(page_priority(&service(false, None), &location(Some(LocationTier::Major), None)), 0.8);
        assert_eq!(page_priority(&service(true, None), &location(Some(LocationTier::Major), None)), 0.9);
        assert_eq!(page_priority(&service(false, None), &location(Some(LocationTier::Secondary), None)), 0.7);
        assert_eq!(page_priority(&service(true, None), &location(Some(LocationTier::Tertiary), None)), 0.7);
        assert_eq!(page_priority(&service(false, None), &location(None, None)), 0.6);
    }

    #[test]
    fn last_modified_takes_the_later_timestamp() {
        let run = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        assert_eq!(page_last_modified(&service(false, Some(early)), &location(None, Some(late)), run), late);
        assert_eq!(page_last_modified(&service(false, Some(late)), &location(None, None), run), late);
        assert_eq!(page_last_modified(&service(false, None), &location(None, None), run), run);
    }

    #[test]
    fn resolves_against_site_url() {
        assert_eq!(resolve_url(None, "/services/a/b").unwrap(), "/services/a/b");

        let root = Url::parse("https://smile.example").unwrap();
        assert_eq!(resolve_url(Some(&root), "/").unwrap(), "https://smile.example/");
        assert_eq!(
            resolve_url(Some(&root), "/services/a/b").unwrap(),
            "https://smile.example/services/a/b"
        );

        let nested = Url::parse("https://smile.example/clinic").unwrap();
        assert_eq!(
            resolve_url(Some(&nested), "/services/a/b").unwrap(),
            "https://smile.example/clinic/services/a/b"
        );
    }

    #[test]
    fn resolved_urls_stay_under_the_site() {
        let root = Url::parse("https://smile.example").unwrap();
        assert_eq!(
            resolve_url(Some(&root), "/mailto:x/leeds").unwrap(),
            "https://smile.example/mailto:x/leeds"
        );
        assert_eq!(
            resolve_url(Some(&root), &page_path("", "mailto:x", "leeds")).unwrap(),
            "https://smile.example/mailto%3Ax/leeds"
        );
    }

    #[test]
    fn builder_keeps_first_occurrence() {
        let run = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let routes = vec![
            StaticRoute {
                path: "/".into(),
                priority: 1.0,
                change_frequency: ChangeFrequency::Weekly,
            },
            StaticRoute {
                path: "/services/teeth-whitening/nottingham".into(),
                priority: 0.5,
                change_frequency: ChangeFrequency::Yearly,
            },
        ];

        let mut builder = SitemapBuilder::new();
        assert_eq!(builder.push_static(&routes, None, run).unwrap(), 2);

        let added = builder
            .push_page(
                "/services/teeth-whitening/nottingham",
                &service(true, None),
                &location(Some(LocationTier::Major), None),
                None,
                run,
            )
            .unwrap();
        assert!(!added);

        let entries = builder.finish();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].priority, 0.5);
        assert_eq!(entries[1].change_frequency, ChangeFrequency::Yearly);
    }

    #[test]
    fn candidate_report_serializes_flat() {
        let row = CandidateReport {
            service: "implants".into(),
            location: "leeds".into(),
            path: "/services/implants/leeds".into(),
            status: CandidateStatus::Rejected {
                reasons: vec!["service not prioritized".into()],
            },
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reasons"][0], "service not prioritized");
        assert!(!row.is_indexed());
        assert!(!row.is_failed());
    }
}
