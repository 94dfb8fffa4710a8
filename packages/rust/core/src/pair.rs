//! Fetch-and-decide for a single service×location pair.

use std::time::Duration;

use pagegen_content::ContentStore;
use pagegen_gateway::FetchGateway;
use pagegen_indexing::{DecisionEngine, PageCandidate, text};
use pagegen_shared::{IndexDecision, LocationEntity, PagegenError, RichContent, ServiceEntity};

/// Why a pair could not be evaluated at all.
#[derive(Debug, thiserror::Error)]
pub enum PairFailure {
    /// Fetching the page body failed (rejected or retries exhausted).
    #[error(transparent)]
    Fetch(#[from] PagegenError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The evaluation task ended without a result (panic or cancellation).
    #[error("evaluation task aborted: {0}")]
    Aborted(String),
}

impl PairFailure {
    /// Gateway operation behind a fetch failure, e.g. `page:implants/leeds`.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Fetch(err) => err.operation(),
            Self::Timeout(_) | Self::Aborted(_) => None,
        }
    }
}

/// Evaluated decision, or the reason no decision could be made.
///
/// Both non-indexable decisions and failures keep the page out of the sitemap,
/// but they are reported separately.
pub type PairOutcome = Result<IndexDecision, PairFailure>;

/// Fetch (or estimate) the body for a pair and run the decision engine.
pub async fn evaluate_pair<S>(
    store: &S,
    gateway: &FetchGateway,
    engine: &DecisionEngine,
    service: &ServiceEntity,
    location: &LocationEntity,
) -> PairOutcome
where
    S: ContentStore + ?Sized,
{
    evaluate(store, gateway, engine, service, location, None).await
}

/// [`evaluate_pair`] with each body fetch bounded by `timeout` once it holds a
/// gateway slot; an overrun becomes [`PairFailure::Timeout`].
///
/// Waiting for a slot does not count.
pub async fn evaluate_pair_within<S>(
    timeout: Duration,
    store: &S,
    gateway: &FetchGateway,
    engine: &DecisionEngine,
    service: &ServiceEntity,
    location: &LocationEntity,
) -> PairOutcome
where
    S: ContentStore + ?Sized,
{
    evaluate(store, gateway, engine, service, location, Some(timeout)).await
}

async fn evaluate<S>(
    store: &S,
    gateway: &FetchGateway,
    engine: &DecisionEngine,
    service: &ServiceEntity,
    location: &LocationEntity,
    timeout: Option<Duration>,
) -> PairOutcome
where
    S: ContentStore + ?Sized,
{
    let operation = format!("page:{}/{}", service.slug, location.slug);
    let lookup = || store.page_body(&service.slug, &location.slug);
    let fetched = match timeout {
        Some(limit) => gateway.fetch_within(&operation, limit, lookup).await,
        None => gateway.fetch(&operation, lookup).await,
    };

    let body = match fetched {
        Ok(body) => body.unwrap_or_else(|| estimated_body(service, location)),
        Err(PagegenError::FetchTimedOut { after, .. }) => return Err(PairFailure::Timeout(after)),
        Err(err) => return Err(err.into()),
    };

    Ok(engine.evaluate(&PageCandidate::new(service, location, Some(&body))))
}

/// Body the page template would render when no dedicated entry exists:
/// the service description followed by the location's unique content.
pub fn estimated_body(service: &ServiceEntity, location: &LocationEntity) -> RichContent {
    let local = location
        .unique_content
        .as_ref()
        .map(text::plain_text)
        .unwrap_or_default();

    RichContent::Plain(format!("{} {}", service.description, local).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_joins_description_and_local_content() {
        let service = ServiceEntity {
            slug: "dental-implants".into(),
            name: "Dental Implants".into(),
            category: "restorative".into(),
            description: "Fixed replacement teeth.".into(),
            priority: false,
            updated_at: None,
        };
        let mut location = LocationEntity {
            slug: "beeston".into(),
            suburb: "Beeston".into(),
            city: "Nottingham".into(),
            tier: None,
            unique_content: Some(RichContent::Html("<p>Parking on Chilwell Road.</p>".into())),
            testimonials: vec![],
            updated_at: None,
        };

        let body = estimated_body(&service, &location);
        assert_eq!(
            body,
            RichContent::Plain("Fixed replacement teeth. Parking on Chilwell Road.".into())
        );

        location.unique_content = None;
        assert_eq!(
            estimated_body(&service, &location),
            RichContent::Plain("Fixed replacement teeth.".into())
        );
    }

    #[test]
    fn failure_messages() {
        let timeout = PairFailure::Timeout(Duration::from_secs(30));
        assert_eq!(timeout.to_string(), "timed out after 30s");

        let fetch = PairFailure::from(PagegenError::FetchRejected {
            operation: "page:implants/leeds".into(),
            status: Some(404),
            message: "HTTP 404: ".into(),
        });
        assert!(fetch.to_string().contains("page:implants/leeds"));
        assert_eq!(fetch.operation(), Some("page:implants/leeds"));
        assert_eq!(timeout.operation(), None);
    }
}
