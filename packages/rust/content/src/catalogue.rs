//! Paginated catalogue fetching through the gateway.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use pagegen_gateway::FetchGateway;
use pagegen_shared::{LocationEntity, PagegenError, Result, ServiceEntity};

use crate::store::{ContentStore, RawEntry};

/// Canonical slug shape: lowercase alphanumerics separated by single hyphens.
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug regex"));

/// An entity decoded from a catalogue entry.
pub trait CatalogueEntity: DeserializeOwned + Send {
    fn slug(&self) -> &str;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

impl CatalogueEntity for ServiceEntity {
    fn slug(&self) -> &str {
        &self.slug
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

impl CatalogueEntity for LocationEntity {
    fn slug(&self) -> &str {
        &self.slug
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

/// Fetch every entry of `content_type`, one gateway call per page.
///
/// Entries whose fields cannot be decoded are skipped with a warning.
/// Duplicate slugs are a validation error, since they would collide in URLs.
#[instrument(skip(store, gateway), fields(content_type = %content_type))]
pub async fn fetch_catalogue<E, S>(
    store: &S,
    gateway: &FetchGateway,
    content_type: &str,
    page_size: u32,
) -> Result<Vec<E>>
where
    E: CatalogueEntity,
    S: ContentStore + ?Sized,
{
    let mut raw: Vec<RawEntry> = Vec::new();
    let mut skip: u32 = 0;

    loop {
        let operation = format!("catalogue:{content_type}@{skip}");
        let page = gateway
            .fetch(&operation, || store.entries_page(content_type, skip, page_size))
            .await?;

        let received = page.items.len() as u32;
        raw.extend(page.items);

        if received == 0 || skip + received >= page.total {
            break;
        }
        skip += received;
    }

    let entities = decode_entries::<E>(content_type, raw)?;
    info!(count = entities.len(), "catalogue fetched");
    Ok(entities)
}

/// Decode raw entries into entities and enforce slug uniqueness.
pub fn decode_entries<E: CatalogueEntity>(content_type: &str, raw: Vec<RawEntry>) -> Result<Vec<E>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entities = Vec::with_capacity(raw.len());

    for entry in raw {
        let decoded = serde_json::from_value::<E>(entry.fields).map_err(|e| {
            PagegenError::parse(format!("{content_type} entry `{}`: {e}", entry.id))
        });
        let mut entity = match decoded {
            Ok(entity) => entity,
            Err(err) => {
                warn!(error = %err, "skipping undecodable entry");
                continue;
            }
        };

        if let Some(at) = entry.updated_at {
            entity.set_updated_at(at);
        }

        let slug = entity.slug().to_string();
        if !SLUG_RE.is_match(&slug) {
            warn!(id = %entry.id, %slug, "slug is not lowercase-hyphenated");
        }
        if !seen.insert(slug.clone()) {
            return Err(PagegenError::validation(format!(
                "duplicate {content_type} slug `{slug}`"
            )));
        }

        entities.push(entity);
    }

    Ok(entities)
}
