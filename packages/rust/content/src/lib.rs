//! Content-store boundary: the [`ContentStore`] seam, its HTTP client, and
//! paginated catalogue fetching through the fetch gateway.

mod catalogue;
mod store;

pub use catalogue::{CatalogueEntity, decode_entries, fetch_catalogue};
pub use store::{ContentStore, EntriesPage, HttpContentStore, RawEntry, parse_retry_after};
