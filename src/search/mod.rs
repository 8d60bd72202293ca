use crate::store::{
    ConnectionError, ContentItem, ContentQuery, ContentStore, QueryError, ServiceIdentity,
    StoreSession,
};
use crate::utils::{property, ContentPath};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Connection error: {0}")]
    ConnectionError(#[from] ConnectionError),

    #[error("Query error: {0}")]
    QueryError(#[from] QueryError),
}

/// One page matching a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub title: String,
    pub description: String,
    pub image_path: Option<String>,
    pub page_path: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl SearchResult {
    fn from_item(item: &ContentItem) -> Self {
        Self {
            title: item.string_property(property::TITLE).unwrap_or_default(),
            description: item.string_property(property::DESCRIPTION).unwrap_or_default(),
            image_path: item.string_property(property::IMAGE_REFERENCE),
            page_path: item.path.clone(),
            // an unparsable date is reported as missing
            last_modified: item.date_property(property::LAST_MODIFIED).ok().flatten(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub term: String,
    pub results: Vec<SearchResult>,
}

impl SearchResults {
    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }
}

/// Free-text search over page titles and descriptions below `root`.
///
/// The term is matched literally and case-insensitively. A blank term
/// returns no results without opening a session.
pub async fn search_pages(
    store: &dyn ContentStore,
    identity: &ServiceIdentity,
    root: &ContentPath,
    term: &str,
) -> Result<SearchResults, SearchError> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(SearchResults {
            term: String::new(),
            results: Vec::new(),
        });
    }

    let query = ContentQuery::descendants_of(root.clone())
        .containing(&[property::TITLE, property::DESCRIPTION], term);
    debug!(query = %query, "Searching pages");

    let mut session = store.connect(identity).await?;
    let result = run_query(session.as_mut(), &query).await;
    session.release().await;

    let items = result?;
    Ok(SearchResults {
        term: term.to_string(),
        results: items.iter().map(SearchResult::from_item).collect(),
    })
}

async fn run_query(
    session: &mut dyn StoreSession,
    query: &ContentQuery,
) -> Result<Vec<ContentItem>, SearchError> {
    session.begin().await?;
    Ok(session.query(query).await?)
}
