use crate::store::{
    ConnectionError, ContentItem, ContentStore, QueryError, ServiceIdentity, StoreSession,
};
use crate::utils::{property, ContentPath, PathError, USER_HOME_ROOT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Placeholder used when a page carries no author
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Error, Debug)]
pub enum AuthorError {
    #[error("Path parameter is required")]
    PathRequired,

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Connection error: {0}")]
    ConnectionError(#[from] ConnectionError),

    #[error("Query error: {0}")]
    QueryError(#[from] QueryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPageInfo {
    pub title: String,
    pub path: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Author of a page and the child pages they also last modified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub first_name: String,
    pub last_name: String,
    pub child_pages: Vec<ChildPageInfo>,
}

impl AuthorInfo {
    fn unknown() -> Self {
        Self {
            first_name: UNKNOWN_AUTHOR.to_string(),
            last_name: UNKNOWN_AUTHOR.to_string(),
            child_pages: Vec::new(),
        }
    }
}

/// Look up who last modified `page_path`.
pub async fn get_author_info(
    store: &dyn ContentStore,
    identity: &ServiceIdentity,
    page_path: &str,
) -> Result<AuthorInfo, AuthorError> {
    if page_path.trim().is_empty() {
        return Err(AuthorError::PathRequired);
    }
    let page_path = ContentPath::parse(page_path)?;

    let mut session = store.connect(identity).await?;
    let result = lookup(session.as_mut(), &page_path).await;
    session.release().await;
    result
}

async fn lookup(
    session: &mut dyn StoreSession,
    page_path: &ContentPath,
) -> Result<AuthorInfo, AuthorError> {
    session.begin().await?;

    let page = session
        .get_item(page_path.as_str())
        .await?
        .ok_or_else(|| AuthorError::PageNotFound(page_path.to_string()))?;

    let Some(author) = page.string_property(property::LAST_MODIFIED_BY) else {
        return Ok(AuthorInfo::unknown());
    };

    let (first_name, last_name) = profile_names(session, &author).await;
    let child_pages = children_by_author(session, page_path, &author).await;

    Ok(AuthorInfo {
        first_name,
        last_name,
        child_pages,
    })
}

/// Profile path `/home/users/<first char>/<user id>`
pub fn profile_path(user_id: &str) -> Option<ContentPath> {
    let initial = user_id.chars().next()?;
    ContentPath::parse(USER_HOME_ROOT)
        .ok()?
        .join(&initial.to_string())
        .ok()?
        .join(user_id)
        .ok()
}

/// Given and family name, falling back to the user id and an empty string
async fn profile_names(session: &mut dyn StoreSession, user_id: &str) -> (String, String) {
    let fallback = (user_id.to_string(), String::new());

    let Some(path) = profile_path(user_id) else {
        debug!(user = %user_id, "User id cannot be mapped to a profile path");
        return fallback;
    };

    match session.get_item(path.as_str()).await {
        Ok(Some(profile)) => (
            profile
                .string_property(property::GIVEN_NAME)
                .unwrap_or(fallback.0),
            profile
                .string_property(property::FAMILY_NAME)
                .unwrap_or(fallback.1),
        ),
        Ok(None) => fallback,
        Err(e) => {
            debug!(user = %user_id, error = %e, "Could not read user profile");
            fallback
        }
    }
}

async fn children_by_author(
    session: &mut dyn StoreSession,
    page_path: &ContentPath,
    author: &str,
) -> Vec<ChildPageInfo> {
    let children = match session.list_children(page_path.as_str()).await {
        Ok(children) => children,
        Err(e) => {
            error!(page = %page_path, error = %e, "Error listing child pages");
            return Vec::new();
        }
    };

    children
        .iter()
        .filter(|child| modified_by(child, author))
        .map(|child| ChildPageInfo {
            title: child.string_property(property::TITLE).unwrap_or_default(),
            path: child.path.clone(),
            last_modified: child.date_property(property::LAST_MODIFIED).ok().flatten(),
        })
        .collect()
}

/// Compared in the same string form the author id was read in
fn modified_by(item: &ContentItem, author: &str) -> bool {
    item.string_property(property::LAST_MODIFIED_BY)
        .map_or(false, |v| v == author)
}
