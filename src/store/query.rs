use super::types::ContentItem;
use crate::utils::ContentPath;
use std::fmt;

/// A condition an item must satisfy to match a query.
///
/// Terms are carried as data and compared literally, never spliced into
/// query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The named property exists
    HasProperty(String),
    /// At least one of the named properties contains `term`, ignoring case
    AnyContains { properties: Vec<String>, term: String },
}

impl Predicate {
    pub fn matches(&self, item: &ContentItem) -> bool {
        match self {
            Predicate::HasProperty(name) => item.has_property(name),
            Predicate::AnyContains { properties, term } => {
                let needle = term.to_lowercase();
                properties.iter().any(|name| {
                    item.get(name)
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            }
        }
    }
}

/// Declarative query over the descendants of `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    pub root: ContentPath,
    pub predicates: Vec<Predicate>,
}

impl ContentQuery {
    pub fn descendants_of(root: ContentPath) -> Self {
        Self {
            root,
            predicates: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: &str) -> Self {
        self.predicates.push(Predicate::HasProperty(name.to_string()));
        self
    }

    pub fn containing(mut self, properties: &[&str], term: &str) -> Self {
        self.predicates.push(Predicate::AnyContains {
            properties: properties.iter().map(|p| p.to_string()).collect(),
            term: term.to_string(),
        });
        self
    }

    /// True if `item` lies below the root and satisfies every predicate
    pub fn matches(&self, item: &ContentItem) -> bool {
        let below_root = ContentPath::parse(&item.path)
            .map(|p| p.is_descendant_of(&self.root))
            .unwrap_or(false);
        below_root && self.predicates.iter().all(|p| p.matches(item))
    }
}

/// Escape a literal for display inside a single-quoted LIKE pattern.
pub fn escape_literal(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

impl fmt::Display for ContentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "descendants of '{}'", escape_literal(self.root.as_str()))?;
        for predicate in &self.predicates {
            match predicate {
                Predicate::HasProperty(name) => write!(f, " and [{}] is not null", name)?,
                Predicate::AnyContains { properties, term } => {
                    let term = escape_literal(term);
                    let clauses: Vec<String> = properties
                        .iter()
                        .map(|name| format!("[{}] like '%{}%'", name, term))
                        .collect();
                    write!(f, " and ({})", clauses.join(" or "))?;
                }
            }
        }
        Ok(())
    }
}
