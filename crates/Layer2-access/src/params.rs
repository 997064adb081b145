//! Operation parameters
//!
//! Calls carry a closed set of parameter shapes instead of a permissive
//! string-to-anything map, so new call sites get exhaustiveness checking at
//! compile time. `Custom` remains the escape hatch for one-off endpoints.
//!
//! Two calls coalesce and share cache entries exactly when their
//! signatures are equal, so `signature()` must not depend on field or map
//! insertion order. Canonical JSON (sorted keys at every level) gives that.

use std::time::Duration;

use serde_json::{Map, Value};

use relay_foundation::cache::canonical_json;

/// Parameter shape for one call
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// No parameters (e.g. viewer/self lookups)
    None,
    /// A single repository
    Repo { owner: String, repo: String },
    /// A repository-scoped listing with optional paging and filters
    List {
        owner: String,
        repo: String,
        page: Option<u32>,
        per_page: Option<u32>,
        filters: Map<String, Value>,
    },
    /// A search with optional paging
    Search {
        query: String,
        page: Option<u32>,
        per_page: Option<u32>,
    },
    /// Anything else
    Custom(Map<String, Value>),
}

impl Params {
    /// Repository parameters
    pub fn repo(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Params::Repo {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Listing parameters without paging or filters
    pub fn list(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Params::List {
            owner: owner.into(),
            repo: repo.into(),
            page: None,
            per_page: None,
            filters: Map::new(),
        }
    }

    /// Search parameters without paging
    pub fn search(query: impl Into<String>) -> Self {
        Params::Search {
            query: query.into(),
            page: None,
            per_page: None,
        }
    }

    /// JSON view of the parameters; absent options are omitted, not null
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            Params::None => {}
            Params::Repo { owner, repo } => {
                map.insert("owner".into(), Value::from(owner.as_str()));
                map.insert("repo".into(), Value::from(repo.as_str()));
            }
            Params::List {
                owner,
                repo,
                page,
                per_page,
                filters,
            } => {
                map.insert("owner".into(), Value::from(owner.as_str()));
                map.insert("repo".into(), Value::from(repo.as_str()));
                if let Some(page) = page {
                    map.insert("page".into(), Value::from(*page));
                }
                if let Some(per_page) = per_page {
                    map.insert("per_page".into(), Value::from(*per_page));
                }
                for (k, v) in filters {
                    map.insert(k.clone(), v.clone());
                }
            }
            Params::Search {
                query,
                page,
                per_page,
            } => {
                map.insert("q".into(), Value::from(query.as_str()));
                if let Some(page) = page {
                    map.insert("page".into(), Value::from(*page));
                }
                if let Some(per_page) = per_page {
                    map.insert("per_page".into(), Value::from(*per_page));
                }
            }
            Params::Custom(custom) => {
                for (k, v) in custom {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Object(map)
    }

    /// Canonical signature: equal for logically identical parameters
    /// regardless of construction order
    pub fn signature(&self) -> String {
        canonical_json(&self.to_value())
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::None
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// TTL override; `Some(Duration::ZERO)` disables caching for the call
    pub cache_ttl: Option<Duration>,
    /// Bypass the response cache (no lookup, no store)
    pub skip_cache: bool,
    /// Bypass coalescing; the call always issues its own fetch
    pub skip_deduplication: bool,
}

impl CallOptions {
    /// Options for a mutating call: no caching, no coalescing
    pub fn mutation() -> Self {
        Self {
            cache_ttl: Some(Duration::ZERO),
            skip_cache: true,
            skip_deduplication: true,
        }
    }

    /// Set an explicit TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Per-call options for GraphQL documents
#[derive(Debug, Clone, Default)]
pub struct GraphQLOptions {
    /// TTL override for the query cache
    pub ttl: Option<Duration>,
    /// Bypass the GraphQL cache (including stale-on-error)
    pub skip_cache: bool,
    /// Bypass coalescing
    pub skip_deduplication: bool,
    /// Override mutation detection; `None` inspects the document text
    pub is_mutation: Option<bool>,
}

impl GraphQLOptions {
    /// Set an explicit TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_ignores_map_order() {
        let mut a = Map::new();
        a.insert("x".into(), json!(1));
        a.insert("y".into(), json!(2));
        let mut b = Map::new();
        b.insert("y".into(), json!(2));
        b.insert("x".into(), json!(1));

        assert_eq!(
            Params::Custom(a).signature(),
            Params::Custom(b).signature()
        );
    }

    #[test]
    fn test_signature_distinguishes_values() {
        assert_ne!(
            Params::repo("a", "b").signature(),
            Params::repo("a", "c").signature()
        );
        assert_eq!(Params::None.signature(), "{}");
    }

    #[test]
    fn test_absent_paging_omitted() {
        let with = Params::Search {
            query: "q".into(),
            page: Some(2),
            per_page: None,
        };
        let without = Params::search("q");
        assert_ne!(with.signature(), without.signature());
        assert!(!without.signature().contains("page"));
    }
}
