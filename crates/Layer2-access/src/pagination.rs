//! Pagination engine
//!
//! Flattens offset-based and cursor-based multi-page fetches into single
//! result sets. Page fetches deliberately bypass the single-response cache:
//! caching individual pages of a larger accumulation would leave
//! inconsistent partial state behind.
//!
//! A mid-stream fetch error stops pagination and returns the partial result
//! accumulated so far; retrying is the caller's concern (layer the fetch
//! through the reliability manager if desired). Callers distinguish a
//! natural end from an incomplete fetch via `complete`/`has_more` plus the
//! carried terminal error.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_foundation::config::PaginationSettings;

use crate::error::ApiError;

/// Progress callback: (accumulated item count, total count when known)
pub type ProgressFn = Box<dyn FnMut(usize, Option<u64>) + Send>;

/// Options for offset pagination
pub struct OffsetOptions {
    /// Requested page size
    pub per_page: u32,
    /// Hard page budget
    pub max_pages: u32,
    /// Hard item budget; the final page is truncated to fit
    pub max_items: Option<usize>,
    /// Fires after every fetched page
    pub on_progress: Option<ProgressFn>,
}

/// Options for cursor pagination
pub struct CursorOptions {
    /// Requested page size; shrunk when it would overshoot `max_items`
    pub first: u32,
    /// Resume cursor
    pub after: Option<String>,
    /// Hard page budget
    pub max_pages: u32,
    /// Hard item budget
    pub max_items: Option<usize>,
    /// When false, fetch exactly one page
    pub auto_page: bool,
    /// Fires after every fetched page
    pub on_progress: Option<ProgressFn>,
}

/// Cursor position descriptor from a page response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a cursor-paginated response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CursorPage {
    pub nodes: Vec<Value>,
    pub page_info: PageInfo,
    pub total_count: Option<u64>,
}

/// Request for one cursor page
#[derive(Debug, Clone)]
pub struct CursorRequest {
    pub first: u32,
    pub after: Option<String>,
}

/// Flattened offset pagination outcome
#[derive(Debug)]
pub struct OffsetResult {
    pub items: Vec<Value>,
    pub pages_fetched: u32,
    /// True only when the natural end of the result set was reached
    pub complete: bool,
    /// Terminal fetch error, when pagination stopped on one
    pub error: Option<ApiError>,
}

/// Flattened cursor pagination outcome
#[derive(Debug)]
pub struct CursorResult {
    pub data: Vec<Value>,
    pub page_info: PageInfo,
    pub total_count: Option<u64>,
    /// More data remains upstream (budget stop, or stop on error)
    pub has_more: bool,
    /// Cursor to resume from
    pub next_cursor: Option<String>,
    pub pages_fetched: u32,
    /// Terminal fetch error, when pagination stopped on one
    pub error: Option<ApiError>,
}

/// Flattens multi-page fetches into single result sets
pub struct PaginationEngine {
    defaults: PaginationSettings,
}

impl PaginationEngine {
    pub fn new(defaults: PaginationSettings) -> Self {
        Self { defaults }
    }

    /// Offset options seeded from configured defaults
    pub fn offset_options(&self) -> OffsetOptions {
        OffsetOptions {
            per_page: self.defaults.per_page,
            max_pages: self.defaults.max_pages,
            max_items: Some(self.defaults.max_items),
            on_progress: None,
        }
    }

    /// Cursor options seeded from configured defaults
    pub fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            first: self.defaults.first,
            after: None,
            max_pages: self.defaults.max_pages,
            max_items: Some(self.defaults.max_items),
            auto_page: true,
            on_progress: None,
        }
    }

    /// Repeatedly fetch `(page, per_page)` until the natural end or a budget
    ///
    /// Stops on an empty page, a short page, `max_pages`, or `max_items`
    /// (truncating the final page to the remaining budget).
    pub async fn paginate_offset<F, Fut>(&self, mut fetch: F, mut opts: OffsetOptions) -> OffsetResult
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<Vec<Value>, ApiError>>,
    {
        let per_page = opts.per_page.max(1);
        let mut items: Vec<Value> = Vec::new();
        let mut pages_fetched = 0u32;

        while pages_fetched < opts.max_pages {
            let page = match fetch(pages_fetched + 1, per_page).await {
                Ok(page) => page,
                Err(err) => {
                    return OffsetResult {
                        items,
                        pages_fetched,
                        complete: false,
                        error: Some(err),
                    };
                }
            };
            pages_fetched += 1;

            let fetched_len = page.len();
            let mut page = page;
            if let Some(max) = opts.max_items {
                let remaining = max.saturating_sub(items.len());
                if page.len() > remaining {
                    page.truncate(remaining);
                }
            }
            items.extend(page);

            if let Some(cb) = opts.on_progress.as_mut() {
                cb(items.len(), None);
            }

            if let Some(max) = opts.max_items {
                if items.len() >= max {
                    return OffsetResult {
                        items,
                        pages_fetched,
                        complete: false,
                        error: None,
                    };
                }
            }
            if fetched_len < per_page as usize {
                // Natural end: empty or short page
                return OffsetResult {
                    items,
                    pages_fetched,
                    complete: true,
                    error: None,
                };
            }
        }

        OffsetResult {
            items,
            pages_fetched,
            complete: false,
            error: None,
        }
    }

    /// Repeatedly fetch cursor pages until `has_next_page` is false or a
    /// budget is hit
    ///
    /// Before each call, a full page that would overshoot the remaining
    /// `max_items` budget shrinks its `first` to exactly that budget.
    pub async fn paginate_cursor<F, Fut>(&self, mut fetch: F, mut opts: CursorOptions) -> CursorResult
    where
        F: FnMut(CursorRequest) -> Fut,
        Fut: Future<Output = Result<CursorPage, ApiError>>,
    {
        let max_pages = if opts.auto_page { opts.max_pages } else { 1 };
        let mut data: Vec<Value> = Vec::new();
        let mut cursor = opts.after.clone();
        let mut page_info = PageInfo::default();
        let mut total_count: Option<u64> = None;
        let mut pages_fetched = 0u32;
        let mut error = None;

        while pages_fetched < max_pages {
            let mut first = opts.first.max(1);
            if let Some(max) = opts.max_items {
                let remaining = max.saturating_sub(data.len());
                if remaining == 0 {
                    break;
                }
                if first as usize > remaining {
                    first = remaining as u32;
                }
            }

            let page = match fetch(CursorRequest {
                first,
                after: cursor.clone(),
            })
            .await
            {
                Ok(page) => page,
                Err(err) => {
                    error = Some(err);
                    break;
                }
            };
            pages_fetched += 1;

            page_info = page.page_info;
            if page.total_count.is_some() {
                total_count = page.total_count;
            }
            let empty = page.nodes.is_empty();
            data.extend(page.nodes);

            if let Some(cb) = opts.on_progress.as_mut() {
                cb(data.len(), total_count);
            }

            cursor = page_info.end_cursor.clone();
            if empty || !page_info.has_next_page {
                break;
            }
            if let Some(max) = opts.max_items {
                if data.len() >= max {
                    break;
                }
            }
        }

        let has_more = error.is_some() || page_info.has_next_page;
        CursorResult {
            data,
            next_cursor: page_info.end_cursor.clone(),
            page_info,
            total_count,
            has_more,
            pages_fetched,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn engine() -> PaginationEngine {
        PaginationEngine::new(PaginationSettings::default())
    }

    fn numbered(from: usize, count: usize) -> Vec<Value> {
        (from..from + count).map(|n| json!(n)).collect()
    }

    #[tokio::test]
    async fn test_offset_stops_after_short_page() {
        let fetches = AtomicU32::new(0);
        let result = engine()
            .paginate_offset(
                |page, per_page| {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async move {
                        // Pages 1-2 full, page 3 short
                        let count = if page <= 2 { per_page as usize } else { 4 };
                        Ok(numbered(((page - 1) * per_page) as usize, count))
                    }
                },
                OffsetOptions {
                    per_page: 10,
                    max_pages: 100,
                    max_items: None,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.items.len(), 24);
        assert!(result.complete);
        assert!(result.error.is_none());
        // Page 4 never fetched
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_offset_empty_first_page() {
        let result = engine()
            .paginate_offset(
                |_, _| async { Ok(Vec::new()) },
                OffsetOptions {
                    per_page: 10,
                    max_pages: 5,
                    max_items: None,
                    on_progress: None,
                },
            )
            .await;
        assert!(result.items.is_empty());
        assert!(result.complete);
        assert_eq!(result.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_offset_max_items_truncates_final_page() {
        let result = engine()
            .paginate_offset(
                |page, per_page| async move {
                    Ok(numbered(((page - 1) * per_page) as usize, per_page as usize))
                },
                OffsetOptions {
                    per_page: 10,
                    max_pages: 100,
                    max_items: Some(25),
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.items.len(), 25);
        assert!(!result.complete);
        assert_eq!(result.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_offset_error_returns_partial() {
        let result = engine()
            .paginate_offset(
                |page, per_page| async move {
                    if page == 3 {
                        Err(ApiError::Network("down".into()))
                    } else {
                        Ok(numbered(((page - 1) * per_page) as usize, per_page as usize))
                    }
                },
                OffsetOptions {
                    per_page: 10,
                    max_pages: 100,
                    max_items: None,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.items.len(), 20);
        assert!(!result.complete);
        assert!(matches!(result.error, Some(ApiError::Network(_))));
    }

    fn cursor_page(from: usize, count: usize, has_next: bool, cursor: &str) -> CursorPage {
        CursorPage {
            nodes: numbered(from, count),
            page_info: PageInfo {
                has_next_page: has_next,
                end_cursor: Some(cursor.to_string()),
            },
            total_count: Some(30),
        }
    }

    #[tokio::test]
    async fn test_cursor_collects_until_last_page() {
        let result = engine()
            .paginate_cursor(
                |req| async move {
                    match req.after.as_deref() {
                        None => Ok(cursor_page(0, 10, true, "c1")),
                        Some("c1") => Ok(cursor_page(10, 10, true, "c2")),
                        Some("c2") => Ok(cursor_page(20, 10, false, "c3")),
                        other => panic!("unexpected cursor {:?}", other),
                    }
                },
                CursorOptions {
                    first: 10,
                    after: None,
                    max_pages: 100,
                    max_items: None,
                    auto_page: true,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.data.len(), 30);
        assert!(!result.has_more);
        assert_eq!(result.next_cursor.as_deref(), Some("c3"));
        assert_eq!(result.total_count, Some(30));
        assert_eq!(result.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_cursor_shrinks_first_to_item_budget() {
        let firsts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&firsts);

        let result = engine()
            .paginate_cursor(
                move |req| {
                    seen.lock().unwrap().push(req.first);
                    async move {
                        Ok(cursor_page(0, req.first as usize, true, "next"))
                    }
                },
                CursorOptions {
                    first: 10,
                    after: None,
                    max_pages: 100,
                    max_items: Some(15),
                    auto_page: true,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.data.len(), 15);
        assert_eq!(*firsts.lock().unwrap(), vec![10, 5]);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn test_cursor_single_page_when_auto_page_off() {
        let result = engine()
            .paginate_cursor(
                |req| async move { Ok(cursor_page(0, req.first as usize, true, "c1")) },
                CursorOptions {
                    first: 10,
                    after: None,
                    max_pages: 100,
                    max_items: None,
                    auto_page: false,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.pages_fetched, 1);
        assert!(result.has_more);
        assert_eq!(result.next_cursor.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_cursor_error_returns_partial_with_has_more() {
        let result = engine()
            .paginate_cursor(
                |req| async move {
                    match req.after.as_deref() {
                        None => Ok(cursor_page(0, 10, true, "c1")),
                        _ => Err(ApiError::RateLimited {
                            retry_after_ms: None,
                        }),
                    }
                },
                CursorOptions {
                    first: 10,
                    after: None,
                    max_pages: 100,
                    max_items: None,
                    auto_page: true,
                    on_progress: None,
                },
            )
            .await;

        assert_eq!(result.data.len(), 10);
        assert!(result.has_more);
        assert!(matches!(result.error, Some(ApiError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_progress_fires_after_every_page() {
        let progress: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);

        engine()
            .paginate_offset(
                |page, per_page| async move {
                    let count = if page <= 2 { per_page as usize } else { 0 };
                    Ok(numbered(0, count))
                },
                OffsetOptions {
                    per_page: 10,
                    max_pages: 100,
                    max_items: None,
                    on_progress: Some(Box::new(move |n, _| sink.lock().unwrap().push(n))),
                },
            )
            .await;

        assert_eq!(*progress.lock().unwrap(), vec![10, 20, 20]);
    }
}
