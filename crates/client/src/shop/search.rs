//! Paginated product search over a volatile result set.
//!
//! The server may add or drop products between pages, so the advertised
//! result count is a snapshot. Every page fetch refreshes the count and
//! resizes the local buffer; consumers therefore see a consistent, if
//! slightly stale, window into the live result set.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use wavecart_core::{CategoryId, Price, parse_id_key};

use crate::error::{Error, Result};
use crate::shop::ShopApi;

/// Products fetched per search page.
pub const PAGE_SIZE: usize = 200;

/// Result shaping for a search: which product fields to include and
/// whether to aggregate category counts.
#[derive(Debug, Clone, Default)]
pub struct SearchShaping {
    pub fields: Vec<String>,
    pub count_categories: bool,
}

impl SearchShaping {
    fn result_params(&self, limit: usize, offset: usize) -> Value {
        let mut result = Map::new();
        result.insert("limit".to_string(), json!(limit));
        result.insert("offset".to_string(), json!(offset));
        if !self.fields.is_empty() {
            result.insert("fields".to_string(), json!(self.fields));
        }
        if self.count_categories {
            result.insert("categories".to_string(), json!(true));
        }
        Value::Object(result)
    }
}

/// Price range based product filter bounds, in eurocents.
#[derive(Debug, Clone, Copy)]
pub struct PriceRange {
    pub from: Price,
    pub to: Price,
}

struct SearchState {
    count: usize,
    /// One slot per result position; `None` until its page was fetched.
    buffer: Vec<Option<crate::shop::Product>>,
    category_counts: Vec<(CategoryId, u64)>,
}

struct SearchInner {
    shop: ShopApi,
    session_id: String,
    filter: Option<Value>,
    shaping: SearchShaping,
    state: Mutex<SearchState>,
}

/// A running product search. Cloning shares the result buffer.
#[derive(Clone)]
pub struct Search {
    inner: Arc<SearchInner>,
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("session_id", &self.inner.session_id)
            .finish()
    }
}

impl Search {
    /// Start a search, fetching only the result count up front.
    pub(crate) async fn new(
        shop: ShopApi,
        session_id: String,
        filter: Option<Value>,
        shaping: SearchShaping,
    ) -> Result<Self> {
        let search = Self {
            inner: Arc::new(SearchInner {
                shop,
                session_id,
                filter,
                shaping,
                state: Mutex::new(SearchState {
                    count: 0,
                    buffer: Vec::new(),
                    category_counts: Vec::new(),
                }),
            }),
        };
        // limit 0 returns the count and aggregations without products
        search.gather(0, 0).await?;
        Ok(search)
    }

    /// The result count as of the most recent server contact.
    pub async fn count(&self) -> usize {
        self.inner.state.lock().await.count
    }

    /// Per-category result counts, resolved against the category tree.
    /// Empty unless the search was shaped with `count_categories`.
    pub async fn category_counts(&self) -> Vec<(CategoryId, u64)> {
        self.inner.state.lock().await.category_counts.clone()
    }

    /// The product at `index`, fetching its page on demand. An index at or
    /// beyond the known count triggers a 1-item revalidating fetch before
    /// `Ok(None)` is returned, in case the result set grew.
    pub async fn get(&self, index: usize) -> Result<Option<crate::shop::Product>> {
        let out_of_range = {
            let state = self.inner.state.lock().await;
            if let Some(Some(product)) = state.buffer.get(index) {
                return Ok(Some(product.clone()));
            }
            index >= state.count
        };
        if out_of_range {
            self.gather(index, 1).await?;
        } else {
            let page_start = index - index % PAGE_SIZE;
            self.gather(page_start, PAGE_SIZE).await?;
        }
        Ok(self
            .inner
            .state
            .lock()
            .await
            .buffer
            .get(index)
            .cloned()
            .flatten())
    }

    /// The products at `start..stop` in strides of `step`, fetching the
    /// page-aligned windows covering the gap. The range is clamped to the
    /// current count, so a shrunken result set yields fewer products than
    /// asked for.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a zero `step`.
    pub async fn get_range(
        &self,
        start: usize,
        stop: usize,
        step: usize,
    ) -> Result<Vec<crate::shop::Product>> {
        if step == 0 {
            return Err(Error::InvalidArgument("step must not be zero".to_string()));
        }
        let mut stop = {
            let state = self.inner.state.lock().await;
            stop.min(state.count)
        };
        let mut window_start = start;
        while window_start < stop {
            let needs_fetch = {
                let state = self.inner.state.lock().await;
                !matches!(state.buffer.get(window_start), Some(Some(_)))
            };
            if needs_fetch {
                let page_start = window_start - window_start % PAGE_SIZE;
                self.gather(page_start, PAGE_SIZE).await?;
                // the fetch may have shrunk the result set
                stop = stop.min(self.inner.state.lock().await.count);
            }
            window_start = (window_start - window_start % PAGE_SIZE) + PAGE_SIZE;
        }

        let state = self.inner.state.lock().await;
        Ok(state
            .buffer
            .iter()
            .take(stop.min(state.count))
            .skip(start)
            .step_by(step)
            .filter_map(Clone::clone)
            .collect())
    }

    /// Iterate over all results in order, fetching pages as needed.
    #[must_use]
    pub fn iter(&self) -> SearchIter {
        SearchIter {
            search: self.clone(),
            index: 0,
        }
    }

    /// Fetch one result page and fold it into the buffer.
    #[instrument(skip(self), fields(session_id = %self.inner.session_id))]
    async fn gather(&self, offset: usize, limit: usize) -> Result<()> {
        let payload = self
            .inner
            .shop
            .api()
            .product_search(
                &self.inner.session_id,
                self.inner.filter.clone(),
                Some(self.inner.shaping.result_params(limit, offset)),
            )
            .await?;

        let count = payload
            .get("product_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::Malformed("product_search payload missing \"product_count\"".to_string())
            })?;
        let count = usize::try_from(count)
            .map_err(|_| Error::Malformed(format!("product_count {count} out of range")))?;
        let category_counts = parse_category_counts(&payload);

        let mut products = Vec::new();
        if let Some(items) = payload.get("products").and_then(Value::as_array) {
            for item in items {
                let fields = item.as_object().ok_or_else(|| {
                    Error::Malformed("product_search product entry is not an object".to_string())
                })?;
                products.push(self.inner.shop.adopt_product(fields.clone()).await?);
            }
        }
        debug!(count, fetched = products.len(), offset, "search page fetched");

        let mut state = self.inner.state.lock().await;
        state.count = count;
        if let Some(counts) = category_counts {
            state.category_counts = counts;
        }
        if state.buffer.len() != count {
            state.buffer.resize_with(count, || None);
        }
        for (i, product) in products.into_iter().enumerate() {
            let position = offset + i;
            if position < state.buffer.len() {
                state.buffer[position] = Some(product);
            }
        }
        Ok(())
    }
}

fn parse_category_counts(payload: &Value) -> Option<Vec<(CategoryId, u64)>> {
    let raw = payload.get("categories")?.as_object()?;
    let mut counts: Vec<(CategoryId, u64)> = raw
        .iter()
        .filter_map(|(key, value)| {
            let id = parse_id_key(key)?;
            Some((CategoryId::from(id), value.as_u64()?))
        })
        .collect();
    counts.sort_by_key(|(id, _)| *id);
    Some(counts)
}

/// In-order cursor over a [`Search`].
pub struct SearchIter {
    search: Search,
    index: usize,
}

impl SearchIter {
    /// The next product, or `Ok(None)` once the live count is exhausted.
    pub async fn next(&mut self) -> Result<Option<crate::shop::Product>> {
        let index = self.index;
        {
            let state = self.search.inner.state.lock().await;
            if index >= state.count {
                return Ok(None);
            }
            if let Some(Some(product)) = state.buffer.get(index) {
                self.index += 1;
                return Ok(Some(product.clone()));
            }
        }
        let page_start = index - index % PAGE_SIZE;
        self.search.gather(page_start, PAGE_SIZE).await?;

        let state = self.search.inner.state.lock().await;
        if index >= state.count {
            return Ok(None);
        }
        match state.buffer.get(index) {
            Some(Some(product)) => {
                self.index += 1;
                Ok(Some(product.clone()))
            }
            // the slot stayed empty after its page was fetched; stop
            // instead of refetching forever
            _ => Ok(None),
        }
    }
}

/// Builder for search filters in the shape the API expects.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    params: Map<String, Value>,
}

impl SearchFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to categories.
    #[must_use]
    pub fn categories(mut self, ids: &[CategoryId]) -> Self {
        self.params.insert("categories".to_string(), json!(ids));
        self
    }

    /// Full-text search words.
    #[must_use]
    pub fn searchword(mut self, word: impl Into<String>) -> Self {
        self.params.insert("searchword".to_string(), json!(word.into()));
        self
    }

    /// Only products on sale (`true`) or only regular ones (`false`).
    #[must_use]
    pub fn sale(mut self, sale: bool) -> Self {
        self.params.insert("sale".to_string(), json!(sale));
        self
    }

    /// Restrict to a price range.
    #[must_use]
    pub fn prices(mut self, range: PriceRange) -> Self {
        self.params.insert(
            "prices".to_string(),
            json!({ "from": range.from, "to": range.to }),
        );
        self
    }

    /// Restrict by facet values of a group.
    #[must_use]
    pub fn facets(mut self, group_id: wavecart_core::FacetGroupId, facet_ids: &[u64]) -> Self {
        let facets = self
            .params
            .entry("facets".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(facets) = facets {
            facets.insert(group_id.to_string(), json!(facet_ids));
        }
        self
    }

    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        if self.params.is_empty() {
            None
        } else {
            Some(Value::Object(self.params))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = SearchFilter::new()
            .searchword("shirt")
            .sale(true)
            .categories(&[CategoryId::from(16077)])
            .facets(wavecart_core::FacetGroupId::from(1), &[570, 168])
            .into_value()
            .unwrap();
        assert_eq!(
            filter,
            json!({
                "searchword": "shirt",
                "sale": true,
                "categories": [16077],
                "facets": { "1": [570, 168] }
            })
        );
    }

    #[test]
    fn test_empty_filter_is_none() {
        assert!(SearchFilter::new().into_value().is_none());
    }

    #[test]
    fn test_result_shaping() {
        let shaping = SearchShaping {
            fields: vec!["sale".to_string(), "name".to_string()],
            count_categories: true,
        };
        assert_eq!(
            shaping.result_params(200, 400),
            json!({
                "limit": 200,
                "offset": 400,
                "fields": ["sale", "name"],
                "categories": true
            })
        );
    }

    #[test]
    fn test_parse_category_counts() {
        let payload = json!({ "categories": { "19631": 7, "16077": 12 } });
        let counts = parse_category_counts(&payload).unwrap();
        assert_eq!(
            counts,
            vec![(CategoryId::from(16077), 12), (CategoryId::from(19631), 7)]
        );
    }
}
