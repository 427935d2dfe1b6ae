//! Paginated lister
//!
//! Turns a list method into a lazy, single-pass stream of items. Pages are
//! fetched only as the consumer pulls, so a downstream `take(n)` stops the
//! fetching as well.

use super::client::ApiCall;
use super::dispatcher::Dispatcher;
use crate::error::{CliError, Result};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;

/// Everything needed to walk one list method
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub call: ApiCall,
    /// Response field holding the items, e.g. `items` or `topics`
    pub items_field: String,
    /// Query parameter carrying the page size: `maxResults` for Compute,
    /// `pageSize` elsewhere
    pub page_size_field: String,
    pub page_size: Option<u32>,
    /// Items are keyed by scope (`items: {zones/a: {instances: [...]}}`)
    pub aggregated: bool,
}

impl ListRequest {
    pub fn new(call: ApiCall, items_field: &str) -> Self {
        Self {
            call,
            items_field: items_field.to_string(),
            page_size_field: "pageSize".to_string(),
            page_size: None,
            aggregated: false,
        }
    }

    pub fn page_size_field(mut self, field: &str) -> Self {
        self.page_size_field = field.to_string();
        self
    }

    pub fn page_size(mut self, size: Option<u32>) -> Self {
        self.page_size = size;
        self
    }

    pub fn aggregated(mut self, items_field: &str) -> Self {
        self.aggregated = true;
        self.items_field = items_field.to_string();
        self
    }
}

enum PageState {
    Next(Option<String>),
    Done,
}

/// Stream the items of every page, in service order.
///
/// Terminates after the first page without a `nextPageToken`. An error
/// ends the stream after it is yielded.
pub fn list_items(dispatcher: &Dispatcher, request: ListRequest) -> impl Stream<Item = Result<Value>> + '_ {
    list_pages(dispatcher, request)
        .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
        .try_flatten()
}

/// Stream whole pages
pub fn list_pages(dispatcher: &Dispatcher, request: ListRequest) -> impl Stream<Item = Result<Vec<Value>>> + '_ {
    stream::unfold(PageState::Next(None), move |state| {
        let request = request.clone();
        async move {
            let PageState::Next(token) = state else {
                return None;
            };
            if dispatcher.cancellation().is_cancelled() {
                return Some((Err(CliError::cancelled("Listing cancelled.")), PageState::Done));
            }

            let mut call = request.call.clone();
            if let Some(size) = request.page_size {
                call.set_query(&request.page_size_field, size.to_string());
            }
            if let Some(token) = &token {
                call.set_query("pageToken", token.clone());
            }

            match dispatcher.call(&call).await {
                Ok(response) => {
                    let items = extract_items(&response, &request);
                    let next = response
                        .get("nextPageToken")
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                        .map(String::from);
                    tracing::debug!(
                        "Fetched page of {} items from {} (more: {})",
                        items.len(),
                        request.call.method,
                        next.is_some()
                    );
                    let state = match next {
                        Some(t) => PageState::Next(Some(t)),
                        None => PageState::Done,
                    };
                    Some((Ok(items), state))
                }
                Err(e) => Some((Err(e), PageState::Done)),
            }
        }
    })
}

fn extract_items(response: &Value, request: &ListRequest) -> Vec<Value> {
    let field = if request.aggregated { "items" } else { request.items_field.as_str() };
    let Some(items) = response.get(field) else {
        return Vec::new();
    };
    if request.aggregated {
        return flatten_aggregated(items, &request.items_field);
    }
    items.as_array().cloned().unwrap_or_default()
}

/// Collect the per-scope lists of an aggregated list response. Scopes that
/// only carry a `warning` (no resources there) contribute nothing.
fn flatten_aggregated(items: &Value, field: &str) -> Vec<Value> {
    let Some(scopes) = items.as_object() else {
        return Vec::new();
    };
    scopes
        .values()
        .filter_map(|scope| scope.get(field).and_then(Value::as_array))
        .flat_map(|arr| arr.iter().cloned())
        .collect()
}
