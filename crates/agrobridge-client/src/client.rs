use std::future::Future;
use std::time::Duration;

use agrobridge_core::{CategoryPage, CategoryQuery, ClientConfig};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::error::ClientError;
use crate::identity::{normalize_list, Identify, ProductRecord, UnidentifiedPolicy};

/// One category page after parsing, with the number of records dropped for
/// lacking an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage<T = ProductRecord> {
    pub lists: CategoryPage<T>,
    pub rejected: usize,
}

impl<T> ParsedPage<T> {
    /// `{[], [], hasMore: false}` with nothing rejected.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lists: CategoryPage::empty(),
            rejected: 0,
        }
    }
}

impl<T> Default for ParsedPage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<CategoryPage<T>> for ParsedPage<T> {
    fn from(lists: CategoryPage<T>) -> Self {
        Self { lists, rejected: 0 }
    }
}

/// Where the feed gets its pages from.
pub trait CategorySource: Send + Sync {
    type Record: Identify + Send;

    fn fetch_page(
        &self,
        query: &CategoryQuery,
    ) -> impl Future<Output = Result<ParsedPage<Self::Record>, ClientError>> + Send;
}

/// Wraps a source so that every failure becomes an empty final page.
///
/// The error is logged at `warn`; callers never see it. Because the empty
/// page reports `hasMore: false`, a failure ends pagination until the next
/// location change.
#[derive(Debug, Clone)]
pub struct SafeDefault<S>(pub S);

impl<S: CategorySource> CategorySource for SafeDefault<S> {
    type Record = S::Record;

    async fn fetch_page(
        &self,
        query: &CategoryQuery,
    ) -> Result<ParsedPage<Self::Record>, ClientError> {
        Ok(or_empty(self.0.fetch_page(query).await, query))
    }
}

fn or_empty<T>(result: Result<ParsedPage<T>, ClientError>, query: &CategoryQuery) -> ParsedPage<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!(
            error = %e,
            category = %query.category,
            page = query.page,
            "category query failed; using empty page"
        );
        ParsedPage::empty()
    })
}

/// HTTP client for `GET /api/v1/products/category/{category}`.
///
/// Single attempt per page: non-2xx statuses, empty bodies and invalid JSON
/// are typed errors, and nothing is retried.
#[derive(Debug, Clone)]
pub struct CategoryClient {
    client: Client,
    base_url: Url,
    policy: UnidentifiedPolicy,
}

impl CategoryClient {
    /// Creates a client from feed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if `api_url` does not parse, or
    /// [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_base_url(
            &config.api_url,
            config.request_timeout_secs,
            &config.user_agent,
        )
    }

    /// Creates a client against an explicit base URL (e.g. a mock server).
    ///
    /// A trailing slash on `base_url` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if `base_url` does not parse or
    /// cannot carry a path, or [`ClientError::Http`] if the underlying client
    /// cannot be constructed.
    pub fn with_base_url(
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".to_owned(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            policy: UnidentifiedPolicy::default(),
        })
    }

    /// Sets how records without an identity are handled.
    #[must_use]
    pub fn with_unidentified_policy(mut self, policy: UnidentifiedPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn category_url(&self, query: &CategoryQuery) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_owned(),
            })?
            .pop_if_empty()
            .extend(["api", "v1", "products", "category", query.category.as_str()]);
        url.query_pairs_mut()
            .append_pair("page", &query.page.to_string())
            .append_pair("page_size", &query.page_size.to_string())
            .append_pair("lng", &query.location.lng.to_string())
            .append_pair("lat", &query.location.lat.to_string());
        Ok(url)
    }

    /// Fetches and parses one category page.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Http`] for transport failures.
    /// - [`ClientError::UnexpectedStatus`] for any non-2xx status.
    /// - [`ClientError::EmptyBody`] when the body is blank.
    /// - [`ClientError::Deserialize`] when the body is not JSON.
    pub async fn fetch_category_page(
        &self,
        query: &CategoryQuery,
    ) -> Result<ParsedPage, ClientError> {
        let url = self.category_url(query)?;
        tracing::debug!(url = %url, "fetching category page");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        parse_category_body(&body, url.as_str(), self.policy)
    }

    /// Like [`Self::fetch_category_page`], but any failure yields an empty
    /// page with `hasMore: false` and a logged warning.
    pub async fn fetch_category_page_or_default(&self, query: &CategoryQuery) -> ParsedPage {
        or_empty(self.fetch_category_page(query).await, query)
    }
}

impl CategorySource for CategoryClient {
    type Record = ProductRecord;

    async fn fetch_page(&self, query: &CategoryQuery) -> Result<ParsedPage, ClientError> {
        self.fetch_category_page(query).await
    }
}

/// Parses a category response body.
///
/// The page may be bare or wrapped in a `data` envelope; `data` is used when
/// it is an object. Lists that are absent or not arrays are empty, and
/// `hasMore` follows JSON truthiness.
///
/// # Errors
///
/// Returns [`ClientError::EmptyBody`] for a blank body and
/// [`ClientError::Deserialize`] when the body is not JSON. `url` only labels
/// the error.
pub fn parse_category_body(
    body: &str,
    url: &str,
    policy: UnidentifiedPolicy,
) -> Result<ParsedPage, ClientError> {
    if body.trim().is_empty() {
        return Err(ClientError::EmptyBody {
            url: url.to_owned(),
        });
    }
    let value: Value = serde_json::from_str(body).map_err(|e| ClientError::Deserialize {
        context: format!("category page from {url}"),
        source: e,
    })?;

    let page = match value.get("data") {
        Some(data) if data.is_object() => data,
        _ => &value,
    };

    let (deliverable_products, rejected_deliverable) =
        normalize_list(page.get("deliverableProducts"), "deliverableProducts", policy);
    let (non_deliverable_products, rejected_non_deliverable) = normalize_list(
        page.get("nonDeliverableProducts"),
        "nonDeliverableProducts",
        policy,
    );

    Ok(ParsedPage {
        lists: CategoryPage {
            deliverable_products,
            non_deliverable_products,
            has_more: is_truthy(page.get("hasMore")),
        },
        rejected: rejected_deliverable + rejected_non_deliverable,
    })
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
