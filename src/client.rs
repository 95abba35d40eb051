//! HubSpot CRM API client with rate limiting and retry logic

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::error::{parse_retry_after_header, HubSpotError, Result};
use crate::ids::RecordId;
use crate::models::{EntityRecord, PageResponse};
use crate::rate_limiter::SlidingWindowLimiter;

/// Properties requested for each contact
pub const CONTACT_PROPERTIES: [&str; 6] = [
    "email",
    "firstname",
    "lastname",
    "company",
    "hs_object_id",
    "associatedcompanyid",
];

/// Properties requested for each company
pub const COMPANY_PROPERTIES: [&str; 2] = ["name", "domain"];

/// Properties requested for each email engagement body
pub const EMAIL_PROPERTIES: [&str; 6] = [
    "hs_email_subject",
    "hs_email_text",
    "hs_timestamp",
    "hs_email_status",
    "hs_email_to_email",
    "hs_email_from_email",
];

/// Rate-limited HubSpot client
///
/// Every request path goes through [`fetch`](Self::fetch), which admits
/// through the shared [`SlidingWindowLimiter`] before each attempt and
/// applies the retry policy: server-directed 429 waits are absorbed without
/// consuming the attempt budget, network failures back off exponentially,
/// and every other HTTP error fails the call immediately.
pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    limiter: SlidingWindowLimiter,
    page_size: usize,
    max_attempts: u32,
}

impl HubSpotClient {
    /// Create a client for the given credential and API settings
    ///
    /// # Arguments
    /// * `token` - Private app access token sent as a bearer credential
    /// * `config` - API endpoint, timeout, paging, and retry settings
    /// * `limiter` - Admission control shared by every clone of this client
    pub fn new(
        token: impl Into<String>,
        config: &ApiConfig,
        limiter: SlidingWindowLimiter,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HubSpotError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            limiter,
            page_size: config.page_size,
            max_attempts: config.max_attempts,
        })
    }

    /// Access the shared rate limiter (for run-end stats)
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// Fetch one JSON document from an API path
    ///
    /// Admits through the rate limiter before every attempt, including
    /// retries. A 429 response sleeps for the server-provided Retry-After
    /// and retries without touching the attempt budget; other non-2xx
    /// responses fail immediately after the status and body are logged;
    /// network errors retry with exponential backoff (1s, 2s, ...) up to
    /// `max_attempts` total attempts, then propagate the last error.
    pub async fn fetch(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempts = 0u32;
        let mut delay = Duration::from_secs(1);

        loop {
            self.limiter.admit().await;

            match self.attempt_fetch(&url, query).await {
                Ok(document) => return Ok(document),
                Err(HubSpotError::RateLimitExceeded { retry_after }) => {
                    warn!(
                        "Rate limited by the API, waiting {}s before retrying {}",
                        retry_after, url
                    );
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        error!("Request to {} failed after {} attempts: {}", url, attempts, e);
                        return Err(e);
                    }
                    warn!(
                        "Request to {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        url, attempts, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One HTTP attempt, classified into the error taxonomy
    async fn attempt_fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| HubSpotError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after_header(response.headers());
            return Err(HubSpotError::RateLimitExceeded { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("API request failed: HTTP {} - {}", status.as_u16(), body);
            return Err(HubSpotError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| HubSpotError::InvalidResponse(e.to_string()))
    }

    /// Collect every record from a paginated list endpoint
    ///
    /// Follows `paging.next.after` cursors with `limit=page_size` until the
    /// API stops returning one. Eager: the full collection is accumulated
    /// in memory, and any fetch error aborts the whole collection.
    pub async fn collect_paginated(
        &self,
        path: &str,
        base_query: &[(&str, String)],
    ) -> Result<Vec<EntityRecord>> {
        let mut records = Vec::new();
        let mut after: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut query: Vec<(&str, String)> = base_query.to_vec();
            query.push(("limit", self.page_size.to_string()));
            if let Some(cursor) = after.as_ref() {
                query.push(("after", cursor.clone()));
            }

            let document = self.fetch(path, &query).await?;
            let page: PageResponse = serde_json::from_value(document).map_err(|e| {
                HubSpotError::InvalidResponse(format!("Unexpected page shape from {}: {}", path, e))
            })?;

            pages += 1;
            after = page.next_after().map(str::to_string);
            debug!(
                "Fetched page {} from {} ({} records)",
                pages,
                path,
                page.results.len()
            );
            records.extend(page.results);

            if after.is_none() {
                break;
            }
        }

        info!("Collected {} records from {} over {} pages", records.len(), path, pages);
        Ok(records)
    }

    /// Download all contacts with the standard property set
    pub async fn contacts(&self) -> Result<Vec<EntityRecord>> {
        self.collect_paginated("crm/v3/objects/contacts", &properties_query(&CONTACT_PROPERTIES))
            .await
    }

    /// Download all engagements of one kind (notes, emails, calls, ...)
    pub async fn engagements(&self, kind: &str) -> Result<Vec<EntityRecord>> {
        self.collect_paginated(&format!("crm/v3/objects/{}", kind), &[])
            .await
    }

    /// Fetch one company document by normalized id
    pub async fn company(&self, id: &RecordId) -> Result<EntityRecord> {
        let document = self
            .fetch(
                &format!("crm/v3/objects/companies/{}", id),
                &properties_query(&COMPANY_PROPERTIES),
            )
            .await?;
        parse_record(document)
    }

    /// Fetch one email engagement body by normalized id
    pub async fn email_content(&self, id: &RecordId) -> Result<EntityRecord> {
        let document = self
            .fetch(
                &format!("crm/v3/objects/emails/{}", id),
                &properties_query(&EMAIL_PROPERTIES),
            )
            .await?;
        parse_record(document)
    }
}

/// Repeat the `properties` query key for each requested property
fn properties_query(names: &[&str]) -> Vec<(&'static str, String)> {
    names
        .iter()
        .map(|name| ("properties", name.to_string()))
        .collect()
}

fn parse_record(document: Value) -> Result<EntityRecord> {
    serde_json::from_value(document).map_err(|e| HubSpotError::InvalidResponse(e.to_string()))
}
