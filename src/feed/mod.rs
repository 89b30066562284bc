//! Remote activity-feed client
//!
//! [`FeedClient`] is the seam the fetch pipeline talks to. [`ManagementApiClient`]
//! implements it over HTTP against the management activity API:
//!
//! ```text
//! {base}/{tenant}/activity/feed/subscriptions/list
//! {base}/{tenant}/activity/feed/subscriptions/start?contentType=..&publisherIdentifier=..
//! {base}/{tenant}/activity/feed/subscriptions/content?contentType=..&startTime=..&endTime=..
//! {contentUri}                                   (blob fetch)
//! ```
//!
//! Only the first page of a content listing is read.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::TokenProvider;
use crate::config::{FeedConfig, MGMT_SCOPE};
use crate::error::{Error, ItemError, Result};
use crate::types::{AuditEvent, ContentItem, Subscription, TimeWindow};


/// Longest response body excerpt carried in an error message
const ERROR_BODY_LIMIT: usize = 512;

/// Operations the fetch pipeline needs from the activity feed
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Content blobs of `content_type` available inside `window`
    async fn list_content(&self, content_type: &str, window: &TimeWindow)
    -> Result<Vec<ContentItem>>;

    /// Records stored in one blob
    async fn fetch_blob(&self, content_uri: &str)
    -> std::result::Result<Vec<AuditEvent>, ItemError>;

    /// Subscriptions registered for the tenant
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Start (or re-enable) the subscription for `content_type`
    async fn start_subscription(&self, content_type: &str) -> Result<Subscription>;
}

/// Production [`FeedClient`] backed by reqwest
pub struct ManagementApiClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    feed_root: String,
    tenant_id: String,
}

impl ManagementApiClient {
    /// Create a client for the tenant configured in `config`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &FeedConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        let feed_root = format!(
            "{}/{}/activity/feed",
            config.base_url.trim_end_matches('/'),
            config.tenant_id
        );

        Ok(Self {
            http,
            tokens,
            feed_root,
            tenant_id: config.tenant_id.clone(),
        })
    }

    async fn bearer(&self) -> Result<String> {
        self.tokens.token(MGMT_SCOPE).await
    }
}

#[async_trait]
impl FeedClient for ManagementApiClient {
    async fn list_content(
        &self,
        content_type: &str,
        window: &TimeWindow,
    ) -> Result<Vec<ContentItem>> {
        let token = self.bearer().await?;
        let url = format!("{}/subscriptions/content", self.feed_root);
        tracing::debug!(content_type, window = %window, "Listing available content");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("contentType", content_type),
                ("publisherIdentifier", self.tenant_id.as_str()),
                ("startTime", window.start_iso().as_str()),
                ("endTime", window.end_iso().as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteList {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        if let Some(next) = response.headers().get("NextPageUri") {
            tracing::debug!(
                next_page = ?next,
                "Content listing has more pages; only the first page is read"
            );
        }

        let body: Value = response.json().await?;
        let items = unwrap_records(body).map_err(Error::Decode)?;
        Ok(items.iter().map(listed_item).collect())
    }

    async fn fetch_blob(
        &self,
        content_uri: &str,
    ) -> std::result::Result<Vec<AuditEvent>, ItemError> {
        let url = url::Url::parse(content_uri).map_err(|e| ItemError::InvalidUri {
            uri: content_uri.to_string(),
            reason: e.to_string(),
        })?;
        let token = self.bearer().await?;

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ItemError::Fetch {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: Value = response.json().await?;
        unwrap_records(body).map_err(ItemError::Decode)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let token = self.bearer().await?;
        let url = format!("{}/subscriptions/list", self.feed_root);

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote {
                operation: "list subscriptions",
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: Value = response.json().await?;
        let subs = unwrap_records(body).map_err(Error::Decode)?;
        subs.into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn start_subscription(&self, content_type: &str) -> Result<Subscription> {
        let token = self.bearer().await?;
        let url = format!("{}/subscriptions/start", self.feed_root);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[
                ("contentType", content_type),
                ("publisherIdentifier", self.tenant_id.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote {
                operation: "start subscription",
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let text = response.text().await?;
        match serde_json::from_str(&text) {
            Ok(sub) => Ok(sub),
            Err(e) => {
                if !text.trim().is_empty() {
                    tracing::debug!(
                        content_type,
                        body = %text,
                        error = %e,
                        "Start subscription body is not a subscription"
                    );
                }
                Ok(Subscription {
                    content_type: content_type.to_string(),
                    status: String::new(),
                    webhook: None,
                })
            }
        }
    }
}

/// Listing element as a [`ContentItem`]
///
/// Elements that do not decode are kept with whatever string fields they carry,
/// so a missing or non-string `contentUri` fails that item alone in the pool.
fn listed_item(value: &Value) -> ContentItem {
    match ContentItem::deserialize(value) {
        Ok(item) => item,
        Err(e) => {
            tracing::warn!(error = %e, element = %value, "Malformed content listing entry");
            let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
            ContentItem {
                content_uri: text("contentUri").unwrap_or_default(),
                content_id: text("contentId"),
                content_type: text("contentType"),
                content_created: text("contentCreated"),
                content_expiration: text("contentExpiration").or_else(|| text("expiration")),
            }
        }
    }
}

/// Accept either a bare array or an object wrapping the array in `value`
pub(crate) fn unwrap_records(body: Value) -> std::result::Result<Vec<Value>, String> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(records)) => Ok(records),
            Some(other) => Err(format!(
                "expected `value` to be an array, got {}",
                json_kind(&other)
            )),
            None => Err("expected an array or an object with a `value` array".to_string()),
        },
        other => Err(format!("expected an array, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Status text plus a bounded excerpt of the error body
async fn error_message(response: reqwest::Response) -> String {
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        return reason;
    }
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    if reason.is_empty() {
        excerpt
    } else {
        format!("{reason}: {excerpt}")
    }
}
