//! Stripe REST API client.
//!
//! Talks to the handful of endpoints the checkout pipeline needs. Reads are
//! `GET` with query strings, writes are form-encoded `POST`s as Stripe
//! expects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::config::StripeConfig;
use crate::models::CustomerDetails;
use crate::models::address::non_blank;

use super::PaymentProvider;
use super::error::{ApiErrorResponse, StripeError};
use super::types::{CheckoutSession, Customer, LineItem, ListResponse, StripeEvent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LINE_ITEMS_PAGE_SIZE: &str = "100";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: Url,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Config` if the key is not a valid header value or
    /// the base URL does not parse, `StripeError::Http` if the HTTP client
    /// fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        let mut headers = HeaderMap::new();

        let auth = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_value = HeaderValue::from_str(&auth)
            .map_err(|e| StripeError::Config(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let api_base = Url::parse(&config.api_base)
            .map_err(|e| StripeError::Config(format!("Invalid API base URL: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(StripeError::Config(format!(
                "API base URL cannot have paths: {api_base}"
            )));
        }

        Ok(Self {
            inner: Arc::new(StripeClientInner { client, api_base }),
        })
    }

    /// Build `{api_base}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, StripeError> {
        let response = self.inner.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    /// Find a customer by exact email.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, StripeError> {
        let mut url = self.endpoint(&["customers"]);
        url.query_pairs_mut()
            .append_pair("email", email)
            .append_pair("limit", "1");

        let list: ListResponse<Customer> = self.get(url).await?;
        Ok(list.data.into_iter().next())
    }

    /// Create a customer from checkout details.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, details))]
    pub async fn create_customer(
        &self,
        details: &CustomerDetails,
    ) -> Result<Customer, StripeError> {
        let response = self
            .inner
            .client
            .post(self.endpoint(&["customers"]))
            .form(&customer_form(details))
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle a response, parsing the body on success.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| StripeError::Parse(format!("Failed to parse response: {e}")))
        } else {
            Err(Self::handle_error_status(status, response).await)
        }
    }

    /// Handle an error status code.
    async fn handle_error_status(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> StripeError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return StripeError::RateLimited(retry_after);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return StripeError::Unauthorized("Invalid API key".to_string());
        }

        match response.text().await {
            Ok(body) => {
                let message = error_message(&body);
                if status == reqwest::StatusCode::NOT_FOUND {
                    StripeError::NotFound(message)
                } else {
                    StripeError::Api {
                        status: status.as_u16(),
                        message,
                    }
                }
            }
            Err(e) => StripeError::Http(e),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self))]
    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, StripeError> {
        let mut items = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut url = self.endpoint(&["checkout", "sessions", session_id, "line_items"]);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("limit", LINE_ITEMS_PAGE_SIZE)
                    .append_pair("expand[]", "data.price.product");
                if let Some(cursor) = &starting_after {
                    query.append_pair("starting_after", cursor);
                }
            }

            let page: ListResponse<LineItem> = self.get(url).await?;
            starting_after = page.data.last().map(|item| item.id.clone());
            items.extend(page.data);

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        tracing::debug!(count = items.len(), "Fetched checkout line items");
        Ok(items)
    }

    async fn find_or_create_customer(
        &self,
        details: &CustomerDetails,
    ) -> Result<Customer, StripeError> {
        let email = non_blank(details.email.as_deref())
            .ok_or_else(|| StripeError::Config("customer email is required".to_string()))?;

        if let Some(existing) = self.find_customer_by_email(email).await? {
            return Ok(existing);
        }
        self.create_customer(details).await
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        self.get(self.endpoint(&["checkout", "sessions", session_id]))
            .await
    }

    #[instrument(skip(self))]
    async fn retrieve_event(&self, event_id: &str) -> Result<StripeEvent, StripeError> {
        self.get(self.endpoint(&["events", event_id])).await
    }
}

/// Form fields for `POST /v1/customers`, blank values omitted.
fn customer_form(details: &CustomerDetails) -> Vec<(&'static str, String)> {
    let mut form = Vec::new();
    let mut push = |key: &'static str, value: Option<&str>| {
        if let Some(value) = non_blank(value) {
            form.push((key, value.to_string()));
        }
    };

    push("email", details.email.as_deref());
    push("name", details.name.as_deref());
    push("phone", details.phone.as_deref());
    if let Some(address) = &details.address {
        push("address[line1]", address.line1.as_deref());
        push("address[line2]", address.line2.as_deref());
        push("address[city]", address.city.as_deref());
        push("address[state]", address.state.as_deref());
        push("address[postal_code]", address.postal_code.as_deref());
        push("address[country]", address.country.as_deref());
    }
    form
}

/// Message from a Stripe error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(|response| response.error.message)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::models::Address;

    fn client(api_base: &str) -> StripeClient {
        StripeClient::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_51Hx9QmKq2v8Lw"),
            webhook_secret: SecretString::from("whsec_3kLq9"),
            api_base: api_base.to_string(),
            webhook_tolerance: Duration::from_secs(300),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_version_prefix() {
        let client = client("https://api.stripe.com/v1");
        assert_eq!(
            client
                .endpoint(&["checkout", "sessions", "cs_test_1", "line_items"])
                .as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs_test_1/line_items"
        );

        let trailing = super::tests::client("http://localhost:12111/v1/");
        assert_eq!(
            trailing.endpoint(&["events", "evt_1"]).as_str(),
            "http://localhost:12111/v1/events/evt_1"
        );
    }

    #[test]
    fn test_endpoint_encodes_ids() {
        let client = client("https://api.stripe.com/v1");
        assert_eq!(
            client.endpoint(&["events", "evt/../x"]).as_str(),
            "https://api.stripe.com/v1/events/evt%2F..%2Fx"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = StripeClient::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_51Hx9QmKq2v8Lw"),
            webhook_secret: SecretString::from("whsec_3kLq9"),
            api_base: "not a url".to_string(),
            webhook_tolerance: Duration::from_secs(300),
        });
        assert!(matches!(result, Err(StripeError::Config(_))));
    }

    #[test]
    fn test_customer_form_skips_blank_fields() {
        let details = CustomerDetails {
            email: Some("lee@example.com".to_string()),
            name: Some("Lee Chan".to_string()),
            phone: Some("  ".to_string()),
            address: Some(Address {
                line1: Some("9 Bay St".to_string()),
                country: Some("CA".to_string()),
                ..Address::default()
            }),
        };

        let form = customer_form(&details);
        assert_eq!(
            form,
            vec![
                ("email", "lee@example.com".to_string()),
                ("name", "Lee Chan".to_string()),
                ("address[line1]", "9 Bay St".to_string()),
                ("address[country]", "CA".to_string()),
            ]
        );
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"No such customer"}}"#;
        assert_eq!(error_message(body), "No such customer");
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
    }
}
