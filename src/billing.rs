//! Stripe integration: checkout session creation, subscription
//! cancellation, and webhook handling.
//!
//! The HTTP calls sit behind [`BillingProvider`] so tests can run against
//! a fake. Webhook signature verification fails closed; no event touches
//! the database until the signature and timestamp check out. Every event
//! branch is a plain overwrite keyed on one user, so replaying an event
//! reproduces the same end state.

use async_trait::async_trait;
use diesel::prelude::*;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ACCOUNT_TYPE_FREE, ACCOUNT_TYPE_PAID};
use crate::retry;
use crate::state::DbConnection;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutStatus {
    pub status: String,
    pub customer_email: Option<String>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Opens an embedded checkout session for `plan`, tagged with the
    /// user's id so the completion webhook can find them again.
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        plan: &str,
    ) -> Result<CheckoutSession, AppError>;

    async fn checkout_session_status(&self, session_id: &str) -> Result<CheckoutStatus, AppError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError>;
}

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    price_paid: String,
    client_url: String,
}

impl StripeClient {
    pub fn new(http: reqwest::Client, secret_key: &str, price_paid: &str, client_url: &str) -> Self {
        Self {
            http,
            secret_key: secret_key.to_string(),
            price_paid: price_paid.to_string(),
            client_url: client_url.to_string(),
        }
    }

    fn price_for_plan(&self, plan: &str) -> Result<&str, AppError> {
        match plan {
            "paid" => Ok(&self.price_paid),
            other => Err(AppError::bad_request(format!("unknown plan: {other}"))),
        }
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::upstream(format!("stripe returned {status}: {body}")))
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        user_id: Uuid,
        email: &str,
        plan: &str,
    ) -> Result<CheckoutSession, AppError> {
        let price = self.price_for_plan(plan)?.to_string();
        let user_id = user_id.to_string();
        let return_url = format!(
            "{}/checkout/return?session_id={{CHECKOUT_SESSION_ID}}",
            self.client_url
        );
        let params = [
            ("mode", "subscription"),
            ("ui_mode", "embedded"),
            ("line_items[0][price]", price.as_str()),
            ("line_items[0][quantity]", "1"),
            ("customer_email", email),
            ("metadata[userId]", user_id.as_str()),
            ("metadata[accountType]", plan),
            ("return_url", return_url.as_str()),
        ];

        let url = format!("{STRIPE_API_BASE}/checkout/sessions");
        let response = retry::with_backoff(
            "stripe",
            || {
                self.http
                    .post(&url)
                    .bearer_auth(&self.secret_key)
                    .form(&params)
                    .send()
            },
            retry::transport_error,
        )
        .await?;
        let response = Self::expect_success(response).await?;

        #[derive(Deserialize)]
        struct SessionResponse {
            id: String,
            client_secret: Option<String>,
        }
        let session: SessionResponse = response.json().await?;
        let client_secret = session
            .client_secret
            .ok_or_else(|| AppError::upstream("stripe session had no client_secret"))?;
        Ok(CheckoutSession {
            id: session.id,
            client_secret,
        })
    }

    async fn checkout_session_status(&self, session_id: &str) -> Result<CheckoutStatus, AppError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions/{session_id}");
        let response = retry::with_backoff(
            "stripe",
            || self.http.get(&url).bearer_auth(&self.secret_key).send(),
            retry::transport_error,
        )
        .await?;
        let response = Self::expect_success(response).await?;

        #[derive(Deserialize)]
        struct StatusResponse {
            status: String,
            customer_details: Option<CustomerDetails>,
        }
        #[derive(Deserialize)]
        struct CustomerDetails {
            email: Option<String>,
        }
        let body: StatusResponse = response.json().await?;
        Ok(CheckoutStatus {
            status: body.status,
            customer_email: body.customer_details.and_then(|details| details.email),
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError> {
        let url = format!("{STRIPE_API_BASE}/subscriptions/{subscription_id}");
        let response = retry::with_backoff(
            "stripe",
            || self.http.delete(&url).bearer_auth(&self.secret_key).send(),
            retry::transport_error,
        )
        .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

/// Verifies the `stripe-signature` header against the raw request body.
/// The header carries a unix timestamp and one or more `v1` HMAC-SHA256
/// signatures over `"{timestamp}.{body}"`.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();
    for part in signature_header.split(',') {
        let mut pair = part.trim().splitn(2, '=');
        match (pair.next(), pair.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse().ok(),
            (Some("v1"), Some(value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::bad_request("invalid stripe-signature header"))?;
    if candidates.is_empty() {
        return Err(AppError::bad_request("invalid stripe-signature header"));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::bad_request(
            "stripe-signature timestamp outside tolerance",
        ));
    }

    for candidate in &candidates {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(AppError::internal)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }
    Err(AppError::bad_request("stripe-signature verification failed"))
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

pub fn parse_event(body: &[u8]) -> Result<StripeEvent, AppError> {
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("invalid webhook payload: {err}")))
}

pub(crate) fn tier_for_subscription_status(status: &str) -> &'static str {
    match status {
        "active" | "trialing" => ACCOUNT_TYPE_PAID,
        _ => ACCOUNT_TYPE_FREE,
    }
}

/// Applies one verified event to the matching user row. Events that
/// match no user are logged and acknowledged so Stripe stops retrying
/// them.
pub fn apply_event(conn: &mut DbConnection, event: &StripeEvent) -> Result<(), AppError> {
    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => apply_checkout_completed(conn, object),
        "customer.subscription.updated" => apply_subscription_updated(conn, object),
        "customer.subscription.deleted" => apply_subscription_deleted(conn, object),
        "invoice.payment_succeeded" => apply_invoice_outcome(conn, object, "succeeded"),
        "invoice.payment_failed" => apply_invoice_outcome(conn, object, "failed"),
        other => {
            tracing::debug!(event_type = other, "ignoring unhandled stripe event");
            Ok(())
        }
    }
}

fn apply_checkout_completed(conn: &mut DbConnection, object: &Value) -> Result<(), AppError> {
    use crate::schema::users::dsl;

    let Some(user_id) = object
        .pointer("/metadata/userId")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        tracing::warn!("checkout.session.completed without usable metadata.userId");
        return Ok(());
    };
    let plan = object
        .pointer("/metadata/accountType")
        .and_then(Value::as_str)
        .unwrap_or(ACCOUNT_TYPE_PAID);
    let customer = object.get("customer").and_then(Value::as_str);
    let subscription = object.get("subscription").and_then(Value::as_str);
    let payment_status = object
        .get("payment_status")
        .and_then(Value::as_str)
        .unwrap_or("paid");

    let affected = diesel::update(dsl::users.filter(dsl::id.eq(user_id)))
        .set((
            dsl::account_type.eq(plan),
            dsl::stripe_customer_id.eq(customer),
            dsl::subscription_id.eq(subscription),
            dsl::subscription_status.eq("active"),
            dsl::payment_status.eq(payment_status),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if affected == 0 {
        tracing::warn!(user_id = %user_id, "checkout completed for unknown user");
    }
    Ok(())
}

fn apply_subscription_updated(conn: &mut DbConnection, object: &Value) -> Result<(), AppError> {
    use crate::schema::users::dsl;

    let Some(customer) = object.get("customer").and_then(Value::as_str) else {
        tracing::warn!("subscription event without a customer id");
        return Ok(());
    };
    let status = object.get("status").and_then(Value::as_str).unwrap_or("unknown");
    let subscription = object.get("id").and_then(Value::as_str);

    let affected = diesel::update(dsl::users.filter(dsl::stripe_customer_id.eq(customer)))
        .set((
            dsl::account_type.eq(tier_for_subscription_status(status)),
            dsl::subscription_status.eq(status),
            dsl::subscription_id.eq(subscription),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if affected == 0 {
        tracing::warn!(customer, "subscription update matched no user");
    }
    Ok(())
}

fn apply_subscription_deleted(conn: &mut DbConnection, object: &Value) -> Result<(), AppError> {
    use crate::schema::users::dsl;

    let Some(customer) = object.get("customer").and_then(Value::as_str) else {
        tracing::warn!("subscription event without a customer id");
        return Ok(());
    };

    let affected = diesel::update(dsl::users.filter(dsl::stripe_customer_id.eq(customer)))
        .set((
            dsl::account_type.eq(ACCOUNT_TYPE_FREE),
            dsl::subscription_status.eq("canceled"),
            dsl::subscription_id.eq(None::<String>),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if affected == 0 {
        tracing::warn!(customer, "subscription deletion matched no user");
    }
    Ok(())
}

fn apply_invoice_outcome(
    conn: &mut DbConnection,
    object: &Value,
    outcome: &str,
) -> Result<(), AppError> {
    use crate::schema::users::dsl;

    let Some(customer) = object.get("customer").and_then(Value::as_str) else {
        tracing::warn!("invoice event without a customer id");
        return Ok(());
    };
    let invoice = object.get("id").and_then(Value::as_str);

    let affected = diesel::update(dsl::users.filter(dsl::stripe_customer_id.eq(customer)))
        .set((
            dsl::last_invoice.eq(invoice),
            dsl::payment_status.eq(outcome),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if affected == 0 {
        tracing::warn!(customer, "invoice event matched no user");
    }
    Ok(())
}
