//! Payment routes: the Stripe webhook and provider lookups.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::Order;
use crate::services::{CheckoutError, CheckoutOutcome};
use crate::stripe::{CHECKOUT_SESSION_COMPLETED, CheckoutSession, SIGNATURE_HEADER, StripeEvent};
use crate::state::AppState;

/// Acknowledgement body for webhook deliveries.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Webhook failure.
///
/// Always a 400 with a plain-text reason so Stripe shows it in the delivery
/// log and retries the event.
#[derive(Debug)]
pub struct WebhookError(CheckoutError);

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.is_client_error() {
            tracing::warn!(error = %err, "Rejected webhook");
        } else {
            let event_id = sentry::capture_error(&err);
            tracing::error!(
                error = %err,
                sentry_event_id = %event_id,
                "Webhook processing failed"
            );
        }

        (StatusCode::BAD_REQUEST, format!("Webhook Error: {err}")).into_response()
    }
}

/// Receive a Stripe event.
///
/// POST /payment/webhook
///
/// The body is kept as raw bytes; the signature covers the exact payload.
///
/// # Errors
///
/// Returns `WebhookError` if verification or any pipeline step fails.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<WebhookAck>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .checkout()
        .process(&body, signature)
        .await
        .map_err(WebhookError)?;

    match &outcome {
        CheckoutOutcome::OrderCreated(order) => {
            tracing::info!(order_number = order.order_number, "Webhook created order");
        }
        CheckoutOutcome::AlreadyProcessed(order) => {
            tracing::info!(order_number = order.order_number, "Webhook redelivery acknowledged");
        }
        CheckoutOutcome::Ignored { event_type } => {
            tracing::debug!(event_type = %event_type, "Webhook acknowledged without action");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Retrieve a checkout session from Stripe.
///
/// GET /payment/stripe/sessions/{session_id}
///
/// # Errors
///
/// Returns `AppError::Stripe` if the lookup fails.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutSession>> {
    let session = state.payments().retrieve_session(&session_id).await?;
    Ok(Json(session))
}

/// A completed-checkout event and the order it produced.
#[derive(Debug, Serialize)]
pub struct EventOrder {
    pub event: StripeEvent,
    pub order: Order,
}

/// Retrieve a Stripe event together with its order.
///
/// GET /payment/stripe/events/{event_id}
///
/// # Errors
///
/// Returns `AppError::BadRequest` for events other than completed
/// checkouts, `AppError::NotFound` if no order was created from the event.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<EventOrder>> {
    let event = state.payments().retrieve_event(&event_id).await?;
    if event.event_type != CHECKOUT_SESSION_COMPLETED {
        return Err(AppError::BadRequest(format!(
            "Event {event_id} is not a completed checkout"
        )));
    }

    let order = state
        .store()
        .find_order_by_payment_event(&event.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found for this event".to_string()))?;

    Ok(Json(EventOrder { event, order }))
}
