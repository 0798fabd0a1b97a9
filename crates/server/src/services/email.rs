//! Customer emails: order confirmation and shipment notice.
//!
//! Delivery goes through the [`Notifier`] trait. Production uses SMTP via
//! lettre; without SMTP settings emails are only logged. Sending is always
//! best effort: callers log failures and carry on.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use thiserror::Error;
use url::Url;

use crate::config::EmailConfig;
use crate::db::{OrderStore, RepositoryError};
use crate::models::{Order, OrderItem, User};

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl NotifyError {
    /// Whether sending again later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Smtp(_))
    }
}

/// Transport acknowledgement of a sent email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub response: String,
}

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Sends emails.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a multipart email with plain text and HTML bodies.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<DeliveryReceipt, NotifyError>;
}

// =============================================================================
// Transports
// =============================================================================

/// SMTP delivery.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpNotifier {
    /// Create a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )?;

        let response = self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(DeliveryReceipt {
            response: response.message().collect::<Vec<_>>().join(" "),
        })
    }
}

/// Logs emails instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        _html: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        tracing::info!(to = %to, subject = %subject, body = %text, "Email not sent (SMTP not configured)");
        Ok(DeliveryReceipt {
            response: "logged".to_string(),
        })
    }
}

// =============================================================================
// Templates
// =============================================================================

struct EmailLine<'a> {
    name: &'a str,
    variant_name: Option<&'a str>,
    quantity: i32,
    price: String,
    total: String,
}

impl<'a> From<&'a OrderItem> for EmailLine<'a> {
    fn from(item: &'a OrderItem) -> Self {
        Self {
            name: &item.name,
            variant_name: item.variant_name.as_deref().filter(|v| !v.is_empty()),
            quantity: item.quantity,
            price: money(item.price),
            total: money(item.total),
        }
    }
}

/// HTML template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer_name: &'a str,
    order_number: i64,
    items: &'a [EmailLine<'a>],
    address: Option<&'a str>,
    subtotal: &'a str,
    shipping_option: &'a str,
    shipping_cost: &'a str,
    total_price: &'a str,
    shop_name: &'a str,
}

/// Plain text template for the order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer_name: &'a str,
    order_number: i64,
    items: &'a [EmailLine<'a>],
    address: Option<&'a str>,
    subtotal: &'a str,
    shipping_option: &'a str,
    shipping_cost: &'a str,
    total_price: &'a str,
    shop_name: &'a str,
}

/// HTML template for the shipment notice.
#[derive(Template)]
#[template(path = "email/shipment.html")]
struct ShipmentHtml<'a> {
    customer_name: &'a str,
    order_number: i64,
    carrier: &'a str,
    tracking_number: &'a str,
    tracking_url: Option<&'a str>,
    items: &'a [EmailLine<'a>],
    shop_name: &'a str,
}

/// Plain text template for the shipment notice.
#[derive(Template)]
#[template(path = "email/shipment.txt")]
struct ShipmentText<'a> {
    customer_name: &'a str,
    order_number: i64,
    carrier: &'a str,
    tracking_number: &'a str,
    tracking_url: Option<&'a str>,
    items: &'a [EmailLine<'a>],
    shop_name: &'a str,
}

/// Render the confirmation for a freshly created order.
///
/// # Errors
///
/// Returns `NotifyError::Template` if rendering fails.
pub fn order_confirmation(
    order: &Order,
    user: &User,
    shop_name: &str,
) -> Result<OutgoingEmail, NotifyError> {
    let customer_name = user.display_name();
    let items: Vec<EmailLine<'_>> = order.items.iter().map(EmailLine::from).collect();
    let address = order
        .shipping_info
        .address
        .as_ref()
        .map(crate::models::Address::one_line)
        .filter(|line| !line.is_empty());
    let subtotal = money(order.subtotal);
    let shipping_cost = money(order.shipping_info.shipping_cost);
    let total_price = money(order.total_price);
    let shipping_option = if order.shipping_info.shipping_option.is_empty() {
        "Shipping"
    } else {
        order.shipping_info.shipping_option.as_str()
    };

    let html = OrderConfirmationHtml {
        customer_name: &customer_name,
        order_number: order.order_number,
        items: &items,
        address: address.as_deref(),
        subtotal: &subtotal,
        shipping_option,
        shipping_cost: &shipping_cost,
        total_price: &total_price,
        shop_name,
    }
    .render()?;
    let text = OrderConfirmationText {
        customer_name: &customer_name,
        order_number: order.order_number,
        items: &items,
        address: address.as_deref(),
        subtotal: &subtotal,
        shipping_option,
        shipping_cost: &shipping_cost,
        total_price: &total_price,
        shop_name,
    }
    .render()?;

    Ok(OutgoingEmail {
        to: user.email.to_string(),
        subject: format!("Order Confirmation - Your Order #{}", order.order_number),
        text,
        html,
    })
}

/// Render the shipment notice for an order with tracking attached.
///
/// # Errors
///
/// Returns `NotifyError::Template` if rendering fails.
pub fn shipment_notice(
    order: &Order,
    user: &User,
    shop_name: &str,
) -> Result<OutgoingEmail, NotifyError> {
    let customer_name = user.display_name();
    let items: Vec<EmailLine<'_>> = order.items.iter().map(EmailLine::from).collect();
    let carrier = order.carrier.as_deref().unwrap_or_default();
    let tracking_number = order.tracking_number.as_deref().unwrap_or_default();
    let url = tracking_url(carrier, tracking_number);

    let html = ShipmentHtml {
        customer_name: &customer_name,
        order_number: order.order_number,
        carrier,
        tracking_number,
        tracking_url: url.as_deref(),
        items: &items,
        shop_name,
    }
    .render()?;
    let text = ShipmentText {
        customer_name: &customer_name,
        order_number: order.order_number,
        carrier,
        tracking_number,
        tracking_url: url.as_deref(),
        items: &items,
        shop_name,
    }
    .render()?;

    Ok(OutgoingEmail {
        to: user.email.to_string(),
        subject: format!("Your Order is Shipped - Tracking #{tracking_number}"),
        text,
        html,
    })
}

/// Send `email` and log the outcome; failures never propagate.
pub async fn send_best_effort(
    notifier: &dyn Notifier,
    email: Result<OutgoingEmail, NotifyError>,
    order_number: i64,
) {
    let result = match email {
        Ok(email) => {
            notifier
                .send(&email.to, &email.subject, &email.text, &email.html)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(receipt) => {
            tracing::info!(order_number, response = %receipt.response, "Customer email delivered");
        }
        Err(e) => {
            tracing::warn!(order_number, error = %e, "Failed to send customer email");
        }
    }
}

/// Send the order confirmation unless it already went out.
///
/// The order is claimed in storage first, so of several concurrent callers
/// only one sends. A transient transport failure releases the claim and the
/// reconciler retries; other failures keep it, the email is dropped.
///
/// Returns whether this call delivered the email.
///
/// # Errors
///
/// Returns `RepositoryError` if the claim cannot be read or written.
pub async fn deliver_confirmation<S>(
    store: &S,
    notifier: &dyn Notifier,
    order: &Order,
    user: &User,
    shop_name: &str,
) -> Result<bool, RepositoryError>
where
    S: OrderStore + ?Sized,
{
    if order.confirmation_sent_at.is_some() || !store.claim_confirmation(order.id).await? {
        tracing::debug!(order_number = order.order_number, "Confirmation already sent");
        return Ok(false);
    }

    let result = match order_confirmation(order, user, shop_name) {
        Ok(email) => {
            notifier
                .send(&email.to, &email.subject, &email.text, &email.html)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(receipt) => {
            tracing::info!(
                order_number = order.order_number,
                response = %receipt.response,
                "Order confirmation delivered"
            );
            Ok(true)
        }
        Err(e) if e.is_transient() => {
            tracing::warn!(
                order_number = order.order_number,
                error = %e,
                "Order confirmation failed, will retry"
            );
            store.release_confirmation(order.id).await?;
            Ok(false)
        }
        Err(e) => {
            tracing::warn!(
                order_number = order.order_number,
                error = %e,
                "Order confirmation dropped"
            );
            Ok(false)
        }
    }
}

/// Carrier tracking page for the known carriers.
#[must_use]
pub fn tracking_url(carrier: &str, tracking_number: &str) -> Option<String> {
    let tracking_number = tracking_number.trim();
    if tracking_number.is_empty() {
        return None;
    }

    let carrier = carrier.trim().to_lowercase();
    let url = match carrier.as_str() {
        "ups" => Url::parse_with_params(
            "https://www.ups.com/track",
            [("loc", "en_CA"), ("tracknum", tracking_number)],
        ),
        "fedex" => Url::parse_with_params(
            "https://www.fedex.com/fedextrack/",
            [("tracknumbers", tracking_number)],
        ),
        "dhl" => Url::parse_with_params(
            "https://www.dhl.com/en/express/tracking.html",
            [("AWB", tracking_number)],
        ),
        _ => return None,
    };
    url.ok().map(String::from)
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use muchio_core::{
        Email, FulfillmentStatus, OptionValueId, OrderId, OrderItemId, PaymentStatus, ProductId,
        StockStatus, UserId, UserRole,
    };

    use super::*;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::{Address, NewOrder, NewUser, ShippingInfo};

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            email: Email::parse("kai@example.com").unwrap(),
            first_name: "Kai".to_string(),
            last_name: "Moana".to_string(),
            street: String::new(),
            city: String::new(),
            province: String::new(),
            postal_code: String::new(),
            country: String::new(),
            phone: String::new(),
            role: UserRole::User,
            is_active: true,
            email_subscribed: false,
            sms_subscribed: false,
            payment_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(5),
            user_id: UserId::new(1),
            order_number: 1042,
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: ProductId::new(7),
                variant_id: Some(OptionValueId::new(71)),
                name: "Linen Shirt".to_string(),
                variant_name: Some("Size: M".to_string()),
                quantity: 2,
                price: Decimal::new(15, 0),
                total: Decimal::new(30, 0),
                stock_status: StockStatus::Applied,
            }],
            subtotal: Decimal::new(30, 0),
            shipping_info: ShippingInfo {
                carrier_name: "Standard Carrier".to_string(),
                shipping_cost: Decimal::new(500, 2),
                address: Some(Address {
                    line1: Some("1 Kelp Way".to_string()),
                    city: Some("Tofino".to_string()),
                    ..Address::default()
                }),
                shipping_option: "Standard Shipping".to_string(),
            },
            total_price: Decimal::new(3500, 2),
            payment_status: PaymentStatus::Paid,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            tracking_number: Some("1Z999AA1".to_string()),
            carrier: Some("UPS".to_string()),
            payment_event_id: None,
            checkout_session_id: None,
            confirmation_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_confirmation_content() {
        let email = order_confirmation(&order(), &user(), "Muchio Shop").unwrap();

        assert_eq!(email.to, "kai@example.com");
        assert_eq!(email.subject, "Order Confirmation - Your Order #1042");
        assert!(email.text.contains("2 x Linen Shirt (Size: M) - $15.00 (Total: $30.00)"));
        assert!(email.text.contains("1 Kelp Way, Tofino"));
        assert!(email.text.contains("Standard Shipping: $5.00"));
        assert!(email.text.contains("Total: $35.00"));
        assert!(email.html.contains("Thank you for your order, Kai Moana!"));
    }

    #[test]
    fn test_shipment_notice_content() {
        let email = shipment_notice(&order(), &user(), "Muchio Shop").unwrap();

        assert_eq!(email.subject, "Your Order is Shipped - Tracking #1Z999AA1");
        assert!(email.text.contains("shipped with UPS"));
        assert!(
            email
                .text
                .contains("https://www.ups.com/track?loc=en_CA&tracknum=1Z999AA1")
        );
    }

    #[test]
    fn test_html_escapes_item_names() {
        let mut order = order();
        order.items[0].name = "<b>Shirt</b>".to_string();
        let email = order_confirmation(&order, &user(), "Muchio Shop").unwrap();
        assert!(!email.html.contains("<b>Shirt</b>"));
        assert!(email.text.contains("<b>Shirt</b>"));
    }

    #[test]
    fn test_tracking_url() {
        assert_eq!(
            tracking_url("FedEx", "7712 3456").as_deref(),
            Some("https://www.fedex.com/fedextrack/?tracknumbers=7712+3456")
        );
        assert_eq!(
            tracking_url("dhl", "JD0001").as_deref(),
            Some("https://www.dhl.com/en/express/tracking.html?AWB=JD0001")
        );
        assert_eq!(tracking_url("Canada Post", "123"), None);
        assert_eq!(tracking_url("ups", "  "), None);
    }

    #[tokio::test]
    async fn test_log_notifier_accepts() {
        let receipt = LogNotifier
            .send("kai@example.com", "Hi", "text", "<p>html</p>")
            .await
            .unwrap();
        assert_eq!(receipt.response, "logged");
    }

    struct RejectingNotifier;

    #[async_trait]
    impl Notifier for RejectingNotifier {
        async fn send(
            &self,
            to: &str,
            _subject: &str,
            _text: &str,
            _html: &str,
        ) -> Result<DeliveryReceipt, NotifyError> {
            Err(NotifyError::InvalidAddress(to.to_string()))
        }
    }

    async fn stored_checkout_order(store: &MemoryStore) -> (Order, User) {
        let user = store
            .create_user(&NewUser {
                email: Email::parse("kai@example.com").unwrap(),
                first_name: "Kai".to_string(),
                last_name: "Moana".to_string(),
                street: String::new(),
                city: String::new(),
                province: String::new(),
                postal_code: String::new(),
                country: String::new(),
                phone: String::new(),
            })
            .await
            .unwrap();
        let template = order();
        let new_order = NewOrder {
            user_id: user.id,
            items: Vec::new(),
            subtotal: template.subtotal,
            shipping_info: template.shipping_info,
            total_price: template.total_price,
            payment_status: PaymentStatus::Paid,
            payment_event_id: Some("evt_confirm".to_string()),
            checkout_session_id: None,
            item_stock_status: StockStatus::Pending,
        };
        (store.insert_order(&new_order, 1).await.unwrap(), user)
    }

    #[tokio::test]
    async fn test_confirmation_delivered_once() {
        let store = MemoryStore::new();
        let (order, user) = stored_checkout_order(&store).await;
        assert_eq!(store.orders_awaiting_confirmation(10).await.unwrap().len(), 1);

        let first = deliver_confirmation(&store, &LogNotifier, &order, &user, "Muchio Shop")
            .await
            .unwrap();
        let again = deliver_confirmation(&store, &LogNotifier, &order, &user, "Muchio Shop")
            .await
            .unwrap();

        assert!(first);
        assert!(!again);
        assert!(store.orders_awaiting_confirmation(10).await.unwrap().is_empty());
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert!(stored.confirmation_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_undeliverable_confirmation_not_retried() {
        let store = MemoryStore::new();
        let (order, user) = stored_checkout_order(&store).await;

        let sent = deliver_confirmation(&store, &RejectingNotifier, &order, &user, "Muchio Shop")
            .await
            .unwrap();

        assert!(!sent);
        assert!(!NotifyError::InvalidAddress(String::new()).is_transient());
        assert!(store.orders_awaiting_confirmation(10).await.unwrap().is_empty());
    }
}
