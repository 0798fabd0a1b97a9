//! Customer types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use muchio_core::{Email, UserId, UserRole};

use super::address::{Address, non_blank};

/// A customer account (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Unique resolution key for checkout customers.
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub role: UserRole,
    pub is_active: bool,
    pub email_subscribed: bool,
    pub sms_subscribed: bool,
    /// Customer id at the payment provider.
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a customer.
///
/// New customers are always active, never admins and unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

/// Customer block embedded in a checkout session or an order request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

impl CustomerDetails {
    /// Split the full name on its first space into first and last name.
    #[must_use]
    pub fn split_name(&self) -> (Option<&str>, Option<&str>) {
        let Some(name) = non_blank(self.name.as_deref()) else {
            return (None, None);
        };
        match name.split_once(' ') {
            Some((first, last)) => (non_blank(Some(first)), non_blank(Some(last))),
            None => (Some(name), None),
        }
    }
}

impl NewUser {
    /// Build an insert from the customer block, blank fields stay empty.
    #[must_use]
    pub fn from_details(email: Email, details: &CustomerDetails) -> Self {
        let (first, last) = details.split_name();
        let address = details.address.as_ref();
        let field = |f: fn(&Address) -> Option<&str>| {
            non_blank(address.and_then(f)).unwrap_or_default().to_string()
        };

        Self {
            email,
            first_name: first.unwrap_or_default().to_string(),
            last_name: last.unwrap_or_default().to_string(),
            street: field(|a| a.line1.as_deref()),
            city: field(|a| a.city.as_deref()),
            province: field(|a| a.state.as_deref()),
            postal_code: field(|a| a.postal_code.as_deref()),
            country: field(|a| a.country.as_deref()),
            phone: non_blank(details.phone.as_deref())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl User {
    /// Merge non-blank fields from `details` into this user.
    ///
    /// Fields the details do not carry are left untouched. Returns whether
    /// anything changed.
    pub fn merge_details(&mut self, details: &CustomerDetails) -> bool {
        let (first, last) = details.split_name();
        let address = details.address.clone().unwrap_or_default();

        let updates = [
            (&mut self.first_name, first),
            (&mut self.last_name, last),
            (&mut self.street, non_blank(address.line1.as_deref())),
            (&mut self.city, non_blank(address.city.as_deref())),
            (&mut self.province, non_blank(address.state.as_deref())),
            (&mut self.postal_code, non_blank(address.postal_code.as_deref())),
            (&mut self.country, non_blank(address.country.as_deref())),
            (&mut self.phone, non_blank(details.phone.as_deref())),
        ];

        let mut changed = false;
        for (field, value) in updates {
            if let Some(value) = value
                && field.as_str() != value
            {
                value.clone_into(field);
                changed = true;
            }
        }
        changed
    }

    /// Display name for emails, falling back to the email address.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.to_string()
        } else {
            full.to_string()
        }
    }
}
