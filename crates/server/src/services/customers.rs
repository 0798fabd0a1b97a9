//! Customer resolution for checkouts and order requests.
//!
//! Email is the only key: a known email gets its record refreshed with the
//! non-blank fields of the incoming details, an unknown one gets a new record.

use thiserror::Error;
use tracing::instrument;

use muchio_core::{Email, EmailError};

use crate::db::{RepositoryError, UserStore};
use crate::models::{CustomerDetails, NewUser, User};

/// Errors that can occur while resolving a customer.
#[derive(Debug, Error)]
pub enum CustomerError {
    /// The checkout carried no customer block or no email in it.
    #[error("missing customer details")]
    MissingCustomerDetails,

    /// The email does not parse.
    #[error("invalid customer email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Maps customer details to a local user record.
pub struct CustomerResolver<'a, S: ?Sized> {
    users: &'a S,
}

impl<'a, S: UserStore + ?Sized> CustomerResolver<'a, S> {
    /// Create a resolver over `users`.
    #[must_use]
    pub const fn new(users: &'a S) -> Self {
        Self { users }
    }

    /// Resolve the customer of a completed checkout.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::MissingCustomerDetails` if `details` is absent
    /// or has no email, `CustomerError::Repository` if storage fails.
    pub async fn resolve_checkout(
        &self,
        details: Option<&CustomerDetails>,
    ) -> Result<User, CustomerError> {
        let details = details.ok_or(CustomerError::MissingCustomerDetails)?;
        let email = details
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or(CustomerError::MissingCustomerDetails)?;
        let email = Email::parse(email)?;
        self.resolve(&email, details).await
    }

    /// Find the user with `email` and merge `details` into it, or create one.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Repository` if storage fails.
    #[instrument(skip(self, details), fields(email = %email))]
    pub async fn resolve(
        &self,
        email: &Email,
        details: &CustomerDetails,
    ) -> Result<User, CustomerError> {
        if let Some(existing) = self.users.find_user_by_email(email).await? {
            return self.refresh(existing, details).await;
        }

        match self
            .users
            .create_user(&NewUser::from_details(email.clone(), details))
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Created customer");
                Ok(user)
            }
            // Another request created the same email in between
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .users
                    .find_user_by_email(email)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                self.refresh(existing, details).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store the payment provider's customer id on `user` if it changed.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Repository` if storage fails.
    pub async fn link_payment_customer(
        &self,
        mut user: User,
        customer_id: &str,
    ) -> Result<User, CustomerError> {
        if user.payment_customer_id.as_deref() == Some(customer_id) {
            return Ok(user);
        }
        user.payment_customer_id = Some(customer_id.to_string());
        let user = self.users.update_user(&user).await?;
        tracing::debug!(user_id = %user.id, customer_id, "Linked payment customer");
        Ok(user)
    }

    async fn refresh(&self, mut user: User, details: &CustomerDetails) -> Result<User, CustomerError> {
        if !user.merge_details(details) {
            return Ok(user);
        }
        let user = self.users.update_user(&user).await?;
        tracing::info!(user_id = %user.id, "Updated customer details");
        Ok(user)
    }
}
