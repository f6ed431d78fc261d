//! Customer service.

use chrono::Utc;
use common::CustomerId;
use store::{Customer, CustomerRepository, Store, Transaction, constraint};

use crate::error::DomainError;

use super::{CustomerError, Registration, password};

/// Service for registering and authenticating customers.
///
/// Emails are matched exactly, including case.
#[derive(Clone)]
pub struct CustomerService<S: Store> {
    store: S,
}

impl<S: Store> CustomerService<S> {
    /// Creates a new customer service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<Customer, DomainError> {
        self.create(registration, false).await
    }

    /// Registers a customer with access to the admin endpoints.
    #[tracing::instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register_staff(
        &self,
        registration: Registration,
    ) -> Result<Customer, DomainError> {
        self.create(registration, true).await
    }

    /// Returns the customer only if the email exists, the account is active
    /// and the password verifies. Every failure looks the same to the caller.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Customer>, DomainError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let found = {
            let mut tx = self.store.begin().await?;
            tx.find_customer_by_email(email).await?
        };
        let Some(customer) = found else {
            tracing::info!("login refused");
            return Ok(None);
        };
        if !customer.is_active
            || !password::verify(password.to_string(), customer.password_hash.clone()).await
        {
            tracing::info!(customer_id = %customer.id, "login refused");
            return Ok(None);
        }

        tracing::info!(customer_id = %customer.id, "customer logged in");
        Ok(Some(customer))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: CustomerId) -> Result<Customer, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .get_customer(customer_id)
            .await?
            .ok_or(CustomerError::NotFound)?)
    }

    /// Deletes a customer and their carts. Customers with orders are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_customer(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_customer(customer_id).await.map_err(|e| {
            if e.is_foreign_key_violation(constraint::ORDER_CUSTOMER) {
                CustomerError::HasOrders(customer_id).into()
            } else {
                DomainError::from(e)
            }
        })?;
        if !deleted {
            return Err(CustomerError::NotFound.into());
        }
        tx.commit().await?;

        tracing::info!(%customer_id, "customer deleted");
        Ok(())
    }

    async fn create(
        &self,
        registration: Registration,
        is_staff: bool,
    ) -> Result<Customer, DomainError> {
        let email = registration.email.trim().to_string();
        if email.is_empty() {
            return Err(CustomerError::MissingEmail.into());
        }
        if registration.password.is_empty() {
            return Err(CustomerError::MissingPassword.into());
        }

        // Hash before opening the transaction so the store is not held meanwhile.
        let password_hash = password::hash(registration.password).await?;

        let mut tx = self.store.begin().await?;
        if tx.find_customer_by_email(&email).await?.is_some() {
            return Err(CustomerError::DuplicateEmail(email).into());
        }

        let customer = Customer {
            id: CustomerId::new(),
            password_hash,
            email,
            name: registration.name.trim().to_string(),
            surname: registration.surname.trim().to_string(),
            phone: registration.phone.trim().to_string(),
            address: registration.address.trim().to_string(),
            city: registration.city.trim().to_string(),
            postal_code: registration.postal_code.trim().to_string(),
            is_staff,
            is_active: true,
            created_at: Utc::now(),
        };
        tx.insert_customer(&customer).await.map_err(|e| {
            if e.is_unique_violation(constraint::CUSTOMER_EMAIL) {
                CustomerError::DuplicateEmail(customer.email.clone()).into()
            } else {
                DomainError::from(e)
            }
        })?;
        tx.commit().await?;

        tracing::info!(customer_id = %customer.id, is_staff, "customer registered");
        Ok(customer)
    }
}
