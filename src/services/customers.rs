//! Customer records keyed by national id.

use std::sync::Arc;

use crate::domain::aggregates::{ContactDetails, Customer};
use crate::domain::value_objects::NationalId;
use crate::error::{ShopError, ShopResult};
use crate::store::{Store, StoreError};

const DUPLICATE: &str = "a customer with this national id or email already exists";
const MIN_SEARCH_LEN: usize = 3;
const SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
pub struct Customers {
    store: Arc<dyn Store>,
}

impl Customers {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[tracing::instrument(name = "customers.register", skip(self, contact))]
    pub async fn register(&self, national_id: &str, contact: ContactDetails) -> ShopResult<Customer> {
        let customer = Customer::register(parse_id(national_id)?, contact);
        self.store.create_customer(&customer).await.map_err(conflict)?;
        tracing::info!("customer registered");
        Ok(customer)
    }

    pub async fn get(&self, national_id: &str) -> ShopResult<Customer> {
        let id = parse_id(national_id)?;
        self.store.customer(id.as_str()).await?.ok_or_else(|| ShopError::NotFound(format!("customer {id}")))
    }

    #[tracing::instrument(name = "customers.update", skip(self, contact))]
    pub async fn update(&self, national_id: &str, contact: ContactDetails) -> ShopResult<Customer> {
        let mut customer = self.get(national_id).await?;
        customer.update_contact(contact);
        if !self.store.update_customer(&customer).await.map_err(conflict)? {
            return Err(ShopError::NotFound(format!("customer {}", customer.national_id)));
        }
        Ok(customer)
    }

    pub async fn list(&self) -> ShopResult<Vec<Customer>> { Ok(self.store.customers().await?) }

    /// Checkout lookup by partial name or national id.
    pub async fn search(&self, term: &str) -> ShopResult<Vec<Customer>> {
        let term = term.trim();
        if term.chars().count() < MIN_SEARCH_LEN {
            return Err(ShopError::validation(format!("search term needs at least {MIN_SEARCH_LEN} characters")));
        }
        Ok(self.store.search_customers(term, SEARCH_LIMIT).await?)
    }

    /// Takes the raw id; legacy records may not pass the checksum.
    #[tracing::instrument(name = "customers.delete", skip(self))]
    pub async fn delete(&self, national_id: &str) -> ShopResult<()> {
        let national_id = national_id.trim();
        if national_id.is_empty() {
            return Err(ShopError::validation("national id is required"));
        }
        if !self.store.delete_customer(national_id).await.map_err(conflict)? {
            return Err(ShopError::NotFound(format!("customer {national_id}")));
        }
        tracing::info!("customer deleted");
        Ok(())
    }
}

fn parse_id(raw: &str) -> ShopResult<NationalId> {
    NationalId::new(raw.trim()).map_err(|e| ShopError::validation(e.to_string()))
}

fn conflict(e: StoreError) -> ShopError {
    match e {
        StoreError::DuplicateCustomer => ShopError::Conflict(DUPLICATE.into()),
        StoreError::CustomerHasOrders(_) => ShopError::Conflict(e.to_string()),
        other => other.into(),
    }
}
