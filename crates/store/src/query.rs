use chrono::{DateTime, Utc};
use common::{BrandId, CategoryId, OrderState};
use serde::{Deserialize, Serialize};

use crate::{Order, Species};

/// Filters for catalog searches. Only available products are ever returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    /// Case-insensitive match against name, description or brand name.
    pub text: Option<String>,

    pub brand_id: Option<BrandId>,

    pub category_id: Option<CategoryId>,

    pub species: Option<Species>,
}

impl ProductQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by free text. Blank text is ignored.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn brand(mut self, brand_id: BrandId) -> Self {
        self.brand_id = Some(brand_id);
        self
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn species(mut self, species: Species) -> Self {
        self.species = Some(species);
        self
    }
}

/// Builder for admin order listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// Filter by state.
    pub state: Option<OrderState>,

    /// Orders created at or after this timestamp.
    pub from: Option<DateTime<Utc>>,

    /// Orders created at or before this timestamp.
    pub to: Option<DateTime<Utc>>,

    /// Case-insensitive substring of the customer's email.
    pub email: Option<String>,

    /// One-based page number.
    pub page: u32,

    pub page_size: u32,
}

impl OrderQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Creates a query for the first page with the default page size.
    pub fn new() -> Self {
        Self {
            state: None,
            from: None,
            to: None,
            email: None,
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn state(mut self, state: OrderState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Selects a page. Page zero is treated as the first page.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, Self::MAX_PAGE_SIZE);
        self
    }

    /// Number of rows to return.
    pub fn limit(&self) -> u32 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    /// Lower-cased email filter, if any.
    pub(crate) fn email_needle(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }

    /// Applies the filters to one order. Used by the in-memory backend.
    pub(crate) fn matches(&self, order: &Order) -> bool {
        if let Some(state) = self.state
            && order.state != state
        {
            return false;
        }
        if let Some(from) = self.from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to
            && order.created_at > to
        {
            return false;
        }
        if let Some(needle) = self.email_needle()
            && !order.customer_email.to_lowercase().contains(&needle)
        {
            return false;
        }
        true
    }
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of an order listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Number of orders matching the filters across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_twenty() {
        let query = OrderQuery::new();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn page_size_is_capped() {
        let query = OrderQuery::new().page_size(500).page(3);
        assert_eq!(query.limit(), 100);
        assert_eq!(query.offset(), 200);
    }

    #[test]
    fn page_zero_is_first_page() {
        assert_eq!(OrderQuery::new().page(0).offset(), 0);
    }

    #[test]
    fn blank_text_is_dropped() {
        assert_eq!(ProductQuery::new().text("   ").text, None);
        assert_eq!(
            ProductQuery::new().text(" kibble ").text.as_deref(),
            Some("kibble")
        );
    }
}
