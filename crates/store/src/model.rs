//! Records persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, Money, OrderId, OrderLineId, OrderState,
    ProductId,
};
use serde::{Deserialize, Serialize};

/// A brand (manufacturer). Names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
}

impl Brand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BrandId::new(),
            name: name.into(),
        }
    }
}

/// A product category. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The animal a product is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
    #[default]
    Both,
    Other,
}

impl Species {
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Dog => "dog",
            Species::Cat => "cat",
            Species::Both => "both",
            Species::Other => "other",
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Species {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dog" => Ok(Species::Dog),
            "cat" => Ok(Species::Cat),
            "both" => Ok(Species::Both),
            "other" => Ok(Species::Other),
            other => Err(format!("unknown species: {other}")),
        }
    }
}

/// A catalog product.
///
/// `brand_name` and `category_name` are read through the brand and category
/// references; they are ignored on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub brand_id: BrandId,
    pub brand_name: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub species: Species,
    pub color: String,
    pub material: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: u32,
    pub available: bool,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// A sale price only counts when it undercuts the list price.
    pub fn is_on_offer(&self) -> bool {
        matches!(self.sale_price, Some(sale) if sale < self.price)
    }

    /// The price a buyer pays right now.
    pub fn current_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }

    /// Percentage off the list price, rounded to two decimals. Zero when not on offer.
    pub fn discount_percent(&self) -> f64 {
        match self.sale_price {
            Some(sale) if sale < self.price && self.price.is_positive() => {
                let off = (self.price - sale).cents() as f64 / self.price.cents() as f64 * 100.0;
                (off * 100.0).round() / 100.0
            }
            _ => 0.0,
        }
    }

    /// Stock that can actually be sold: zero while the product is withdrawn.
    pub fn effective_stock(&self) -> u32 {
        if self.available { self.stock } else { 0 }
    }

    pub fn is_sold_out(&self) -> bool {
        self.effective_stock() == 0
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub brand_id: BrandId,
    pub category_id: CategoryId,
    #[serde(default)]
    pub species: Species,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub material: String,
    pub price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub featured: bool,
}

fn default_available() -> bool {
    true
}

/// A shopping cart. `customer_id` is `None` for anonymous carts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub customer_id: Option<CustomerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(customer_id: Option<CustomerId>, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            customer_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.customer_id.is_none()
    }
}

/// Current intent to buy `quantity` units of a product. Never price-locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(cart_id: CartId, product_id: ProductId, quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: CartLineId::new(),
            cart_id,
            product_id,
            quantity,
            added_at: now,
        }
    }
}

/// A frozen purchase line. `unit_price` never follows later catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

impl OrderLine {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            id: OrderLineId::new(),
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            total: unit_price.multiply(quantity),
        }
    }
}

/// A placed order and its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub customer_email: String,
    pub order_number: String,
    pub tracking_token: String,
    pub state: OrderState,
    pub subtotal: Money,
    pub taxes: Money,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total: Money,
    pub shipping_address: String,
    pub phone: String,
    pub cancellation_reason: Option<String>,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Re-derives line totals and the order total from their parts.
    ///
    /// Called by every backend before an order is written.
    pub fn normalize(&mut self) {
        for line in &mut self.lines {
            line.total = line.unit_price.multiply(line.quantity);
        }
        self.total = self.subtotal + self.taxes + self.shipping_cost - self.discount;
    }

    /// Sum of quantities over all lines.
    pub fn total_items(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}

/// A registered customer. The email is the login identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: i64, sale: Option<i64>, stock: u32, available: bool) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(),
            name: "Chew toy".to_string(),
            description: "Rubber bone".to_string(),
            brand_id: BrandId::new(),
            brand_name: "Acme".to_string(),
            category_id: CategoryId::new(),
            category_name: "Toys".to_string(),
            species: Species::Dog,
            color: String::new(),
            material: String::new(),
            price: Money::from_cents(price),
            sale_price: sale.map(Money::from_cents),
            stock,
            available,
            featured: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn current_price_uses_lower_sale_price() {
        let p = product(2000, Some(1500), 5, true);
        assert!(p.is_on_offer());
        assert_eq!(p.current_price(), Money::from_cents(1500));
    }

    #[test]
    fn sale_price_not_below_list_is_ignored() {
        let p = product(2000, Some(2000), 5, true);
        assert!(!p.is_on_offer());
        assert_eq!(p.current_price(), Money::from_cents(2000));
        assert_eq!(p.discount_percent(), 0.0);
    }

    #[test]
    fn discount_percent_rounds_to_two_decimals() {
        let p = product(3000, Some(2000), 5, true);
        assert_eq!(p.discount_percent(), 33.33);
    }

    #[test]
    fn withdrawn_product_has_no_effective_stock() {
        let p = product(1000, None, 8, false);
        assert_eq!(p.effective_stock(), 0);
        assert!(p.is_sold_out());

        let p = product(1000, None, 0, true);
        assert!(p.is_sold_out());
    }

    #[test]
    fn normalize_recomputes_totals() {
        let now = Utc::now();
        let mut line = OrderLine::new(ProductId::new(), "Leash", 3, Money::from_cents(500));
        line.total = Money::zero();
        let mut order = Order {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            customer_email: "a@example.com".to_string(),
            order_number: "ORD-1".to_string(),
            tracking_token: "t".to_string(),
            state: OrderState::Pending,
            subtotal: Money::from_cents(1500),
            taxes: Money::from_cents(315),
            shipping_cost: Money::from_cents(499),
            discount: Money::from_cents(100),
            total: Money::zero(),
            shipping_address: "1 Main St".to_string(),
            phone: "+34600111222".to_string(),
            cancellation_reason: None,
            lines: vec![line],
            created_at: now,
            updated_at: now,
        };

        order.normalize();

        assert_eq!(order.lines[0].total, Money::from_cents(1500));
        assert_eq!(order.total, Money::from_cents(1500 + 315 + 499 - 100));
        assert_eq!(order.total_items(), 3);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let customer = Customer {
            id: CustomerId::new(),
            email: "a@example.com".to_string(),
            password_hash: "secret-hash".to_string(),
            name: "Ana".to_string(),
            surname: "Ruiz".to_string(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            is_staff: false,
            is_active: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&customer).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn species_parses() {
        assert_eq!("cat".parse::<Species>().unwrap(), Species::Cat);
        assert!("fish".parse::<Species>().is_err());
    }
}
