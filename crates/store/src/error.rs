use thiserror::Error;

/// Names of the storage constraints the core relies on.
///
/// The in-memory backend reports violations under the same names as the
/// PostgreSQL schema so callers can match on them regardless of backend.
pub mod constraint {
    pub const BRAND_NAME: &str = "brands_name_key";
    pub const CATEGORY_NAME: &str = "categories_name_key";
    pub const PRODUCT_BRAND: &str = "products_brand_id_fkey";
    pub const PRODUCT_CATEGORY: &str = "products_category_id_fkey";
    pub const CUSTOMER_EMAIL: &str = "customers_email_key";
    pub const CART_CUSTOMER: &str = "carts_customer_id_fkey";
    pub const CART_LINE_CART: &str = "cart_lines_cart_id_fkey";
    pub const CART_LINE_PRODUCT: &str = "cart_lines_product_id_fkey";
    pub const CART_LINE_UNIQUE: &str = "cart_lines_cart_product_key";
    pub const ORDER_CUSTOMER: &str = "orders_customer_id_fkey";
    pub const ORDER_NUMBER: &str = "orders_order_number_key";
    pub const ORDER_TRACKING_TOKEN: &str = "orders_tracking_token_key";
    pub const ORDER_LINE_PRODUCT: &str = "order_lines_product_id_fkey";
}

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint rejected the write or delete.
    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// An update targeted a row that does not exist.
    #[error("Row not found in {0}")]
    MissingRow(&'static str),

    /// A value does not fit the column or record it is mapped to.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if this is a unique violation of the named constraint.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation(c) if c == name)
    }

    /// Returns true if this is a foreign key violation of the named constraint.
    pub fn is_foreign_key_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::ForeignKeyViolation(c) if c == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            let name = db_err.constraint().unwrap_or_default().to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(name);
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(name);
            }
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_constraint_by_name() {
        let err = StoreError::UniqueViolation(constraint::CUSTOMER_EMAIL.to_string());
        assert!(err.is_unique_violation(constraint::CUSTOMER_EMAIL));
        assert!(!err.is_unique_violation(constraint::CART_LINE_UNIQUE));
        assert!(!err.is_foreign_key_violation(constraint::CUSTOMER_EMAIL));
    }

    #[test]
    fn non_database_sqlx_errors_stay_database() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }
}
