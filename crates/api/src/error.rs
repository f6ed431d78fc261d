//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, CatalogError, CustomerError, DomainError, OrderError};

const INTERNAL_MESSAGE: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No authenticated customer, or failed login.
    Unauthorized(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Internal server error. The detail is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: String) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::Store(_) => return internal(err.to_string()),
        DomainError::Catalog(e) => match e {
            CatalogError::ProductNotFound(_)
            | CatalogError::BrandNotFound(_)
            | CatalogError::CategoryNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::InvalidPrice { .. }
            | CatalogError::InvalidStock { .. }
            | CatalogError::EmptyName
            | CatalogError::DuplicateName(_) => StatusCode::BAD_REQUEST,
            CatalogError::ProductInUse(_) => StatusCode::CONFLICT,
        },
        DomainError::Cart(e) => match e {
            CartError::CartNotFound(_)
            | CartError::ProductNotFound(_)
            | CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
            CartError::InvalidQuantity { .. }
            | CartError::ProductUnavailable { .. }
            | CartError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            CartError::AlreadyOwned(_) => StatusCode::CONFLICT,
        },
        DomainError::Order(e) => match e {
            OrderError::NotFound(_) | OrderError::TrackingNotFound => StatusCode::NOT_FOUND,
            OrderError::ForeignCart(_) => StatusCode::FORBIDDEN,
            OrderError::InvalidStateTransition { .. }
            | OrderError::EmptyCart(_)
            | OrderError::InvalidPhone(_)
            | OrderError::InvalidAddress
            | OrderError::InvalidAmount { .. }
            | OrderError::ProductUnavailable { .. }
            | OrderError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        },
        DomainError::Customer(e) => match e {
            CustomerError::NotFound => StatusCode::NOT_FOUND,
            CustomerError::MissingEmail
            | CustomerError::MissingPassword
            | CustomerError::DuplicateEmail(_) => StatusCode::BAD_REQUEST,
            CustomerError::HasOrders(_) => StatusCode::CONFLICT,
            CustomerError::PasswordHash => return internal(err.to_string()),
        },
    };

    // Report the inner error without the layer prefix.
    let message = match err {
        DomainError::Catalog(e) => e.to_string(),
        DomainError::Cart(e) => e.to_string(),
        DomainError::Order(e) => e.to_string(),
        DomainError::Customer(e) => e.to_string(),
        DomainError::Store(e) => e.to_string(),
    };
    (status, message)
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use store::StoreError;

    fn status_of(err: impl Into<DomainError>) -> (StatusCode, String) {
        domain_error_to_response(err.into())
    }

    #[test]
    fn stock_errors_are_bad_requests_with_numbers() {
        let (status, message) = status_of(CartError::InsufficientStock {
            product_id: ProductId::new(),
            name: "Ball".to_string(),
            available: 10,
            requested: 12,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("Available: 10"));
        assert!(message.starts_with("Insufficient stock"));
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(
            status_of(CatalogError::ProductInUse(ProductId::new())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CartError::AlreadyOwned(common::CartId::new())).0,
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_failures_hide_detail() {
        let (status, message) = status_of(StoreError::MissingRow("products"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, INTERNAL_MESSAGE);
    }
}
