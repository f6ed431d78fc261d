//! Catalog browsing and admin product management.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::{ProductId, ProductUpdate, ProductView, catalog::DEFAULT_FEATURED_LIMIT};
use serde::Deserialize;
use store::{Brand, BrandId, Category, CategoryId, NewProduct, ProductQuery, Species, Store};

use crate::error::ApiError;
use crate::routes::require_staff;
use crate::session::Session;
use crate::state::AppState;

const MAX_FEATURED_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ProductFilters {
    pub q: Option<String>,
    pub brand_id: Option<BrandId>,
    pub category_id: Option<CategoryId>,
    pub species: Option<Species>,
}

impl From<ProductFilters> for ProductQuery {
    fn from(filters: ProductFilters) -> Self {
        let mut query = ProductQuery::new();
        if let Some(text) = filters.q {
            query = query.text(text);
        }
        if let Some(brand_id) = filters.brand_id {
            query = query.brand(brand_id);
        }
        if let Some(category_id) = filters.category_id {
            query = query.category(category_id);
        }
        if let Some(species) = filters.species {
            query = query.species(species);
        }
        query
    }
}

#[derive(Debug, Deserialize)]
pub struct FeaturedParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct NewBrandRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// GET /products: available products matching the filters.
#[tracing::instrument(skip(state, filters))]
pub async fn search<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    filters: Result<Query<ProductFilters>, QueryRejection>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    let Query(filters) = filters?;
    let products = state.catalog.search(&filters.into()).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

/// GET /products/featured: the home page selection.
#[tracing::instrument(skip(state, params))]
pub async fn featured<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<FeaturedParams>, QueryRejection>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    let Query(params) = params?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_FEATURED_LIMIT)
        .min(MAX_FEATURED_LIMIT);
    let products = state.catalog.featured(limit).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<ProductView>, ApiError> {
    let product = state.catalog.get_product(product_id).await?;
    Ok(Json(product.into()))
}

/// GET /brands
pub async fn list_brands<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Brand>>, ApiError> {
    Ok(Json(state.catalog.list_brands().await?))
}

/// GET /categories
pub async fn list_categories<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.catalog.list_categories().await?))
}

/// POST /brands (staff)
#[tracing::instrument(skip(state, payload))]
pub async fn create_brand<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<NewBrandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    require_staff(&state, &session).await?;
    let Json(req) = payload?;
    let brand = state.catalog.create_brand(&req.name).await?;
    Ok((StatusCode::CREATED, Json(brand)))
}

/// POST /categories (staff)
#[tracing::instrument(skip(state, payload))]
pub async fn create_category<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<NewCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    require_staff(&state, &session).await?;
    let Json(req) = payload?;
    let category = state
        .catalog
        .create_category(&req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// POST /products (staff)
#[tracing::instrument(skip(state, payload))]
pub async fn create_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductView>), ApiError> {
    require_staff(&state, &session).await?;
    let Json(new) = payload?;
    let product = state.catalog.create_product(new).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PATCH /products/{id} (staff)
#[tracing::instrument(skip(state, payload))]
pub async fn update_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<ProductId>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Json<ProductView>, ApiError> {
    require_staff(&state, &session).await?;
    let Json(update) = payload?;
    let product = state.catalog.update_product(product_id, update).await?;
    Ok(Json(product.into()))
}

/// DELETE /products/{id} (staff)
#[tracing::instrument(skip(state))]
pub async fn delete_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode, ApiError> {
    require_staff(&state, &session).await?;
    state.catalog.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
