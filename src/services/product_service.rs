//! Product catalog service.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::AppError,
    models::product::{CreateProductRequest, Product},
    repository::LedgerStore,
};

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn LedgerStore>,
}

impl ProductService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a product under a unique, non-blank name.
    pub async fn create(&self, request: CreateProductRequest) -> Result<Product, AppError> {
        let name = request.validated_name()?;

        let product = self.store.create_product(name).await?;

        tracing::info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub async fn get(&self, product_id: Uuid) -> Result<Product, AppError> {
        self.store
            .product_by_id(product_id)
            .await?
            .ok_or(AppError::NotFound("product"))
    }
}
