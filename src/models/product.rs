//! Product catalog models.
//!
//! Products only give names to the `product_id`s that reservations and
//! operations carry. An id does not have to be registered to be reserved
//! against; unregistered ids simply show up without a name in the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_PRODUCT_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /products`.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
}

impl CreateProductRequest {
    /// The trimmed name, if it is non-empty and not too long.
    pub fn validated_name(&self) -> Result<&str, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("product name is required".to_string()));
        }
        if name.chars().count() > MAX_PRODUCT_NAME_LEN {
            return Err(AppError::Validation(format!(
                "product name must be at most {MAX_PRODUCT_NAME_LEN} characters"
            )));
        }
        Ok(name)
    }
}
