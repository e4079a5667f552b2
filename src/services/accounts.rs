use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::customer::{self, Entity as Customer},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterCustomerInput {
    #[validate(length(min = 1, message = "First name is required"))]
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    #[serde(alias = "lastName")]
    pub last_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Customer profile; never carries the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<customer::Model> for CustomerProfile {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            created_at: model.created_at,
        }
    }
}

/// Storefront customer accounts. Registration and credential check only;
/// no session is issued.
#[derive(Clone)]
pub struct AccountService {
    db_pool: Arc<DbPool>,
}

impl AccountService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, input))]
    pub async fn register(&self, input: RegisterCustomerInput) -> Result<CustomerProfile, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();

        let existing = Customer::find()
            .filter(customer::Column::Email.eq(email.clone()))
            .one(&*self.db_pool)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict("Email already exists".to_string()));
        }

        let now = Utc::now();
        let inserted = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            first_name: Set(input.first_name.trim().to_string()),
            last_name: Set(input.last_name.trim().to_string()),
            password_hash: Set(hash_password(&input.password)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await;

        let model = match inserted {
            Ok(model) => model,
            // Lost a race with a concurrent registration for the same email.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(ServiceError::Conflict("Email already exists".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        info!(customer_id = %model.id, "Customer registered");
        Ok(model.into())
    }

    #[instrument(skip(self, input))]
    pub async fn login(&self, input: LoginInput) -> Result<CustomerProfile, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();

        let customer = Customer::find()
            .filter(customer::Column::Email.eq(email))
            .one(&*self.db_pool)
            .await?;

        match customer {
            Some(customer) if verify_password(&input.password, &customer.password_hash) => {
                info!(customer_id = %customer.id, "Customer signed in");
                Ok(customer.into())
            }
            _ => {
                warn!("Customer sign-in rejected");
                Err(ServiceError::AuthError("Invalid email or password".to_string()))
            }
        }
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let a = hash_password("spore-print-42").unwrap();
        let b = hash_password("spore-print-42").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("spore-print-42", &a));
        assert!(!verify_password("wrong", &a));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn short_password_is_rejected() {
        let input = RegisterCustomerInput {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            password: "short".into(),
        };
        assert!(input.validate().unwrap_err().field_errors().contains_key("password"));
    }
}
