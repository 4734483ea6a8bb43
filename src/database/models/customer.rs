use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::{password::hash_password, AuthError};

use super::{finish, optional_text, require_text, FieldErrors};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// Create payload. `password` is plaintext on the wire and is replaced by its
/// bcrypt hash (see [`NewCustomer::with_hashed_password`]) before it is stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 100);
        require_text(&mut errors, "email", &self.email, 100);
        require_text(&mut errors, "phone", &self.phone, 20);
        require_text(&mut errors, "password", &self.password, 128);
        if !self.email.contains('@') && !errors.contains_key("email") {
            errors.insert("email".to_string(), "Not a valid email address.".to_string());
        }
        finish(errors)
    }

    pub fn with_hashed_password(mut self, cost: u32) -> Result<Self, AuthError> {
        self.password = hash_password(&self.password, cost)?;
        Ok(self)
    }
}

/// Partial update: absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

impl CustomerPatch {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        optional_text(&mut errors, "name", self.name.as_deref(), 100);
        optional_text(&mut errors, "email", self.email.as_deref(), 100);
        optional_text(&mut errors, "phone", self.phone.as_deref(), 20);
        optional_text(&mut errors, "password", self.password.as_deref(), 128);
        finish(errors)
    }

    pub fn with_hashed_password(mut self, cost: u32) -> Result<Self, AuthError> {
        if let Some(plain) = self.password.take() {
            self.password = Some(hash_password(&plain, cost)?);
        }
        Ok(self)
    }

    /// Expects `password` to already hold a hash
    pub fn apply(&self, customer: &mut Customer) {
        if let Some(name) = &self.name {
            customer.name = name.clone();
        }
        if let Some(email) = &self.email {
            customer.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            customer.phone = phone.clone();
        }
        if let Some(hash) = &self.password {
            customer.password_hash = hash.clone();
        }
    }
}
