use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{finish, optional_text, require_text, FieldErrors};

/// An inventory item that can be attached to service tickets
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Part {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPart {
    pub name: String,
    pub price: f64,
}

impl NewPart {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 100);
        check_price(&mut errors, self.price);
        finish(errors)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartPatch {
    pub name: Option<String>,
    pub price: Option<f64>,
}

impl PartPatch {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        optional_text(&mut errors, "name", self.name.as_deref(), 100);
        if let Some(price) = self.price {
            check_price(&mut errors, price);
        }
        finish(errors)
    }

    pub fn apply(&self, part: &mut Part) {
        if let Some(name) = &self.name {
            part.name = name.clone();
        }
        if let Some(price) = self.price {
            part.price = price;
        }
    }
}

fn check_price(errors: &mut FieldErrors, price: f64) {
    if !price.is_finite() || price < 0.0 {
        errors.insert("price".to_string(), "Must be a non-negative number.".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_price_only() {
        let mut part = Part { id: 1, name: "Test Part".into(), price: 99.99 };
        PartPatch { price: Some(199.99), ..Default::default() }.apply(&mut part);
        assert_eq!(part.name, "Test Part");
        assert_eq!(part.price, 199.99);
    }

    #[test]
    fn test_negative_price_rejected() {
        let errors = NewPart { name: "Rotor".into(), price: -1.0 }.validate().unwrap_err();
        assert!(errors.contains_key("price"));
    }
}
