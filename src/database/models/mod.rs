pub mod customer;
pub mod mechanic;
pub mod part;
pub mod ticket;

use std::collections::HashMap;

use serde::Deserialize;

pub use customer::{Customer, CustomerPatch, NewCustomer};
pub use mechanic::{Mechanic, MechanicActivity, MechanicPatch, NewMechanic};
pub use part::{NewPart, Part, PartPatch};
pub use ticket::{NewServiceTicket, ServiceTicket};

/// Field name -> problem, as reported back to the client
pub type FieldErrors = HashMap<String, String>;

pub(crate) fn require_text(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) {
    if value.trim().is_empty() {
        errors.insert(field.to_string(), "Missing data for required field.".to_string());
    } else if value.chars().count() > max_len {
        errors.insert(field.to_string(), format!("Longer than maximum length {}.", max_len));
    }
}

pub(crate) fn optional_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max_len: usize) {
    if let Some(value) = value {
        require_text(errors, field, value, max_len);
    }
}

pub(crate) fn finish(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `?page=&per_page=` pagination. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default = "Page::default_page")]
    pub page: u32,
    #[serde(default = "Page::default_per_page")]
    pub per_page: u32,
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    fn default_page() -> u32 {
        1
    }

    fn default_per_page() -> u32 {
        10
    }

    /// Clamp to `page >= 1` and `1 <= per_page <= MAX_PER_PAGE`
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }

    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offsets() {
        assert_eq!(Page::default().offset(), 0);
        assert_eq!(Page { page: 3, per_page: 10 }.offset(), 20);
        let clamped = Page { page: 0, per_page: 5000 }.normalized();
        assert_eq!(clamped, Page { page: 1, per_page: Page::MAX_PER_PAGE });
    }
}
