use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{finish, optional_text, require_text, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Mechanic {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub salary: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMechanic {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub salary: f64,
}

impl NewMechanic {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 100);
        require_text(&mut errors, "email", &self.email, 100);
        require_text(&mut errors, "phone", &self.phone, 20);
        check_salary(&mut errors, self.salary);
        finish(errors)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MechanicPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub salary: Option<f64>,
}

impl MechanicPatch {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        optional_text(&mut errors, "name", self.name.as_deref(), 100);
        optional_text(&mut errors, "email", self.email.as_deref(), 100);
        optional_text(&mut errors, "phone", self.phone.as_deref(), 20);
        if let Some(salary) = self.salary {
            check_salary(&mut errors, salary);
        }
        finish(errors)
    }

    pub fn apply(&self, mechanic: &mut Mechanic) {
        if let Some(name) = &self.name {
            mechanic.name = name.clone();
        }
        if let Some(email) = &self.email {
            mechanic.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            mechanic.phone = phone.clone();
        }
        if let Some(salary) = self.salary {
            mechanic.salary = salary;
        }
    }
}

fn check_salary(errors: &mut FieldErrors, salary: f64) {
    if !salary.is_finite() || salary < 0.0 {
        errors.insert("salary".to_string(), "Must be a non-negative number.".to_string());
    }
}

/// A mechanic together with the number of tickets they are assigned to
#[derive(Debug, Clone, Serialize)]
pub struct MechanicActivity {
    #[serde(flatten)]
    pub mechanic: Mechanic,
    pub ticket_count: i64,
}
