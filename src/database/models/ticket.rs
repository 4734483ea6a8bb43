use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{finish, require_text, FieldErrors};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceTicket {
    pub id: i64,
    #[serde(rename = "VIN")]
    pub vin: String,
    pub service_date: String,
    pub service_desc: String,
    pub customer_id: i64,
    pub mechanic_ids: Vec<i64>,
    pub part_ids: Vec<i64>,
}

/// Flat `service_tickets` row, before associations are attached
#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: i64,
    pub vin: String,
    pub service_date: String,
    pub service_desc: String,
    pub customer_id: i64,
}

impl TicketRow {
    pub fn with_peers(self, mechanic_ids: Vec<i64>, part_ids: Vec<i64>) -> ServiceTicket {
        ServiceTicket {
            id: self.id,
            vin: self.vin,
            service_date: self.service_date,
            service_desc: self.service_desc,
            customer_id: self.customer_id,
            mechanic_ids,
            part_ids,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceTicket {
    #[serde(rename = "VIN")]
    pub vin: String,
    pub service_date: String,
    pub service_desc: String,
    pub customer_id: i64,
}

impl NewServiceTicket {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "VIN", &self.vin, 17);
        require_text(&mut errors, "service_date", &self.service_date, 20);
        require_text(&mut errors, "service_desc", &self.service_desc, 255);
        finish(errors)
    }
}
