use async_trait::async_trait;

use super::manager::DatabaseError;
use super::models::{
    Customer, CustomerPatch, Mechanic, MechanicActivity, MechanicPatch, NewCustomer, NewMechanic,
    NewPart, NewServiceTicket, Page, Part, PartPatch, ServiceTicket,
};
use crate::ledger::PeerKind;

/// Persistence for the shop's entities and their association rows.
///
/// Implementations only store and fetch; uniqueness of associations under
/// concurrency is the ledger's job, though `insert_link` must still refuse a
/// duplicate row (returning `false`). Customer passwords arrive here already
/// hashed.
#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    // Relationships
    async fn ticket_exists(&self, ticket_id: i64) -> Result<bool, DatabaseError>;
    async fn peer_exists(&self, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError>;
    /// Linked peer ids in the order they were linked
    async fn peers_of(&self, ticket_id: i64, kind: PeerKind) -> Result<Vec<i64>, DatabaseError>;
    /// `false` if the row already existed, `NotFound` if the ticket or peer is gone
    async fn insert_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError>;
    /// `false` if there was no such row
    async fn delete_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError>;

    // Customers
    async fn list_customers(&self, page: Page) -> Result<Vec<Customer>, DatabaseError>;
    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, DatabaseError>;
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, DatabaseError>;
    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, DatabaseError>;
    async fn update_customer(&self, id: i64, patch: CustomerPatch) -> Result<Option<Customer>, DatabaseError>;
    /// Also removes the customer's tickets and their associations
    async fn delete_customer(&self, id: i64) -> Result<bool, DatabaseError>;

    // Mechanics
    async fn list_mechanics(&self) -> Result<Vec<Mechanic>, DatabaseError>;
    async fn get_mechanic(&self, id: i64) -> Result<Option<Mechanic>, DatabaseError>;
    async fn find_mechanic_by_email(&self, email: &str) -> Result<Option<Mechanic>, DatabaseError>;
    async fn create_mechanic(&self, new: NewMechanic) -> Result<Mechanic, DatabaseError>;
    async fn update_mechanic(&self, id: i64, patch: MechanicPatch) -> Result<Option<Mechanic>, DatabaseError>;
    async fn delete_mechanic(&self, id: i64) -> Result<bool, DatabaseError>;
    /// Mechanics by number of assigned tickets, busiest first, ties by id
    async fn most_active_mechanics(&self, limit: u32) -> Result<Vec<MechanicActivity>, DatabaseError>;

    // Inventory
    async fn list_parts(&self) -> Result<Vec<Part>, DatabaseError>;
    async fn get_part(&self, id: i64) -> Result<Option<Part>, DatabaseError>;
    async fn create_part(&self, new: NewPart) -> Result<Part, DatabaseError>;
    async fn update_part(&self, id: i64, patch: PartPatch) -> Result<Option<Part>, DatabaseError>;
    async fn delete_part(&self, id: i64) -> Result<bool, DatabaseError>;

    // Service tickets
    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, DatabaseError>;
    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, DatabaseError>;
    async fn create_ticket(&self, new: NewServiceTicket) -> Result<ServiceTicket, DatabaseError>;
    async fn tickets_for_customer(&self, customer_id: i64) -> Result<Vec<ServiceTicket>, DatabaseError>;
}
