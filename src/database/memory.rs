use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::manager::DatabaseError;
use super::models::ticket::TicketRow;
use super::models::{
    Customer, CustomerPatch, Mechanic, MechanicActivity, MechanicPatch, NewCustomer, NewMechanic,
    NewPart, NewServiceTicket, Page, Part, PartPatch, ServiceTicket,
};
use super::store::ShopStore;
use crate::ledger::PeerKind;

#[derive(Default)]
struct Tables {
    next_id: i64,
    customers: BTreeMap<i64, Customer>,
    mechanics: BTreeMap<i64, Mechanic>,
    parts: BTreeMap<i64, Part>,
    tickets: BTreeMap<i64, TicketRow>,
    links: HashMap<(i64, PeerKind), Vec<i64>>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn peers(&self, ticket_id: i64, kind: PeerKind) -> Vec<i64> {
        self.links.get(&(ticket_id, kind)).cloned().unwrap_or_default()
    }

    fn has_peer(&self, peer_id: i64, kind: PeerKind) -> bool {
        match kind {
            PeerKind::Mechanic => self.mechanics.contains_key(&peer_id),
            PeerKind::Part => self.parts.contains_key(&peer_id),
        }
    }

    fn ticket(&self, row: &TicketRow) -> ServiceTicket {
        row.clone().with_peers(
            self.peers(row.id, PeerKind::Mechanic),
            self.peers(row.id, PeerKind::Part),
        )
    }

    fn drop_peer_everywhere(&mut self, peer_id: i64, kind: PeerKind) {
        for ((_, k), peers) in self.links.iter_mut() {
            if *k == kind {
                peers.retain(|p| *p != peer_id);
            }
        }
    }

    fn customer_email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.customers
            .values()
            .any(|c| c.email == email && Some(c.id) != except)
    }

    fn mechanic_email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.mechanics
            .values()
            .any(|m| m.email == email && Some(m.id) != except)
    }
}

/// In-process store with the same observable behavior as [`super::PgShopStore`]:
/// unique emails, cascading deletes, insertion-ordered associations.
/// Used by the test suite and by `--memory` runs.
#[derive(Default)]
pub struct MemoryShopStore {
    tables: RwLock<Tables>,
}

impl MemoryShopStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShopStore for MemoryShopStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn ticket_exists(&self, ticket_id: i64) -> Result<bool, DatabaseError> {
        Ok(self.tables.read().await.tickets.contains_key(&ticket_id))
    }

    async fn peer_exists(&self, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        Ok(self.tables.read().await.has_peer(peer_id, kind))
    }

    async fn peers_of(&self, ticket_id: i64, kind: PeerKind) -> Result<Vec<i64>, DatabaseError> {
        Ok(self.tables.read().await.peers(ticket_id, kind))
    }

    async fn insert_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.tickets.contains_key(&ticket_id) {
            return Err(DatabaseError::NotFound(format!("service ticket {}", ticket_id)));
        }
        if !tables.has_peer(peer_id, kind) {
            return Err(DatabaseError::NotFound(format!("{} {}", kind, peer_id)));
        }
        let peers = tables.links.entry((ticket_id, kind)).or_default();
        if peers.contains(&peer_id) {
            return Ok(false);
        }
        peers.push(peer_id);
        Ok(true)
    }

    async fn delete_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(peers) = tables.links.get_mut(&(ticket_id, kind)) else {
            return Ok(false);
        };
        let before = peers.len();
        peers.retain(|p| *p != peer_id);
        Ok(peers.len() != before)
    }

    async fn list_customers(&self, page: Page) -> Result<Vec<Customer>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, DatabaseError> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| c.email == email).cloned())
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.customer_email_taken(&new.email, None) {
            return Err(DatabaseError::Conflict(format!("customer email {} exists", new.email)));
        }
        let customer = Customer {
            id: tables.allocate_id(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            password_hash: new.password,
        };
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn update_customer(&self, id: i64, patch: CustomerPatch) -> Result<Option<Customer>, DatabaseError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &patch.email {
            if tables.customer_email_taken(email, Some(id)) {
                return Err(DatabaseError::Conflict(format!("customer email {} exists", email)));
            }
        }
        let Some(customer) = tables.customers.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(customer);
        Ok(Some(customer.clone()))
    }

    async fn delete_customer(&self, id: i64) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.customers.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = tables
            .tickets
            .values()
            .filter(|t| t.customer_id == id)
            .map(|t| t.id)
            .collect();
        for ticket_id in owned {
            tables.tickets.remove(&ticket_id);
            tables.links.retain(|(t, _), _| *t != ticket_id);
        }
        Ok(true)
    }

    async fn list_mechanics(&self) -> Result<Vec<Mechanic>, DatabaseError> {
        Ok(self.tables.read().await.mechanics.values().cloned().collect())
    }

    async fn get_mechanic(&self, id: i64) -> Result<Option<Mechanic>, DatabaseError> {
        Ok(self.tables.read().await.mechanics.get(&id).cloned())
    }

    async fn find_mechanic_by_email(&self, email: &str) -> Result<Option<Mechanic>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.mechanics.values().find(|m| m.email == email).cloned())
    }

    async fn create_mechanic(&self, new: NewMechanic) -> Result<Mechanic, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.mechanic_email_taken(&new.email, None) {
            return Err(DatabaseError::Conflict(format!("mechanic email {} exists", new.email)));
        }
        let mechanic = Mechanic {
            id: tables.allocate_id(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            salary: new.salary,
        };
        tables.mechanics.insert(mechanic.id, mechanic.clone());
        Ok(mechanic)
    }

    async fn update_mechanic(&self, id: i64, patch: MechanicPatch) -> Result<Option<Mechanic>, DatabaseError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &patch.email {
            if tables.mechanic_email_taken(email, Some(id)) {
                return Err(DatabaseError::Conflict(format!("mechanic email {} exists", email)));
            }
        }
        let Some(mechanic) = tables.mechanics.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(mechanic);
        Ok(Some(mechanic.clone()))
    }

    async fn delete_mechanic(&self, id: i64) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.mechanics.remove(&id).is_none() {
            return Ok(false);
        }
        tables.drop_peer_everywhere(id, PeerKind::Mechanic);
        Ok(true)
    }

    async fn most_active_mechanics(&self, limit: u32) -> Result<Vec<MechanicActivity>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<i64, i64> = HashMap::new();
        for ((_, kind), peers) in &tables.links {
            if *kind == PeerKind::Mechanic {
                for id in peers {
                    *counts.entry(*id).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<MechanicActivity> = tables
            .mechanics
            .values()
            .map(|m| MechanicActivity {
                mechanic: m.clone(),
                ticket_count: counts.get(&m.id).copied().unwrap_or(0),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.ticket_count
                .cmp(&a.ticket_count)
                .then(a.mechanic.id.cmp(&b.mechanic.id))
        });
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn list_parts(&self) -> Result<Vec<Part>, DatabaseError> {
        Ok(self.tables.read().await.parts.values().cloned().collect())
    }

    async fn get_part(&self, id: i64) -> Result<Option<Part>, DatabaseError> {
        Ok(self.tables.read().await.parts.get(&id).cloned())
    }

    async fn create_part(&self, new: NewPart) -> Result<Part, DatabaseError> {
        let mut tables = self.tables.write().await;
        let part = Part {
            id: tables.allocate_id(),
            name: new.name,
            price: new.price,
        };
        tables.parts.insert(part.id, part.clone());
        Ok(part)
    }

    async fn update_part(&self, id: i64, patch: PartPatch) -> Result<Option<Part>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(part) = tables.parts.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(part);
        Ok(Some(part.clone()))
    }

    async fn delete_part(&self, id: i64) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.parts.remove(&id).is_none() {
            return Ok(false);
        }
        tables.drop_peer_everywhere(id, PeerKind::Part);
        Ok(true)
    }

    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.tickets.values().map(|row| tables.ticket(row)).collect())
    }

    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.tickets.get(&id).map(|row| tables.ticket(row)))
    }

    async fn create_ticket(&self, new: NewServiceTicket) -> Result<ServiceTicket, DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&new.customer_id) {
            return Err(DatabaseError::NotFound(format!("customer {}", new.customer_id)));
        }
        let row = TicketRow {
            id: tables.allocate_id(),
            vin: new.vin,
            service_date: new.service_date,
            service_desc: new.service_desc,
            customer_id: new.customer_id,
        };
        tables.tickets.insert(row.id, row.clone());
        Ok(row.with_peers(Vec::new(), Vec::new()))
    }

    async fn tickets_for_customer(&self, customer_id: i64) -> Result<Vec<ServiceTicket>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .filter(|t| t.customer_id == customer_id)
            .map(|row| tables.ticket(row))
            .collect())
    }
}
