use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Executor, PgPool};

use super::manager::DatabaseError;
use super::models::ticket::TicketRow;
use super::models::{
    Customer, CustomerPatch, Mechanic, MechanicActivity, MechanicPatch, NewCustomer, NewMechanic,
    NewPart, NewServiceTicket, Page, Part, PartPatch, ServiceTicket,
};
use super::store::ShopStore;
use crate::ledger::PeerKind;

/// Schema this store expects. Idempotent; see [`PgShopStore::install_schema`].
pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const TICKET_COLUMNS: &str = "id, vin, service_date, service_desc, customer_id";

/// Association table and peer column for a relationship kind
fn link_table(kind: PeerKind) -> (&'static str, &'static str) {
    match kind {
        PeerKind::Mechanic => ("service_mechanics", "mechanic_id"),
        PeerKind::Part => ("service_parts", "part_id"),
    }
}

fn peer_table(kind: PeerKind) -> &'static str {
    match kind {
        PeerKind::Mechanic => "mechanics",
        PeerKind::Part => "parts",
    }
}

pub struct PgShopStore {
    pool: PgPool,
}

impl PgShopStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create any missing tables and indexes. Multi-statement, so it goes over
    /// the simple query protocol rather than a prepared statement.
    pub async fn install_schema(&self) -> Result<(), DatabaseError> {
        self.pool.execute(SCHEMA_SQL).await?;
        Ok(())
    }

    async fn exists(&self, table: &str, id: i64) -> Result<bool, DatabaseError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table);
        let (found,): (bool,) = sqlx::query_as(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(found)
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<bool, DatabaseError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach mechanic and part ids to ticket rows with one query per kind
    async fn hydrate(&self, rows: Vec<TicketRow>) -> Result<Vec<ServiceTicket>, DatabaseError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut mechanics = self.peers_for(&ids, PeerKind::Mechanic).await?;
        let mut parts = self.peers_for(&ids, PeerKind::Part).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let m = mechanics.remove(&row.id).unwrap_or_default();
                let p = parts.remove(&row.id).unwrap_or_default();
                row.with_peers(m, p)
            })
            .collect())
    }

    async fn peers_for(&self, ticket_ids: &[i64], kind: PeerKind) -> Result<HashMap<i64, Vec<i64>>, DatabaseError> {
        let (table, column) = link_table(kind);
        let sql = format!(
            "SELECT ticket_id, {column} FROM {table} WHERE ticket_id = ANY($1) ORDER BY seq",
            column = column,
            table = table
        );
        let pairs: Vec<(i64, i64)> = sqlx::query_as(&sql)
            .bind(ticket_ids)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
        for (ticket_id, peer_id) in pairs {
            grouped.entry(ticket_id).or_default().push(peer_id);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl ShopStore for PgShopStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ticket_exists(&self, ticket_id: i64) -> Result<bool, DatabaseError> {
        self.exists("service_tickets", ticket_id).await
    }

    async fn peer_exists(&self, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        self.exists(peer_table(kind), peer_id).await
    }

    async fn peers_of(&self, ticket_id: i64, kind: PeerKind) -> Result<Vec<i64>, DatabaseError> {
        let (table, column) = link_table(kind);
        let sql = format!("SELECT {} FROM {} WHERE ticket_id = $1 ORDER BY seq", column, table);
        let ids: Vec<(i64,)> = sqlx::query_as(&sql).bind(ticket_id).fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        let (table, column) = link_table(kind);
        let sql = format!(
            "INSERT INTO {} (ticket_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            table, column
        );
        // A concurrently deleted ticket or peer trips the foreign key
        let result = sqlx::query(&sql)
            .bind(ticket_id)
            .bind(peer_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, DatabaseError> {
        let (table, column) = link_table(kind);
        let sql = format!("DELETE FROM {} WHERE ticket_id = $1 AND {} = $2", table, column);
        let result = sqlx::query(&sql)
            .bind(ticket_id)
            .bind(peer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_customers(&self, page: Page) -> Result<Vec<Customer>, DatabaseError> {
        let rows = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone, password_hash FROM customers ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, DatabaseError> {
        let row = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone, password_hash FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, DatabaseError> {
        let row = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone, password_hash FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_customer(&self, new: NewCustomer) -> Result<Customer, DatabaseError> {
        sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, email, phone, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone, password_hash
            "#,
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.password)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_customer(&self, id: i64, patch: CustomerPatch) -> Result<Option<Customer>, DatabaseError> {
        sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                password_hash = COALESCE($5, password_hash)
            WHERE id = $1
            RETURNING id, name, email, phone, password_hash
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.password)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn delete_customer(&self, id: i64) -> Result<bool, DatabaseError> {
        // service_tickets and the link tables cascade
        self.delete_by_id("customers", id).await
    }

    async fn list_mechanics(&self) -> Result<Vec<Mechanic>, DatabaseError> {
        let rows = sqlx::query_as::<_, Mechanic>(
            "SELECT id, name, email, phone, salary FROM mechanics ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_mechanic(&self, id: i64) -> Result<Option<Mechanic>, DatabaseError> {
        let row = sqlx::query_as::<_, Mechanic>(
            "SELECT id, name, email, phone, salary FROM mechanics WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_mechanic_by_email(&self, email: &str) -> Result<Option<Mechanic>, DatabaseError> {
        let row = sqlx::query_as::<_, Mechanic>(
            "SELECT id, name, email, phone, salary FROM mechanics WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_mechanic(&self, new: NewMechanic) -> Result<Mechanic, DatabaseError> {
        sqlx::query_as::<_, Mechanic>(
            r#"
            INSERT INTO mechanics (name, email, phone, salary)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone, salary
            "#,
        )
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.salary)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn update_mechanic(&self, id: i64, patch: MechanicPatch) -> Result<Option<Mechanic>, DatabaseError> {
        sqlx::query_as::<_, Mechanic>(
            r#"
            UPDATE mechanics SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                salary = COALESCE($5, salary)
            WHERE id = $1
            RETURNING id, name, email, phone, salary
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(patch.salary)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn delete_mechanic(&self, id: i64) -> Result<bool, DatabaseError> {
        self.delete_by_id("mechanics", id).await
    }

    async fn most_active_mechanics(&self, limit: u32) -> Result<Vec<MechanicActivity>, DatabaseError> {
        let rows: Vec<(i64, String, String, String, f64, i64)> = sqlx::query_as(
            r#"
            SELECT m.id, m.name, m.email, m.phone, m.salary, COUNT(sm.ticket_id) AS ticket_count
            FROM mechanics m
            LEFT JOIN service_mechanics sm ON sm.mechanic_id = m.id
            GROUP BY m.id
            ORDER BY ticket_count DESC, m.id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, email, phone, salary, ticket_count)| MechanicActivity {
                mechanic: Mechanic { id, name, email, phone, salary },
                ticket_count,
            })
            .collect())
    }

    async fn list_parts(&self) -> Result<Vec<Part>, DatabaseError> {
        let rows = sqlx::query_as::<_, Part>("SELECT id, name, price FROM parts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_part(&self, id: i64) -> Result<Option<Part>, DatabaseError> {
        let row = sqlx::query_as::<_, Part>("SELECT id, name, price FROM parts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_part(&self, new: NewPart) -> Result<Part, DatabaseError> {
        let row = sqlx::query_as::<_, Part>(
            "INSERT INTO parts (name, price) VALUES ($1, $2) RETURNING id, name, price",
        )
        .bind(&new.name)
        .bind(new.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_part(&self, id: i64, patch: PartPatch) -> Result<Option<Part>, DatabaseError> {
        let row = sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts SET
                name = COALESCE($2, name),
                price = COALESCE($3, price)
            WHERE id = $1
            RETURNING id, name, price
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.price)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_part(&self, id: i64) -> Result<bool, DatabaseError> {
        self.delete_by_id("parts", id).await
    }

    async fn list_tickets(&self) -> Result<Vec<ServiceTicket>, DatabaseError> {
        let sql = format!("SELECT {} FROM service_tickets ORDER BY id", TICKET_COLUMNS);
        let rows = sqlx::query_as::<_, TicketRow>(&sql).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn get_ticket(&self, id: i64) -> Result<Option<ServiceTicket>, DatabaseError> {
        let sql = format!("SELECT {} FROM service_tickets WHERE id = $1", TICKET_COLUMNS);
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_ticket(&self, new: NewServiceTicket) -> Result<ServiceTicket, DatabaseError> {
        let sql = format!(
            "INSERT INTO service_tickets (vin, service_date, service_desc, customer_id) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            TICKET_COLUMNS
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(&new.vin)
            .bind(&new.service_date)
            .bind(&new.service_desc)
            .bind(new.customer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                // customer_id foreign key
                let missing_customer = matches!(
                    &e,
                    sqlx::Error::Database(db) if db.code().as_deref() == Some("23503")
                );
                if missing_customer {
                    DatabaseError::NotFound(format!("customer {}", new.customer_id))
                } else {
                    DatabaseError::from_sqlx(e)
                }
            })?;
        Ok(row.with_peers(Vec::new(), Vec::new()))
    }

    async fn tickets_for_customer(&self, customer_id: i64) -> Result<Vec<ServiceTicket>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM service_tickets WHERE customer_id = $1 ORDER BY id",
            TICKET_COLUMNS
        );
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }
}
