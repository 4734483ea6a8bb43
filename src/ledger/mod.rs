//! Ticket <-> mechanic and ticket <-> part associations.
//!
//! Two entry points with deliberately different contracts:
//!
//! - [`RelationshipLedger::link`] / [`RelationshipLedger::unlink`] are strict and
//!   all-or-nothing. A missing ticket or peer is `NotFound`, a duplicate link is
//!   `AlreadyLinked`, removing an absent link is `NotLinked`.
//! - [`RelationshipLedger::bulk_edit`] is best-effort reconciliation. It applies
//!   removals, then additions, and skips peer ids that are unknown or already in
//!   the requested state. Only a missing ticket fails the call.
//!
//! Mutations on the same `(ticket, kind)` run one at a time under a per-pair async
//! lock, so two concurrent `link` calls cannot both see "not linked" and both
//! insert. Different tickets never wait on each other. A pair's lock lives in the
//! map only while someone holds or waits on it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::database::{DatabaseError, ShopStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Mechanic,
    Part,
}

impl PeerKind {
    pub fn label(&self) -> &'static str {
        match self {
            PeerKind::Mechanic => "Mechanic",
            PeerKind::Part => "Part",
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerKind::Mechanic => "mechanic",
            PeerKind::Part => "part",
        })
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{entity} {id} not found.")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{kind} {peer_id} already assigned to ticket {ticket_id}.")]
    AlreadyLinked { ticket_id: i64, peer_id: i64, kind: PeerKind },

    #[error("{kind} {peer_id} is not assigned to ticket {ticket_id}.")]
    NotLinked { ticket_id: i64, peer_id: i64, kind: PeerKind },

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Outcome of a [`RelationshipLedger::bulk_edit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub ticket_id: i64,
    pub kind: PeerKind,
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
    pub skipped: Vec<i64>,
    /// Associations after the edit, in insertion order
    pub peers: Vec<i64>,
}

type PairKey = (i64, PeerKind);

pub struct RelationshipLedger {
    store: Arc<dyn ShopStore>,
    locks: DashMap<PairKey, Arc<Mutex<()>>>,
}

/// Held for the duration of one mutation on a `(ticket, kind)` pair
struct PairGuard<'a> {
    locks: &'a DashMap<PairKey, Arc<Mutex<()>>>,
    key: PairKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits on it.
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl RelationshipLedger {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    async fn lock_pair(&self, ticket_id: i64, kind: PeerKind) -> PairGuard<'_> {
        let key = (ticket_id, kind);
        let lock = self.locks.entry(key).or_default().clone();
        let guard = lock.lock_owned().await;
        PairGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    async fn require_ticket(&self, ticket_id: i64) -> Result<(), LinkError> {
        if self.store.ticket_exists(ticket_id).await? {
            Ok(())
        } else {
            Err(LinkError::NotFound { entity: "Service ticket", id: ticket_id })
        }
    }

    async fn require_peer(&self, peer_id: i64, kind: PeerKind) -> Result<(), LinkError> {
        if self.store.peer_exists(peer_id, kind).await? {
            Ok(())
        } else {
            Err(LinkError::NotFound { entity: kind.label(), id: peer_id })
        }
    }

    /// Insert the row, naming whichever side was deleted out from under us.
    /// Deletes of tickets and peers do not take the pair lock.
    async fn insert_link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<bool, LinkError> {
        match self.store.insert_link(ticket_id, peer_id, kind).await {
            Ok(inserted) => Ok(inserted),
            Err(DatabaseError::NotFound(detail)) => {
                debug!("link target vanished: {}", detail);
                self.require_ticket(ticket_id).await?;
                Err(LinkError::NotFound { entity: kind.label(), id: peer_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn link(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<(), LinkError> {
        let _pair = self.lock_pair(ticket_id, kind).await;

        self.require_ticket(ticket_id).await?;
        self.require_peer(peer_id, kind).await?;

        let current = self.store.peers_of(ticket_id, kind).await?;
        if current.contains(&peer_id) {
            return Err(LinkError::AlreadyLinked { ticket_id, peer_id, kind });
        }
        // The store's own uniqueness constraint has the final word.
        if !self.insert_link(ticket_id, peer_id, kind).await? {
            return Err(LinkError::AlreadyLinked { ticket_id, peer_id, kind });
        }

        info!("Linked {} {} to ticket {}", kind, peer_id, ticket_id);
        Ok(())
    }

    pub async fn unlink(&self, ticket_id: i64, peer_id: i64, kind: PeerKind) -> Result<(), LinkError> {
        let _pair = self.lock_pair(ticket_id, kind).await;

        self.require_ticket(ticket_id).await?;
        self.require_peer(peer_id, kind).await?;

        if !self.store.delete_link(ticket_id, peer_id, kind).await? {
            return Err(LinkError::NotLinked { ticket_id, peer_id, kind });
        }

        info!("Unlinked {} {} from ticket {}", kind, peer_id, ticket_id);
        Ok(())
    }

    /// Remove `remove_ids`, then add `add_ids`, both judged against the set as it
    /// stood before the edit. A peer that was linked beforehand and appears in
    /// both lists ends up removed. Ids that are unknown, already linked (for adds)
    /// or not linked (for removes) land in `skipped`.
    pub async fn bulk_edit(
        &self,
        ticket_id: i64,
        add_ids: &[i64],
        remove_ids: &[i64],
        kind: PeerKind,
    ) -> Result<LedgerReport, LinkError> {
        let _pair = self.lock_pair(ticket_id, kind).await;

        self.require_ticket(ticket_id).await?;

        let before = self.store.peers_of(ticket_id, kind).await?;
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut skipped = Vec::new();

        for &peer_id in remove_ids {
            if removed.contains(&peer_id) {
                continue;
            }
            if before.contains(&peer_id) && self.store.delete_link(ticket_id, peer_id, kind).await? {
                removed.push(peer_id);
            } else {
                debug!("bulk edit: {} {} not on ticket {}, skipped", kind, peer_id, ticket_id);
                skipped.push(peer_id);
            }
        }

        for &peer_id in add_ids {
            if added.contains(&peer_id) {
                continue;
            }
            if before.contains(&peer_id) || !self.store.peer_exists(peer_id, kind).await? {
                debug!("bulk edit: {} {} skipped for ticket {}", kind, peer_id, ticket_id);
                skipped.push(peer_id);
                continue;
            }
            match self.insert_link(ticket_id, peer_id, kind).await {
                Ok(true) => added.push(peer_id),
                Ok(false) => skipped.push(peer_id),
                // Peer deleted mid-edit; a vanished ticket still fails the call
                Err(LinkError::NotFound { entity, .. }) if entity == kind.label() => skipped.push(peer_id),
                Err(e) => return Err(e),
            }
        }

        let peers = self.store.peers_of(ticket_id, kind).await?;
        info!(
            "Bulk edit of ticket {} {}s: +{} -{} ({} skipped)",
            ticket_id,
            kind,
            added.len(),
            removed.len(),
            skipped.len()
        );

        Ok(LedgerReport {
            ticket_id,
            kind,
            added,
            removed,
            skipped,
            peers,
        })
    }

    pub async fn peers_of(&self, ticket_id: i64, kind: PeerKind) -> Result<Vec<i64>, LinkError> {
        self.require_ticket(ticket_id).await?;
        Ok(self.store.peers_of(ticket_id, kind).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewCustomer, NewMechanic, NewPart, NewServiceTicket};
    use crate::database::MemoryShopStore;

    struct Fixture {
        ledger: Arc<RelationshipLedger>,
        ticket: i64,
        mechanics: Vec<i64>,
        part: i64,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn ShopStore> = Arc::new(MemoryShopStore::new());
        let customer = store
            .create_customer(NewCustomer {
                name: "Test Customer".into(),
                email: "customer@test.com".into(),
                phone: "555-1234".into(),
                password: "hash".into(),
            })
            .await
            .unwrap();
        let ticket = store
            .create_ticket(NewServiceTicket {
                vin: "12345678901234567".into(),
                service_date: "2024-01-01".into(),
                service_desc: "Test service".into(),
                customer_id: customer.id,
            })
            .await
            .unwrap();

        let mut mechanics = Vec::new();
        for n in 0..3 {
            let m = store
                .create_mechanic(NewMechanic {
                    name: format!("Mechanic {}", n),
                    email: format!("m{}@test.com", n),
                    phone: "555-5555".into(),
                    salary: 50000.0,
                })
                .await
                .unwrap();
            mechanics.push(m.id);
        }
        let part = store
            .create_part(NewPart { name: "Test Part".into(), price: 99.99 })
            .await
            .unwrap();

        Fixture {
            ledger: Arc::new(RelationshipLedger::new(store)),
            ticket: ticket.id,
            mechanics,
            part: part.id,
        }
    }

    #[tokio::test]
    async fn test_link_then_unlink_round() {
        let f = fixture().await;
        let m = f.mechanics[0];

        f.ledger.link(f.ticket, m, PeerKind::Mechanic).await.unwrap();
        assert_eq!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap(), vec![m]);

        f.ledger.unlink(f.ticket, m, PeerKind::Mechanic).await.unwrap();
        assert!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_double_link_and_double_unlink() {
        let f = fixture().await;
        let m = f.mechanics[0];

        f.ledger.link(f.ticket, m, PeerKind::Mechanic).await.unwrap();
        assert!(matches!(
            f.ledger.link(f.ticket, m, PeerKind::Mechanic).await,
            Err(LinkError::AlreadyLinked { .. })
        ));

        f.ledger.unlink(f.ticket, m, PeerKind::Mechanic).await.unwrap();
        assert!(matches!(
            f.ledger.unlink(f.ticket, m, PeerKind::Mechanic).await,
            Err(LinkError::NotLinked { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_ticket_or_peer_creates_nothing() {
        let f = fixture().await;

        assert!(matches!(
            f.ledger.link(999, f.mechanics[0], PeerKind::Mechanic).await,
            Err(LinkError::NotFound { entity: "Service ticket", id: 999 })
        ));
        assert!(matches!(
            f.ledger.link(f.ticket, 999, PeerKind::Mechanic).await,
            Err(LinkError::NotFound { entity: "Mechanic", id: 999 })
        ));
        // A part id is not a mechanic id.
        assert!(matches!(
            f.ledger.link(f.ticket, f.part + 100, PeerKind::Part).await,
            Err(LinkError::NotFound { entity: "Part", .. })
        ));
        assert!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kinds_are_separate_sets() {
        let f = fixture().await;
        f.ledger.link(f.ticket, f.part, PeerKind::Part).await.unwrap();
        assert_eq!(f.ledger.peers_of(f.ticket, PeerKind::Part).await.unwrap(), vec![f.part]);
        assert!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_edit_removes_before_adding() {
        let f = fixture().await;
        let (m7, m8) = (f.mechanics[0], f.mechanics[1]);
        f.ledger.link(f.ticket, m7, PeerKind::Mechanic).await.unwrap();

        let report = f
            .ledger
            .bulk_edit(f.ticket, &[m7, m8], &[m7], PeerKind::Mechanic)
            .await
            .unwrap();

        assert_eq!(report.removed, vec![m7]);
        assert_eq!(report.added, vec![m8]);
        assert_eq!(report.skipped, vec![m7]);
        assert_eq!(report.peers, vec![m8]);
    }

    #[tokio::test]
    async fn test_bulk_edit_skips_unknown_and_consistent_ids() {
        let f = fixture().await;
        let (m7, m8) = (f.mechanics[0], f.mechanics[1]);
        f.ledger.link(f.ticket, m7, PeerKind::Mechanic).await.unwrap();

        let report = f
            .ledger
            .bulk_edit(f.ticket, &[m7, 404], &[m8, 505], PeerKind::Mechanic)
            .await
            .unwrap();

        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(report.skipped, vec![m8, 505, m7, 404]);
        assert_eq!(report.peers, vec![m7]);
    }

    #[tokio::test]
    async fn test_bulk_edit_on_missing_ticket_fails() {
        let f = fixture().await;
        assert!(matches!(
            f.ledger.bulk_edit(999, &[f.mechanics[0]], &[], PeerKind::Mechanic).await,
            Err(LinkError::NotFound { .. })
        ));
    }

    /// Deletes do not take the pair lock, so the insert itself must refuse a
    /// peer that disappeared after the existence check.
    #[tokio::test]
    async fn test_insert_after_peer_deleted_is_not_found() {
        let f = fixture().await;
        let m = f.mechanics[1];
        f.ledger.store.delete_mechanic(m).await.unwrap();

        assert!(matches!(
            f.ledger.insert_link(f.ticket, m, PeerKind::Mechanic).await,
            Err(LinkError::NotFound { entity: "Mechanic", id }) if id == m
        ));
        assert!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap().is_empty());

        let ranked = f.ledger.store.most_active_mechanics(10).await.unwrap();
        assert!(ranked.iter().all(|a| a.mechanic.id != m));
    }

    #[tokio::test]
    async fn test_pair_locks_are_released() {
        let f = fixture().await;

        for t in 0..1_000 {
            assert!(matches!(
                f.ledger.link(1_000_000 + t, f.mechanics[0], PeerKind::Mechanic).await,
                Err(LinkError::NotFound { .. })
            ));
        }
        f.ledger.link(f.ticket, f.mechanics[0], PeerKind::Mechanic).await.unwrap();
        f.ledger.bulk_edit(f.ticket, &[f.part], &[], PeerKind::Part).await.unwrap();

        assert!(f.ledger.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_links_insert_once() {
        let f = fixture().await;
        let m = f.mechanics[2];

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = f.ledger.clone();
                let ticket = f.ticket;
                tokio::spawn(async move { ledger.link(ticket, m, PeerKind::Mechanic).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let ok = results.iter().filter(|r| matches!(r, Ok(Ok(())))).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(LinkError::AlreadyLinked { .. }))))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(dup, 15);
        assert_eq!(f.ledger.peers_of(f.ticket, PeerKind::Mechanic).await.unwrap(), vec![m]);
        assert!(f.ledger.locks.is_empty());
    }
}
