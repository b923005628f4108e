use tracing::{info, warn};

use crate::assess::{Settings, assess};
use crate::error::ReconcileError;
use crate::notice::{Notice, NoticeSink};
use crate::store::{InventoryStore, Ledger};
use crate::types::{OrderId, OrderStatus, ShortageRecord, SupplyRequest, SupplyStage};

/// Which shortages the operator agreed to order.
#[derive(Debug, Clone, Copy)]
enum Confirmed<'a> {
    Every,
    Only(&'a [ShortageRecord]),
}

/// Turns confirmed shortages into supply requests.
///
/// Shortages are recomputed from the store inside the transaction. A
/// confirmation can shrink a request to what is still missing but never
/// widens it, and quantities already requested for the order are subtracted,
/// so repeating a confirmation never requests the same material twice.
#[derive(Debug, Clone, Default)]
pub struct SupplyRequestFactory {
    settings: Settings,
}

impl SupplyRequestFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Requests the confirmed materials only, each capped at its current
    /// shortage.
    pub fn create_requests<S: InventoryStore>(
        &self,
        store: &mut S,
        order: OrderId,
        confirmed: &[ShortageRecord],
        sink: &mut dyn NoticeSink,
    ) -> Result<Vec<SupplyRequest>, ReconcileError> {
        self.run(store, order, Confirmed::Only(confirmed), sink)
    }

    /// Requests every shortage the order currently has.
    pub fn create_all_requests<S: InventoryStore>(
        &self,
        store: &mut S,
        order: OrderId,
        sink: &mut dyn NoticeSink,
    ) -> Result<Vec<SupplyRequest>, ReconcileError> {
        self.run(store, order, Confirmed::Every, sink)
    }

    fn run<S: InventoryStore>(
        &self,
        store: &mut S,
        order: OrderId,
        confirmed: Confirmed<'_>,
        sink: &mut dyn NoticeSink,
    ) -> Result<Vec<SupplyRequest>, ReconcileError> {
        let requests = store.transaction(|ledger| self.submit(ledger, order, confirmed))?;
        info!(order, requests = requests.len(), "supply requests submitted");
        if !requests.is_empty() {
            sink.notify(Notice::SupplyRequested {
                order,
                requests: requests.clone(),
            });
        }
        Ok(requests)
    }

    fn submit(
        &self,
        ledger: &mut dyn Ledger,
        order: OrderId,
        confirmed: Confirmed<'_>,
    ) -> Result<Vec<SupplyRequest>, ReconcileError> {
        let status = ledger.order_status(order)?;
        if !matches!(status, OrderStatus::AwaitingSupply(_)) {
            return Err(ReconcileError::InvalidTransition {
                order,
                status,
                action: "request supply",
            });
        }

        let current = assess(ledger, order, &self.settings)?.shortages();
        if current.is_empty() {
            // left awaiting supply so the next reconciliation can release it
            info!(order, "no shortage left, nothing to request");
            return Ok(Vec::new());
        }

        let wanted: Vec<ShortageRecord> = match confirmed {
            Confirmed::Every => current,
            Confirmed::Only(records) => records
                .iter()
                .filter_map(|record| {
                    let now = current
                        .iter()
                        .find(|s| s.material == record.material)
                        .map_or(0, |s| s.missing);
                    if record.missing > now {
                        warn!(
                            order,
                            material = %record.material,
                            confirmed = record.missing,
                            current = now,
                            "confirmed shortage is stale, using current figure"
                        );
                    }
                    ShortageRecord::new(record.material.clone(), record.missing.min(now))
                })
                .collect(),
        };

        let mut requests = Vec::new();
        for shortage in &wanted {
            let already = ledger.requested_supply(order, &shortage.material)?;
            let qty = shortage.missing.saturating_sub(already);
            if qty == 0 {
                continue;
            }
            let id = ledger.create_supply_request(order, &shortage.material, qty)?;
            requests.push(SupplyRequest {
                id,
                order,
                material: shortage.material.clone(),
                qty,
            });
        }

        if !requests.is_empty() {
            ledger.set_order_status(order, OrderStatus::AwaitingSupply(SupplyStage::Submitted))?;
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::notice::LogSink;
    use crate::reconcile::{Decision, InventoryReconciler};
    use crate::store::InMemoryStore;
    use crate::types::{HardwareNeed, MaterialSheet, OrderLine, ProductDemand, Rect};

    fn short_store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store
            .add_sheet(MaterialSheet::fabric(1, "Cotton", Rect::new(100, 100), 100, 3))
            .add_sheet(MaterialSheet::hardware(2, "Zip", 2, 0))
            .add_order(
                10,
                vec![OrderLine::new("Cotton", ProductDemand::new("panel", 100, 100, 120))],
                vec![HardwareNeed::new("Zip", 5)],
            );
        store
    }

    fn reconciled() -> (InMemoryStore, Vec<ShortageRecord>) {
        let mut store = short_store();
        let rec = InventoryReconciler::default()
            .reconcile(&mut store, 10, &mut LogSink)
            .unwrap();
        assert_eq!(rec.decision, Decision::AwaitingSupply);
        (store, rec.shortages)
    }

    #[test]
    fn test_one_request_per_shortage() {
        let (mut store, shortages) = reconciled();
        let mut notices: Vec<Notice> = Vec::new();

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &shortages, &mut notices)
            .unwrap();

        let sized: Vec<(&str, u32)> = requests.iter().map(|r| (r.material.as_str(), r.qty)).collect();
        assert_eq!(sized, [("Cotton", 20), ("Zip", 3)]);
        assert_eq!(
            store.status(10),
            Some(OrderStatus::AwaitingSupply(SupplyStage::Submitted))
        );
        assert_eq!(store.supply_requests(), requests.as_slice());
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_second_confirmation_creates_nothing() {
        let (mut store, shortages) = reconciled();
        let factory = SupplyRequestFactory::default();
        factory
            .create_requests(&mut store, 10, &shortages, &mut LogSink)
            .unwrap();

        let mut notices: Vec<Notice> = Vec::new();
        let again = factory
            .create_requests(&mut store, 10, &shortages, &mut notices)
            .unwrap();
        assert!(again.is_empty());
        assert!(notices.is_empty());
        assert_eq!(store.supply_requests().len(), 2);
    }

    #[test]
    fn test_stale_shortage_is_recomputed() {
        let (mut store, shortages) = reconciled();
        // stock arrived for the zips after the operator saw the warning
        store.update_sheet(2, |s| s.available = 10);

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &shortages, &mut LogSink)
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].material, "Cotton");
    }

    #[test]
    fn test_only_confirmed_materials_are_requested() {
        let (mut store, _) = reconciled();
        let zips = [ShortageRecord::new("Zip", 3).unwrap()];

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &zips, &mut LogSink)
            .unwrap();
        let sized: Vec<(&str, u32)> = requests.iter().map(|r| (r.material.as_str(), r.qty)).collect();
        assert_eq!(sized, [("Zip", 3)]);
    }

    #[test]
    fn test_confirmation_caps_the_quantity() {
        let (mut store, _) = reconciled();
        let some_cotton = [ShortageRecord::new("Cotton", 5).unwrap()];

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &some_cotton, &mut LogSink)
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].qty, 5);
    }

    #[test]
    fn test_restocked_order_is_not_submitted() {
        let (mut store, shortages) = reconciled();
        store.update_sheet(1, |s| s.available = 200);
        store.update_sheet(2, |s| s.available = 50);

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &shortages, &mut LogSink)
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(
            store.status(10),
            Some(OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed))
        );

        let rec = InventoryReconciler::default()
            .reconcile(&mut store, 10, &mut LogSink)
            .unwrap();
        assert!(rec.changed);
        assert_eq!(rec.decision, Decision::Ready);
    }

    #[test]
    fn test_nothing_requested_leaves_status() {
        let (mut store, _) = reconciled();
        // zips restocked, cotton still short but not confirmed
        store.update_sheet(2, |s| s.available = 50);
        let zips = [ShortageRecord::new("Zip", 3).unwrap()];

        let requests = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &zips, &mut LogSink)
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(
            store.status(10),
            Some(OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed))
        );
    }

    #[test]
    fn test_grown_shortage_only_requests_the_difference() {
        let (mut store, shortages) = reconciled();
        let factory = SupplyRequestFactory::default();
        factory
            .create_requests(&mut store, 10, &shortages, &mut LogSink)
            .unwrap();
        store.update_sheet(1, |s| s.available = 90);

        let more = factory
            .create_all_requests(&mut store, 10, &mut LogSink)
            .unwrap();
        assert_eq!(more.len(), 1);
        assert_eq!((more[0].material.as_str(), more[0].qty), ("Cotton", 10));
    }

    #[test]
    fn test_requires_awaiting_supply() {
        let mut store = short_store();
        let err = SupplyRequestFactory::default()
            .create_requests(&mut store, 10, &[], &mut LogSink)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(store.supply_requests().is_empty());
        assert_eq!(store.status(10), Some(OrderStatus::Processing));
    }
}
