use cut_allocator::logging;
use cut_allocator::store::SqliteStore;
use cut_allocator::types::{
    HardwareNeed, MaterialSheet, OrderLine, OrderStatus, ProductDemand, Rect, SupplyStage,
};
use cut_allocator::{
    CancelToken, Decision, ErrorKind, InventoryReconciler, LogSink, Notice, SupplyRequestFactory,
};
use tempfile::TempDir;

fn workshop() -> (TempDir, SqliteStore) {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let mut store = SqliteStore::open(dir.path().join("cutting.db")).unwrap();
    store.init_schema().unwrap();
    store
        .add_sheet(&MaterialSheet::fabric(1, "Cotton", Rect::new(100, 100), 100, 0))
        .unwrap();
    store
        .add_sheet(&MaterialSheet::fabric(2, "Cotton", Rect::new(100, 100), 0, 30))
        .unwrap();
    store.add_sheet(&MaterialSheet::hardware(3, "Zip", 10, 0)).unwrap();

    store
        .add_order(
            1,
            &[OrderLine::new("Cotton", ProductDemand::new("panel", 100, 100, 120))],
            &[HardwareNeed::new("Zip", 4)],
        )
        .unwrap();
    store
        .add_order(
            2,
            &[OrderLine::new("Cotton", ProductDemand::new("panel", 50, 50, 40))],
            &[HardwareNeed::new("Zip", 12)],
        )
        .unwrap();
    (dir, store)
}

#[test]
fn test_shortage_closed_from_remainder_stock() {
    let (dir, mut store) = workshop();
    let mut notices: Vec<Notice> = Vec::new();

    let rec = InventoryReconciler::default()
        .reconcile(&mut store, 1, &mut notices)
        .unwrap();

    assert_eq!(rec.decision, Decision::PartiallyResolved);
    assert_eq!(rec.plans.len(), 100);
    assert_eq!(rec.transfers.len(), 1);
    assert_eq!((rec.transfers[0].sheet_id, rec.transfers[0].qty), (2, 20));
    assert!(matches!(notices[..], [Notice::TransferredFromRemainder { order: 1, .. }]));
    drop(store);

    let reopened = SqliteStore::open(dir.path().join("cutting.db")).unwrap();
    assert_eq!(reopened.status(1).unwrap(), OrderStatus::PartiallyResolved);
    assert_eq!(reopened.sheet(2).unwrap().unwrap().remainder, 10);
    assert_eq!(reopened.sheet(1).unwrap().unwrap().available, 0);
    assert_eq!(reopened.sheet(3).unwrap().unwrap().available, 6);
    assert_eq!(reopened.allocations(1).unwrap(), rec.transfers);
}

#[test]
fn test_next_order_sees_stock_the_first_drew() {
    let (_dir, mut store) = workshop();
    let reconciler = InventoryReconciler::default();

    let first = reconciler.reconcile(&mut store, 1, &mut LogSink).unwrap();
    assert_eq!(first.decision, Decision::PartiallyResolved);
    let drawn: Vec<(i64, u32)> = first.drawn.iter().map(|d| (d.sheet_id, d.qty)).collect();
    assert_eq!(drawn, [(1, 100), (3, 4)]);

    let second = reconciler.reconcile(&mut store, 2, &mut LogSink).unwrap();
    assert_eq!(second.decision, Decision::AwaitingSupply);
    assert!(second.plans.is_empty());
    assert!(second.drawn.is_empty());
    let missing = |material: &str| {
        second
            .shortages
            .iter()
            .find(|s| s.material == material)
            .map(|s| s.missing)
    };
    assert_eq!(missing("Cotton"), Some(10));
    assert_eq!(missing("Zip"), Some(6));
    assert_eq!(store.sheet(3).unwrap().unwrap().available, 6);
    assert_eq!(store.sheet(2).unwrap().unwrap().remainder, 10);
}

#[test]
fn test_hardware_shortage_goes_to_supply() {
    let (_dir, mut store) = workshop();

    let rec = InventoryReconciler::default()
        .reconcile(&mut store, 2, &mut LogSink)
        .unwrap();
    assert_eq!(rec.decision, Decision::AwaitingSupply);
    assert_eq!(rec.shortages.len(), 1);
    assert_eq!((rec.shortages[0].material.as_str(), rec.shortages[0].missing), ("Zip", 2));
    assert_eq!(
        store.status(2).unwrap(),
        OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed)
    );

    let factory = SupplyRequestFactory::default();
    let requests = factory
        .create_requests(&mut store, 2, &rec.shortages, &mut LogSink)
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].qty, 2);
    assert_eq!(
        store.status(2).unwrap(),
        OrderStatus::AwaitingSupply(SupplyStage::Submitted)
    );

    let repeated = factory
        .create_requests(&mut store, 2, &rec.shortages, &mut LogSink)
        .unwrap();
    assert!(repeated.is_empty());
    assert_eq!(store.supply_requests(2).unwrap(), requests);

    // a submitted order is not re-reconciled
    let again = InventoryReconciler::default()
        .reconcile(&mut store, 2, &mut LogSink)
        .unwrap();
    assert!(!again.changed);
}

#[test]
fn test_cancelled_pass_leaves_database_untouched() {
    let (_dir, mut store) = workshop();
    let token = CancelToken::new();
    token.cancel();

    let err = InventoryReconciler::default()
        .reconcile_with(&mut store, 1, &token, &mut LogSink)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(store.status(1).unwrap(), OrderStatus::Processing);
    assert_eq!(store.sheet(2).unwrap().unwrap().remainder, 30);
    assert!(store.allocations(1).unwrap().is_empty());
}

#[test]
fn test_unknown_order() {
    let (_dir, mut store) = workshop();
    let err = InventoryReconciler::default()
        .reconcile(&mut store, 99, &mut LogSink)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataAccess);
    assert_eq!(err.order(), Some(99));
}
