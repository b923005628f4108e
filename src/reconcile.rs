use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::assess::{Assessment, MaterialRequirement, Settings, assess};
use crate::error::{ReconcileError, StoreError};
use crate::notice::{Notice, NoticeSink};
use crate::store::{InventoryStore, Ledger};
use crate::types::{
    Allocation, CuttingPlan, MaterialKind, OrderId, OrderStatus, SheetId, ShortageRecord, StockDraw,
    SupplyStage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Ready,
    PartiallyResolved,
    AwaitingSupply,
}

impl Decision {
    /// The decision an already reconciled status stands for.
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Processing => None,
            OrderStatus::Ready => Some(Decision::Ready),
            OrderStatus::PartiallyResolved => Some(Decision::PartiallyResolved),
            OrderStatus::AwaitingSupply(_) => Some(Decision::AwaitingSupply),
        }
    }

    fn status(self) -> OrderStatus {
        match self {
            Decision::Ready => OrderStatus::Ready,
            Decision::PartiallyResolved => OrderStatus::PartiallyResolved,
            Decision::AwaitingSupply => OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed),
        }
    }
}

/// Lets the caller abandon a pass. Only honoured before the pass writes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub order: OrderId,
    pub decision: Decision,
    pub status: OrderStatus,
    /// False when the order had already been reconciled and nothing was written.
    pub changed: bool,
    pub plans: Vec<CuttingPlan>,
    pub requirements: Vec<MaterialRequirement>,
    pub shortages: Vec<ShortageRecord>,
    pub transfers: Vec<Allocation>,
    /// Available stock the plans and hardware needs took.
    pub drawn: Vec<StockDraw>,
}

impl Reconciliation {
    fn unchanged(order: OrderId, status: OrderStatus, decision: Decision) -> Self {
        Self {
            order,
            decision,
            status,
            changed: false,
            plans: Vec::new(),
            requirements: Vec::new(),
            shortages: Vec::new(),
            transfers: Vec::new(),
            drawn: Vec::new(),
        }
    }

    fn notice(&self) -> Notice {
        match self.decision {
            Decision::Ready => Notice::MaterialsAvailable { order: self.order },
            Decision::PartiallyResolved => Notice::TransferredFromRemainder {
                order: self.order,
                transfers: self.transfers.clone(),
            },
            Decision::AwaitingSupply => Notice::ShortageRequiresSupply {
                order: self.order,
                shortages: self.shortages.clone(),
            },
        }
    }
}

/// Decides an order's next status from what stock can cover, moving
/// remainder stock to the order when that closes every shortage.
#[derive(Debug, Clone, Default)]
pub struct InventoryReconciler {
    settings: Settings,
}

impl InventoryReconciler {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn reconcile<S: InventoryStore>(
        &self,
        store: &mut S,
        order: OrderId,
        sink: &mut dyn NoticeSink,
    ) -> Result<Reconciliation, ReconcileError> {
        self.reconcile_with(store, order, &CancelToken::new(), sink)
    }

    /// Runs one reconciliation pass as a single transaction: the transfers
    /// and the status change commit together or not at all.
    pub fn reconcile_with<S: InventoryStore>(
        &self,
        store: &mut S,
        order: OrderId,
        cancel: &CancelToken,
        sink: &mut dyn NoticeSink,
    ) -> Result<Reconciliation, ReconcileError> {
        let outcome = store.transaction(|ledger| self.pass(ledger, order, cancel));
        match outcome {
            Ok(rec) => {
                info!(
                    order,
                    decision = ?rec.decision,
                    changed = rec.changed,
                    sheets = rec.plans.len(),
                    shortages = rec.shortages.len(),
                    transfers = rec.transfers.len(),
                    "reconciliation pass finished"
                );
                if rec.changed {
                    sink.notify(rec.notice());
                }
                Ok(rec)
            }
            Err(err) => {
                warn!(order, kind = ?err.kind(), error = %err, "reconciliation pass aborted");
                Err(err)
            }
        }
    }

    fn pass(
        &self,
        ledger: &mut dyn Ledger,
        order: OrderId,
        cancel: &CancelToken,
    ) -> Result<Reconciliation, ReconcileError> {
        let status = ledger.order_status(order)?;
        match status {
            OrderStatus::Processing | OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed) => {}
            settled => {
                if let Some(decision) = Decision::for_status(settled) {
                    return Ok(Reconciliation::unchanged(order, settled, decision));
                }
            }
        }

        let assessment = assess(ledger, order, &self.settings)?;
        let shortages = assessment.shortages();

        let decision = if shortages.is_empty() {
            Decision::Ready
        } else if remainder_covers(ledger, &shortages)? {
            Decision::PartiallyResolved
        } else {
            Decision::AwaitingSupply
        };

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled(order));
        }

        let transfers = match decision {
            Decision::PartiallyResolved => transfer_remainders(ledger, order, &shortages)?,
            _ => Vec::new(),
        };
        let drawn = match decision {
            Decision::Ready | Decision::PartiallyResolved => draw_stock(ledger, &assessment)?,
            Decision::AwaitingSupply => Vec::new(),
        };
        let next = decision.status();
        ledger.set_order_status(order, next)?;

        Ok(Reconciliation {
            order,
            decision,
            status: next,
            changed: true,
            plans: assessment.plans,
            requirements: assessment.requirements,
            shortages,
            transfers,
            drawn,
        })
    }
}

/// True if every shortage fits in the summed remainder of its material.
fn remainder_covers(
    ledger: &dyn Ledger,
    shortages: &[ShortageRecord],
) -> Result<bool, ReconcileError> {
    for shortage in shortages {
        let total = ledger
            .sheets(&shortage.material)?
            .iter()
            .fold(0u64, |acc, s| acc + s.remainder as u64);
        if total < shortage.missing as u64 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// First-fit by sheet id: drains remainders until each shortage is covered.
fn transfer_remainders(
    ledger: &mut dyn Ledger,
    order: OrderId,
    shortages: &[ShortageRecord],
) -> Result<Vec<Allocation>, ReconcileError> {
    let mut transfers = Vec::new();
    for shortage in shortages {
        let mut needed = shortage.missing;
        for sheet in ledger.sheets(&shortage.material)? {
            if needed == 0 {
                break;
            }
            if sheet.remainder == 0 {
                continue;
            }
            let qty = sheet.remainder.min(needed);
            ledger.take_remainder(sheet.id, qty)?;
            let allocation = Allocation {
                order,
                material: shortage.material.clone(),
                sheet_id: sheet.id,
                qty,
            };
            ledger.record_allocation(&allocation)?;
            transfers.push(allocation);
            needed -= qty;
        }
        if needed > 0 {
            return Err(StoreError::StockShort {
                material: shortage.material.clone(),
                stock: "remainder",
                missing: needed,
            }
            .into());
        }
    }
    Ok(transfers)
}

/// Takes every planned sheet from its catalog entry, then the hardware units
/// available stock covers, first-fit by sheet id.
fn draw_stock(
    ledger: &mut dyn Ledger,
    assessment: &Assessment,
) -> Result<Vec<StockDraw>, ReconcileError> {
    let mut drawn: Vec<StockDraw> = Vec::new();
    for plan in &assessment.plans {
        push_draw(&mut drawn, &plan.material, plan.sheet_id, 1);
    }
    for draw in &drawn {
        ledger.take_available(draw.sheet_id, draw.qty)?;
    }

    for need in assessment
        .requirements
        .iter()
        .filter(|r| r.kind == MaterialKind::Hardware)
    {
        let mut left = need.required.saturating_sub(need.missing);
        for sheet in ledger.sheets(&need.material)? {
            if left == 0 {
                break;
            }
            let qty = sheet.available.min(left);
            if qty == 0 {
                continue;
            }
            ledger.take_available(sheet.id, qty)?;
            push_draw(&mut drawn, &need.material, sheet.id, qty);
            left -= qty;
        }
        if left > 0 {
            return Err(StoreError::StockShort {
                material: need.material.clone(),
                stock: "available",
                missing: left,
            }
            .into());
        }
    }
    Ok(drawn)
}

fn push_draw(drawn: &mut Vec<StockDraw>, material: &str, sheet_id: SheetId, qty: u32) {
    match drawn.iter_mut().find(|d| d.sheet_id == sheet_id) {
        Some(draw) => draw.qty += qty,
        None => drawn.push(StockDraw {
            material: material.to_string(),
            sheet_id,
            qty,
        }),
    }
}
