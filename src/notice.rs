use serde::Serialize;
use tracing::{info, warn};

use crate::types::{Allocation, OrderId, ShortageRecord, SupplyRequest};

/// Operator-facing outcome of a pass. Emitted only after the pass commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    MaterialsAvailable {
        order: OrderId,
    },
    TransferredFromRemainder {
        order: OrderId,
        transfers: Vec<Allocation>,
    },
    /// The operator may confirm a supply request for these shortages.
    ShortageRequiresSupply {
        order: OrderId,
        shortages: Vec<ShortageRecord>,
    },
    SupplyRequested {
        order: OrderId,
        requests: Vec<SupplyRequest>,
    },
}

pub trait NoticeSink {
    fn notify(&mut self, notice: Notice);
}

impl NoticeSink for Vec<Notice> {
    fn notify(&mut self, notice: Notice) {
        self.push(notice);
    }
}

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NoticeSink for LogSink {
    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::MaterialsAvailable { order } => {
                info!(order, "all materials available, order ready for cutting");
            }
            Notice::TransferredFromRemainder { order, transfers } => {
                let qty: u32 = transfers.iter().map(|t| t.qty).sum();
                info!(order, transfers = transfers.len(), qty, "remainder stock transferred to order");
            }
            Notice::ShortageRequiresSupply { order, shortages } => {
                for s in &shortages {
                    warn!(order, material = %s.material, missing = s.missing, "shortage requires new supply");
                }
            }
            Notice::SupplyRequested { order, requests } => {
                for r in &requests {
                    info!(order, request = r.id, material = %r.material, qty = r.qty, "supply requested");
                }
            }
        }
    }
}
