use thiserror::Error;

use crate::types::{OrderId, OrderStatus, SheetId};

/// Failure reading or writing the order, catalog or supply data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("remainder on sheet {sheet} changed: needed {needed}, found {found}")]
    RemainderChanged {
        sheet: SheetId,
        needed: u32,
        found: u32,
    },

    #[error("unknown order status '{0}'")]
    InvalidStatus(String),

    #[error("available stock on sheet {sheet} changed: needed {needed}, found {found}")]
    AvailableChanged {
        sheet: SheetId,
        needed: u32,
        found: u32,
    },

    #[error("{stock} stock of {material} is {missing} short of what the pass checked")]
    StockShort {
        material: String,
        stock: &'static str,
        missing: u32,
    },

    #[error("data store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataAccess,
    InvalidTransition,
    Cancelled,
}

/// A failed reconciliation or supply-request attempt. The order status is
/// left as it was.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("order {order} is {status}, cannot {action}")]
    InvalidTransition {
        order: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("reconciliation of order {0} cancelled before any write")]
    Cancelled(OrderId),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Store(_) => ErrorKind::DataAccess,
            ReconcileError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ReconcileError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// The order the failure is about, when the error itself names one.
    pub fn order(&self) -> Option<OrderId> {
        match self {
            ReconcileError::Store(StoreError::NotFound { entity: "order", id }) => Some(*id),
            ReconcileError::Store(_) => None,
            ReconcileError::InvalidTransition { order, .. } | ReconcileError::Cancelled(order) => {
                Some(*order)
            }
        }
    }
}
