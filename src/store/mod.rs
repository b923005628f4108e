//! Data boundary of the engine: the demand source, supply catalog, order
//! status store and supply-request sink, all reached through one [`Ledger`]
//! inside one transaction.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    Allocation, HardwareNeed, MaterialSheet, OrderId, OrderLine, OrderStatus, SheetId,
    SupplyRequestId,
};

/// Reads and writes available inside a transaction.
pub trait Ledger {
    fn order_status(&self, order: OrderId) -> StoreResult<OrderStatus>;

    fn set_order_status(&mut self, order: OrderId, status: OrderStatus) -> StoreResult<()>;

    /// Product demand of the order, in entry order.
    fn order_lines(&self, order: OrderId) -> StoreResult<Vec<OrderLine>>;

    fn hardware_needs(&self, order: OrderId) -> StoreResult<Vec<HardwareNeed>>;

    /// Catalog entries of a material, ascending by id.
    fn sheets(&self, material: &str) -> StoreResult<Vec<MaterialSheet>>;

    /// Decrements a sheet's remainder. Fails with
    /// [`StoreError::RemainderChanged`] rather than going negative.
    fn take_remainder(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()>;

    /// Decrements a sheet's available count. Fails with
    /// [`StoreError::AvailableChanged`] rather than going negative.
    fn take_available(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()>;

    fn record_allocation(&mut self, allocation: &Allocation) -> StoreResult<()>;

    /// Total quantity already requested for this order and material.
    fn requested_supply(&self, order: OrderId, material: &str) -> StoreResult<u32>;

    fn create_supply_request(
        &mut self,
        order: OrderId,
        material: &str,
        qty: u32,
    ) -> StoreResult<SupplyRequestId>;
}

/// A store that can run a group of ledger operations atomically.
pub trait InventoryStore {
    /// Runs `f` against a consistent view of the store. Everything `f` wrote
    /// is committed if it returns `Ok`, and nothing is if it returns `Err`.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>;
}
