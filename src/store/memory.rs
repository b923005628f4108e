use std::collections::BTreeMap;

use super::{InventoryStore, Ledger};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Allocation, HardwareNeed, MaterialSheet, OrderId, OrderLine, OrderStatus, SheetId,
    SupplyRequest, SupplyRequestId,
};

#[derive(Debug, Clone)]
struct OrderRecord {
    status: OrderStatus,
    lines: Vec<OrderLine>,
    hardware: Vec<HardwareNeed>,
}

#[derive(Debug, Clone, Default)]
struct Books {
    orders: BTreeMap<OrderId, OrderRecord>,
    sheets: BTreeMap<SheetId, MaterialSheet>,
    allocations: Vec<Allocation>,
    supply_requests: Vec<SupplyRequest>,
    /// Writes left before the simulated outage; `None` means no outage.
    writes_left: Option<usize>,
}

impl Books {
    fn write(&mut self) -> StoreResult<()> {
        match self.writes_left.as_mut() {
            Some(0) => Err(StoreError::Unavailable("simulated outage".to_string())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sheet_mut(&mut self, sheet: SheetId) -> StoreResult<&mut MaterialSheet> {
        self.sheets.get_mut(&sheet).ok_or(StoreError::NotFound {
            entity: "sheet",
            id: sheet,
        })
    }

    fn order(&self, order: OrderId) -> StoreResult<&OrderRecord> {
        self.orders.get(&order).ok_or(StoreError::NotFound {
            entity: "order",
            id: order,
        })
    }
}

/// In-memory store. A transaction works on a copy of the books and swaps it
/// in only when the closure succeeds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    books: Books,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, sheet: MaterialSheet) -> &mut Self {
        self.books.sheets.insert(sheet.id, sheet);
        self
    }

    pub fn add_order(
        &mut self,
        order: OrderId,
        lines: Vec<OrderLine>,
        hardware: Vec<HardwareNeed>,
    ) -> &mut Self {
        self.books.orders.insert(
            order,
            OrderRecord {
                status: OrderStatus::Processing,
                lines,
                hardware,
            },
        );
        self
    }

    /// Changes a sheet outside any transaction, as another client would.
    #[cfg(test)]
    pub fn update_sheet(&mut self, id: SheetId, f: impl FnOnce(&mut MaterialSheet)) {
        if let Some(sheet) = self.books.sheets.get_mut(&id) {
            f(sheet);
        }
    }

    /// Lets the next `writes` writes succeed and fails every one after that,
    /// until [`InMemoryStore::restore`] is called.
    #[cfg(test)]
    pub fn fail_after_writes(&mut self, writes: usize) {
        self.books.writes_left = Some(writes);
    }

    #[cfg(test)]
    pub fn restore(&mut self) {
        self.books.writes_left = None;
    }

    pub fn sheet(&self, id: SheetId) -> Option<&MaterialSheet> {
        self.books.sheets.get(&id)
    }

    pub fn status(&self, order: OrderId) -> Option<OrderStatus> {
        self.books.orders.get(&order).map(|o| o.status)
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.books.allocations
    }

    pub fn supply_requests(&self) -> &[SupplyRequest] {
        &self.books.supply_requests
    }
}

impl InventoryStore for InMemoryStore {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut draft = self.books.clone();
        let value = f(&mut draft)?;
        self.books = draft;
        Ok(value)
    }
}

impl Ledger for Books {
    fn order_status(&self, order: OrderId) -> StoreResult<OrderStatus> {
        Ok(self.order(order)?.status)
    }

    fn set_order_status(&mut self, order: OrderId, status: OrderStatus) -> StoreResult<()> {
        self.order(order)?;
        self.write()?;
        if let Some(record) = self.orders.get_mut(&order) {
            record.status = status;
        }
        Ok(())
    }

    fn order_lines(&self, order: OrderId) -> StoreResult<Vec<OrderLine>> {
        Ok(self.order(order)?.lines.clone())
    }

    fn hardware_needs(&self, order: OrderId) -> StoreResult<Vec<HardwareNeed>> {
        Ok(self.order(order)?.hardware.clone())
    }

    fn sheets(&self, material: &str) -> StoreResult<Vec<MaterialSheet>> {
        Ok(self
            .sheets
            .values()
            .filter(|s| s.material == material)
            .cloned()
            .collect())
    }

    fn take_remainder(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()> {
        let found = self.sheet_mut(sheet)?.remainder;
        if found < qty {
            return Err(StoreError::RemainderChanged {
                sheet,
                needed: qty,
                found,
            });
        }
        self.write()?;
        self.sheet_mut(sheet)?.remainder = found - qty;
        Ok(())
    }

    fn take_available(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()> {
        let found = self.sheet_mut(sheet)?.available;
        if found < qty {
            return Err(StoreError::AvailableChanged {
                sheet,
                needed: qty,
                found,
            });
        }
        self.write()?;
        self.sheet_mut(sheet)?.available = found - qty;
        Ok(())
    }

    fn record_allocation(&mut self, allocation: &Allocation) -> StoreResult<()> {
        self.write()?;
        self.allocations.push(allocation.clone());
        Ok(())
    }

    fn requested_supply(&self, order: OrderId, material: &str) -> StoreResult<u32> {
        Ok(self
            .supply_requests
            .iter()
            .filter(|r| r.order == order && r.material == material)
            .map(|r| r.qty)
            .sum())
    }

    fn create_supply_request(
        &mut self,
        order: OrderId,
        material: &str,
        qty: u32,
    ) -> StoreResult<SupplyRequestId> {
        self.order(order)?;
        self.write()?;
        let id = self.supply_requests.last().map_or(1, |r| r.id + 1);
        self.supply_requests.push(SupplyRequest {
            id,
            order,
            material: material.to_string(),
            qty,
        });
        Ok(id)
    }
}
