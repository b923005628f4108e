use std::path::Path;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use super::{InventoryStore, Ledger};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Allocation, HardwareNeed, MaterialKind, MaterialSheet, OrderId, OrderLine, OrderStatus,
    ProductDemand, Rect, SheetId, SupplyRequest, SupplyRequestId,
};

pub const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS material (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('fabric', 'hardware'))
);
CREATE TABLE IF NOT EXISTS sheet (
    id        INTEGER PRIMARY KEY,
    material  TEXT NOT NULL REFERENCES material(name),
    width     INTEGER NOT NULL CHECK (width >= 0),
    height    INTEGER NOT NULL CHECK (height >= 0),
    available INTEGER NOT NULL CHECK (available >= 0),
    remainder INTEGER NOT NULL CHECK (remainder >= 0)
);
CREATE TABLE IF NOT EXISTS production_order (
    id     INTEGER PRIMARY KEY,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS order_line (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL REFERENCES production_order(id),
    product  TEXT NOT NULL,
    material TEXT NOT NULL,
    width    INTEGER NOT NULL,
    height   INTEGER NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0)
);
CREATE TABLE IF NOT EXISTS hardware_need (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL REFERENCES production_order(id),
    material TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0)
);
CREATE TABLE IF NOT EXISTS allocation (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL REFERENCES production_order(id),
    material TEXT NOT NULL,
    sheet_id INTEGER NOT NULL REFERENCES sheet(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0)
);
CREATE TABLE IF NOT EXISTS supply_request (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id   INTEGER NOT NULL REFERENCES production_order(id),
    material   TEXT NOT NULL,
    quantity   INTEGER NOT NULL CHECK (quantity > 0),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed store. Each transaction is `IMMEDIATE`: the write lock is
/// taken before the first read, so a pass sees a snapshot no other pass can
/// change underneath it.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::configure(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn add_sheet(&self, sheet: &MaterialSheet) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO material (name, kind) VALUES (?1, ?2)",
            params![sheet.material, sheet.kind.as_str()],
        )?;
        self.conn.execute(
            "INSERT INTO sheet (id, material, width, height, available, remainder)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sheet.id,
                sheet.material,
                sheet.size.w,
                sheet.size.h,
                sheet.available,
                sheet.remainder
            ],
        )?;
        Ok(())
    }

    /// Registers a new order in `Processing` with its demand.
    pub fn add_order(
        &mut self,
        order: OrderId,
        lines: &[OrderLine],
        hardware: &[HardwareNeed],
    ) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO production_order (id, status) VALUES (?1, ?2)",
            params![order, OrderStatus::Processing.as_str()],
        )?;
        for line in lines {
            tx.execute(
                "INSERT INTO order_line (order_id, product, material, width, height, quantity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    order,
                    line.demand.product,
                    line.material,
                    line.demand.size.w,
                    line.demand.size.h,
                    line.demand.qty
                ],
            )?;
        }
        for need in hardware {
            tx.execute(
                "INSERT INTO hardware_need (order_id, material, quantity) VALUES (?1, ?2, ?3)",
                params![order, need.material, need.qty],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn sheet(&self, id: SheetId) -> StoreResult<Option<MaterialSheet>> {
        Ok(self
            .conn
            .query_row(
                "SELECT s.id, s.material, m.kind, s.width, s.height, s.available, s.remainder
                 FROM sheet s JOIN material m ON m.name = s.material
                 WHERE s.id = ?1",
                params![id],
                map_sheet,
            )
            .optional()?)
    }

    pub fn status(&self, order: OrderId) -> StoreResult<OrderStatus> {
        read_status(&self.conn, order)
    }

    pub fn allocations(&self, order: OrderId) -> StoreResult<Vec<Allocation>> {
        let mut stmt = self.conn.prepare(
            "SELECT order_id, material, sheet_id, quantity FROM allocation
             WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order], |row| {
            Ok(Allocation {
                order: row.get(0)?,
                material: row.get(1)?,
                sheet_id: row.get(2)?,
                qty: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn supply_requests(&self, order: OrderId) -> StoreResult<Vec<SupplyRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_id, material, quantity FROM supply_request
             WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order], |row| {
            Ok(SupplyRequest {
                id: row.get(0)?,
                order: row.get(1)?,
                material: row.get(2)?,
                qty: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl InventoryStore for SqliteStore {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Ledger) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        // Returning early drops `tx`, which rolls it back
        let value = f(&mut SqliteLedger { tx: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

struct SqliteLedger<'t, 'c> {
    tx: &'t Transaction<'c>,
}

impl Ledger for SqliteLedger<'_, '_> {
    fn order_status(&self, order: OrderId) -> StoreResult<OrderStatus> {
        read_status(self.tx, order)
    }

    fn set_order_status(&mut self, order: OrderId, status: OrderStatus) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE production_order SET status = ?1 WHERE id = ?2",
            params![status.as_str(), order],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "order",
                id: order,
            });
        }
        Ok(())
    }

    fn order_lines(&self, order: OrderId) -> StoreResult<Vec<OrderLine>> {
        read_status(self.tx, order)?;
        let mut stmt = self.tx.prepare(
            "SELECT material, product, width, height, quantity FROM order_line
             WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order], |row| {
            Ok(OrderLine {
                material: row.get(0)?,
                demand: ProductDemand {
                    product: row.get(1)?,
                    size: Rect::new(row.get(2)?, row.get(3)?),
                    qty: row.get(4)?,
                },
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn hardware_needs(&self, order: OrderId) -> StoreResult<Vec<HardwareNeed>> {
        let mut stmt = self.tx.prepare(
            "SELECT material, quantity FROM hardware_need WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![order], |row| {
            Ok(HardwareNeed {
                material: row.get(0)?,
                qty: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn sheets(&self, material: &str) -> StoreResult<Vec<MaterialSheet>> {
        let mut stmt = self.tx.prepare(
            "SELECT s.id, s.material, m.kind, s.width, s.height, s.available, s.remainder
             FROM sheet s JOIN material m ON m.name = s.material
             WHERE s.material = ?1 ORDER BY s.id",
        )?;
        let rows = stmt.query_map(params![material], map_sheet)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn take_remainder(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()> {
        decrement(self.tx, Stock::Remainder, sheet, qty)
    }

    fn take_available(&mut self, sheet: SheetId, qty: u32) -> StoreResult<()> {
        decrement(self.tx, Stock::Available, sheet, qty)
    }

    fn record_allocation(&mut self, allocation: &Allocation) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO allocation (order_id, material, sheet_id, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                allocation.order,
                allocation.material,
                allocation.sheet_id,
                allocation.qty
            ],
        )?;
        Ok(())
    }

    fn requested_supply(&self, order: OrderId, material: &str) -> StoreResult<u32> {
        Ok(self.tx.query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM supply_request
             WHERE order_id = ?1 AND material = ?2",
            params![order, material],
            |row| row.get(0),
        )?)
    }

    fn create_supply_request(
        &mut self,
        order: OrderId,
        material: &str,
        qty: u32,
    ) -> StoreResult<SupplyRequestId> {
        self.tx.execute(
            "INSERT INTO supply_request (order_id, material, quantity) VALUES (?1, ?2, ?3)",
            params![order, material, qty],
        )?;
        Ok(self.tx.last_insert_rowid())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stock {
    Available,
    Remainder,
}

impl Stock {
    fn column(self) -> &'static str {
        match self {
            Stock::Available => "available",
            Stock::Remainder => "remainder",
        }
    }

    fn changed(self, sheet: SheetId, needed: u32, found: u32) -> StoreError {
        match self {
            Stock::Available => StoreError::AvailableChanged {
                sheet,
                needed,
                found,
            },
            Stock::Remainder => StoreError::RemainderChanged {
                sheet,
                needed,
                found,
            },
        }
    }
}

/// Conditional decrement: the row is only touched if it still holds `qty`.
fn decrement(conn: &Connection, stock: Stock, sheet: SheetId, qty: u32) -> StoreResult<()> {
    let column = stock.column();
    let changed = conn.execute(
        &format!("UPDATE sheet SET {column} = {column} - ?1 WHERE id = ?2 AND {column} >= ?1"),
        params![qty, sheet],
    )?;
    if changed == 1 {
        return Ok(());
    }
    let found: Option<u32> = conn
        .query_row(
            &format!("SELECT {column} FROM sheet WHERE id = ?1"),
            params![sheet],
            |row| row.get(0),
        )
        .optional()?;
    Err(match found {
        Some(found) => stock.changed(sheet, qty, found),
        None => StoreError::NotFound {
            entity: "sheet",
            id: sheet,
        },
    })
}

fn read_status(conn: &Connection, order: OrderId) -> StoreResult<OrderStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM production_order WHERE id = ?1",
            params![order],
            |row| row.get(0),
        )
        .optional()?;
    let status = status.ok_or(StoreError::NotFound {
        entity: "order",
        id: order,
    })?;
    status.parse().map_err(StoreError::InvalidStatus)
}

fn map_sheet(row: &Row) -> rusqlite::Result<MaterialSheet> {
    let kind: String = row.get(2)?;
    let kind = kind
        .parse::<MaterialKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    Ok(MaterialSheet {
        id: row.get(0)?,
        material: row.get(1)?,
        kind,
        size: Rect::new(row.get(3)?, row.get(4)?),
        available: row.get(5)?,
        remainder: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
            .add_sheet(&MaterialSheet::fabric(1, "Cotton", Rect::new(100, 100), 2, 4))
            .unwrap();
        store
            .add_sheet(&MaterialSheet::fabric(2, "Cotton", Rect::new(150, 100), 1, 0))
            .unwrap();
        store
            .add_sheet(&MaterialSheet::hardware(3, "Button", 40, 0))
            .unwrap();
        store
            .add_order(
                7,
                &[OrderLine::new("Cotton", ProductDemand::new("shirt", 50, 50, 4))],
                &[HardwareNeed::new("Button", 12)],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_reads_demand_and_catalog() {
        let mut store = store();
        let (lines, hardware, sheets) = store
            .transaction(|l| -> StoreResult<_> {
                Ok((l.order_lines(7)?, l.hardware_needs(7)?, l.sheets("Cotton")?))
            })
            .unwrap();
        assert_eq!(lines[0].demand, ProductDemand::new("shirt", 50, 50, 4));
        assert_eq!(hardware, vec![HardwareNeed::new("Button", 12)]);
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].kind, MaterialKind::Fabric);
        assert_eq!(sheets[1].size, Rect::new(150, 100));
    }

    #[test]
    fn test_rollback_on_error() {
        let mut store = store();
        let result: StoreResult<()> = store.transaction(|l| {
            l.take_remainder(1, 3)?;
            l.set_order_status(7, OrderStatus::PartiallyResolved)?;
            l.take_remainder(1, 3)
        });
        assert!(matches!(
            result,
            Err(StoreError::RemainderChanged {
                sheet: 1,
                needed: 3,
                found: 1
            })
        ));
        assert_eq!(store.sheet(1).unwrap().unwrap().remainder, 4);
        assert_eq!(store.status(7).unwrap(), OrderStatus::Processing);
    }

    #[test]
    fn test_available_never_goes_negative() {
        let mut store = store();
        let err = store
            .transaction(|l| -> StoreResult<()> {
                l.take_available(1, 2)?;
                l.take_available(1, 1)
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::AvailableChanged {
                sheet: 1,
                needed: 1,
                found: 0
            }
        ));
        assert_eq!(store.sheet(1).unwrap().unwrap().available, 2);

        store.transaction(|l| l.take_available(1, 2)).unwrap();
        assert_eq!(store.sheet(1).unwrap().unwrap().available, 0);
    }

    #[test]
    fn test_commit_on_success() {
        let mut store = store();
        store
            .transaction(|l| -> StoreResult<()> {
                l.take_remainder(1, 3)?;
                l.record_allocation(&Allocation {
                    order: 7,
                    material: "Cotton".into(),
                    sheet_id: 1,
                    qty: 3,
                })?;
                l.set_order_status(7, OrderStatus::PartiallyResolved)
            })
            .unwrap();
        assert_eq!(store.sheet(1).unwrap().unwrap().remainder, 1);
        assert_eq!(store.status(7).unwrap(), OrderStatus::PartiallyResolved);
        assert_eq!(store.allocations(7).unwrap().len(), 1);
    }

    #[test]
    fn test_supply_requests_are_summed() {
        let mut store = store();
        let id = store
            .transaction(|l| {
                l.create_supply_request(7, "Cotton", 5)?;
                l.create_supply_request(7, "Cotton", 2)
            })
            .unwrap();
        assert_eq!(id, 2);
        let total = store.transaction(|l| l.requested_supply(7, "Cotton")).unwrap();
        assert_eq!(total, 7);
        let none = store.transaction(|l| l.requested_supply(7, "Linen")).unwrap();
        assert_eq!(none, 0);
        assert_eq!(store.supply_requests(7).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_rows() {
        let mut store = store();
        let err = store.transaction(|l| l.order_lines(99)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "order", id: 99 }));
        let err = store.transaction(|l| l.take_remainder(42, 1)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "sheet", id: 42 }));
    }
}
