use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type SheetId = i64;
pub type OrderId = i64;
pub type SupplyRequestId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn rotated(&self) -> Self {
        Self {
            w: self.h,
            h: self.w,
        }
    }

    pub fn fits_in(&self, other: &Rect) -> bool {
        self.w <= other.w && self.h <= other.h
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// One product of an order: its footprint and how many pieces are still needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDemand {
    pub product: String,
    pub size: Rect,
    pub qty: u32,
}

impl ProductDemand {
    pub fn new(product: impl Into<String>, w: u32, h: u32, qty: u32) -> Self {
        Self {
            product: product.into(),
            size: Rect::new(w, h),
            qty,
        }
    }

    /// True if the piece fits the sheet as-is or turned 90 degrees.
    pub fn fits_sheet(&self, sheet: Rect) -> bool {
        !self.size.is_empty() && (self.size.fits_in(&sheet) || self.size.rotated().fits_in(&sheet))
    }
}

/// A demand as the order stores it: tagged with the fabric it is cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub material: String,
    pub demand: ProductDemand,
}

impl OrderLine {
    pub fn new(material: impl Into<String>, demand: ProductDemand) -> Self {
        Self {
            material: material.into(),
            demand,
        }
    }
}

/// Hardware (buttons, zips, ...) is counted, never cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareNeed {
    pub material: String,
    pub qty: u32,
}

impl HardwareNeed {
    pub fn new(material: impl Into<String>, qty: u32) -> Self {
        Self {
            material: material.into(),
            qty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Fabric,
    Hardware,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Fabric => "fabric",
            MaterialKind::Hardware => "hardware",
        }
    }
}

impl FromStr for MaterialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fabric" => Ok(MaterialKind::Fabric),
            "hardware" => Ok(MaterialKind::Hardware),
            other => Err(format!("unknown material kind '{other}'")),
        }
    }
}

/// A catalog entry: `available` whole sheets of one format plus the
/// `remainder` stock left over from partially used ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSheet {
    pub id: SheetId,
    pub material: String,
    pub kind: MaterialKind,
    pub size: Rect,
    pub available: u32,
    pub remainder: u32,
}

impl MaterialSheet {
    pub fn fabric(
        id: SheetId,
        material: impl Into<String>,
        size: Rect,
        available: u32,
        remainder: u32,
    ) -> Self {
        Self {
            id,
            material: material.into(),
            kind: MaterialKind::Fabric,
            size,
            available,
            remainder,
        }
    }

    pub fn hardware(id: SheetId, material: impl Into<String>, available: u32, remainder: u32) -> Self {
        Self {
            id,
            material: material.into(),
            kind: MaterialKind::Hardware,
            size: Rect::new(0, 0),
            available,
            remainder,
        }
    }
}

/// `count` pieces of one product laid out on a sheet. `rect` is the
/// footprint after rotation. No origin is kept: pieces of different products
/// on one sheet are not guaranteed to be disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub product: String,
    pub rect: Rect,
    pub count: u32,
    pub rotated: bool,
}

impl Placement {
    pub fn area(&self) -> u64 {
        self.rect.area() * self.count as u64
    }
}

/// How many pieces of the demand at `index` one sheet absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    pub index: usize,
    pub product: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuttingPlan {
    pub sheet_id: SheetId,
    pub sheet: Rect,
    pub material: String,
    pub placements: Vec<Placement>,
}

impl CuttingPlan {
    pub fn covered_area(&self) -> u64 {
        self.placements.iter().map(Placement::area).sum()
    }

    pub fn piece_count(&self) -> u32 {
        self.placements.iter().map(|p| p.count).sum()
    }
}

/// A strictly positive gap between required and available quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageRecord {
    pub material: String,
    pub missing: u32,
}

impl ShortageRecord {
    pub fn new(material: impl Into<String>, missing: u32) -> Option<Self> {
        (missing > 0).then(|| Self {
            material: material.into(),
            missing,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyStage {
    /// Shortage found, operator has not confirmed a supply request yet.
    Unconfirmed,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Ready,
    /// Shortages covered by transferring remainder stock.
    PartiallyResolved,
    AwaitingSupply(SupplyStage),
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::PartiallyResolved => "partially_resolved",
            OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed) => "awaiting_supply",
            OrderStatus::AwaitingSupply(SupplyStage::Submitted) => "supply_requested",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(OrderStatus::Processing),
            "ready" => Ok(OrderStatus::Ready),
            "partially_resolved" => Ok(OrderStatus::PartiallyResolved),
            "awaiting_supply" => Ok(OrderStatus::AwaitingSupply(SupplyStage::Unconfirmed)),
            "supply_requested" => Ok(OrderStatus::AwaitingSupply(SupplyStage::Submitted)),
            other => Err(other.to_string()),
        }
    }
}

/// Remainder stock moved from a catalog sheet to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub order: OrderId,
    pub material: String,
    pub sheet_id: SheetId,
    pub qty: u32,
}

/// Whole sheets or hardware units taken from a catalog entry's available
/// stock for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDraw {
    pub material: String,
    pub sheet_id: SheetId,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyRequest {
    pub id: SupplyRequestId,
    pub order: OrderId,
    pub material: String,
    pub qty: u32,
}
