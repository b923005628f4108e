use crate::types::{Consumption, Placement, ProductDemand, Rect};

/// Strip of a sheet left over after laying out one product in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRect {
    pub x: u32,
    pub y: u32,
    pub rect: Rect,
}

/// Outcome of packing one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packing {
    pub placements: Vec<Placement>,
    pub consumed: Vec<Consumption>,
    pub covered_area: u64,
    pub rotated: bool,
    /// Margins beyond each product's grid. Recorded only: later products in
    /// the same pass are still measured against the whole sheet.
    pub margins: Vec<FreeRect>,
}

impl Packing {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Single-sheet, single-orientation grid packer.
#[derive(Debug, Clone, Copy)]
pub struct PackingEngine {
    sheet: Rect,
}

impl PackingEngine {
    pub fn new(sheet: Rect) -> Self {
        Self { sheet }
    }

    pub fn sheet(&self) -> Rect {
        self.sheet
    }

    /// Packs one sheet against `demands`, trying every footprint as-is and
    /// then every footprint turned 90 degrees. The orientation covering more
    /// area wins; on a tie the as-is layout is kept.
    pub fn pack(&self, demands: &[ProductDemand]) -> Packing {
        let straight = self.pack_oriented(demands, false);
        let turned = self.pack_oriented(demands, true);
        if turned.covered_area > straight.covered_area {
            turned
        } else {
            straight
        }
    }

    fn pack_oriented(&self, demands: &[ProductDemand], rotate: bool) -> Packing {
        let mut order: Vec<usize> = (0..demands.len()).filter(|&i| demands[i].qty > 0).collect();
        // Widest first, then tallest; sort_by is stable so full ties keep input order
        order.sort_by(|&a, &b| {
            let (a, b) = (demands[a].size, demands[b].size);
            b.w.cmp(&a.w).then(b.h.cmp(&a.h))
        });

        let mut packing = Packing {
            rotated: rotate,
            ..Packing::default()
        };

        for idx in order {
            let demand = &demands[idx];
            let piece = if rotate {
                demand.size.rotated()
            } else {
                demand.size
            };
            if piece.is_empty() {
                continue;
            }

            let across = self.sheet.w / piece.w;
            let down = self.sheet.h / piece.h;
            let capacity = across as u64 * down as u64;
            let count = capacity.min(demand.qty as u64) as u32;
            if count == 0 {
                continue;
            }

            packing.placements.push(Placement {
                product: demand.product.clone(),
                rect: piece,
                count,
                rotated: rotate,
            });
            packing.consumed.push(Consumption {
                index: idx,
                product: demand.product.clone(),
                count,
            });
            packing.covered_area += piece.area() * count as u64;
            self.record_margins(&mut packing.margins, piece, across, down);
        }

        packing
    }

    fn record_margins(&self, margins: &mut Vec<FreeRect>, piece: Rect, across: u32, down: u32) {
        let used_w = across * piece.w;
        let used_h = down * piece.h;
        if self.sheet.w > used_w {
            margins.push(FreeRect {
                x: used_w,
                y: 0,
                rect: Rect::new(self.sheet.w - used_w, self.sheet.h),
            });
        }
        if self.sheet.h > used_h {
            margins.push(FreeRect {
                x: 0,
                y: used_h,
                rect: Rect::new(self.sheet.w, self.sheet.h - used_h),
            });
        }
    }
}
