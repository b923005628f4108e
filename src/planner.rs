use tracing::debug;

use crate::packing::PackingEngine;
use crate::types::{CuttingPlan, ProductDemand, Rect, SheetId};

/// Result of cutting repeated sheets of one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRun {
    pub plans: Vec<CuttingPlan>,
    /// Every input demand, in input order, with what is still uncut.
    pub residual: Vec<ProductDemand>,
    pub sheets_used: u32,
}

impl SheetRun {
    pub fn is_satisfied(&self) -> bool {
        self.residual.iter().all(|d| d.qty == 0)
    }

    /// Demands with pieces left over.
    pub fn outstanding(&self) -> impl Iterator<Item = &ProductDemand> {
        self.residual.iter().filter(|d| d.qty > 0)
    }

    pub fn outstanding_pieces(&self) -> u64 {
        self.outstanding().map(|d| d.qty as u64).sum()
    }
}

/// Drives [`PackingEngine`] sheet after sheet for one material format.
pub struct SheetCuttingPlanner {
    material: String,
    sheet_id: SheetId,
    engine: PackingEngine,
}

impl SheetCuttingPlanner {
    pub fn new(material: impl Into<String>, sheet_id: SheetId, sheet: Rect) -> Self {
        Self {
            material: material.into(),
            sheet_id,
            engine: PackingEngine::new(sheet),
        }
    }

    /// Cuts up to `supply` sheets. Stops early once demand is met or a sheet
    /// takes no piece at all, so an unplaceable demand ends the run instead of
    /// spinning.
    pub fn plan(&self, supply: u32, demands: &[ProductDemand]) -> SheetRun {
        let mut residual = demands.to_vec();
        let mut plans = Vec::new();
        let mut remaining = supply;

        while remaining > 0 && residual.iter().any(|d| d.qty > 0) {
            let packing = self.engine.pack(&residual);
            if packing.is_empty() {
                debug!(
                    material = %self.material,
                    sheet = %self.engine.sheet(),
                    "no outstanding demand fits the sheet"
                );
                break;
            }

            for used in &packing.consumed {
                let demand = &mut residual[used.index];
                demand.qty = demand.qty.saturating_sub(used.count);
            }
            remaining -= 1;

            debug!(
                material = %self.material,
                sheet_no = plans.len() + 1,
                covered = packing.covered_area,
                rotated = packing.rotated,
                "sheet planned"
            );
            plans.push(CuttingPlan {
                sheet_id: self.sheet_id,
                sheet: self.engine.sheet(),
                material: self.material.clone(),
                placements: packing.placements,
            });
        }

        SheetRun {
            sheets_used: supply - remaining,
            plans,
            residual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(w: u32, h: u32) -> SheetCuttingPlanner {
        SheetCuttingPlanner::new("Cotton", 1, Rect::new(w, h))
    }

    #[test]
    fn test_single_demand_over_many_sheets() {
        let run = planner(100, 50).plan(u32::MAX, &[ProductDemand::new("collar", 30, 20, 100)]);
        // 6 per sheet: 16 full sheets and one with the last 4
        assert_eq!(run.plans.len(), 17);
        assert_eq!(run.sheets_used, 17);
        assert!(run.is_satisfied());
        assert_eq!(run.plans.last().map(CuttingPlan::piece_count), Some(4));
    }

    #[test]
    fn test_limited_supply_leaves_residual() {
        let run = planner(100, 50).plan(3, &[ProductDemand::new("collar", 30, 20, 100)]);
        assert_eq!(run.plans.len(), 3);
        assert_eq!(run.residual[0].qty, 100 - 18);
        assert_eq!(run.outstanding_pieces(), 82);
    }

    #[test]
    fn test_unplaceable_demand_stops_run() {
        let run = planner(100, 100).plan(50, &[ProductDemand::new("tent", 200, 200, 7)]);
        assert!(run.plans.is_empty());
        assert_eq!(run.sheets_used, 0);
        assert_eq!(run.residual[0].qty, 7);
    }

    #[test]
    fn test_no_supply_plans_nothing() {
        let run = planner(100, 100).plan(0, &[ProductDemand::new("shirt", 10, 10, 1)]);
        assert!(run.plans.is_empty());
        assert_eq!(run.residual[0].qty, 1);
    }

    #[test]
    fn test_no_demands() {
        let run = planner(100, 100).plan(10, &[]);
        assert!(run.plans.is_empty());
        assert!(run.is_satisfied());
    }

    #[test]
    fn test_mixed_products_share_sheets() {
        let demands = [
            ProductDemand::new("back", 50, 100, 3),
            ProductDemand::new("pocket", 10, 10, 150),
            ProductDemand::new("tent", 500, 500, 2),
        ];
        let run = planner(100, 100).plan(10, &demands);
        // back: 2 per sheet; pocket: 100 per sheet, both measured on the whole sheet
        assert_eq!(run.plans.len(), 2);
        assert_eq!(run.residual[0].qty, 0);
        assert_eq!(run.residual[1].qty, 0);
        assert_eq!(run.residual[2].qty, 2);
        for plan in &run.plans {
            assert!(!plan.placements.is_empty());
            assert!(plan.covered_area() > 0);
            assert_eq!(plan.material, "Cotton");
        }
    }

    #[test]
    fn test_duplicate_product_names_are_tracked_separately() {
        let demands = [
            ProductDemand::new("strap", 100, 10, 3),
            ProductDemand::new("strap", 100, 10, 2),
        ];
        let run = planner(100, 10).plan(10, &demands);
        assert!(run.is_satisfied());
        // one piece of each line per sheet until the shorter line runs out
        assert_eq!(run.plans.len(), 3);
        assert_eq!(run.plans[0].placements.len(), 2);
        assert_eq!(run.plans[2].placements.len(), 1);
    }
}
