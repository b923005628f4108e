//! Order-level planning: how many sheets of each fabric an order needs, how
//! much hardware it needs, and what current stock cannot cover.

use serde::Serialize;
use tracing::debug;

use crate::error::StoreResult;
use crate::planner::SheetCuttingPlanner;
use crate::store::Ledger;
use crate::types::{
    CuttingPlan, HardwareNeed, MaterialKind, MaterialSheet, OrderId, OrderLine, ProductDemand,
    ShortageRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Upper bound on sheets per format when projecting how many more would
    /// be needed for demand current stock cannot cover.
    pub projection_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            projection_limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialRequirement {
    pub material: String,
    pub kind: MaterialKind,
    pub required: u32,
    pub available: u32,
    pub missing: u32,
    /// Fabric demand no sheet format can hold, even turned.
    pub unplaceable: Vec<ProductDemand>,
}

impl MaterialRequirement {
    pub fn shortage(&self) -> Option<ShortageRecord> {
        ShortageRecord::new(self.material.clone(), self.missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricPlan {
    /// Sheets that can be cut from current stock.
    pub plans: Vec<CuttingPlan>,
    pub requirement: MaterialRequirement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub plans: Vec<CuttingPlan>,
    pub requirements: Vec<MaterialRequirement>,
}

impl Assessment {
    /// One record per material, summed over its fabric and hardware
    /// requirements, in order of first appearance.
    pub fn shortages(&self) -> Vec<ShortageRecord> {
        let mut merged: Vec<ShortageRecord> = Vec::new();
        for shortage in self.requirements.iter().filter_map(MaterialRequirement::shortage) {
            match merged.iter_mut().find(|s| s.material == shortage.material) {
                Some(existing) => existing.missing = existing.missing.saturating_add(shortage.missing),
                None => merged.push(shortage),
            }
        }
        merged
    }

    /// Sheets of `material` the plans cut from stock.
    pub fn sheets_planned(&self, material: &str) -> u32 {
        self.plans.iter().filter(|p| p.material == material).count() as u32
    }

    pub fn requirement(&self, material: &str) -> Option<&MaterialRequirement> {
        self.requirements.iter().find(|r| r.material == material)
    }
}

/// Cuts `demands` from the catalog entries of one fabric, in id order, using
/// each entry's available sheets. Whatever is left is projected onto the same
/// formats to count the extra sheets needed; what still does not fit is
/// unplaceable and counts one unit per piece.
pub fn plan_fabric(
    material: &str,
    sheets: &[MaterialSheet],
    demands: &[ProductDemand],
    settings: &Settings,
) -> FabricPlan {
    let mut plans = Vec::new();
    let mut residual = demands.to_vec();

    for sheet in sheets.iter().filter(|s| s.available > 0) {
        let run =
            SheetCuttingPlanner::new(material, sheet.id, sheet.size).plan(sheet.available, &residual);
        plans.extend(run.plans);
        residual = run.residual;
    }
    let consumed = plans.len() as u32;

    let mut extra = 0u32;
    for sheet in sheets {
        if residual.iter().all(|d| d.qty == 0) {
            break;
        }
        let run = SheetCuttingPlanner::new(material, sheet.id, sheet.size)
            .plan(settings.projection_limit, &residual);
        extra = extra.saturating_add(run.sheets_used);
        residual = run.residual;
    }

    let unplaceable: Vec<ProductDemand> = residual.into_iter().filter(|d| d.qty > 0).collect();
    let unplaceable_pieces = unplaceable.iter().fold(0u32, |acc, d| acc.saturating_add(d.qty));
    let missing = extra.saturating_add(unplaceable_pieces);
    let available = total_available(sheets);

    debug!(
        material,
        consumed,
        extra,
        unplaceable = unplaceable_pieces,
        available,
        "fabric planned"
    );

    FabricPlan {
        plans,
        requirement: MaterialRequirement {
            material: material.to_string(),
            kind: MaterialKind::Fabric,
            required: consumed.saturating_add(missing),
            available,
            missing,
            unplaceable,
        },
    }
}

/// Assesses one order against the catalog as `ledger` currently sees it.
pub fn assess(ledger: &dyn Ledger, order: OrderId, settings: &Settings) -> StoreResult<Assessment> {
    let lines = ledger.order_lines(order)?;
    let hardware = ledger.hardware_needs(order)?;

    let mut assessment = Assessment::default();
    for (material, demands) in group_by_material(&lines) {
        let sheets = ledger.sheets(&material)?;
        let fabric = plan_fabric(&material, &sheets, &demands, settings);
        assessment.plans.extend(fabric.plans);
        assessment.requirements.push(fabric.requirement);
    }

    for (material, required) in sum_hardware(&hardware) {
        // stock a fabric plan of the same name already cuts is not there for hardware
        let available = total_available(&ledger.sheets(&material)?)
            .saturating_sub(assessment.sheets_planned(&material));
        assessment.requirements.push(MaterialRequirement {
            missing: required.saturating_sub(available),
            material,
            kind: MaterialKind::Hardware,
            required,
            available,
            unplaceable: Vec::new(),
        });
    }

    Ok(assessment)
}

fn total_available(sheets: &[MaterialSheet]) -> u32 {
    sheets.iter().fold(0u32, |acc, s| acc.saturating_add(s.available))
}

/// Demand grouped by fabric, in order of first appearance.
fn group_by_material(lines: &[OrderLine]) -> Vec<(String, Vec<ProductDemand>)> {
    let mut groups: Vec<(String, Vec<ProductDemand>)> = Vec::new();
    for line in lines {
        match groups.iter_mut().find(|(m, _)| *m == line.material) {
            Some((_, demands)) => demands.push(line.demand.clone()),
            None => groups.push((line.material.clone(), vec![line.demand.clone()])),
        }
    }
    groups
}

fn sum_hardware(needs: &[HardwareNeed]) -> Vec<(String, u32)> {
    let mut totals: Vec<(String, u32)> = Vec::new();
    for need in needs {
        match totals.iter_mut().find(|(m, _)| *m == need.material) {
            Some((_, qty)) => *qty = qty.saturating_add(need.qty),
            None => totals.push((need.material.clone(), need.qty)),
        }
    }
    totals
}
