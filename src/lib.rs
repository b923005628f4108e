pub mod assess;
pub mod config;
pub mod error;
pub mod logging;
pub mod notice;
pub mod packing;
pub mod planner;
pub mod reconcile;
pub mod store;
pub mod supply;
pub mod types;

pub use assess::{Assessment, MaterialRequirement, Settings};
pub use error::{ErrorKind, ReconcileError, StoreError};
pub use notice::{LogSink, Notice, NoticeSink};
pub use packing::PackingEngine;
pub use planner::SheetCuttingPlanner;
pub use reconcile::{CancelToken, Decision, InventoryReconciler, Reconciliation};
pub use supply::SupplyRequestFactory;
