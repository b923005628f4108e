use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cut_allocator::config::Config;
use cut_allocator::logging;
use cut_allocator::store::SqliteStore;
use cut_allocator::types::{
    CuttingPlan, HardwareNeed, MaterialSheet, OrderId, OrderLine, ProductDemand, Rect,
    ShortageRecord,
};
use cut_allocator::{
    Decision, InventoryReconciler, LogSink, Reconciliation, Settings, SheetCuttingPlanner,
    SupplyRequestFactory,
};
use serde::Deserialize;

#[derive(Parser)]
#[command(
    name = "cut_allocator",
    about = "Cutting plans and material allocation for production orders"
)]
struct Cli {
    /// SQLite database holding the catalog and the orders
    #[arg(long, global = true, env = "CUT_DB", default_value = "cutting.db")]
    db: PathBuf,

    /// Sheets per format to try when projecting a shortage
    #[arg(long, global = true, env = "CUT_PROJECTION_LIMIT", default_value_t = 10_000)]
    projection_limit: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan cuts on one sheet format without touching the database
    Plan {
        /// Sheet dimensions (WxH, e.g. 1500x1000)
        #[arg(long)]
        sheet: String,

        /// Number of sheets on hand
        #[arg(long, default_value_t = 1)]
        supply: u32,

        /// Products as name:WxH:qty (e.g. sleeve:400x300:8)
        #[arg(long = "cuts", num_args = 1..)]
        cuts: Vec<String>,
    },
    /// Create the database schema
    InitDb,
    /// Load sheets and orders from a JSON file
    Load { file: PathBuf },
    /// Run one reconciliation pass for an order
    Reconcile {
        order: OrderId,

        /// Confirm a supply request if the order ends up awaiting supply
        #[arg(long)]
        request_supply: bool,
    },
    /// Turn confirmed shortages of an order into supply requests
    #[command(group = clap::ArgGroup::new("what").required(true).args(["confirm", "all"]))]
    RequestSupply {
        order: OrderId,

        /// Shortages as material:qty (e.g. Zip:3), capped at what is still missing
        #[arg(long = "confirm", num_args = 1.., value_parser = parse_shortage)]
        confirm: Vec<ShortageRecord>,

        /// Request every shortage the order currently has
        #[arg(long)]
        all: bool,
    },
}

#[derive(Deserialize)]
struct Inventory {
    #[serde(default)]
    sheets: Vec<MaterialSheet>,
    #[serde(default)]
    orders: Vec<OrderImport>,
}

#[derive(Deserialize)]
struct OrderImport {
    id: OrderId,
    #[serde(default)]
    lines: Vec<OrderLine>,
    #[serde(default)]
    hardware: Vec<HardwareNeed>,
}

fn parse_dimensions(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("invalid dimensions '{}', expected WxH", s));
    }
    let w = parts[0]
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let h = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok(Rect::new(w, h))
}

fn parse_cut(s: &str) -> Result<ProductDemand, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 || parts[0].is_empty() {
        return Err(format!("invalid cut '{}', expected name:WxH:qty", s));
    }
    let size = parse_dimensions(parts[1])?;
    let qty = parts[2]
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    if qty == 0 {
        return Err(format!("quantity must be non-zero in '{}'", s));
    }
    Ok(ProductDemand::new(parts[0], size.w, size.h, qty))
}

fn parse_shortage(s: &str) -> Result<ShortageRecord, String> {
    let (material, qty) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid shortage '{}', expected material:qty", s))?;
    if material.is_empty() {
        return Err(format!("missing material in '{}'", s));
    }
    let qty = qty
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    ShortageRecord::new(material, qty).ok_or_else(|| format!("quantity must be non-zero in '{}'", s))
}

fn print_plans(plans: &[CuttingPlan]) {
    for (i, plan) in plans.iter().enumerate() {
        println!("Sheet {} ({} #{} {}):", i + 1, plan.material, plan.sheet_id, plan.sheet);
        for p in &plan.placements {
            let rot = if p.rotated { " [rotated]" } else { "" };
            println!("  {} x{} {}{}", p.product, p.count, p.rect, rot);
        }
        println!();
    }
}

fn plan(sheet: &str, supply: u32, cuts: &[String]) -> Result<(), String> {
    let sheet = parse_dimensions(sheet)?;
    let demands = cuts
        .iter()
        .map(|c| parse_cut(c))
        .collect::<Result<Vec<_>, _>>()?;

    let run = SheetCuttingPlanner::new("cli", 0, sheet).plan(supply, &demands);
    print_plans(&run.plans);

    println!(
        "Summary: {} sheet{} used, {} piece{} outstanding",
        run.sheets_used,
        if run.sheets_used == 1 { "" } else { "s" },
        run.outstanding_pieces(),
        if run.outstanding_pieces() == 1 { "" } else { "s" },
    );
    for d in run.outstanding() {
        let reason = if d.fits_sheet(sheet) { "out of sheets" } else { "does not fit" };
        println!("  {} {}: {} left ({})", d.product, d.size, d.qty, reason);
    }
    Ok(())
}

fn load(store: &mut SqliteStore, file: &Path) -> Result<(), String> {
    let raw = std::fs::read_to_string(file).map_err(|e| format!("{}: {}", file.display(), e))?;
    let inventory: Inventory =
        serde_json::from_str(&raw).map_err(|e| format!("{}: {}", file.display(), e))?;

    store.init_schema().map_err(|e| e.to_string())?;
    for sheet in &inventory.sheets {
        store.add_sheet(sheet).map_err(|e| e.to_string())?;
    }
    for order in &inventory.orders {
        store
            .add_order(order.id, &order.lines, &order.hardware)
            .map_err(|e| e.to_string())?;
    }
    println!(
        "Loaded {} sheet{} and {} order{}",
        inventory.sheets.len(),
        if inventory.sheets.len() == 1 { "" } else { "s" },
        inventory.orders.len(),
        if inventory.orders.len() == 1 { "" } else { "s" },
    );
    Ok(())
}

fn print_reconciliation(rec: &Reconciliation) {
    if !rec.changed {
        println!("Order {} already {}, nothing to do", rec.order, rec.status);
        return;
    }
    print_plans(&rec.plans);
    for r in &rec.requirements {
        println!(
            "  {}: required {}, available {}, missing {}",
            r.material, r.required, r.available, r.missing
        );
    }
    for t in &rec.transfers {
        println!("  transferred {} {} from sheet #{}", t.qty, t.material, t.sheet_id);
    }
    for d in &rec.drawn {
        println!("  drew {} {} from sheet #{}", d.qty, d.material, d.sheet_id);
    }
    println!("Order {}: {}", rec.order, rec.status);
}

fn reconcile(
    store: &mut SqliteStore,
    settings: Settings,
    order: OrderId,
    request_supply: bool,
) -> Result<(), String> {
    let rec = InventoryReconciler::new(settings)
        .reconcile(store, order, &mut LogSink)
        .map_err(|e| e.to_string())?;
    print_reconciliation(&rec);

    if rec.changed && rec.decision == Decision::AwaitingSupply {
        if request_supply {
            return submit_supply(store, settings, order, Some(rec.shortages.as_slice()));
        }
        println!("Run `request-supply {}` to order the missing materials", order);
    }
    Ok(())
}

fn submit_supply(
    store: &mut SqliteStore,
    settings: Settings,
    order: OrderId,
    confirmed: Option<&[ShortageRecord]>,
) -> Result<(), String> {
    let factory = SupplyRequestFactory::new(settings);
    let requests = match confirmed {
        Some(records) => factory.create_requests(store, order, records, &mut LogSink),
        None => factory.create_all_requests(store, order, &mut LogSink),
    }
    .map_err(|e| e.to_string())?;
    for r in &requests {
        println!("  request #{}: {} x{}", r.id, r.material, r.qty);
    }
    println!(
        "Order {}: {} supply request{} submitted",
        order,
        requests.len(),
        if requests.len() == 1 { "" } else { "s" },
    );
    Ok(())
}

fn open_store(db: &Path) -> Result<SqliteStore, String> {
    SqliteStore::open(db).map_err(|e| format!("{}: {}", db.display(), e))
}

fn run(cli: Cli) -> Result<(), String> {
    let settings = Settings {
        projection_limit: cli.projection_limit.max(1),
    };

    match cli.command {
        Command::Plan { sheet, supply, cuts } => plan(&sheet, supply, &cuts),
        Command::InitDb => {
            open_store(&cli.db)?.init_schema().map_err(|e| e.to_string())?;
            println!("Initialised {}", cli.db.display());
            Ok(())
        }
        Command::Load { file } => load(&mut open_store(&cli.db)?, &file),
        Command::Reconcile {
            order,
            request_supply,
        } => reconcile(&mut open_store(&cli.db)?, settings, order, request_supply),
        Command::RequestSupply { order, confirm, all } => {
            let confirmed = (!all).then_some(confirm.as_slice());
            submit_supply(&mut open_store(&cli.db)?, settings, order, confirmed)
        }
    }
}

fn main() -> ExitCode {
    let config = Config::from_env();
    match &config.log_file {
        Some(path) => {
            if let Err(e) = logging::init_to_file(path, &config.log_level) {
                eprintln!("Error: cannot open {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
        None => logging::init(&config.log_level),
    }

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
