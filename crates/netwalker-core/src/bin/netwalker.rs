use clap::Parser;
use netwalker_core::config::{
    load_seed_file, merge_seeds, parse_seed_list, resolve_credentials, WalkerConfig,
};
use netwalker_core::engine::{DiscoveryEngine, Seed};
use netwalker_core::inventory::reconciler::Reconciler;
use netwalker_core::inventory::store::SqliteInventory;
use netwalker_core::inventory::{Inventory, MemoryInventory};
use netwalker_core::logging::init_logging;
use netwalker_core::report::{ReportSink, TextReport};
use netwalker_core::filter::GlobPattern;
use netwalker_core::{SessionCollector, WalkError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_CONNECTIVITY: i32 = 2;
const EXIT_STORE: i32 = 3;

/// Recursive CDP/LLDP network discovery and inventory.
#[derive(Parser, Debug)]
#[command(name = "netwalker", version)]
struct Cli {
    /// Path to the INI configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed devices as NAME:IP[,NAME:IP...]; merged with the seed file
    #[arg(long, value_name = "SEEDS")]
    seed_devices: Option<String>,

    /// Device login username (falls back to NETWALKER_USERNAME)
    #[arg(long)]
    username: Option<String>,

    /// Device login password (falls back to NETWALKER_PASSWORD; ENC: values accepted)
    #[arg(long)]
    password: Option<String>,

    /// Privileged-mode password (falls back to NETWALKER_ENABLE_PASSWORD)
    #[arg(long)]
    enable_password: Option<String>,

    /// Walk and parse without touching the database
    #[arg(long)]
    dry_run: bool,

    /// Initialize the inventory schema and exit
    #[arg(long)]
    db_init: bool,

    /// Print inventory table counts and exit
    #[arg(long)]
    db_status: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging("info", None) {
        eprintln!("Could not initialize logging: {}", e);
        std::process::exit(EXIT_CONFIG);
    }

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match WalkerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return EXIT_CONFIG;
        }
    };

    if cli.db_init || cli.db_status {
        return db_command(&config, cli.db_init).await;
    }

    let creds = match resolve_credentials(
        cli.username,
        cli.password,
        cli.enable_password,
        &config.credentials,
    ) {
        Ok(creds) => creds,
        Err(e) => {
            error!(error = %e, "Credential error");
            return EXIT_CONFIG;
        }
    };

    let seeds = match gather_seeds(&config, cli.seed_devices.as_deref()) {
        Ok(seeds) if seeds.is_empty() => {
            error!("No seed devices given (config seed_file or --seed-devices)");
            return EXIT_CONFIG;
        }
        Ok(seeds) => seeds,
        Err(e) => {
            error!(error = %e, "Seed error");
            return EXIT_CONFIG;
        }
    };

    let inventory: Arc<dyn Inventory> = if cli.dry_run || !config.database.enabled {
        info!("Running against the in-memory inventory (no database writes)");
        Arc::new(MemoryInventory::new())
    } else {
        match SqliteInventory::new(&config.database.url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Could not open inventory store");
                return EXIT_STORE;
            }
        }
    };
    if let Err(e) = inventory.init_schema().await {
        error!(error = %e, "Could not initialize inventory schema");
        return EXIT_STORE;
    }

    let reconciler = Arc::new(Reconciler::new(inventory.clone()));
    let collector = Arc::new(SessionCollector::new(creds, config.collector_settings()));
    let engine = Arc::new(DiscoveryEngine::new(
        config.engine_config(),
        config.neighbor_filter(),
        collector,
        reconciler,
    ));

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping discovery");
            cancel.cancel();
        }
    });

    let summary = match engine.run(seeds).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Discovery failed");
            return EXIT_STORE;
        }
    };

    write_report(&config, inventory.as_ref()).await;
    println!("{}", summary);

    if summary.store_failed {
        EXIT_STORE
    } else if summary.completed == 0 && summary.queued > 0 {
        EXIT_CONNECTIVITY
    } else {
        EXIT_OK
    }
}

async fn db_command(config: &WalkerConfig, init: bool) -> i32 {
    let store = match SqliteInventory::new(&config.database.url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Could not open inventory store");
            return EXIT_STORE;
        }
    };
    if let Err(e) = store.init_schema().await {
        error!(error = %e, "Could not initialize inventory schema");
        return EXIT_STORE;
    }
    if init {
        println!("Inventory schema ready at {}", config.database.url);
        return EXIT_OK;
    }

    match store.table_counts().await {
        Ok(counts) => {
            for (table, count) in counts {
                println!("{:<20} {}", table, count);
            }
        }
        Err(e) => {
            error!(error = %e, "Could not read table counts");
            return EXIT_STORE;
        }
    }
    match store.newest_last_seen().await {
        Ok(Some(newest)) => println!("{:<20} {}", "newest last_seen", newest),
        Ok(None) => println!("{:<20} -", "newest last_seen"),
        Err(e) => {
            error!(error = %e, "Could not read newest last_seen");
            return EXIT_STORE;
        }
    }
    EXIT_OK
}

fn gather_seeds(config: &WalkerConfig, flag: Option<&str>) -> Result<Vec<Seed>, WalkError> {
    let from_cli = match flag {
        Some(raw) => parse_seed_list(raw)?,
        None => Vec::new(),
    };
    let from_file = match config.discovery.seed_file.as_deref() {
        Some(path) => load_seed_file(Path::new(path))?,
        None => Vec::new(),
    };
    Ok(merge_seeds(from_file, from_cli))
}

async fn write_report(config: &WalkerConfig, inventory: &dyn Inventory) {
    let devices = match inventory.all_devices().await {
        Ok(rows) => rows.into_iter().map(|r| r.identity).collect::<Vec<_>>(),
        Err(e) => {
            warn!(error = %e, "Could not read devices for the report");
            return;
        }
    };
    let edges = match inventory.all_edges().await {
        Ok(edges) => edges,
        Err(e) => {
            warn!(error = %e, "Could not read adjacencies for the report");
            return;
        }
    };
    let pattern = match GlobPattern::new(&config.output.site_boundary_pattern) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(error = %e, "Invalid site boundary pattern, using default");
            GlobPattern::new("*-CORE-*").expect("default pattern is valid")
        }
    };
    let mut sink = TextReport::new(&config.output.directory, pattern);
    if let Err(e) = sink.write(&devices, &edges) {
        warn!(error = %e, "Could not write the inventory report");
    }
}
