//! Inventory query command implementation
//!
//! Resolves the merged component or package table for a set of facts
//! against local checkouts of the global defaults (and optionally a tenant
//! configuration) repository, without compiling anything. Useful for
//! answering "which version of component X would cluster facts Y get".

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Distinguishes scratch directories of concurrent queries in one process.
static SCRATCH_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Arguments for the inventory command
#[derive(Args, Debug)]
pub struct InventoryArgs {
    #[command(subcommand)]
    what: InventoryTable,
}

#[derive(Subcommand, Debug)]
enum InventoryTable {
    /// Print the resolved component versions
    Components(TableArgs),

    /// Print the resolved package versions
    Packages(TableArgs),
}

/// Shared arguments of the inventory table subcommands
#[derive(Args, Debug)]
pub struct TableArgs {
    /// Path to a checkout of the global defaults repository
    #[arg(value_name = "GLOBAL_DIR")]
    pub global_dir: PathBuf,

    /// Path to a checkout of the tenant configuration repository
    #[arg(long, value_name = "PATH", requires = "tenant")]
    pub tenant_dir: Option<PathBuf>,

    /// Tenant id the tenant directory belongs to
    #[arg(long, value_name = "ID")]
    pub tenant: Option<String>,

    /// Cluster id selecting the tenant's cluster layer
    #[arg(long, value_name = "ID", requires = "tenant")]
    pub cluster_id: Option<String>,

    /// Distribution fact
    #[arg(long, value_name = "NAME")]
    pub distribution: Option<String>,

    /// Cloud fact
    #[arg(long, value_name = "NAME")]
    pub cloud: Option<String>,

    /// Cloud region fact
    #[arg(long, value_name = "NAME", requires = "cloud")]
    pub region: Option<String>,

    /// Tolerate class files that do not exist
    #[arg(long)]
    pub allow_missing_classes: bool,
}

/// Execute the inventory command
pub fn execute(args: InventoryArgs) -> Result<()> {
    match args.what {
        InventoryTable::Components(table) => print_table(table, "components"),
        InventoryTable::Packages(table) => print_table(table, "packages"),
    }
}

fn print_table(args: TableArgs, key: &str) -> Result<()> {
    use catalog_compiler::inventory::factory::{InventoryFactory, InventoryFacts};

    if !args.global_dir.is_dir() {
        bail!(
            "Global defaults directory not found: {}",
            args.global_dir.display()
        );
    }

    // The hierarchy is materialized in a scratch working directory; the
    // query never mutates the given checkouts.
    let work_dir = std::env::temp_dir().join(format!(
        "catalog-inventory-{}-{}",
        std::process::id(),
        SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&work_dir)?;

    let result = (|| -> Result<String> {
        let tenant = match (&args.tenant, &args.tenant_dir) {
            (Some(id), Some(dir)) => Some((id.as_str(), dir.as_path())),
            _ => None,
        };
        let factory = InventoryFactory::from_repo_dirs(&work_dir, &args.global_dir, tenant)?;

        let facts = InventoryFacts {
            distribution: args.distribution.clone(),
            cloud: args.cloud.clone(),
            region: args.region.clone(),
            cluster_id: args.cluster_id.clone(),
            tenant_id: args.tenant.clone(),
        };
        if !args.allow_missing_classes {
            factory.validate_facts(&facts)?;
        }

        let inventory = factory.query(&facts)?;
        Ok(serde_yaml::to_string(&inventory.get(key))?)
    })();

    let _ = fs::remove_dir_all(&work_dir);

    println!("{}", result?.trim_end());
    Ok(())
}
