//! Compile command implementation
//!
//! Runs the full compile pipeline for one cluster:
//! 1. Checkout of the global defaults and tenant configuration repositories
//! 2. Cluster parameter rendering and hierarchy evaluation
//! 3. Package and component synchronization at their pinned versions
//! 4. Target rendering (one per component instance plus the cluster target)
//! 5. External compiler invocation per target
//! 6. Catalog repository update and commit

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the compile command
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Path to the cluster descriptor file
    #[arg(value_name = "CLUSTER_FILE")]
    pub cluster_file: PathBuf,

    /// Path to the tenant descriptor file
    #[arg(short, long, value_name = "PATH", env = "CATALOG_TENANT_FILE")]
    pub tenant_file: PathBuf,

    /// Working directory for the compile run
    #[arg(short, long, value_name = "PATH", env = "CATALOG_WORK_DIR", default_value = ".")]
    pub working_dir: PathBuf,

    /// Reuse the existing working directory, never fetch
    #[arg(long)]
    pub local: bool,

    /// Push the catalog commit to its remote
    #[arg(long)]
    pub push: bool,

    /// Pin the global defaults repository to a revision
    #[arg(long, value_name = "REV")]
    pub global_revision: Option<String>,

    /// Pin the tenant configuration repository to a revision
    #[arg(long, value_name = "REV")]
    pub tenant_revision: Option<String>,

    /// External compiler command
    #[arg(long, value_name = "CMD", env = "CATALOG_COMPILER", default_value = "kapitan")]
    pub compiler: String,

    /// Commit author name for catalog commits
    #[arg(long, value_name = "NAME", env = "CATALOG_AUTHOR_NAME")]
    pub author_name: Option<String>,

    /// Commit author e-mail for catalog commits
    #[arg(long, value_name = "EMAIL", env = "CATALOG_AUTHOR_EMAIL")]
    pub author_email: Option<String>,
}

/// Execute the compile command
pub fn execute(args: CompileArgs) -> Result<()> {
    use catalog_compiler::api;
    use catalog_compiler::cluster::Cluster;
    use catalog_compiler::compile::{compile_cluster, CommandCompiler};
    use catalog_compiler::config::Config;

    let cluster_response = api::load_cluster(&args.cluster_file)?;
    let tenant_response = api::load_tenant(&args.tenant_file)?;
    let cluster = Cluster::new(cluster_response, tenant_response)?;

    let mut cfg = Config::new(&args.working_dir);
    cfg.set_local(args.local);
    cfg.set_push(args.push);
    cfg.set_global_revision(args.global_revision);
    cfg.set_tenant_revision(args.tenant_revision);
    cfg.set_compiler_command(&args.compiler);
    if let (Some(name), Some(email)) = (&args.author_name, &args.author_email) {
        cfg.set_author(name, email);
    }

    let compiler = CommandCompiler::new(cfg.compiler_command());
    compile_cluster(&mut cfg, &cluster, &compiler)?;

    println!("Catalog for cluster '{}' compiled successfully", cluster.id());
    Ok(())
}
