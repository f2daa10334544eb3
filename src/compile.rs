//! # Compile Orchestration
//!
//! Drives one full catalog compile: checkout of the configuration
//! repositories, parameter rendering, hierarchy evaluation, package and
//! component synchronization, target rendering, external compilation, and
//! the catalog commit. The phases run strictly in sequence; any failure
//! aborts the run before a catalog commit is created.
//!
//! The external manifest compiler is behind the [`TargetCompiler`] trait so
//! tests can substitute a mock; the default implementation shells out to
//! the configured compiler command.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use log::{debug, info};

use crate::catalog;
use crate::cluster::{self, Cluster};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gitrepo::GitRepo;
use crate::inventory::factory::{InventoryFactory, InventoryFacts};
use crate::inventory::BOOTSTRAP_TARGET;
use crate::resolver;

/// Interface to the external manifest compiler.
///
/// An implementation consumes one rendered target (plus the conventional
/// `inventory/`, `dependencies/`, `vendor/` layout under the working
/// directory) and produces manifests under `compiled/<target>/`.
pub trait TargetCompiler {
    fn compile_target(&self, work_dir: &Path, target: &str) -> Result<()>;
}

/// Default [`TargetCompiler`] shelling out to a compiler command.
///
/// The configured command is split on whitespace and invoked as
/// `<command> compile --targets <target>` in the working directory, which
/// matches the kapitan CLI contract. The subprocess inherits the
/// environment, so compiler-specific configuration travels the usual way.
pub struct CommandCompiler {
    command: String,
}

impl CommandCompiler {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl TargetCompiler for CommandCompiler {
    fn compile_target(&self, work_dir: &Path, target: &str) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::configuration("Compiler command is empty"))?;

        debug!("compiling target {} with '{}'", target, self.command);
        let output = Command::new(program)
            .args(parts)
            .args(["compile", "--targets", target])
            .current_dir(work_dir)
            .output()
            .map_err(|e| Error::Compile {
                target: target.to_string(),
                message: format!("failed to run '{}': {}", self.command, e),
            })?;

        if !output.status.success() {
            return Err(Error::Compile {
                target: target.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Remove the previous compile state from the working directory.
///
/// The catalog checkout and the shared bare-clone store survive, so
/// re-runs reuse the already transferred objects.
pub fn clean_working_tree(cfg: &Config) -> Result<()> {
    info!("Cleaning working tree");
    let inv = cfg.inventory();
    for dir in [
        inv.inventory_dir(),
        inv.dependencies_dir(),
        inv.vendor_dir(),
        inv.output_dir(),
    ] {
        if dir.exists() {
            debug!("removing {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
    }
    Ok(())
}

/// Clone a configuration repository into `dir`, or update an existing
/// checkout, and pin it at `revision` (`None` selects the default branch).
fn checkout_config_repo(url: &str, dir: &Path, revision: Option<&str>) -> Result<GitRepo> {
    let repo = if dir.join(".git").exists() {
        GitRepo::open(dir)?
    } else {
        GitRepo::clone(url, dir)?
    };
    repo.checkout(revision)?;
    Ok(repo)
}

fn cluster_facts(cluster: &Cluster) -> InventoryFacts {
    InventoryFacts {
        distribution: cluster.distribution().map(String::from),
        cloud: cluster.cloud().map(String::from),
        region: cluster.region().map(String::from),
        cluster_id: Some(cluster.id().to_string()),
        tenant_id: Some(cluster.tenant_id().to_string()),
    }
}

/// Delete target files of instances that no longer exist.
fn clean_stale_targets(cfg: &Config, keep: &BTreeSet<String>) -> Result<()> {
    let targets_dir = cfg.inventory().targets_dir();
    if !targets_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(&targets_dir)? {
        let path = entry?.path();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if !keep.contains(&stem) {
            info!("Removing obsolete target {}", stem);
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Compile the full catalog for one cluster.
///
/// Either every target resolves, compiles, and lands in the catalog
/// commit, or the run aborts with an error before the catalog is touched;
/// there is no partial-success mode.
pub fn compile_cluster(
    cfg: &mut Config,
    cluster: &Cluster,
    compiler: &dyn TargetCompiler,
) -> Result<()> {
    let facts = cluster_facts(cluster);

    if cfg.local() {
        if !cfg.inventory().classes_dir().is_dir() {
            return Err(Error::resource_state(format!(
                "Inventory missing at '{}'; local mode requires an existing working directory",
                cfg.inventory().inventory_dir().display()
            )));
        }
        if cfg.inventory().params_file().is_file() {
            let (cluster_id, tenant_id) = cluster::read_cluster_and_tenant(cfg.inventory())?;
            if cluster_id != cluster.id() || tenant_id != cluster.tenant_id() {
                return Err(Error::configuration(format!(
                    "Working directory state was compiled for cluster '{}' of tenant '{}', \
                     refusing to compile cluster '{}' into it",
                    cluster_id,
                    tenant_id,
                    cluster.id()
                )));
            }
        }
        info!("Running in local mode: reusing existing checkouts");
    } else {
        clean_working_tree(cfg)?;
        cfg.inventory().ensure_dirs()?;

        let global_url = cluster.global_git_repo_url().ok_or_else(|| {
            Error::configuration(format!(
                "Tenant '{}' does not define a global defaults repository",
                cluster.tenant_id()
            ))
        })?;
        info!("Updating global defaults...");
        checkout_config_repo(global_url, &cfg.inventory().global_dir(), cfg.global_revision())?;
        info!("Updating tenant configuration...");
        checkout_config_repo(
            cluster.config_repo_url(),
            &cfg.inventory().tenant_dir(cluster.tenant_id()),
            cfg.tenant_revision(),
        )?;
    }

    info!("Rendering cluster parameters...");
    cluster::write_params(cfg.inventory(), cluster)?;

    let factory = InventoryFactory::from_inventory(
        cfg.inventory().clone(),
        Some(cluster.tenant_id().to_string()),
    )?;

    // Package classes are not on disk yet, so the discovery pass must
    // tolerate the holes they will fill.
    let inventory = if cfg.local() {
        factory.reclass(&facts, &[], false)?
    } else {
        let lenient = factory.reclass(&facts, &[], true)?;
        let package_names = resolver::declared_packages(&lenient);
        let package_specs = resolver::read_packages(&lenient, &package_names)?;
        resolver::fetch_packages(cfg, &package_specs)?;
        factory.reclass(&facts, &[], false)?
    };

    resolver::verify_version_overrides(&inventory)?;
    let (components, aliases) = resolver::discover_components(inventory.applications())?;
    info!(
        "Active components: {}",
        resolver::format_name_list(&components)
    );

    if !cfg.local() {
        let specs = resolver::read_components(&inventory, &components)?;
        resolver::fetch_components(cfg, &specs)?;
    }

    // Re-evaluate with the component defaults in place; multi-instance
    // metadata lives there.
    let inventory = factory.reclass(&facts, &components, false)?;
    if cfg.local() {
        resolver::register_existing_components(cfg, &components, &aliases, &inventory)?;
    } else {
        cfg.register_component_aliases(&aliases, &inventory)?;
    }

    info!("Rendering targets...");
    cluster::update_target(cfg.inventory(), BOOTSTRAP_TARGET, &components, None)?;
    for (alias, component) in cfg.get_component_aliases() {
        cluster::update_target(cfg.inventory(), alias, &components, Some(component))?;
    }

    let mut targets = vec![BOOTSTRAP_TARGET.to_string()];
    targets.extend(cfg.get_component_aliases().keys().cloned());
    clean_stale_targets(cfg, &targets.iter().cloned().collect())?;

    fs::create_dir_all(cfg.inventory().vendor_dir())?;
    fs::create_dir_all(cfg.inventory().output_dir())?;

    info!("Compiling catalog...");
    for target in &targets {
        compiler.compile_target(cfg.work_dir(), target)?;
    }

    let catalog_repo = catalog::fetch_catalog(cfg, cluster)?;
    catalog::update_catalog(cfg, cluster, &catalog_repo, &targets)?;

    info!("Cluster catalog for {} compiled successfully", cluster.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_compiler_unknown_program() {
        let tmp = TempDir::new().unwrap();
        let compiler = CommandCompiler::new("definitely-not-a-compiler-binary");
        let err = compiler
            .compile_target(tmp.path(), "cluster")
            .unwrap_err();
        match err {
            Error::Compile { target, .. } => assert_eq!(target, "cluster"),
            other => panic!("expected Compile error, got {:?}", other),
        }
    }

    #[test]
    fn test_command_compiler_empty_command() {
        let tmp = TempDir::new().unwrap();
        let compiler = CommandCompiler::new("  ");
        assert!(matches!(
            compiler.compile_target(tmp.path(), "cluster"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_command_compiler_failing_program() {
        let tmp = TempDir::new().unwrap();
        let compiler = CommandCompiler::new("false");
        assert!(matches!(
            compiler.compile_target(tmp.path(), "cluster"),
            Err(Error::Compile { .. })
        ));
    }

    #[test]
    fn test_clean_working_tree_keeps_catalog_and_store() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path());
        cfg.inventory().ensure_dirs().unwrap();
        fs::create_dir_all(cfg.catalog_dir().join("manifests")).unwrap();
        fs::create_dir_all(tmp.path().join(".repo-store")).unwrap();

        clean_working_tree(&cfg).unwrap();
        assert!(!cfg.inventory().inventory_dir().exists());
        assert!(!cfg.inventory().dependencies_dir().exists());
        assert!(cfg.catalog_dir().join("manifests").is_dir());
        assert!(tmp.path().join(".repo-store").is_dir());
    }

    #[test]
    fn test_clean_stale_targets() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path());
        let targets_dir = cfg.inventory().targets_dir();
        fs::create_dir_all(&targets_dir).unwrap();
        for name in ["cluster", "keep-me", "stale"] {
            fs::write(targets_dir.join(format!("{}.yml", name)), "classes: []\n").unwrap();
        }

        let keep: BTreeSet<String> =
            ["cluster".to_string(), "keep-me".to_string()].into_iter().collect();
        clean_stale_targets(&cfg, &keep).unwrap();
        assert!(targets_dir.join("cluster.yml").is_file());
        assert!(targets_dir.join("keep-me.yml").is_file());
        assert!(!targets_dir.join("stale.yml").exists());
    }

    #[test]
    fn test_local_mode_requires_inventory() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        cfg.set_local(true);

        let cluster_resp: crate::api::ClusterResponse = serde_yaml::from_str(
            "id: c-test\ntenant: t-test\nfacts:\n  distribution: d\n  cloud: c\n",
        )
        .unwrap();
        let tenant_resp: crate::api::TenantResponse = serde_yaml::from_str("id: t-test\n").unwrap();
        let cluster = Cluster::new(cluster_resp, tenant_resp).unwrap();

        struct NoopCompiler;
        impl TargetCompiler for NoopCompiler {
            fn compile_target(&self, _: &Path, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let err = compile_cluster(&mut cfg, &cluster, &NoopCompiler).unwrap_err();
        assert!(matches!(err, Error::ResourceState { .. }));
    }
}
