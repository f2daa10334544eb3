//! # Inventory Factory
//!
//! Materializes the layered class hierarchy for one cluster and exposes the
//! merged parameter view.
//!
//! The global defaults repository drives fact discovery:
//!
//! - `global/distribution/<name>.yml`: one file per supported
//!   distribution,
//! - `global/cloud/<name>.yml`: a single-file cloud,
//! - `global/cloud/<name>/`: a multi-region cloud, where a reserved
//!   `params` file holds cloud-wide parameters and every other file is a
//!   region.
//!
//! For a concrete cluster the factory builds the precedence chain
//! `global.params` → `global.distribution.<dist>` → `global.cloud.<cloud>`
//! (expanding to `.params` and `.<region>` for directory-style clouds) →
//! `<tenant>.<cluster>`, skipping optional layers whose facts are unset or
//! whose files do not exist. `global.params` is always included, so a
//! missing file there surfaces as a hard error from the evaluator.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::Value;

use crate::component::component_parameters_key;
use crate::error::{Error, Result};
use crate::inventory::evaluator::{Evaluated, Evaluator};
use crate::inventory::{Inventory, Target, BOOTSTRAP_TARGET};

/// Placeholder facts used when querying the hierarchy without a concrete
/// cluster; they make `${facts:...}` interpolation in user-authored classes
/// degrade to skipped layers instead of failing.
pub const FAKE_DISTRIBUTION: &str = "x-fake-distribution";
pub const FAKE_CLOUD: &str = "x-fake-cloud";
pub const FAKE_REGION: &str = "x-fake-region";
pub const FAKE_CLUSTER_ID: &str = "c-fake-cluster";
pub const FAKE_TENANT_ID: &str = "t-fake-tenant";

/// The cluster attributes driving hierarchy layer selection.
#[derive(Debug, Clone, Default)]
pub struct InventoryFacts {
    pub distribution: Option<String>,
    pub cloud: Option<String>,
    pub region: Option<String>,
    pub cluster_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl InventoryFacts {
    pub fn cluster_id(&self) -> &str {
        self.cluster_id.as_deref().unwrap_or(FAKE_CLUSTER_ID)
    }

    pub fn tenant_id(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or(FAKE_TENANT_ID)
    }
}

/// The merged parameter view of one evaluated target.
#[derive(Debug)]
pub struct InventoryParameters {
    parameters: Value,
    applications: Vec<String>,
}

impl InventoryParameters {
    pub fn new(evaluated: Evaluated) -> Self {
        Self {
            parameters: evaluated.parameters,
            applications: evaluated.applications,
        }
    }

    /// The full merged parameters mapping.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// A top-level parameter by key, `Null` when absent.
    pub fn get(&self, key: &str) -> Value {
        self.parameters
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// The parameter block of one component, keyed by the underscored
    /// component name. Empty mapping when absent.
    pub fn component_parameters(&self, component: &str) -> Value {
        self.parameters
            .get(component_parameters_key(component))
            .cloned()
            .unwrap_or(Value::Mapping(Default::default()))
    }

    /// The merged `applications` list.
    pub fn applications(&self) -> &[String] {
        &self.applications
    }
}

/// Builds and evaluates the class hierarchy for one working directory.
#[derive(Debug)]
pub struct InventoryFactory {
    inventory: Inventory,
    global_dir: PathBuf,
    tenant_id: Option<String>,
    distributions: Vec<String>,
    clouds: Vec<String>,
    cloud_regions: BTreeMap<String, Vec<String>>,
}

impl InventoryFactory {
    /// Set up the classes directory from checked-out global and tenant
    /// repositories: creates the inventory directories and the
    /// `classes/global` and `classes/<tenant>` symlinks, then discovers
    /// the available distributions, clouds, and regions.
    pub fn from_repo_dirs(
        work_dir: &Path,
        global_dir: &Path,
        tenant: Option<(&str, &Path)>,
    ) -> Result<Self> {
        let inventory = Inventory::new(work_dir);
        inventory.ensure_dirs()?;

        let global_link = inventory.global_dir();
        link_dir(global_dir, &global_link)?;

        let tenant_id = match tenant {
            Some((id, dir)) => {
                link_dir(dir, &inventory.tenant_dir(id))?;
                Some(id.to_string())
            }
            None => None,
        };

        Self::discover(inventory, global_link, tenant_id)
    }

    /// Use an already materialized classes directory.
    pub fn from_inventory(inventory: Inventory, tenant_id: Option<String>) -> Result<Self> {
        let global_dir = inventory.global_dir();
        Self::discover(inventory, global_dir, tenant_id)
    }

    fn discover(
        inventory: Inventory,
        global_dir: PathBuf,
        tenant_id: Option<String>,
    ) -> Result<Self> {
        let distributions = class_file_stems(&global_dir.join("distribution"))?;
        let cloud_dir = global_dir.join("cloud");
        let mut clouds = class_file_stems(&cloud_dir)?;
        let mut cloud_regions = BTreeMap::new();
        if cloud_dir.is_dir() {
            for entry in fs::read_dir(&cloud_dir)? {
                let entry = entry?;
                if entry.path().is_dir() {
                    let cloud = entry.file_name().to_string_lossy().to_string();
                    let regions: Vec<String> = class_file_stems(&entry.path())?
                        .into_iter()
                        .filter(|r| r != "params")
                        .collect();
                    cloud_regions.insert(cloud.clone(), regions);
                    if !clouds.contains(&cloud) {
                        clouds.push(cloud);
                    }
                }
            }
        }
        clouds.sort();

        Ok(Self {
            inventory,
            global_dir,
            tenant_id,
            distributions,
            clouds,
            cloud_regions,
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.inventory.classes_dir()
    }

    pub fn targets_dir(&self) -> PathBuf {
        self.inventory.targets_dir()
    }

    /// Distributions known to the global defaults repository.
    pub fn distributions(&self) -> &[String] {
        &self.distributions
    }

    /// Clouds known to the global defaults repository.
    pub fn clouds(&self) -> &[String] {
        &self.clouds
    }

    /// Regions per directory-style cloud.
    pub fn cloud_regions(&self) -> &BTreeMap<String, Vec<String>> {
        &self.cloud_regions
    }

    /// Validate facts against the discovered hierarchy values.
    ///
    /// Used by the inventory query commands, where an unknown fact almost
    /// certainly means a typo rather than an intentionally absent layer.
    pub fn validate_facts(&self, facts: &InventoryFacts) -> Result<()> {
        if let Some(d) = &facts.distribution {
            if !self.distributions.contains(d) {
                return Err(Error::configuration(format!(
                    "Unknown distribution '{}' in global defaults",
                    d
                )));
            }
        }
        if let Some(c) = &facts.cloud {
            if !self.clouds.contains(c) {
                return Err(Error::configuration(format!(
                    "Unknown cloud '{}' in global defaults",
                    c
                )));
            }
        }
        if let Some(r) = &facts.region {
            let cloud = facts.cloud.as_ref().ok_or_else(|| {
                Error::configuration(format!(
                    "Unable to resolve region '{}': no cloud fact set",
                    r
                ))
            })?;
            let known = self
                .cloud_regions
                .get(cloud)
                .map(|regions| regions.contains(r))
                .unwrap_or(false);
            if !known {
                return Err(Error::configuration(format!(
                    "Unknown cloud region '{}' for cloud '{}'",
                    r, cloud
                )));
            }
        }
        Ok(())
    }

    /// The fact-driven hierarchy layers for one cluster, lowest precedence
    /// first. Optional layers whose facts are unset or whose files do not
    /// exist are skipped; `global.params` is always included.
    pub fn hierarchy_classes(&self, facts: &InventoryFacts) -> Vec<String> {
        let mut classes = vec!["global.params".to_string()];

        if let Some(d) = &facts.distribution {
            if class_exists(&self.global_dir.join("distribution"), d) {
                classes.push(format!("global.distribution.{}", d));
            } else {
                debug!("no distribution layer for '{}'", d);
            }
        }

        if let Some(c) = &facts.cloud {
            let cloud_subdir = self.global_dir.join("cloud").join(c);
            if cloud_subdir.is_dir() {
                if class_exists(&cloud_subdir, "params") {
                    classes.push(format!("global.cloud.{}.params", c));
                }
                if let Some(r) = &facts.region {
                    if class_exists(&cloud_subdir, r) {
                        classes.push(format!("global.cloud.{}.{}", c, r));
                    } else {
                        debug!("no region layer '{}' for cloud '{}'", r, c);
                    }
                }
            } else if class_exists(&self.global_dir.join("cloud"), c) {
                classes.push(format!("global.cloud.{}", c));
            } else {
                debug!("no cloud layer for '{}'", c);
            }
        }

        if let Some(tenant) = &self.tenant_id {
            classes.push(format!("{}.{}", tenant, facts.cluster_id()));
        }

        classes
    }

    /// Build the bootstrap target for resolution: the rendered cluster
    /// parameters class first, then the defaults of the active components,
    /// the organization-wide entry class when present, and finally the
    /// fact-driven hierarchy with the tenant layer last.
    pub fn bootstrap_target(&self, facts: &InventoryFacts, components: &[String]) -> Target {
        let mut classes = vec!["params.cluster".to_string()];
        for component in components {
            if self.inventory.defaults_file(component).is_file() {
                classes.push(format!("defaults.{}", component));
            }
        }
        if class_exists(&self.global_dir, "commodore") {
            classes.push("global.commodore".to_string());
        }
        classes.extend(self.hierarchy_classes(facts));

        let mut parameters = serde_yaml::Mapping::new();
        parameters.insert(
            Value::String("_instance".to_string()),
            Value::String(BOOTSTRAP_TARGET.to_string()),
        );

        Target {
            classes,
            parameters: Value::Mapping(parameters),
        }
    }

    /// Write the bootstrap target and evaluate it.
    ///
    /// The rendered cluster parameters class (`params.cluster`) must have
    /// been written beforehand; a missing params class is a hard error
    /// even in lenient mode, since every hierarchy lookup depends on the
    /// facts it carries.
    pub fn reclass(
        &self,
        facts: &InventoryFacts,
        components: &[String],
        allow_missing_classes: bool,
    ) -> Result<InventoryParameters> {
        if !self.inventory.params_file().is_file() {
            return Err(Error::resource_state(format!(
                "Cluster parameters class '{}' missing; render parameters first",
                self.inventory.params_file().display()
            )));
        }

        let target = self.bootstrap_target(facts, components);
        self.inventory.write_target(BOOTSTRAP_TARGET, &target)?;

        let evaluator = Evaluator::new(self.classes_dir(), allow_missing_classes);
        let evaluated = evaluator.evaluate(&target)?;
        Ok(InventoryParameters::new(evaluated))
    }

    /// Write a placeholder cluster parameters class for hierarchy queries
    /// without a concrete cluster, then evaluate.
    ///
    /// Missing facts are substituted with `x-fake-*` values in the facts
    /// mapping (but select no hierarchy layer), so user-authored classes
    /// that interpolate facts into class names degrade gracefully.
    pub fn query(&self, facts: &InventoryFacts) -> Result<InventoryParameters> {
        let mut f = serde_yaml::Mapping::new();
        f.insert(
            "distribution".into(),
            facts
                .distribution
                .clone()
                .unwrap_or_else(|| FAKE_DISTRIBUTION.to_string())
                .into(),
        );
        f.insert(
            "cloud".into(),
            facts
                .cloud
                .clone()
                .unwrap_or_else(|| FAKE_CLOUD.to_string())
                .into(),
        );
        f.insert(
            "region".into(),
            facts
                .region
                .clone()
                .unwrap_or_else(|| FAKE_REGION.to_string())
                .into(),
        );

        let mut cluster = serde_yaml::Mapping::new();
        cluster.insert("name".into(), facts.cluster_id().into());
        cluster.insert("tenant".into(), facts.tenant_id().into());

        let mut params = serde_yaml::Mapping::new();
        params.insert("cluster".into(), Value::Mapping(cluster));
        params.insert("facts".into(), Value::Mapping(f));

        let mut doc = serde_yaml::Mapping::new();
        doc.insert("parameters".into(), Value::Mapping(params));

        fs::create_dir_all(self.inventory.params_dir())?;
        let file = fs::File::create(self.inventory.params_file())?;
        serde_yaml::to_writer(file, &Value::Mapping(doc))?;

        self.reclass(facts, &[], true)
    }
}

/// Symlink `target` (made absolute) at `link`, replacing a stale link.
fn link_dir(target: &Path, link: &Path) -> Result<()> {
    if !target.is_dir() {
        return Err(Error::resource_state(format!(
            "Configuration directory '{}' does not exist",
            target.display()
        )));
    }
    let absolute = target.canonicalize()?;
    if link.symlink_metadata().is_ok() {
        if link.is_dir() && link.read_link().is_err() {
            return Err(Error::resource_state(format!(
                "'{}' exists and is not a symlink",
                link.display()
            )));
        }
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(absolute, link)?;
    #[cfg(not(unix))]
    return Err(Error::resource_state(
        "symlink-based inventories are only supported on unix".to_string(),
    ));
    Ok(())
}

/// Stems of all `.yml`/`.yaml` files directly under `dir`.
fn class_file_stems(dir: &Path) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    if !dir.is_dir() {
        return Ok(stems);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext == "yml" || ext == "yaml" {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

fn class_exists(dir: &Path, name: &str) -> bool {
    dir.join(format!("{}.yml", name)).is_file() || dir.join(format!("{}.yaml", name)).is_file()
}
