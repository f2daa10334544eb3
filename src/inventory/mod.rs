//! # Inventory Layout
//!
//! The on-disk shape of a compile working directory:
//!
//! ```text
//! <work_dir>/
//!   inventory/
//!     classes/
//!       global/         -> symlink to the global defaults checkout
//!       <tenant>/       -> symlink to the tenant configuration checkout
//!       components/     -> per-component class symlinks
//!       defaults/       -> per-component defaults symlinks
//!       params/         -> rendered cluster parameters
//!     targets/          -> one YAML target per compiled instance
//!   dependencies/       -> component and package worktrees
//!   vendor/             -> reserved for the external compiler
//!   compiled/           -> compiler output, one directory per target
//!   catalog/            -> the cluster catalog repository
//! ```
//!
//! This module owns the path arithmetic and the symlink helper; the
//! evaluation logic lives in [`evaluator`], the hierarchy construction in
//! [`factory`].

pub mod evaluator;
pub mod factory;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::{Error, Result};

/// Name of the bootstrap (cluster-level) target.
pub const BOOTSTRAP_TARGET: &str = "cluster";

/// One compilation target: an ordered class list plus parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub classes: Vec<String>,
    #[serde(default = "empty_mapping")]
    pub parameters: serde_yaml::Value,
}

fn empty_mapping() -> serde_yaml::Value {
    serde_yaml::Value::Mapping(Default::default())
}

/// Path accessors for one working directory.
#[derive(Debug, Clone)]
pub struct Inventory {
    work_dir: PathBuf,
}

impl Inventory {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn inventory_dir(&self) -> PathBuf {
        self.work_dir.join("inventory")
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.inventory_dir().join("classes")
    }

    pub fn targets_dir(&self) -> PathBuf {
        self.inventory_dir().join("targets")
    }

    pub fn global_dir(&self) -> PathBuf {
        self.classes_dir().join("global")
    }

    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.classes_dir().join(tenant)
    }

    pub fn components_dir(&self) -> PathBuf {
        self.classes_dir().join("components")
    }

    pub fn defaults_dir(&self) -> PathBuf {
        self.classes_dir().join("defaults")
    }

    pub fn params_dir(&self) -> PathBuf {
        self.classes_dir().join("params")
    }

    /// The rendered cluster parameters class, `params.cluster`.
    pub fn params_file(&self) -> PathBuf {
        self.params_dir().join("cluster.yml")
    }

    pub fn target_file(&self, name: &str) -> PathBuf {
        self.targets_dir().join(format!("{}.yml", name))
    }

    pub fn bootstrap_target_file(&self) -> PathBuf {
        self.target_file(BOOTSTRAP_TARGET)
    }

    /// Inventory-side class file of a component.
    pub fn component_file(&self, component: &str) -> PathBuf {
        self.components_dir().join(format!("{}.yml", component))
    }

    /// Inventory-side defaults file of a component.
    pub fn defaults_file(&self, component: &str) -> PathBuf {
        self.defaults_dir().join(format!("{}.yml", component))
    }

    pub fn dependencies_dir(&self) -> PathBuf {
        self.work_dir.join("dependencies")
    }

    pub fn vendor_dir(&self) -> PathBuf {
        self.work_dir.join("vendor")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join("compiled")
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.work_dir.join("catalog")
    }

    /// Create all inventory directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.classes_dir(),
            self.targets_dir(),
            self.components_dir(),
            self.defaults_dir(),
            self.params_dir(),
            self.dependencies_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Create the symlinks exposing a component's classes to the
    /// inventory.
    pub fn create_component_symlinks(&self, component: &Component) -> Result<()> {
        relsymlink(
            &component.class_file(),
            &self.components_dir(),
            Some(&format!("{}.yml", component.name())),
        )?;
        relsymlink(
            &component.defaults_file(),
            &self.defaults_dir(),
            Some(&format!("{}.yml", component.name())),
        )
    }

    /// Remove a component's inventory symlinks again.
    pub fn remove_component_symlinks(&self, component: &str) -> Result<()> {
        for path in [self.component_file(component), self.defaults_file(component)] {
            if path.symlink_metadata().is_ok() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Write a target file, creating the targets directory if needed.
    pub fn write_target(&self, name: &str, target: &Target) -> Result<()> {
        fs::create_dir_all(self.targets_dir())?;
        let file = fs::File::create(self.target_file(name))?;
        serde_yaml::to_writer(file, target)?;
        Ok(())
    }

    /// Read a target file back.
    pub fn read_target(&self, name: &str) -> Result<Target> {
        let file = fs::File::open(self.target_file(name))?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

/// Create a relative symlink to `src` in `dest_dir`.
///
/// An existing entry at the destination is replaced, so re-running a
/// compile refreshes stale links instead of failing.
pub fn relsymlink(src: &Path, dest_dir: &Path, dest_name: Option<&str>) -> Result<()> {
    let name = match dest_name {
        Some(n) => n.to_string(),
        None => src
            .file_name()
            .ok_or_else(|| Error::resource_state(format!("Can't link '{}': no file name", src.display())))?
            .to_string_lossy()
            .to_string(),
    };
    if !src.exists() {
        return Err(Error::resource_state(format!(
            "Can't link '{}' to '{}': source does not exist",
            src.display(),
            dest_dir.join(&name).display()
        )));
    }
    fs::create_dir_all(dest_dir)?;

    let link_target = relative_path(src, dest_dir);
    let link = dest_dir.join(&name);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(link_target, link)?;
    #[cfg(not(unix))]
    {
        // Windows symlinks need privileges; fall back to a copy.
        fs::copy(src, link)?;
    }
    Ok(())
}

/// Compute `src` relative to `base`, walking up with `..` as needed.
fn relative_path(src: &Path, base: &Path) -> PathBuf {
    let src: Vec<_> = src.components().collect();
    let base: Vec<_> = base.components().collect();
    let common = src
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for comp in &src[common..] {
        rel.push(comp);
    }
    rel
}
