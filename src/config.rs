//! # Compile Context
//!
//! [`Config`] is the explicit context object for one compile run. It owns
//! the working-directory layout, the shared dependency registry, and the
//! component/package/alias registries; every resolution call receives it
//! instead of consulting process-wide state, so two runs never share
//! mutable registries.

use std::collections::BTreeMap;

use log::debug;
use std::path::{Path, PathBuf};

use crate::component::{component_parameters_key, Component, Package};
use crate::dependency::DependencyRegistry;
use crate::error::{Error, Result};
use crate::inventory::factory::InventoryParameters;
use crate::inventory::Inventory;

/// Context for one compile run.
#[derive(Debug)]
pub struct Config {
    work_dir: PathBuf,
    inventory: Inventory,
    registry: DependencyRegistry,
    components: BTreeMap<String, Component>,
    packages: BTreeMap<String, Package>,
    aliases: BTreeMap<String, String>,
    username: String,
    usermail: String,
    local: bool,
    push: bool,
    global_revision: Option<String>,
    tenant_revision: Option<String>,
    compiler_command: String,
}

impl Config {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            inventory: Inventory::new(&work_dir),
            registry: DependencyRegistry::new(&work_dir),
            work_dir,
            components: BTreeMap::new(),
            packages: BTreeMap::new(),
            aliases: BTreeMap::new(),
            username: "Catalog Compiler".to_string(),
            usermail: "catalog-compiler@localhost".to_string(),
            local: false,
            push: false,
            global_revision: None,
            tenant_revision: None,
            compiler_command: "kapitan".to_string(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.inventory.catalog_dir()
    }

    pub fn set_author(&mut self, name: &str, email: &str) {
        self.username = name.to_string();
        self.usermail = email.to_string();
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn usermail(&self) -> &str {
        &self.usermail
    }

    /// Local mode: reuse existing checkouts, never fetch.
    pub fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    pub fn local(&self) -> bool {
        self.local
    }

    /// Whether the catalog commit is pushed to its remote.
    pub fn set_push(&mut self, push: bool) {
        self.push = push;
    }

    pub fn push(&self) -> bool {
        self.push
    }

    /// Pin the global defaults repository to a specific revision instead of
    /// its default branch.
    pub fn set_global_revision(&mut self, revision: Option<String>) {
        self.global_revision = revision;
    }

    pub fn global_revision(&self) -> Option<&str> {
        self.global_revision.as_deref()
    }

    /// Pin the tenant configuration repository to a specific revision.
    pub fn set_tenant_revision(&mut self, revision: Option<String>) {
        self.tenant_revision = revision;
    }

    pub fn tenant_revision(&self) -> Option<&str> {
        self.tenant_revision.as_deref()
    }

    /// The external manifest compiler invocation.
    pub fn set_compiler_command(&mut self, command: &str) {
        self.compiler_command = command.to_string();
    }

    pub fn compiler_command(&self) -> &str {
        &self.compiler_command
    }

    pub fn register_component(&mut self, component: Component) {
        debug!("registering component {}", component.name());
        self.components.insert(component.name().to_string(), component);
    }

    pub fn get_components(&self) -> &BTreeMap<String, Component> {
        &self.components
    }

    pub fn get_component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    pub fn register_package(&mut self, package: Package) {
        debug!("registering package {}", package.name());
        self.packages.insert(package.name().to_string(), package);
    }

    pub fn get_packages(&self) -> &BTreeMap<String, Package> {
        &self.packages
    }

    /// Register the alias map discovered from the `applications` list.
    ///
    /// Every alias must map to a registered component, and aliased
    /// components (alias != component name) must advertise multi-instance
    /// support via `parameters.<component_key>._metadata.multi_instance`
    /// in the merged inventory.
    pub fn register_component_aliases(
        &mut self,
        aliases: &BTreeMap<String, String>,
        inventory: &InventoryParameters,
    ) -> Result<()> {
        for (alias, component) in aliases {
            if !self.components.contains_key(component) {
                return Err(Error::configuration(format!(
                    "Alias '{}' refers to unknown component '{}'",
                    alias, component
                )));
            }
            if alias != component {
                let params = inventory.component_parameters(component);
                let multi_instance = params
                    .get("_metadata")
                    .and_then(|m| m.get("multi_instance"))
                    .and_then(serde_yaml::Value::as_bool)
                    .unwrap_or(false);
                if !multi_instance {
                    return Err(Error::configuration(format!(
                        "Component '{}' does not support instantiation (alias '{}'): \
                         set 'parameters.{}._metadata.multi_instance' to allow it",
                        component,
                        alias,
                        component_parameters_key(component)
                    )));
                }
            }
        }
        self.aliases = aliases.clone();
        Ok(())
    }

    /// The validated alias -> component map.
    pub fn get_component_aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::evaluator::Evaluated;
    use tempfile::TempDir;

    fn inventory_with_params(yaml: &str) -> InventoryParameters {
        InventoryParameters::new(Evaluated {
            parameters: serde_yaml::from_str(yaml).unwrap(),
            applications: Vec::new(),
        })
    }

    fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_register_component() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        let component = Component::new("test-component", cfg.work_dir()).unwrap();
        cfg.register_component(component);

        assert!(cfg.get_component("test-component").is_some());
        assert_eq!(cfg.get_components().len(), 1);
    }

    #[test]
    fn test_identity_alias_needs_no_metadata() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        cfg.register_component(Component::new("foo", cfg.work_dir()).unwrap());

        let inv = inventory_with_params("foo: {}");
        cfg.register_component_aliases(&aliases(&[("foo", "foo")]), &inv)
            .unwrap();
        assert_eq!(cfg.get_component_aliases()["foo"], "foo");
    }

    #[test]
    fn test_alias_requires_multi_instance_metadata() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        cfg.register_component(Component::new("foo", cfg.work_dir()).unwrap());

        let inv = inventory_with_params("foo: {}");
        let err = cfg
            .register_component_aliases(&aliases(&[("foo-1", "foo")]), &inv)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("multi_instance"));

        let inv = inventory_with_params("foo:\n  _metadata:\n    multi_instance: true");
        cfg.register_component_aliases(&aliases(&[("foo-1", "foo")]), &inv)
            .unwrap();
        assert_eq!(cfg.get_component_aliases()["foo-1"], "foo");
    }

    #[test]
    fn test_alias_for_unknown_component_fails() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        let inv = inventory_with_params("{}");
        let err = cfg
            .register_component_aliases(&aliases(&[("x", "ghost")]), &inv)
            .unwrap_err();
        assert!(err.to_string().contains("unknown component 'ghost'"));
    }

    #[test]
    fn test_multi_instance_metadata_respects_dashed_names() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        cfg.register_component(Component::new("foo-comp", cfg.work_dir()).unwrap());

        let inv = inventory_with_params("foo_comp:\n  _metadata:\n    multi_instance: true");
        cfg.register_component_aliases(&aliases(&[("foo-1", "foo-comp")]), &inv)
            .unwrap();
    }
}
