//! # Cluster and Target Rendering
//!
//! Renders the cluster-level parameters class and the per-instance
//! compilation targets consumed by the external manifest compiler.
//!
//! Target class ordering is load-bearing: every target starts with
//! `params.cluster`, then one `defaults.<component>` entry per active
//! component in declaration order, then `global.commodore`, and for
//! non-bootstrap targets `components.<component>` last. Aliased targets
//! additionally re-point the component's parameter key at the alias's own
//! parameter subtree via a `${...}` back-reference.

use std::fs;

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::api::{ClusterResponse, TenantResponse};
use crate::component::component_parameters_key;
use crate::error::{Error, Result};
use crate::inventory::{Inventory, Target, BOOTSTRAP_TARGET};

/// Cluster facts that must be present and non-empty; they drive hierarchy
/// layer selection, so an empty value would silently select the wrong or
/// no layer.
const REQUIRED_FACTS: [&str; 2] = ["distribution", "cloud"];

/// One cluster with its tenant, as fetched from the catalog API.
#[derive(Debug, Clone)]
pub struct Cluster {
    cluster: ClusterResponse,
    tenant: TenantResponse,
}

impl Cluster {
    /// Pair a cluster descriptor with its tenant descriptor.
    ///
    /// The tenant must be the one the cluster references.
    pub fn new(cluster: ClusterResponse, tenant: TenantResponse) -> Result<Self> {
        if cluster.tenant != tenant.id {
            return Err(Error::configuration(format!(
                "Tenant '{}' does not match cluster tenant '{}'",
                tenant.id, cluster.tenant
            )));
        }
        Ok(Self { cluster, tenant })
    }

    pub fn id(&self) -> &str {
        &self.cluster.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    pub fn display_name(&self) -> &str {
        &self.cluster.display_name
    }

    pub fn tenant_display_name(&self) -> &str {
        &self.tenant.display_name
    }

    /// URL of the cluster catalog repository.
    pub fn catalog_repo_url(&self) -> &str {
        &self.cluster.git_repo.url
    }

    /// URL of the tenant configuration repository.
    pub fn config_repo_url(&self) -> &str {
        &self.tenant.git_repo.url
    }

    /// URL of the global defaults repository, when the tenant carries one.
    pub fn global_git_repo_url(&self) -> Option<&str> {
        self.tenant.global_git_repo_url.as_deref()
    }

    pub fn facts(&self) -> &serde_yaml::Mapping {
        &self.cluster.facts
    }

    fn fact(&self, name: &str) -> Option<&str> {
        self.cluster
            .facts
            .get(Value::String(name.to_string()))
            .and_then(Value::as_str)
    }

    pub fn distribution(&self) -> Option<&str> {
        self.fact("distribution")
    }

    pub fn cloud(&self) -> Option<&str> {
        self.fact("cloud")
    }

    pub fn region(&self) -> Option<&str> {
        self.fact("region")
    }

    pub fn dynamic_facts(&self) -> &serde_json::Value {
        &self.cluster.dynamic_facts
    }
}

fn str_value(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Render the cluster-level parameters block.
///
/// Fails with a configuration error when a required fact is missing or any
/// fact value is the empty string.
pub fn render_params(cluster: &Cluster) -> Result<Value> {
    for fact in REQUIRED_FACTS {
        if cluster.fact(fact).is_none() {
            return Err(Error::configuration(format!(
                "Required fact '{}' not set on cluster '{}'",
                fact,
                cluster.id()
            )));
        }
    }
    for (key, value) in cluster.facts() {
        if value.as_str() == Some("") {
            return Err(Error::configuration(format!(
                "Fact {:?} of cluster '{}' is empty",
                key.as_str().unwrap_or("?"),
                cluster.id()
            )));
        }
    }

    let mut cluster_params = Mapping::new();
    cluster_params.insert(str_value("name"), str_value(cluster.id()));
    cluster_params.insert(str_value("display_name"), str_value(cluster.display_name()));
    cluster_params.insert(str_value("catalog_url"), str_value(cluster.catalog_repo_url()));
    cluster_params.insert(str_value("tenant"), str_value(cluster.tenant_id()));
    cluster_params.insert(
        str_value("tenant_display_name"),
        str_value(cluster.tenant_display_name()),
    );
    cluster_params.insert(
        str_value("dist"),
        str_value(cluster.distribution().unwrap_or_default()),
    );

    let mut customer = Mapping::new();
    customer.insert(str_value("name"), str_value(cluster.tenant_id()));

    let mut cloud = Mapping::new();
    cloud.insert(
        str_value("provider"),
        str_value(cluster.cloud().unwrap_or_default()),
    );

    // dynamic facts come in as JSON and go out as YAML, verbatim
    let dynamic_facts: Value = serde_yaml::to_value(cluster.dynamic_facts())?;

    let mut params = Mapping::new();
    params.insert(str_value("cluster"), Value::Mapping(cluster_params));
    params.insert(str_value("customer"), Value::Mapping(customer));
    params.insert(str_value("cloud"), Value::Mapping(cloud));
    params.insert(str_value("facts"), Value::Mapping(cluster.facts().clone()));
    params.insert(str_value("dynamic_facts"), dynamic_facts);

    let mut doc = Mapping::new();
    doc.insert(str_value("parameters"), Value::Mapping(params));
    Ok(Value::Mapping(doc))
}

/// Render and write the `params.cluster` class.
pub fn write_params(inventory: &Inventory, cluster: &Cluster) -> Result<()> {
    let params = render_params(cluster)?;
    fs::create_dir_all(inventory.params_dir())?;
    let file = fs::File::create(inventory.params_file())?;
    serde_yaml::to_writer(file, &params)?;
    Ok(())
}

/// Read back `parameters.cluster.{name, tenant}` from the written params
/// class.
pub fn read_cluster_and_tenant(inventory: &Inventory) -> Result<(String, String)> {
    let content = fs::read_to_string(inventory.params_file())?;
    let doc: Value = serde_yaml::from_str(&content)?;
    let cluster = &doc["parameters"]["cluster"];
    let get = |key: &str| -> Result<String> {
        cluster[key]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "Required key 'parameters.cluster.{}' missing in cluster parameters",
                    key
                ))
            })
    };
    Ok((get("name")?, get("tenant")?))
}

/// Render one compilation target.
///
/// `active_components` is the ordered component list; only components with
/// an inventory-side defaults class contribute a `defaults.<c>` entry.
/// `component` names the underlying component when `target_name` is an
/// alias; the rendered parameters then include the back-reference that
/// re-points the component's parameter block at the alias's subtree.
pub fn render_target(
    inventory: &Inventory,
    target_name: &str,
    active_components: &[String],
    component: Option<&str>,
) -> Target {
    let bootstrap = target_name == BOOTSTRAP_TARGET;
    let component = component.unwrap_or(target_name);

    let mut classes = vec!["params.cluster".to_string()];
    for c in active_components {
        if inventory.defaults_file(c).is_file() {
            classes.push(format!("defaults.{}", c));
        } else {
            debug!("skipping defaults for '{}': no defaults class", c);
        }
    }
    classes.push("global.commodore".to_string());
    if !bootstrap {
        classes.push(format!("components.{}", component));
    }

    let mut parameters = Mapping::new();
    if !bootstrap {
        let mut vars = Mapping::new();
        vars.insert(str_value("target"), str_value(target_name));
        let mut kapitan = Mapping::new();
        kapitan.insert(str_value("vars"), Value::Mapping(vars));
        parameters.insert(str_value("kapitan"), Value::Mapping(kapitan));
    }
    if component != target_name {
        // Alias: re-point the component's parameter block at the alias's
        // own parameter subtree, resolved late by the class evaluator.
        parameters.insert(
            str_value(&component_parameters_key(component)),
            str_value(&format!("${{{}}}", component_parameters_key(target_name))),
        );
    }
    parameters.insert(str_value("_instance"), str_value(target_name));

    Target {
        classes,
        parameters: Value::Mapping(parameters),
    }
}

/// Render and write the target for one instance.
pub fn update_target(
    inventory: &Inventory,
    target_name: &str,
    active_components: &[String],
    component: Option<&str>,
) -> Result<()> {
    let target = render_target(inventory, target_name, active_components, component);
    inventory.write_target(target_name, &target)
}
