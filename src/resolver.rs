//! # Dependency Resolver
//!
//! Reads the declared component and package specifications from the merged
//! inventory, validates them strictly, and drives the shared dependency
//! store to produce working trees pinned at the requested versions.
//!
//! Resolution is strict by design: an unknown name, a missing `url`, or a
//! missing `version` fails the whole run with a message naming the exact
//! key. Guessing or defaulting here would make catalog builds
//! non-reproducible.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde_yaml::Value;

use crate::component::{validate_slug, Component, Package};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gitrepo::GitRepo;
use crate::inventory::factory::InventoryParameters;
use crate::inventory::relsymlink;

/// The two kinds of fetchable dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepType {
    Component,
    Package,
}

impl DepType {
    /// The inventory key holding the specs of this type.
    pub fn key(&self) -> &'static str {
        match self {
            DepType::Component => "components",
            DepType::Package => "packages",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DepType::Component => "component",
            DepType::Package => "package",
        }
    }

    fn label_capitalized(&self) -> &'static str {
        match self {
            DepType::Component => "Component",
            DepType::Package => "Package",
        }
    }
}

/// A parsed dependency specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub url: String,
    pub version: String,
    pub path: String,
}

/// Format a name list for error messages: `'a'`, `'a' and 'b'`,
/// `'a', 'b', and 'c'`.
pub fn format_name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.len() {
        0 => String::new(),
        1 => quoted[0].clone(),
        2 => format!("{} and {}", quoted[0], quoted[1]),
        _ => format!(
            "{}, and {}",
            quoted[..quoted.len() - 1].join(", "),
            quoted[quoted.len() - 1]
        ),
    }
}

/// Levenshtein edit distance, used for "did you mean" hints on unknown
/// dependency names.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }
    matrix[a.len()][b.len()]
}

fn find_similar<'a>(input: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .filter_map(|candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Read the specs of `names` from `parameters.components` or
/// `parameters.packages` in the merged inventory.
///
/// With `require_key` an absent top-level key is an error; without it
/// (packages are optional) it yields an empty map. The returned map is
/// guaranteed to contain every requested name.
pub fn read_versions(
    inventory: &InventoryParameters,
    dep_type: DepType,
    names: &[String],
    require_key: bool,
) -> Result<BTreeMap<String, DependencySpec>> {
    let deps_key = dep_type.key();
    let deps = inventory.get(deps_key);
    let deps = match deps.as_mapping() {
        Some(m) if !m.is_empty() => m.clone(),
        _ => {
            if require_key {
                return Err(Error::configuration(format!(
                    "{} list ('parameters.{}') missing",
                    dep_type.label_capitalized(),
                    deps_key
                )));
            }
            Default::default()
        }
    };

    let mut resolved = BTreeMap::new();
    for name in names {
        let info = deps.get(Value::String(name.clone())).ok_or_else(|| {
            let known = deps.keys().filter_map(Value::as_str);
            let hint = find_similar(name, known)
                .map(|s| format!(" Did you mean '{}'?", s))
                .unwrap_or_default();
            Error::configuration(format!(
                "Unknown {} '{}'. Please add it to 'parameters.{}'.{}",
                dep_type.label(),
                name,
                deps_key,
                hint
            ))
        })?;

        let url = info
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "No url for {} '{}' configured",
                    dep_type.label(),
                    name
                ))
            })?;

        let version = info
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "{} '{}' doesn't have a version specified.",
                    dep_type.label_capitalized(),
                    name
                ))
            })?;

        let mut path = info
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if let Some(stripped) = path.strip_prefix('/') {
            path = stripped.to_string();
        }

        debug!(
            "{} {}: url={} version={} path={}",
            dep_type.label(),
            name,
            url,
            version,
            path
        );
        resolved.insert(
            name.clone(),
            DependencySpec {
                url: url.to_string(),
                version: version.to_string(),
                path,
            },
        );
    }

    Ok(resolved)
}

/// Shorthand for reading component specs (the key is required).
pub fn read_components(
    inventory: &InventoryParameters,
    names: &[String],
) -> Result<BTreeMap<String, DependencySpec>> {
    read_versions(inventory, DepType::Component, names, true)
}

/// Shorthand for reading package specs (the key is optional).
pub fn read_packages(
    inventory: &InventoryParameters,
    names: &[String],
) -> Result<BTreeMap<String, DependencySpec>> {
    read_versions(inventory, DepType::Package, names, false)
}

/// Names of all declared packages, in declaration-independent sorted
/// order.
pub fn declared_packages(inventory: &InventoryParameters) -> Vec<String> {
    inventory
        .get(DepType::Package.key())
        .as_mapping()
        .map(|m| {
            m.keys()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the component set and the alias map from the merged
/// `applications` list.
///
/// Entries are `name` or `name as alias`. The returned component list is
/// sorted; the alias map contains one entry per application instance
/// (identity aliases included). Duplicate aliases and components aliasing
/// existing components are configuration errors.
pub fn discover_components(
    applications: &[String],
) -> Result<(Vec<String>, BTreeMap<String, String>)> {
    let mut components = BTreeSet::new();
    let mut all_aliases: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for application in applications {
        let (name, alias) = match application.split_once(" as ") {
            Some((name, alias)) => (name.trim(), alias.trim()),
            None => (application.as_str(), application.as_str()),
        };
        validate_slug("component", name)?;
        validate_slug("instance", alias)?;
        if alias != application {
            debug!("found component {} aliased to {}", name, alias);
        } else {
            debug!("found component {}", name);
        }
        components.insert(name.to_string());
        all_aliases
            .entry(alias.to_string())
            .or_default()
            .insert(name.to_string());
    }

    let mut aliases = BTreeMap::new();
    for (alias, names) in all_aliases {
        if names.len() > 1 {
            if names.contains(&alias) {
                let others: Vec<String> =
                    names.iter().filter(|n| **n != alias).cloned().collect();
                return Err(Error::configuration(format!(
                    "Component{} {} alias{} existing component '{}'",
                    if others.len() > 1 { "s" } else { "" },
                    format_name_list(&others),
                    if others.len() > 1 { "" } else { "es" },
                    alias
                )));
            }
            let list: Vec<String> = names.iter().cloned().collect();
            return Err(Error::configuration(format!(
                "Duplicate component alias '{}': components {} are aliased to '{}'",
                alias,
                format_name_list(&list),
                alias
            )));
        }
        aliases.insert(alias, names.into_iter().next().expect("names is non-empty"));
    }

    Ok((components.into_iter().collect(), aliases))
}

/// Fail when cluster parameters override a component version without any
/// URL configured anywhere in the hierarchy.
pub fn verify_version_overrides(inventory: &InventoryParameters) -> Result<()> {
    let components = inventory.get(DepType::Component.key());
    let Some(components) = components.as_mapping() else {
        return Ok(());
    };

    let mut errors: Vec<String> = Vec::new();
    for (name, spec) in components {
        let has_url = spec
            .get("url")
            .and_then(Value::as_str)
            .map(|u| !u.is_empty())
            .unwrap_or(false);
        if !has_url {
            if let Some(name) = name.as_str() {
                errors.push(name.to_string());
            }
        }
    }

    if !errors.is_empty() {
        let plural = errors.len() > 1;
        return Err(Error::configuration(format!(
            "Version override{} specified for component{} {} which {} no URL",
            if plural { "s" } else { "" },
            if plural { "s" } else { "" },
            format_name_list(&errors),
            if plural { "have" } else { "has" }
        )));
    }
    Ok(())
}

/// Materialize a worktree for one resolved dependency.
///
/// Re-runs adopt an existing linked worktree and re-pin it instead of
/// failing on the occupied directory.
fn checkout_dependency(
    cfg: &Config,
    key: &str,
    target_dir: &std::path::Path,
    version: &str,
) -> Result<()> {
    if target_dir.join(".git").is_file() {
        cfg.registry().adopt_worktree(key, target_dir)?;
        GitRepo::open(target_dir)?.checkout_detached(Some(version))?;
        return Ok(());
    }
    cfg.registry()
        .initialize_worktree(key, target_dir, Some(version))
}

/// Fetch all components in `specs` and register them with the context.
///
/// Each component gets a worktree under `dependencies/<name>` pinned at
/// its version, and its class and defaults files are linked into the
/// inventory.
pub fn fetch_components(
    cfg: &mut Config,
    specs: &BTreeMap<String, DependencySpec>,
) -> Result<()> {
    info!("Fetching components...");
    for (name, spec) in specs {
        debug!("fetching component {}", name);
        let key = cfg.registry().register(&spec.url)?;
        let component = Component::new(name, cfg.work_dir())?
            .with_version(&spec.version)
            .with_sub_path(&spec.path)
            .with_dependency_key(&key);

        checkout_dependency(cfg, &key, &component.target_directory(), &spec.version)?;

        cfg.inventory().create_component_symlinks(&component)?;
        cfg.register_component(component);
    }
    Ok(())
}

/// Fetch all packages in `specs` and register them with the context.
///
/// Each package gets a worktree under `dependencies/pkg.<name>` and its
/// class directory is linked into the inventory as `classes/<name>`, so
/// its classes are addressable as `<package>.<class>`.
pub fn fetch_packages(cfg: &mut Config, specs: &BTreeMap<String, DependencySpec>) -> Result<()> {
    if specs.is_empty() {
        return Ok(());
    }
    info!("Fetching packages...");
    for (name, spec) in specs {
        debug!("fetching package {}", name);
        let key = cfg.registry().register(&spec.url)?;
        let package = Package::new(name, cfg.work_dir())?
            .with_version(&spec.version)
            .with_sub_path(&spec.path)
            .with_dependency_key(&key);

        checkout_dependency(cfg, &key, &package.target_directory(), &spec.version)?;

        relsymlink(
            &package.root_directory(),
            &cfg.inventory().classes_dir(),
            Some(name),
        )?;
        cfg.register_package(package);
    }
    Ok(())
}

/// Register components whose checkouts already exist in the working
/// directory, without fetching (local mode).
///
/// Components without a checkout are skipped with a warning; aliases
/// pointing at skipped components are dropped.
pub fn register_existing_components(
    cfg: &mut Config,
    names: &[String],
    aliases: &BTreeMap<String, String>,
    inventory: &InventoryParameters,
) -> Result<()> {
    info!("Registering existing components...");
    for name in names {
        let component = Component::new(name, cfg.work_dir())?;
        if !component.target_directory().is_dir() {
            warn!(
                "Skipping registration of component {}: repo is not available",
                name
            );
            cfg.inventory().remove_component_symlinks(name)?;
            continue;
        }
        cfg.inventory().create_component_symlinks(&component)?;
        cfg.register_component(component);
    }

    let registered: BTreeSet<&String> = cfg.get_components().keys().collect();
    let pruned: BTreeMap<String, String> = aliases
        .iter()
        .filter(|(_, c)| registered.contains(c))
        .map(|(a, c)| (a.clone(), c.clone()))
        .collect();
    let dropped: Vec<String> = aliases
        .keys()
        .filter(|a| !pruned.contains_key(*a))
        .cloned()
        .collect();
    if !dropped.is_empty() {
        warn!(
            "Dropping alias(es) {} with missing component(s)",
            format_name_list(&dropped)
        );
    }
    cfg.register_component_aliases(&pruned, inventory)
}
