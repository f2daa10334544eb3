//! # Catalog API Descriptors
//!
//! Serde models for the cluster and tenant descriptors served by the
//! remote catalog API. The HTTP transport itself is out of scope; callers
//! obtain descriptors from the API (or from files, for local compiles) and
//! everything downstream consumes the deserialized structs.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Git repository coordinates of a cluster catalog or tenant
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitRepoSpec {
    #[serde(default)]
    pub url: String,
}

/// A cluster descriptor as served by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResponse {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub tenant: String,
    #[serde(default)]
    pub facts: serde_yaml::Mapping,
    #[serde(default)]
    pub dynamic_facts: serde_json::Value,
    #[serde(default)]
    pub git_repo: GitRepoSpec,
}

/// A tenant descriptor as served by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub git_repo: GitRepoSpec,
    #[serde(default, rename = "globalGitRepoURL")]
    pub global_git_repo_url: Option<String>,
}

/// Load a cluster descriptor from a YAML file.
pub fn load_cluster(path: &Path) -> Result<ClusterResponse> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::resource_state(format!(
            "Can't read cluster descriptor '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Load a tenant descriptor from a YAML file.
pub fn load_tenant(path: &Path) -> Result<TenantResponse> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::resource_state(format!(
            "Can't read tenant descriptor '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cluster_descriptor_roundtrip() {
        let yaml = "\
id: c-bar
displayName: Foo Inc. Bar cluster
tenant: t-foo
facts:
  distribution: rancher
  cloud: cloudscale
dynamicFacts:
  kubernetes_version:
    major: '1'
    minor: '21'
gitRepo:
  url: ssh://git@git.example.com/cluster-catalogs/mycluster
";
        let cluster: ClusterResponse = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cluster.id, "c-bar");
        assert_eq!(cluster.tenant, "t-foo");
        assert_eq!(cluster.display_name, "Foo Inc. Bar cluster");
        assert_eq!(
            cluster.facts.get("distribution").unwrap().as_str(),
            Some("rancher")
        );
        assert_eq!(
            cluster.git_repo.url,
            "ssh://git@git.example.com/cluster-catalogs/mycluster"
        );
        assert_eq!(cluster.dynamic_facts["kubernetes_version"]["minor"], "21");
    }

    #[test]
    fn test_tenant_descriptor_with_global_repo() {
        let yaml = "\
id: t-foo
displayName: Foo Inc.
gitRepo:
  url: https://git.example.com/tenants/t-foo.git
globalGitRepoURL: https://git.example.com/global-defaults.git
";
        let tenant: TenantResponse = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tenant.id, "t-foo");
        assert_eq!(
            tenant.global_git_repo_url.as_deref(),
            Some("https://git.example.com/global-defaults.git")
        );
    }

    #[test]
    fn test_load_cluster_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = load_cluster(&tmp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, Error::ResourceState { .. }));
    }
}
