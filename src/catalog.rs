//! # Catalog Repository Updates
//!
//! The compiled manifests end up in the cluster's catalog repository. This
//! module owns that last mile: fetching the catalog checkout, refreshing
//! `manifests/` from the compiler output, and creating the staged,
//! conflict-checked catalog commit.
//!
//! The commit flow stages a small fixed allow-list first, then everything
//! else, so the reported diff covers the full change set. When the catalog
//! repository was empty at clone time, the first content commit amends the
//! placeholder initial commit instead of stacking a second one.

use std::fs;
use std::path::Path;

use log::{debug, info};
use walkdir::WalkDir;

use crate::cluster::Cluster;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gitrepo::GitRepo;

/// Paths staged ahead of the bulk staging pass.
const CATALOG_PREAMBLE_FILES: &[&str] = &[".gitignore", "README.md"];

/// Fetch the cluster catalog repository into `<work_dir>/catalog`.
///
/// An existing checkout is reused and updated to the remote default branch;
/// otherwise the repository is cloned. In local mode a missing checkout is
/// a resource-state error, since local mode must never touch the network.
pub fn fetch_catalog(cfg: &Config, cluster: &Cluster) -> Result<GitRepo> {
    let catalog_dir = cfg.catalog_dir();

    let mut repo = if catalog_dir.join(".git").exists() {
        let repo = GitRepo::open(&catalog_dir)?;
        if !cfg.local() {
            repo.checkout(None)?;
        }
        repo
    } else if cfg.local() {
        return Err(Error::resource_state(format!(
            "Catalog repository checkout missing at '{}'; local mode requires an existing working directory",
            catalog_dir.display()
        )));
    } else {
        info!("Fetching cluster catalog...");
        GitRepo::clone(cluster.catalog_repo_url(), &catalog_dir)?
    };

    repo.set_author(cfg.username(), cfg.usermail());
    Ok(repo)
}

/// Refresh the catalog working tree from the compiler output and commit.
///
/// `targets` names the compiled instances; each must have produced output
/// under `compiled/<target>/`. The previous `manifests/` contents are
/// replaced wholesale, so manifests of removed instances disappear from
/// the catalog with the same commit.
pub fn update_catalog(
    cfg: &Config,
    cluster: &Cluster,
    repo: &GitRepo,
    targets: &[String],
) -> Result<()> {
    info!("Updating catalog repository...");
    let manifests_dir = repo.working_tree_dir().join("manifests");
    rm_tree_contents(&manifests_dir)?;

    for target in targets {
        let output = cfg.inventory().output_dir().join(target);
        if !output.is_dir() {
            return Err(Error::resource_state(format!(
                "Missing compiled output for target '{}' at '{}'",
                target,
                output.display()
            )));
        }
        copy_tree(&output, &manifests_dir.join(target))?;
    }

    repo.stage_files(CATALOG_PREAMBLE_FILES)?;
    let (diff, changed) = repo.stage_all()?;
    if !changed {
        info!("Catalog already up-to-date, skipping commit");
        return Ok(());
    }

    info!("Catalog changes:\n{}", diff);
    repo.commit(&commit_message(cluster.id()), repo.initialized_empty())?;

    if cfg.push() {
        info!("Pushing catalog to remote...");
        repo.push()?;
    } else {
        info!("Skipping catalog push");
    }
    Ok(())
}

fn commit_message(cluster_id: &str) -> String {
    format!(
        "Automated catalog update for cluster '{}'\n\nGenerated by catalog-compiler v{}",
        cluster_id,
        env!("CARGO_PKG_VERSION")
    )
}

/// Delete everything inside `dir` except a `.git` entry, creating the
/// directory when it does not exist yet.
fn rm_tree_contents(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        debug!("removing stale catalog entry {}", path.display());
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Copy a directory tree, following the layout verbatim.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            Error::resource_state(format!("Can't walk '{}': {}", src.display(), e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths below its root");
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClusterResponse, TenantResponse};
    use std::path::PathBuf;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).to_string()
    }

    fn test_cluster(catalog_url: &str) -> Cluster {
        let cluster: ClusterResponse = serde_yaml::from_str(&format!(
            "id: c-test\ntenant: t-test\nfacts:\n  distribution: k3d\n  cloud: local\ngitRepo:\n  url: {}\n",
            catalog_url
        ))
        .unwrap();
        let tenant: TenantResponse = serde_yaml::from_str("id: t-test\n").unwrap();
        Cluster::new(cluster, tenant).unwrap()
    }

    /// Work dir with compiled output for `targets`, plus a bare catalog
    /// upstream.
    fn setup(tmp: &TempDir, targets: &[&str]) -> (Config, PathBuf) {
        let work_dir = tmp.path().join("work");
        fs::create_dir_all(&work_dir).unwrap();
        let mut cfg = Config::new(&work_dir);
        cfg.set_push(true);

        for target in targets {
            let out = cfg.inventory().output_dir().join(target);
            fs::create_dir_all(out.join("apps")).unwrap();
            fs::write(
                out.join("apps").join("deployment.yaml"),
                format!("target: {}\n", target),
            )
            .unwrap();
        }

        let upstream = tmp.path().join("catalog.git");
        git(tmp.path(), &["init", "--bare", &upstream.to_string_lossy()]);
        (cfg, upstream)
    }

    #[test]
    fn test_commit_message_names_cluster() {
        let message = commit_message("c-prod-1");
        assert!(message.starts_with("Automated catalog update for cluster 'c-prod-1'"));
        assert!(message.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_rm_tree_contents_preserves_git_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("catalog");
        fs::create_dir_all(dir.join(".git")).unwrap();
        fs::create_dir_all(dir.join("manifests")).unwrap();
        fs::write(dir.join("stale.yaml"), "x").unwrap();

        rm_tree_contents(&dir).unwrap();
        assert!(dir.join(".git").is_dir());
        assert!(!dir.join("manifests").exists());
        assert!(!dir.join("stale.yaml").exists());
    }

    #[test]
    fn test_update_catalog_amends_fresh_clone_and_pushes() {
        let tmp = TempDir::new().unwrap();
        let (cfg, upstream) = setup(&tmp, &["cluster", "comp-a"]);
        let cluster = test_cluster(&upstream.to_string_lossy());

        let repo = fetch_catalog(&cfg, &cluster).unwrap();
        assert!(repo.initialized_empty());
        update_catalog(&cfg, &cluster, &repo, &["cluster".to_string(), "comp-a".to_string()])
            .unwrap();

        // The pushed catalog holds the manifests as a single commit: the
        // placeholder initial commit was amended, not stacked upon.
        let verify = tmp.path().join("verify");
        git(
            tmp.path(),
            &["clone", &upstream.to_string_lossy(), &verify.to_string_lossy()],
        );
        assert!(verify
            .join("manifests")
            .join("comp-a")
            .join("apps")
            .join("deployment.yaml")
            .is_file());
        let count = git(&verify, &["rev-list", "--count", "HEAD"]);
        assert_eq!(count.trim(), "1");
        let subject = git(&verify, &["log", "-1", "--format=%s"]);
        assert!(subject.contains("c-test"));
    }

    #[test]
    fn test_update_catalog_unchanged_skips_commit() {
        let tmp = TempDir::new().unwrap();
        let (cfg, upstream) = setup(&tmp, &["cluster"]);
        let cluster = test_cluster(&upstream.to_string_lossy());
        let targets = vec!["cluster".to_string()];

        let repo = fetch_catalog(&cfg, &cluster).unwrap();
        update_catalog(&cfg, &cluster, &repo, &targets).unwrap();
        let head = repo.head_short_sha().unwrap();

        update_catalog(&cfg, &cluster, &repo, &targets).unwrap();
        assert_eq!(repo.head_short_sha().unwrap(), head);
    }

    #[test]
    fn test_update_catalog_drops_removed_instances() {
        let tmp = TempDir::new().unwrap();
        let (cfg, upstream) = setup(&tmp, &["cluster", "comp-a"]);
        let cluster = test_cluster(&upstream.to_string_lossy());

        let repo = fetch_catalog(&cfg, &cluster).unwrap();
        update_catalog(
            &cfg,
            &cluster,
            &repo,
            &["cluster".to_string(), "comp-a".to_string()],
        )
        .unwrap();
        assert!(repo.working_tree_dir().join("manifests/comp-a").is_dir());

        update_catalog(&cfg, &cluster, &repo, &["cluster".to_string()]).unwrap();
        assert!(!repo.working_tree_dir().join("manifests/comp-a").exists());
        assert!(repo.working_tree_dir().join("manifests/cluster").is_dir());
    }

    #[test]
    fn test_update_catalog_missing_output_is_error() {
        let tmp = TempDir::new().unwrap();
        let (cfg, upstream) = setup(&tmp, &["cluster"]);
        let cluster = test_cluster(&upstream.to_string_lossy());

        let repo = fetch_catalog(&cfg, &cluster).unwrap();
        let err = update_catalog(&cfg, &cluster, &repo, &["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ResourceState { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_fetch_catalog_local_mode_requires_checkout() {
        let tmp = TempDir::new().unwrap();
        let (mut cfg, upstream) = setup(&tmp, &[]);
        cfg.set_local(true);
        let cluster = test_cluster(&upstream.to_string_lossy());

        let err = fetch_catalog(&cfg, &cluster).unwrap_err();
        assert!(matches!(err, Error::ResourceState { .. }));
    }
}
