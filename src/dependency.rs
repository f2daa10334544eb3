//! # Shared Dependency Store
//!
//! Many components and packages can point at the same upstream repository,
//! often under different URL spellings (https for anonymous fetches, ssh for
//! authenticated ones). This module deduplicates those references: each
//! normalized repository identity maps to exactly one bare clone, and every
//! consumer gets its own worktree attached to that clone. Cloning once and
//! sharing the object store avoids redundant network transfer and disk
//! usage while keeping each working directory independent (distinct index,
//! distinct checked-out ref).
//!
//! Lifecycle per entry:
//!
//! ```text
//! UNREGISTERED -> registered (no clone) -> bare clone -> N worktrees
//!              -> ... -> 0 worktrees -> bare clone deleted
//! ```
//!
//! The bare clone is created lazily on the first worktree request and
//! deleted only when the last worktree disappears, so storage shared by
//! sibling checkouts is never destroyed underneath them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};
use crate::gitrepo::{self, GitRepo};

/// A normalized repository URL.
///
/// The key identifies the repository independent of transport scheme,
/// userinfo, host case, and a trailing `.git`; `is_ssh` records whether the
/// spelling was an ssh (or scp-style) URL, which takes precedence over
/// https spellings when both are registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    pub key: String,
    pub canonical: String,
    pub is_ssh: bool,
}

/// Normalize a repository URL to a transport-independent identity.
///
/// Handles regular `scheme://` URLs, scp-style `git@host:path` spellings
/// (rewritten to `ssh://git@host/path`), and plain local paths.
pub fn normalize_url(url: &str) -> Result<RepoUrl> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::configuration("Empty repository URL"));
    }

    if trimmed.contains("://") {
        let parsed = Url::parse(trimmed)?;
        let host = parsed.host_str().unwrap_or("").to_lowercase();
        let path = normalize_path(parsed.path());
        return Ok(RepoUrl {
            key: format!("{}{}", host, path),
            canonical: trimmed.to_string(),
            is_ssh: parsed.scheme() == "ssh",
        });
    }

    // scp-style: user@host:path, but not a Windows drive or a plain path.
    if let Some((userhost, path)) = trimmed.split_once(':') {
        if userhost.contains('@') && !path.starts_with('/') {
            let canonical = format!("ssh://{}/{}", userhost, path);
            let parsed = Url::parse(&canonical)?;
            let host = parsed.host_str().unwrap_or("").to_lowercase();
            return Ok(RepoUrl {
                key: format!("{}{}", host, normalize_path(parsed.path())),
                canonical,
                is_ssh: true,
            });
        }
    }

    // Anything else is treated as a local path.
    Ok(RepoUrl {
        key: normalize_path(trimmed),
        canonical: trimmed.to_string(),
        is_ssh: false,
    })
}

fn normalize_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path).to_string()
}

/// Stable on-disk directory name for a repository key.
///
/// `DefaultHasher` is not guaranteed stable across Rust releases, which
/// matters for a store that outlives one process, so a truncated SHA-256
/// digest is used instead.
fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// One shared dependency: a canonical URL, its bare clone, and the set of
/// worktrees attached to it.
#[derive(Debug)]
struct Dependency {
    url: String,
    bare_dir: PathBuf,
    worktrees: BTreeSet<PathBuf>,
}

/// Registry of shared dependencies for one compile run.
///
/// The registry is the only shared mutable structure during dependency
/// resolution; all operations take the internal lock, so concurrent callers
/// cannot race to clone the same bare repository.
#[derive(Debug)]
pub struct DependencyRegistry {
    store_root: PathBuf,
    entries: Mutex<BTreeMap<String, Dependency>>,
}

impl DependencyRegistry {
    /// Create a registry whose bare clones live under
    /// `<work_dir>/.repo-store/`.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            store_root: work_dir.join(".repo-store"),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Dependency>> {
        // A poisoned registry means another fetch panicked mid-operation;
        // the store contents are still consistent on disk.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a repository URL, returning its key.
    ///
    /// Idempotent: a second registration of the same repository returns the
    /// existing entry. When an https and an ssh spelling are both
    /// registered, the ssh form wins, since it is the more specific,
    /// authenticated one.
    pub fn register(&self, url: &str) -> Result<String> {
        let repo_url = normalize_url(url)?;
        let mut entries = self.lock();
        match entries.get_mut(&repo_url.key) {
            Some(entry) => {
                if repo_url.is_ssh && entry.url != repo_url.canonical {
                    debug!(
                        "replacing stored URL {} with ssh spelling {}",
                        entry.url, repo_url.canonical
                    );
                    entry.url = repo_url.canonical;
                }
            }
            None => {
                let bare_dir = self
                    .store_root
                    .join(format!("{}.git", key_digest(&repo_url.key)));
                entries.insert(
                    repo_url.key.clone(),
                    Dependency {
                        url: repo_url.canonical,
                        bare_dir,
                        worktrees: BTreeSet::new(),
                    },
                );
            }
        }
        Ok(repo_url.key)
    }

    /// The stored canonical URL for a registered key.
    pub fn url_for(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|e| e.url.clone())
    }

    /// The bare repository directory for a registered key.
    pub fn bare_repository_dir(&self, key: &str) -> Option<PathBuf> {
        self.lock().get(key).map(|e| e.bare_dir.clone())
    }

    /// True iff the entry has at least one worktree attached.
    pub fn has_checkouts(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .map(|e| !e.worktrees.is_empty())
            .unwrap_or(false)
    }

    /// Number of registered dependencies.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no dependency has been registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Materialize a worktree of `key` at `target_dir`, pinned to
    /// `version` (`None` leaves the remote default branch checked out).
    ///
    /// Creates the bare clone on demand. Fails with a resource-state error
    /// when `target_dir` exists as a non-empty directory.
    pub fn initialize_worktree(
        &self,
        key: &str,
        target_dir: &Path,
        version: Option<&str>,
    ) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key).ok_or_else(|| {
            Error::resource_state(format!("Dependency '{}' is not registered", key))
        })?;

        gitrepo::ensure_bare_clone(&entry.url, &entry.bare_dir)?;
        gitrepo::add_worktree(&entry.bare_dir, target_dir)?;

        let worktree = GitRepo::open(target_dir)?;
        // Dependency worktrees are always detached: several checkouts of
        // one shared repository may pin the same branch, and a local
        // branch can only be checked out once.
        worktree.checkout_detached(version)?;

        entry.worktrees.insert(target_dir.to_path_buf());
        Ok(())
    }

    /// Record an already existing worktree of `key` at `target_dir`.
    ///
    /// Used when a previous run left a checkout behind; the directory must
    /// exist and be a linked worktree (its `.git` is a file pointing at
    /// the shared repository).
    pub fn adopt_worktree(&self, key: &str, target_dir: &Path) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key).ok_or_else(|| {
            Error::resource_state(format!("Dependency '{}' is not registered", key))
        })?;
        if !target_dir.join(".git").is_file() {
            return Err(Error::resource_state(format!(
                "'{}' is not a linked worktree",
                target_dir.display()
            )));
        }
        entry.worktrees.insert(target_dir.to_path_buf());
        Ok(())
    }

    /// Remove the worktree of `key` at `target_dir`.
    ///
    /// The bare clone is deleted only when this was the last checkout,
    /// preserving storage shared by sibling worktrees.
    pub fn remove_worktree(&self, key: &str, target_dir: &Path) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries.get_mut(key).ok_or_else(|| {
            Error::resource_state(format!("Dependency '{}' not found for deletion", key))
        })?;
        if !entry.worktrees.remove(&target_dir.to_path_buf()) {
            return Err(Error::resource_state(format!(
                "No checkout of '{}' at '{}'",
                key,
                target_dir.display()
            )));
        }

        gitrepo::remove_worktree(&entry.bare_dir, target_dir)?;

        if entry.worktrees.is_empty() && entry.bare_dir.exists() {
            debug!(
                "removing bare clone {} (no checkouts left)",
                entry.bare_dir.display()
            );
            fs::remove_dir_all(&entry.bare_dir)?;
        }
        Ok(())
    }
}
