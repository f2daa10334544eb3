//! # Git Repository Handle
//!
//! This module wraps one on-disk git working tree (or bare repository) and
//! provides the staged-change detection, conflict-safe commit, and diff
//! reporting the catalog workflow needs.
//!
//! All operations shell out to the system `git` command, which automatically
//! handles:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig
//!
//! Conflict handling is strictly local: after a staging attempt the index is
//! inspected for unmerged entries and the first conflicting path is surfaced
//! as [`Error::MergeConflict`]. No automatic conflict resolution is ever
//! attempted.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;
use url::Url;

use crate::error::{Error, Result};

/// Fallback commit identity when the caller does not configure one.
///
/// Commits must never depend on the machine-global git config, otherwise a
/// catalog build fails on hosts without `user.name`/`user.email` set.
const DEFAULT_AUTHOR_NAME: &str = "Catalog Compiler";
const DEFAULT_AUTHOR_EMAIL: &str = "catalog-compiler@localhost";

/// Run a git subcommand in `dir` and return its stdout.
///
/// A non-zero exit status maps to [`Error::GitCommand`] carrying the full
/// argument list and the subprocess stderr.
fn git_run(dir: &Path, args: &[&str]) -> Result<String> {
    debug!("git {} (in {})", args.join(" "), dir.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::GitCommand {
            command: args.join(" "),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::GitCommand {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Like [`git_run`], but only reports success or failure.
fn git_check(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Rewrite common clone/fetch failures into an actionable message.
fn clone_error(url: &str, stderr: &str) -> Error {
    let message = if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        format!(
            "Authentication failed. Make sure you have access to the repository.\n\
            For private repos, ensure you have:\n\
            - SSH key added to ssh-agent\n\
            - Git credentials configured\n\
            - Personal access token set up\n\
            Error: {}",
            stderr
        )
    } else {
        stderr.to_string()
    };

    Error::GitClone {
        url: url.to_string(),
        message,
    }
}

/// A handle to one git working tree.
pub struct GitRepo {
    root: PathBuf,
    author_name: String,
    author_email: String,
    initialized_empty: Cell<bool>,
}

impl GitRepo {
    /// Open an existing working tree.
    ///
    /// Fails with a resource-state error when `root` is not a git
    /// repository.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !git_check(&root, &["rev-parse", "--git-dir"]) {
            return Err(Error::resource_state(format!(
                "'{}' is not a git repository",
                root.display()
            )));
        }
        Ok(Self {
            root,
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
            initialized_empty: Cell::new(false),
        })
    }

    /// Initialize a fresh repository at `root`, creating the directory if
    /// needed.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        git_run(&root, &["init"])?;
        Ok(Self {
            root,
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
            initialized_empty: Cell::new(false),
        })
    }

    /// Clone `url` into `directory` and check out the remote default
    /// branch.
    ///
    /// An empty upstream yields an empty working tree with an initial
    /// commit, so subsequent staged commits have a parent to amend.
    pub fn clone(url: &str, directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        if let Some(parent) = directory.parent() {
            fs::create_dir_all(parent)?;
        }

        let output = Command::new("git")
            .args(["clone", url])
            .arg(&directory)
            .output()
            .map_err(|e| clone_error(url, &e.to_string()))?;
        if !output.status.success() {
            return Err(clone_error(url, &String::from_utf8_lossy(&output.stderr)));
        }

        let repo = Self::open(directory)?;
        repo.configure_push_url(url)?;

        if !git_check(&repo.root, &["rev-parse", "--verify", "--quiet", "HEAD"]) {
            debug!(
                "cloned repository {} is empty, creating initial commit",
                url
            );
            repo.commit_initial()?;
            repo.initialized_empty.set(true);
        }

        Ok(repo)
    }

    /// True when the clone found an empty upstream and created the initial
    /// placeholder commit. The flag clears with the next commit created
    /// through this handle, so only the first content commit amends the
    /// placeholder.
    pub fn initialized_empty(&self) -> bool {
        self.initialized_empty.get()
    }

    /// Set the author identity used for commits created through this
    /// handle.
    pub fn set_author(&mut self, name: &str, email: &str) {
        self.author_name = name.to_string();
        self.author_email = email.to_string();
    }

    /// The working tree root.
    pub fn working_tree_dir(&self) -> &Path {
        &self.root
    }

    /// URL of the `origin` remote.
    pub fn remote_url(&self) -> Result<String> {
        Ok(git_run(&self.root, &["remote", "get-url", "origin"])?
            .trim()
            .to_string())
    }

    /// Short (6 character) SHA of the current HEAD commit.
    pub fn head_short_sha(&self) -> Result<String> {
        Ok(git_run(&self.root, &["rev-parse", "--short=6", "HEAD"])?
            .trim()
            .to_string())
    }

    /// Configure a best-effort SSH push URL for http(s) clone URLs.
    ///
    /// Catalog repositories are commonly cloned read-only over https while
    /// pushes go over SSH.
    fn configure_push_url(&self, url: &str) -> Result<()> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let parsed = Url::parse(url)?;
            if let Some(host) = parsed.host_str() {
                let pushurl = format!("ssh://git@{}{}", host, parsed.path());
                git_run(
                    &self.root,
                    &["remote", "set-url", "--push", "origin", &pushurl],
                )?;
            }
        }
        Ok(())
    }

    /// Default branch of the `origin` remote (e.g. `main` or `master`).
    fn default_branch(&self) -> Result<String> {
        let symref = ["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"];
        let name = match git_run(&self.root, &symref) {
            Ok(name) => name,
            Err(_) => {
                git_run(&self.root, &["remote", "set-head", "origin", "--auto"])?;
                git_run(&self.root, &symref)?
            }
        };
        Ok(name.trim().trim_start_matches("origin/").to_string())
    }

    /// Fetch the remote and point the working tree at `version`.
    ///
    /// `version` may be a remote branch (a local tracking branch is created
    /// or reset), a tag, or a commit SHA (detached head). `None` selects
    /// the remote default branch. An unknown revision is a configuration
    /// error, since an unresolvable pin would silently compile the wrong
    /// catalog.
    pub fn checkout(&self, version: Option<&str>) -> Result<()> {
        git_run(&self.root, &["fetch", "--prune", "--tags", "origin"])?;

        let version = match version {
            Some(v) => v.to_string(),
            None => self.default_branch()?,
        };

        let remote_ref = format!("refs/remotes/origin/{}", version);
        if git_check(&self.root, &["show-ref", "--verify", "--quiet", &remote_ref]) {
            let start = format!("origin/{}", version);
            git_run(&self.root, &["checkout", "--force", "-B", &version, &start])?;
            return Ok(());
        }

        self.checkout_detached_at(&version)
    }

    /// Fetch the remote and detach the working tree at `version` without
    /// creating a local branch.
    ///
    /// This is the variant used for dependency worktrees: several worktrees
    /// of one shared repository may be pinned to the same branch, and a
    /// local branch can only be checked out in one worktree at a time.
    pub fn checkout_detached(&self, version: Option<&str>) -> Result<()> {
        git_run(&self.root, &["fetch", "--prune", "--tags", "origin"])?;

        let version = match version {
            Some(v) => v.to_string(),
            None => self.default_branch()?,
        };
        self.checkout_detached_at(&version)
    }

    fn checkout_detached_at(&self, version: &str) -> Result<()> {
        let candidates = [
            format!("refs/remotes/origin/{}", version),
            format!("refs/tags/{}", version),
            version.to_string(),
        ];
        for rev in &candidates {
            if git_check(&self.root, &["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", rev)]) {
                git_run(&self.root, &["checkout", "--force", "--detach", rev])?;
                return Ok(());
            }
        }
        Err(Error::configuration(format!(
            "Revision '{}' not found in repository '{}'",
            version,
            self.remote_url().unwrap_or_else(|_| self.root.display().to_string())
        )))
    }

    /// Stage a fixed allow-list of paths or glob patterns.
    ///
    /// Patterns are resolved relative to the working tree; patterns that
    /// match nothing are skipped. This must run before [`GitRepo::stage_all`]
    /// so the reported diff covers the allow-listed files too.
    pub fn stage_files(&self, patterns: &[&str]) -> Result<()> {
        let mut to_add: Vec<String> = Vec::new();
        for pattern in patterns {
            let full = self.root.join(pattern);
            let matches = glob::glob(&full.to_string_lossy())?;
            for entry in matches.flatten() {
                if let Ok(rel) = entry.strip_prefix(&self.root) {
                    to_add.push(rel.to_string_lossy().to_string());
                }
            }
        }
        if to_add.is_empty() {
            return Ok(());
        }

        let mut args: Vec<&str> = vec!["add", "--"];
        args.extend(to_add.iter().map(String::as_str));
        git_run(&self.root, &args)?;
        Ok(())
    }

    /// Paths with unmerged index entries, deduplicated, in index order.
    fn unmerged_paths(&self) -> Result<Vec<String>> {
        let out = git_run(&self.root, &["ls-files", "--unmerged"])?;
        let mut paths: Vec<String> = Vec::new();
        for line in out.lines() {
            // `<mode> <sha> <stage>\t<path>` per unmerged stage entry
            if let Some((_, path)) = line.split_once('\t') {
                if !paths.iter().any(|p| p == path) {
                    paths.push(path.to_string());
                }
            }
        }
        Ok(paths)
    }

    /// Stage every remaining change (including deletions) and report the
    /// staged diff.
    ///
    /// Returns the diff text and whether anything changed. Fails with
    /// [`Error::MergeConflict`] carrying the first conflicting path when
    /// the index holds unresolved conflict entries; staging such a path
    /// would silently mark the conflict as resolved, so it is checked
    /// before `git add` runs.
    pub fn stage_all(&self) -> Result<(String, bool)> {
        let conflicts = self.unmerged_paths()?;
        if let Some(path) = conflicts.into_iter().next() {
            return Err(Error::MergeConflict { path });
        }

        git_run(&self.root, &["add", "--all"])?;

        let diff = if git_check(&self.root, &["rev-parse", "--verify", "--quiet", "HEAD"]) {
            git_run(&self.root, &["diff", "--cached", "HEAD"])?
        } else {
            git_run(&self.root, &["diff", "--cached"])?
        };
        let changed = !diff.trim().is_empty();
        Ok((diff, changed))
    }

    /// True when the index holds staged changes relative to HEAD.
    fn has_staged_changes(&self) -> bool {
        if git_check(&self.root, &["rev-parse", "--verify", "--quiet", "HEAD"]) {
            !git_check(&self.root, &["diff", "--cached", "--quiet", "HEAD"])
        } else {
            // Unborn branch: anything in the index counts as staged.
            !git_run(&self.root, &["ls-files", "--cached"])
                .map(|o| o.trim().is_empty())
                .unwrap_or(true)
        }
    }

    fn identity_args(&self) -> [String; 4] {
        [
            "-c".to_string(),
            format!("user.name={}", self.author_name),
            "-c".to_string(),
            format!("user.email={}", self.author_email),
        ]
    }

    fn commit_initial(&self) -> Result<()> {
        let id = self.identity_args();
        let mut args: Vec<&str> = id.iter().map(String::as_str).collect();
        args.extend(["commit", "--allow-empty", "-m", "Initial commit"]);
        git_run(&self.root, &args)?;
        Ok(())
    }

    /// Create a commit from the staged changes.
    ///
    /// With `amend` the previous commit is rewritten instead; this is used
    /// when a worktree was just initialized and the first content commit
    /// should not produce two commits. Without staged changes (and without
    /// `amend`) the call is a no-op.
    pub fn commit(&self, message: &str, amend: bool) -> Result<()> {
        if !amend && !self.has_staged_changes() {
            debug!("no staged changes in {}, skipping commit", self.root.display());
            return Ok(());
        }

        let id = self.identity_args();
        let mut args: Vec<&str> = id.iter().map(String::as_str).collect();
        args.extend(["commit", "-m", message]);
        if amend {
            args.push("--amend");
        }
        git_run(&self.root, &args)?;
        self.initialized_empty.set(false);
        Ok(())
    }

    /// Fast-forward push to `origin`. Fails loudly, no retry.
    pub fn push(&self) -> Result<()> {
        git_run(&self.root, &["push", "origin", "HEAD"])?;
        Ok(())
    }
}

// Bare-repository and worktree plumbing used by the shared dependency
// store. Bare clones are created with an explicit remote-tracking refspec
// so worktrees can resolve `origin/<branch>` the same way normal clones do.

/// Ensure a bare clone of `url` exists at `bare_dir` and is up to date.
pub fn ensure_bare_clone(url: &str, bare_dir: &Path) -> Result<()> {
    if !bare_dir.join("HEAD").exists() {
        if let Some(parent) = bare_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(bare_dir)?;
        git_run(bare_dir, &["init", "--bare"])?;
        git_run(bare_dir, &["remote", "add", "origin", url])?;
        git_run(
            bare_dir,
            &[
                "config",
                "remote.origin.fetch",
                "+refs/heads/*:refs/remotes/origin/*",
            ],
        )?;
    }

    git_run(bare_dir, &["fetch", "--prune", "--tags", "--force", "origin"])
        .map_err(|e| match e {
            Error::GitCommand { stderr, .. } => clone_error(url, &stderr),
            other => other,
        })?;

    // A previous run may have deleted worktree directories without
    // detaching them; stale registrations block re-adding the same path.
    git_run(bare_dir, &["worktree", "prune"])?;

    // Point HEAD at the remote default branch so `worktree add` has a
    // commit to start from.
    git_run(bare_dir, &["remote", "set-head", "origin", "--auto"])?;
    let target = git_run(bare_dir, &["symbolic-ref", "refs/remotes/origin/HEAD"])?;
    git_run(bare_dir, &["symbolic-ref", "HEAD", target.trim()])?;

    Ok(())
}

/// Attach a new detached worktree of `bare_dir` at `worktree_dir`.
///
/// Fails with a resource-state error when `worktree_dir` already exists as
/// a non-empty directory.
pub fn add_worktree(bare_dir: &Path, worktree_dir: &Path) -> Result<()> {
    if worktree_dir.exists() {
        let non_empty = fs::read_dir(worktree_dir)?.next().is_some();
        if non_empty {
            return Err(Error::resource_state(format!(
                "Can't create worktree at '{}': directory exists and is not empty",
                worktree_dir.display()
            )));
        }
        // git refuses to create a worktree over an existing directory,
        // even an empty one.
        fs::remove_dir(worktree_dir)?;
    }
    if let Some(parent) = worktree_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    let worktree = worktree_dir.to_string_lossy().to_string();
    git_run(bare_dir, &["worktree", "add", "--detach", &worktree])?;
    Ok(())
}

/// Detach the worktree at `worktree_dir` from `bare_dir` and delete it.
pub fn remove_worktree(bare_dir: &Path, worktree_dir: &Path) -> Result<()> {
    let worktree = worktree_dir.to_string_lossy().to_string();
    if git_run(bare_dir, &["worktree", "remove", "--force", &worktree]).is_err() {
        // The worktree directory may already be gone; drop the leftover
        // bookkeeping instead.
        if worktree_dir.exists() {
            fs::remove_dir_all(worktree_dir)?;
        }
        git_run(bare_dir, &["worktree", "prune"])?;
    }
    Ok(())
}

/// Name of the branch HEAD points at; test fixtures need it because the
/// default branch name depends on the host git configuration.
#[cfg(test)]
pub(crate) fn tests_helper_head_branch(dir: &Path) -> String {
    git_run(dir, &["symbolic-ref", "--short", "HEAD"])
        .expect("HEAD is not a branch")
        .trim()
        .to_string()
}
