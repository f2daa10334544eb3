//! # Error Handling
//!
//! Centralized error type for catalog compilation. All library code returns
//! [`Result<T>`]; the binary maps errors to a non-zero exit at the top level.
//!
//! The taxonomy distinguishes:
//!
//! - **Configuration errors**: missing or malformed user configuration
//!   (unknown component, missing `url`/`version`, empty cluster facts).
//!   These are never defaulted away, since a silently guessed value would
//!   make catalog builds non-reproducible.
//! - **Merge conflicts**: an unresolved conflict in a tracked path of a
//!   working tree; the variant carries the first conflicting path.
//! - **Resource-state errors**: the filesystem is not in the expected shape
//!   (target directory already exists, checkout missing on delete).
//! - **External-tool errors**: git or the manifest compiler failed; these
//!   propagate as fatal with the subprocess stderr attached, no retry.
//! - **Evaluation errors**: a referenced class file does not exist, or a
//!   `${...}` reference cannot be resolved against the merged parameters.

use thiserror::Error;

/// Main error type for catalog compilation
#[derive(Error, Debug)]
pub enum Error {
    /// User-facing configuration error; the message names the offending
    /// key, fact, or file.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An unresolved merge conflict was found while staging changes.
    ///
    /// Carries the first conflicting path, relative to the working tree.
    #[error("Merge conflict in '{path}'")]
    MergeConflict { path: String },

    /// The on-disk state does not match what the operation requires.
    #[error("{message}")]
    ResourceState { message: String },

    /// Cloning or fetching a Git repository failed.
    #[error("Git clone error for {url}: {message}")]
    GitClone { url: String, message: String },

    /// A Git subprocess exited non-zero.
    #[error("Git command failed: git {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// The external manifest compiler failed for a target.
    #[error("Compilation of target '{target}' failed: {message}")]
    Compile { target: String, message: String },

    /// A class named in a target or another class does not exist on disk.
    #[error("Class '{class}' not found in inventory")]
    MissingClass { class: String },

    /// A `${...}` reference could not be resolved during inventory
    /// evaluation.
    #[error("Unable to resolve reference '${{{reference}}}': {message}")]
    UnresolvedReference { reference: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

impl Error {
    /// Shorthand for an [`Error::Configuration`] with an owned message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for an [`Error::ResourceState`] with an owned message.
    pub fn resource_state(message: impl Into<String>) -> Self {
        Error::ResourceState {
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
