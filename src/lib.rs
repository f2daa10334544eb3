//! # Catalog Compiler Library
//!
//! This library provides the core functionality for compiling cluster
//! catalogs: given a cluster descriptor, it resolves a layered parameter
//! hierarchy, synchronizes the versioned component and package repositories
//! the hierarchy declares, renders per-component compilation targets for an
//! external manifest compiler, and commits the compiled catalog to its git
//! repository. It is designed to be used by the `catalog-compiler`
//! command-line tool but can also be integrated into other applications
//! that drive catalog builds.
//!
//! ## Core Concepts
//!
//! The library is built around a few key concepts:
//!
//! - **Repository Handle (`gitrepo`)**: Wraps one on-disk git working tree;
//!   staged-change detection, conflict-safe commits, diff reporting, and
//!   the bare-clone/worktree plumbing used by the dependency store.
//! - **Shared Dependency Store (`dependency`)**: Maps a normalized
//!   repository URL to exactly one bare clone and tracks the worktrees
//!   attached to it, deduplicating storage across components and packages
//!   that reference the same upstream under different URL spellings.
//! - **Dependency Resolver (`resolver`)**: Reads the declared component
//!   and package specifications from the merged inventory, validates them
//!   strictly, and drives the store to produce pinned working trees.
//! - **Inventory (`inventory`)**: The layered class hierarchy (global →
//!   distribution → cloud → region → tenant → cluster), its on-disk
//!   layout, and the hierarchical class evaluator producing the merged
//!   parameter view.
//! - **Target Rendering (`cluster`)**: The cluster parameters class and
//!   one compilation target per component instance, including aliased
//!   multi-instance targets.
//!
//! ## Execution Flow
//!
//! The main entry point is [`compile::compile_cluster`], which executes
//! the following high-level steps:
//!
//! 1. **Checkout**: Clone the global defaults and tenant configuration
//!    repositories into the inventory.
//! 2. **Parameters**: Render the cluster parameters class from the
//!    cluster's facts.
//! 3. **Packages**: Evaluate the hierarchy leniently, fetch the declared
//!    packages, and re-evaluate with their classes in place.
//! 4. **Components**: Discover active components and aliases from the
//!    merged `applications` list, fetch them at their pinned versions,
//!    and validate alias use against multi-instance metadata.
//! 5. **Targets**: Render one target per instance plus the cluster-level
//!    bootstrap target, removing targets of instances that no longer
//!    exist.
//! 6. **Compile**: Invoke the external manifest compiler once per target.
//! 7. **Catalog**: Copy the compiled manifests into the catalog
//!    repository and create the staged, conflict-checked catalog commit.

pub mod api;
pub mod catalog;
pub mod cluster;
pub mod compile;
pub mod component;
pub mod config;
pub mod dependency;
pub mod error;
pub mod gitrepo;
pub mod inventory;
pub mod resolver;
