//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `catalog-compiler` command-line tool. Each subcommand is defined in its
//! own file to keep the logic separated and maintainable.
//!
//! Each command module contains an `Args` struct that defines the
//! command-specific arguments and options, derived using `clap`, and an
//! `execute` function that takes the parsed `Args` and calls into the
//! `catalog_compiler` library to perform the core logic.

pub mod compile;
pub mod inventory;
