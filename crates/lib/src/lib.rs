//! rebuilder-lib: Core types and logic for rebuilder
//!
//! This crate decides which recipes in a recipe repository need to be built:
//! - `matrix`: build-environment matrix expansion
//! - `graph`: package dependency graph over a recipe set
//! - `filter`: per-environment build-candidate filtering
//! - `target`: a single (artifact, environment) build obligation
//!
//! The remaining modules are the collaborators the engine talks to: recipe
//! metadata, channel indexes, artifact path resolution, git history and
//! configuration.

pub mod blacklist;
pub mod channel;
pub mod config;
pub mod consts;
pub mod filter;
pub mod graph;
pub mod matrix;
pub mod platform;
pub mod recipe;
pub mod resolve;
pub mod target;
pub mod vcs;
