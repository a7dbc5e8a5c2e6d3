// src/config/mod.rs

//! Configuration loading, validation and the config graph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a project file from disk (`loader.rs`).
//! - Validate references and acyclicity (`validate.rs`).
//! - Merge raw tables into immutable [`Action`] values (`action.rs`).
//! - Scan and substitute runtime output references (`template.rs`).
//! - Expose the topology to the scheduler (`graph.rs`).

pub mod action;
pub mod graph;
pub mod loader;
pub mod model;
pub mod template;
pub mod validate;

pub use action::{Action, compute_version};
pub use graph::{ConfigGraph, ConfigSource, DependencyQuery, Module, StaticConfigGraph};
pub use loader::{FileConfigSource, load_and_validate, load_from_path};
pub use model::{ActionConfig, DefaultsSection, ProjectConfig, ProjectSection, RawProjectConfig};
pub use template::{OutputReference, output_references, referenced_actions, resolve_spec};
pub use validate::validate_config;
