// src/watch/mod.rs

//! File watching and source fingerprints.
//!
//! This module is responsible for:
//! - Compiling per-action include/exclude globs ([`patterns`]).
//! - Hashing the files they match into action versions ([`hash`]).
//! - Turning filesystem changes into bus events ([`event_handler`],
//!   [`watcher`]).
//!
//! It knows nothing about tasks or scheduling; the orchestrator decides what
//! a changed module means.

pub mod event_handler;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use event_handler::{ChangeBatch, ChangeClassifier, ChangeKind};
pub use hash::{compute_hash_for_paths, compute_source_hash};
pub use patterns::{SourceProfile, collect_matching_files};
pub use watcher::{WatcherHandle, profiles_for, spawn_watcher};
