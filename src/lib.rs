// Library exports for integration testing
//
// This file exposes internal modules for integration tests while keeping
// the binary entrypoint in main.rs

pub mod cluster;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod models;
pub mod net;
pub mod notify;
pub mod reconciler;
pub mod registry;
pub mod version;

// Re-export commonly used types for testing
pub use engine::{Decision, Observation, decide};
pub use models::{ImageRef, RegistryKind};
pub use version::{
    CandidateTags, candidates_from_names, filter_pep440, latest_auto_updatable, latest_overall,
    should_auto_update,
};
