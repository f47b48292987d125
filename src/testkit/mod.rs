//! Test doubles for the system boundaries.
//!
//! - [`FakeCluster`] — in-memory orchestrator with live watch feeds and
//!   scripted failure knobs. Best for: lifecycle flows, ownership
//!   scoping, watch-to-stream behavior.
//! - [`StaticVerifier`] — bearer → owner map with no network.

mod auth;
mod cluster;

pub use auth::StaticVerifier;
pub use cluster::{matches_selector, FakeCluster};
