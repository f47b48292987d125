//! podbench - ephemeral per-user notebook sessions on Kubernetes.
//!
//! The service provisions a compute pod (and optionally a fronting
//! service) per session, authenticates callers through an external
//! identity gateway, tracks which session belongs to which caller, and
//! streams live session status over a per-subscriber watch.
//!
//! # Architecture
//!
//! Dependencies are injected at construction; there are no global
//! handles. The seams are traits:
//!
//! - [`orchestrator::Orchestrator`] - typed wrapper over the cluster API
//! - [`auth::AuthVerifier`] - bearer credential → verified owner
//! - [`registry::OwnershipRegistry`] - owner → instance index, either
//!   label-derived (stateless) or table-backed (durable)
//!
//! [`lifecycle::LifecycleController`] owns the instance state machine;
//! [`streamer::StatusStreamer`] bridges cluster watches into per-owner
//! event feeds; [`server`] is the thin HTTP boundary.
//!
//! # Modules
//!
//! - [`config`] - environment-provided startup configuration
//! - [`domain`] - instances, lifecycle states, watch events
//! - [`error`] - typed outcomes for every core operation
//! - [`images`] - the image allow-list
//!
//! # Features
//!
//! - `testkit` - in-memory fakes for the system boundaries

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod images;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod streamer;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
