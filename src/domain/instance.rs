//! Instance types and the lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instance identifier - newtype for type safety.
///
/// The inner String is private to ensure all construction goes through
/// the defined constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Generate a fresh, globally unique instance id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create an InstanceId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the instance id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Verified owner identity - newtype for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an OwnerId from a verified identity string.
    ///
    /// Only the auth verifier and the ownership registry should construct
    /// these from external input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the owner id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-instance secret consumed by the instance's embedded application.
///
/// Distinct from the caller's bearer credential. Generated once at creation
/// and immutable afterwards. Random uuid, not cryptographically hardened;
/// uniqueness per owner is enforced by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Generate a fresh access token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create an AccessToken from an existing string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an instance.
///
/// Transitions are monotonic: Provisioning → Running → Terminating →
/// Deleted, with a direct Provisioning → Deleted edge when the owner
/// deletes before readiness is observed. No transition reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Provisioning,
    Running,
    Terminating,
    Deleted,
}

impl InstanceState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, next),
            (Provisioning, Running)
                | (Provisioning, Terminating)
                | (Provisioning, Deleted)
                | (Running, Terminating)
                | (Running, Deleted)
                | (Terminating, Deleted)
        )
    }

    /// Project a state from the underlying compute resource's observed
    /// status.
    pub fn project(phase: Option<&str>, ready: bool, deleting: bool) -> Self {
        if deleting {
            return InstanceState::Terminating;
        }
        match phase {
            Some("Running") if ready => InstanceState::Running,
            Some("Succeeded") | Some("Failed") => InstanceState::Terminating,
            _ => InstanceState::Provisioning,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Provisioning => "provisioning",
            InstanceState::Running => "running",
            InstanceState::Terminating => "terminating",
            InstanceState::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A single provisioned session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: InstanceId,
    pub owner_id: OwnerId,
    pub access_token: AccessToken,
    /// Name of the underlying compute resource.
    pub compute_ref: String,
    /// Name of the underlying endpoint resource, absent when the deployment
    /// variant does not create one.
    pub endpoint_ref: Option<String>,
    /// Caller-supplied label, not guaranteed unique.
    pub display_name: String,
    /// Resolved full image reference from the allow-list.
    pub image_ref: String,
    pub state: InstanceState,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Owner-visible projection of this instance.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            instance_id: self.instance_id.clone(),
            display_name: self.display_name.clone(),
            compute_ref: Some(self.compute_ref.clone()),
            endpoint_ref: self.endpoint_ref.clone(),
            access_token: Some(self.access_token.clone()),
            state: self.state,
            created_at: Some(self.created_at),
        }
    }
}

/// The projection of an instance published to its owner, both in list
/// responses and in watch events.
///
/// Fields other than `instance_id` and `display_name` may be absent on
/// removal notices, where only the last-known identity is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub instance_id: InstanceId,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(InstanceId::generate(), InstanceId::generate());
        assert_ne!(
            AccessToken::generate().as_str(),
            AccessToken::generate().as_str()
        );
    }

    #[test]
    fn state_machine_is_monotonic() {
        use InstanceState::*;
        assert!(Provisioning.can_transition_to(Running));
        assert!(Provisioning.can_transition_to(Deleted));
        assert!(Running.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Deleted));

        assert!(!Running.can_transition_to(Provisioning));
        assert!(!Deleted.can_transition_to(Provisioning));
        assert!(!Deleted.can_transition_to(Running));
        assert!(!Terminating.can_transition_to(Running));
    }

    #[test]
    fn projection_requires_readiness_for_running() {
        assert_eq!(
            InstanceState::project(Some("Running"), true, false),
            InstanceState::Running
        );
        assert_eq!(
            InstanceState::project(Some("Running"), false, false),
            InstanceState::Provisioning
        );
        assert_eq!(
            InstanceState::project(Some("Pending"), false, false),
            InstanceState::Provisioning
        );
        assert_eq!(
            InstanceState::project(Some("Running"), true, true),
            InstanceState::Terminating
        );
    }

}
